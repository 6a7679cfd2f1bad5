mod common;

use std::{
    path::Path,
    process::{Command, Output},
};

use classbind::{consts::NULLABLE_ANNOTATION, metadata::CompiledUnit};

use common::{base_class, widget_class, write_jar};

fn classbind(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_classbind"))
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "classbind failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout.clone()).unwrap()
}

fn demo_jar(dir: &Path) -> String {
    let base = base_class();
    let widget = widget_class();
    let jar = write_jar(
        dir,
        "demo.jar",
        &[
            ("demo/Base.class", base.as_slice()),
            ("demo/Widget.class", widget.as_slice()),
        ],
    );
    jar.to_str().unwrap().to_string()
}

#[test]
fn members_lists_annotations() {
    let dir = tempfile::tempdir().unwrap();
    let jar = demo_jar(dir.path());
    let out = stdout(&classbind(&["members", "demo.Widget", "--class-path", &jar]));

    assert!(out.starts_with("demo/Widget extends demo/Base"), "{out}");
    assert!(out.contains(&format!("  field  label Ljava/lang/String; @{NULLABLE_ANNOTATION}")));
    assert!(out.contains(&format!(
        "  method of(Ljava/lang/String;)Ldemo/Widget; @{NULLABLE_ANNOTATION}"
    )));
    assert!(out.contains(&format!("    param 0 @{NULLABLE_ANNOTATION}")));
}

#[test]
fn modifiers_without_descriptor_lists_overloads() {
    let dir = tempfile::tempdir().unwrap();
    let jar = demo_jar(dir.path());

    let out = stdout(&classbind(&["-c", &jar, "modifiers", "demo/Widget", "f"]));
    assert_eq!(
        out.lines().collect::<Vec<_>>(),
        ["f (I)V: none", "f (Ljava/lang/String;)V: none"]
    );

    let out = stdout(&classbind(&[
        "-c",
        &jar,
        "modifiers",
        "demo/Widget",
        "of",
        "(Ljava/lang/String;)Ldemo/Widget;",
    ]));
    assert_eq!(out.trim_end(), "of (Ljava/lang/String;)Ldemo/Widget;: STATIC | NULLABLE");

    let out = stdout(&classbind(&[
        "-c",
        &jar,
        "modifiers",
        "demo/Widget",
        "f",
        "(Ljava/lang/String;)V",
        "--param",
        "0",
    ]));
    assert_eq!(out.trim_end(), "f(Ljava/lang/String;)V param 0: NULLABLE");
}

#[test]
fn synth_writes_a_loadable_unit() {
    let dir = tempfile::tempdir().unwrap();
    let jar = demo_jar(dir.path());
    let output = dir.path().join("Bound.class");
    let out = stdout(&classbind(&[
        "synth",
        "Bound",
        "--class-path",
        &jar,
        "--super",
        "demo.Base",
        "-m",
        "step:(I)V",
        "--method",
        "peek:()Ldemo/Widget;",
        "-o",
        output.to_str().unwrap(),
    ]));
    assert!(out.starts_with("classbind/generated/Bound ("), "{out}");

    let unit = CompiledUnit::parse(&std::fs::read(&output).unwrap()).unwrap();
    assert_eq!(unit.name, "classbind/generated/Bound");
    assert_eq!(unit.super_name.as_deref(), Some("demo/Base"));
    assert!(unit.find_method("step", "(I)V").is_some());
    assert!(unit.find_method("peek", "()Ldemo/Widget;").is_some());
    assert!(unit.find_method("<init>", "(J)V").is_some());
}

#[test]
fn malformed_arguments_fail() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("Out.class");
    let out = classbind(&["synth", "Out", "-m", "nodescriptor", "-o", output.to_str().unwrap()]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("NAME:DESCRIPTOR"));
    assert!(!output.exists());

    let out = classbind(&["synth", "Out", "-m", "f:(Iz)V", "-o", output.to_str().unwrap()]);
    assert!(!out.status.success());
    assert!(!output.exists());
}
