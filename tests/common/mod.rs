#![allow(dead_code)]

use std::{
    cell::RefCell,
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    sync::Once,
};

use classbind::{
    BindingConfig, Runtime,
    class::{ClassWriter, Code, Insn},
    consts::{
        CONSTRUCTOR_NAME, FieldAccessFlag, MethodAccessFlag, NULLABLE_ANNOTATION, OBJECT_CLASS,
        opcode,
    },
    metadata::Annotation,
};
use log::{Level, LevelFilter, Log, Metadata, Record};
use tempfile::TempDir;
use zip::{ZipWriter, write::SimpleFileOptions};

thread_local! {
    static RECORDS: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
}

struct CaptureLogger;

impl Log for CaptureLogger {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        RECORDS.with(|records| {
            records
                .borrow_mut()
                .push((record.level(), record.args().to_string()))
        });
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;

/// Installs the capturing logger and clears this thread's records.
pub fn capture_logs() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(LevelFilter::Trace);
    });
    RECORDS.with(|records| records.borrow_mut().clear());
}

/// Warning and error lines logged on this thread since `capture_logs`.
pub fn warnings() -> Vec<String> {
    RECORDS.with(|records| {
        records
            .borrow()
            .iter()
            .filter(|(level, _)| *level <= Level::Warn)
            .map(|(_, message)| message.clone())
            .collect()
    })
}

pub fn nullable(visible: bool) -> Annotation {
    Annotation::new(NULLABLE_ANNOTATION, visible)
}

/// `demo/Base`: a public `(J)V` constructor and an instance `name()`.
pub fn base_class() -> Vec<u8> {
    let mut writer = ClassWriter::new("demo/Base", Some(OBJECT_CLASS));
    writer.source_file("Base.java");
    writer
        .method(MethodAccessFlag::PUBLIC, CONSTRUCTOR_NAME, "(J)V")
        .code(Code {
            max_stack: 1,
            max_locals: 3,
            instructions: vec![
                Insn::Op(opcode::ALOAD_0),
                Insn::InvokeSpecial {
                    owner: OBJECT_CLASS.to_string(),
                    name: CONSTRUCTOR_NAME.to_string(),
                    descriptor: "()V".to_string(),
                },
                Insn::Op(opcode::RETURN),
            ],
        });
    writer.method(MethodAccessFlag::PUBLIC, "name", "()Ljava/lang/String;");
    writer.to_bytes().unwrap()
}

/// `demo/Widget extends demo/Base` with overloads, statics and nullable
/// markers of both retentions.
pub fn widget_class() -> Vec<u8> {
    let mut writer = ClassWriter::new("demo/Widget", Some("demo/Base"));
    writer.source_file("Widget.java");
    writer
        .field(FieldAccessFlag::PRIVATE, "label", "Ljava/lang/String;")
        .annotation(nullable(false));
    writer.field(
        FieldAccessFlag::PUBLIC | FieldAccessFlag::STATIC | FieldAccessFlag::FINAL,
        "COUNT",
        "I",
    );
    writer
        .method(MethodAccessFlag::PUBLIC, CONSTRUCTOR_NAME, "(J)V")
        .code(Code {
            max_stack: 3,
            max_locals: 3,
            instructions: vec![
                Insn::Op(opcode::ALOAD_0),
                Insn::Load {
                    opcode: opcode::LLOAD,
                    index: 1,
                },
                Insn::InvokeSpecial {
                    owner: "demo/Base".to_string(),
                    name: CONSTRUCTOR_NAME.to_string(),
                    descriptor: "(J)V".to_string(),
                },
                Insn::Op(opcode::RETURN),
            ],
        });
    writer.method(MethodAccessFlag::PUBLIC | MethodAccessFlag::NATIVE, "f", "(I)V");
    writer
        .method(
            MethodAccessFlag::PUBLIC | MethodAccessFlag::NATIVE,
            "f",
            "(Ljava/lang/String;)V",
        )
        .parameter_annotation(0, nullable(false));
    writer
        .method(
            MethodAccessFlag::PUBLIC | MethodAccessFlag::NATIVE,
            "g",
            "(Ljava/lang/String;Ljava/lang/String;)V",
        )
        .parameter_annotation(1, nullable(true));
    writer
        .method(
            MethodAccessFlag::PUBLIC | MethodAccessFlag::STATIC | MethodAccessFlag::NATIVE,
            "of",
            "(Ljava/lang/String;)Ldemo/Widget;",
        )
        .annotation(nullable(true));
    writer.method(MethodAccessFlag::PUBLIC | MethodAccessFlag::NATIVE, "size", "()I");
    writer.to_bytes().unwrap()
}

/// `demo/Orphan`, whose superclass is not on any class path.
pub fn orphan_class() -> Vec<u8> {
    let mut writer = ClassWriter::new("demo/Orphan", Some("demo/Missing"));
    writer.method(MethodAccessFlag::PUBLIC, "f", "(I)V");
    writer.to_bytes().unwrap()
}

pub fn write_jar(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
    let path = dir.join(name);
    let mut writer = ZipWriter::new(File::create(&path).unwrap());
    for (entry, bytes) in entries {
        writer
            .start_file(*entry, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap();
    path
}

/// A runtime whose class path is a jar holding the demo fixtures.
pub fn demo_runtime(config: BindingConfig) -> (TempDir, Runtime) {
    let dir = tempfile::tempdir().unwrap();
    let base = base_class();
    let widget = widget_class();
    let orphan = orphan_class();
    let jar = write_jar(
        dir.path(),
        "demo.jar",
        &[
            ("demo/Base.class", base.as_slice()),
            ("demo/Widget.class", widget.as_slice()),
            ("demo/Orphan.class", orphan.as_slice()),
            ("demo/Broken.class", &b"\xca\xfe\xba\xbe\x00"[..]),
        ],
    );
    let config = BindingConfig {
        class_path: vec![jar],
        ..config
    };
    let runtime = Runtime::new(config).unwrap();
    (dir, runtime)
}
