mod common;

use classbind::{
    BindingConfig, ModifierExtractor, ModifierSet, StubSpec, Synthesizer,
    consts::{FieldAccessFlag, MethodAccessFlag},
    descriptor::{FieldType, parse_method_descriptor},
    error::{ResolveError, RuntimeError, SynthesisError},
    metadata::CompiledUnit,
    resolve::resolve_method_descriptor,
    runtime::{NativeVariable, Runtime},
};
use common::demo_runtime;

#[test]
fn generated_class_end_to_end() {
    let runtime = Runtime::new(BindingConfig::default()).unwrap();
    let spec = StubSpec {
        simple_name: "Generated1".to_string(),
        superclass: None,
        methods: vec![("step".to_string(), "(I)V".to_string())],
    };
    let class = Synthesizer::new(&runtime).synthesize(&spec).unwrap();

    let handle = class.declared_field("rust_object").unwrap();
    assert_eq!(handle.field_type(), &FieldType::Long);
    assert!(!handle.is_static());

    let step = class.declared_method("step", &[FieldType::Int]).unwrap();
    assert!(step.is_native());
    assert_eq!(step.descriptor().return_type, None);
    assert_eq!(class.methods().iter().filter(|m| m.is_native()).count(), 1);

    let object = runtime.alloc_object(&class).unwrap();
    let err = runtime
        .invoke(object, "step", "(I)V", vec![NativeVariable::Int(3)])
        .unwrap_err();
    assert!(matches!(err, RuntimeError::UnsatisfiedLink { .. }));
}

#[test]
fn malformed_descriptor_is_rejected_up_front() {
    let err = parse_method_descriptor("(Iz)V").unwrap_err();
    assert_eq!(err.input, "(Iz)V");
    assert_eq!(err.offset, 2);

    let runtime = Runtime::new(BindingConfig::default()).unwrap();
    assert!(matches!(
        resolve_method_descriptor(&runtime, "(Iz)V"),
        Err(ResolveError::Descriptor(_))
    ));

    let loaded = runtime.loaded_class_count();
    let spec = StubSpec::new("Broken")
        .method("ok", "()V")
        .method("bad", "(Iz)V");
    let err = Synthesizer::new(&runtime).synthesize(&spec).unwrap_err();
    assert!(matches!(err, SynthesisError::Descriptor { method, .. } if method == "bad"));
    assert_eq!(runtime.loaded_class_count(), loaded);
}

#[test]
fn subclass_of_class_path_class() {
    let (_dir, runtime) = demo_runtime(BindingConfig::default());
    let spec = StubSpec::new("FurnaceEntity")
        .superclass("demo.Base")
        .method("tick", "(Ldemo/Widget;J)I")
        .method("reset", "()V");
    let class = Synthesizer::new(&runtime).synthesize(&spec).unwrap();
    assert_eq!(class.name(), "classbind/generated/FurnaceEntity");
    assert_eq!(class.super_class().unwrap().name(), "demo/Base");
    assert!(runtime.find_loaded("demo/Widget").is_some());

    let constructor = class.declared_constructor(&[FieldType::Long]).unwrap();
    assert_eq!(constructor.access_flags(), MethodAccessFlag::PUBLIC);
    assert!(!constructor.is_native());

    runtime
        .register_native(class.name(), "tick", "(Ldemo/Widget;J)I", |env| {
            let handle = env.handle()?;
            let delta = env.arg(1)?.get_long()?;
            Ok(Some(NativeVariable::Int((handle + delta) as i32)))
        })
        .unwrap();

    let object = runtime.alloc_object(&class).unwrap();
    runtime.set_handle(object, 40).unwrap();
    assert_eq!(runtime.handle(object).unwrap(), 40);
    assert!(runtime.is_instance_of(object, "demo.Base").unwrap());

    let result = runtime
        .invoke(
            object,
            "tick",
            "(Ldemo/Widget;J)I",
            vec![NativeVariable::Reference(0), NativeVariable::Long(2)],
        )
        .unwrap();
    assert_eq!(result, Some(NativeVariable::Int(42)));

    let err = runtime.invoke(object, "reset", "()V", vec![]).unwrap_err();
    assert!(matches!(err, RuntimeError::UnsatisfiedLink { .. }));
}

#[test]
fn generated_bytes_are_a_valid_unit() {
    let runtime = Runtime::new(BindingConfig::default()).unwrap();
    let spec = StubSpec::new("Shape")
        .method("area", "()D")
        .method("scale", "(F[Ljava/lang/String;)V");
    let bytes = Synthesizer::new(&runtime).generate(&spec).unwrap();
    let unit = CompiledUnit::parse(&bytes).unwrap();

    assert_eq!(unit.name, "classbind/generated/Shape");
    assert_eq!(unit.super_name.as_deref(), Some("java/lang/Object"));
    assert_eq!(unit.major_version, 52);
    let handle = unit.find_field("rust_object", "J").unwrap();
    assert_eq!(handle.access_flags, FieldAccessFlag::PUBLIC);
    for (name, descriptor) in &spec.methods {
        let method = unit.find_method(name, descriptor).unwrap();
        assert_eq!(
            method.access_flags,
            MethodAccessFlag::PUBLIC | MethodAccessFlag::NATIVE
        );
    }
    // nothing was defined
    assert!(runtime.find_loaded("classbind/generated/Shape").is_none());
}

#[test]
fn configured_package_and_handle() {
    let config = BindingConfig::from_toml_str(
        r#"
        generated_package = "com.example.bind"
        handle_field = "native_ptr"
        "#,
    )
    .unwrap();
    let runtime = Runtime::new(config).unwrap();
    let class = Synthesizer::new(&runtime)
        .synthesize(&StubSpec::new("Pump").method("flow", "()I"))
        .unwrap();
    assert_eq!(class.name(), "com/example/bind/Pump");
    assert!(class.declared_field("native_ptr").is_some());

    let object = runtime.alloc_object(&class).unwrap();
    runtime.set_handle(object, -1).unwrap();
    assert_eq!(runtime.handle(object).unwrap(), -1);
}

#[test]
fn modifiers_of_generated_class() {
    let runtime = Runtime::new(BindingConfig::default()).unwrap();
    Synthesizer::new(&runtime)
        .synthesize(&StubSpec::new("Probe").method("read", "(Ljava/lang/String;)J"))
        .unwrap();
    let extractor = ModifierExtractor::new(&runtime);
    assert_eq!(
        extractor
            .method_modifiers("classbind.generated.Probe", "read", "(Ljava/lang/String;)J")
            .unwrap(),
        ModifierSet::empty()
    );
    assert_eq!(
        extractor
            .field_modifiers("classbind/generated/Probe", "rust_object", "J")
            .unwrap(),
        ModifierSet::empty()
    );
}
