//! Run-time generation of native-backed subclasses.
//!
//! A [`StubSpec`] is validated and resolved into a [`ClassBlueprint`], which
//! is emitted through [`ClassWriter`] and defined in the [`Runtime`]. Nothing
//! is defined unless every step succeeds.

use std::{collections::HashSet, sync::Arc};

use crate::{
    class::{ClassWriter, Code, Insn},
    consts::{
        CLASS_INITIALIZER_NAME, CONSTRUCTOR_NAME, FieldAccessFlag, MethodAccessFlag,
        OBJECT_CLASS, opcode,
    },
    descriptor::{FieldType, MethodDescriptor, parse_method_descriptor},
    error::{SynthesisError, WriteError},
    loader::checked_internal_name,
    resolve::resolve_signature,
    runtime::{Class, Runtime},
};

/// Input of one synthesis request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StubSpec {
    /// Unqualified name; the package comes from the configuration.
    pub simple_name: String,
    /// `None` extends `java/lang/Object`.
    pub superclass: Option<String>,
    /// `(name, descriptor)` pairs, in declaration order.
    pub methods: Vec<(String, String)>,
}

impl StubSpec {
    pub fn new(simple_name: impl Into<String>) -> Self {
        Self {
            simple_name: simple_name.into(),
            ..Self::default()
        }
    }

    pub fn superclass(mut self, name: impl Into<String>) -> Self {
        self.superclass = Some(name.into());
        self
    }

    pub fn method(mut self, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        self.methods.push((name.into(), descriptor.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubMethod {
    pub name: String,
    pub descriptor: MethodDescriptor,
}

/// Structure of a generated class, independent of its binary encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassBlueprint {
    pub name: String,
    pub super_name: String,
    pub handle_field: String,
    pub stubs: Vec<StubMethod>,
    /// Superclass constructors re-exposed as public constructors.
    pub constructors: Vec<MethodDescriptor>,
}

impl ClassBlueprint {
    pub fn emit(&self) -> Result<Vec<u8>, WriteError> {
        let mut writer = ClassWriter::new(self.name.as_str(), Some(self.super_name.as_str()));
        writer.field(FieldAccessFlag::PUBLIC, self.handle_field.as_str(), "J");
        for constructor in &self.constructors {
            writer
                .method(
                    MethodAccessFlag::PUBLIC,
                    CONSTRUCTOR_NAME,
                    constructor.to_descriptor(),
                )
                .code(delegating_constructor(&self.super_name, constructor));
        }
        for stub in &self.stubs {
            writer.method(
                MethodAccessFlag::PUBLIC | MethodAccessFlag::NATIVE,
                stub.name.as_str(),
                stub.descriptor.to_descriptor(),
            );
        }
        writer.to_bytes()
    }
}

fn load_opcode(field_type: &FieldType) -> u8 {
    match field_type {
        FieldType::Boolean
        | FieldType::Byte
        | FieldType::Char
        | FieldType::Short
        | FieldType::Int => opcode::ILOAD,
        FieldType::Long => opcode::LLOAD,
        FieldType::Float => opcode::FLOAD,
        FieldType::Double => opcode::DLOAD,
        FieldType::Object(_) | FieldType::Array(_) => opcode::ALOAD,
    }
}

/// `this` and every argument pushed in order, then `invokespecial` on the
/// superclass constructor with the same descriptor.
fn delegating_constructor(super_name: &str, descriptor: &MethodDescriptor) -> Code {
    let mut instructions = vec![Insn::Op(opcode::ALOAD_0)];
    let mut index = 1;
    for parameter in &descriptor.parameters {
        instructions.push(Insn::Load {
            opcode: load_opcode(parameter),
            index,
        });
        index += parameter.slot_size();
    }
    instructions.push(Insn::InvokeSpecial {
        owner: super_name.to_string(),
        name: CONSTRUCTOR_NAME.to_string(),
        descriptor: descriptor.to_descriptor(),
    });
    instructions.push(Insn::Op(opcode::RETURN));

    Code {
        max_stack: index,
        max_locals: index,
        instructions,
    }
}

// The receiver takes one of these.
const MAX_ARGUMENT_SLOTS: u16 = 255;

fn is_legal_method_name(name: &str) -> bool {
    !name.is_empty()
        && name != CONSTRUCTOR_NAME
        && name != CLASS_INITIALIZER_NAME
        && !name.contains(['.', ';', '[', '/', '<', '>'])
}

#[derive(Debug)]
pub struct Synthesizer<'a> {
    runtime: &'a Runtime,
}

impl<'a> Synthesizer<'a> {
    pub fn new(runtime: &'a Runtime) -> Self {
        Self { runtime }
    }

    /// Validates `spec` and resolves everything it references. Descriptor
    /// grammar is checked before any class is loaded.
    pub fn blueprint(&self, spec: &StubSpec) -> Result<ClassBlueprint, SynthesisError> {
        let mut parsed = Vec::with_capacity(spec.methods.len());
        for (name, descriptor) in &spec.methods {
            let method_descriptor =
                parse_method_descriptor(descriptor).map_err(|source| SynthesisError::Descriptor {
                    method: name.clone(),
                    source,
                })?;
            parsed.push((name, descriptor, method_descriptor));
        }

        if spec.simple_name.contains('/') || checked_internal_name(&spec.simple_name).is_err() {
            return Err(SynthesisError::InvalidName(spec.simple_name.clone()));
        }
        let name = self.runtime.config().generated_class_name(&spec.simple_name);

        let mut seen = HashSet::new();
        for (method, descriptor, method_descriptor) in &parsed {
            if !is_legal_method_name(method) {
                return Err(SynthesisError::IllegalMethodName(method.to_string()));
            }
            if method_descriptor.parameter_slots() >= MAX_ARGUMENT_SLOTS {
                return Err(SynthesisError::TooManyParameters {
                    name: method.to_string(),
                    descriptor: descriptor.to_string(),
                });
            }
            if !seen.insert((method.as_str(), descriptor.as_str())) {
                return Err(SynthesisError::DuplicateMethod {
                    name: method.to_string(),
                    descriptor: descriptor.to_string(),
                });
            }
        }

        let super_name = spec.superclass.as_deref().unwrap_or(OBJECT_CLASS);
        let superclass = self
            .runtime
            .class_for_name(super_name)
            .map_err(|source| SynthesisError::Superclass {
                name: super_name.to_string(),
                source,
            })?;
        if superclass.is_final() || superclass.is_interface() {
            return Err(SynthesisError::IllegalSuperclass(superclass.name().to_string()));
        }

        let mut stubs = Vec::with_capacity(parsed.len());
        for (method, descriptor, method_descriptor) in parsed {
            let signature = resolve_signature(self.runtime, Arc::new(method_descriptor))
                .map_err(|source| SynthesisError::Type {
                    method: method.clone(),
                    descriptor: descriptor.clone(),
                    source,
                })?;
            stubs.push(StubMethod {
                name: method.clone(),
                descriptor: Arc::unwrap_or_clone(signature.descriptor),
            });
        }

        Ok(ClassBlueprint {
            name,
            super_name: superclass.name().to_string(),
            handle_field: self.runtime.config().handle_field.clone(),
            stubs,
            constructors: inherited_constructors(&superclass),
        })
    }

    /// Builds, emits and defines the class described by `spec`.
    pub fn synthesize(&self, spec: &StubSpec) -> Result<Arc<Class>, SynthesisError> {
        let blueprint = self.blueprint(spec)?;
        let bytes = blueprint.emit()?;
        let class = self
            .runtime
            .define_class(&bytes)
            .map_err(|source| SynthesisError::Define {
                class: blueprint.name.clone(),
                source,
            })?;
        log::debug!(
            "synthesized {} extending {} with {} native stubs",
            blueprint.name,
            blueprint.super_name,
            blueprint.stubs.len()
        );
        Ok(class)
    }

    /// Emits the bytes for `spec` without defining them.
    pub fn generate(&self, spec: &StubSpec) -> Result<Vec<u8>, SynthesisError> {
        Ok(self.blueprint(spec)?.emit()?)
    }
}

fn inherited_constructors(superclass: &Class) -> Vec<MethodDescriptor> {
    superclass
        .declared_constructors()
        .filter(|constructor| !constructor.access_flags().contains(MethodAccessFlag::PRIVATE))
        .map(|constructor| constructor.descriptor().clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::BindingConfig,
        consts::ClassAccessFlag,
        error::RuntimeError,
        metadata::CompiledUnit,
        runtime::NativeVariable,
    };

    fn runtime() -> Runtime {
        Runtime::new(BindingConfig::default()).unwrap()
    }

    #[test]
    fn test_generated_class_shape() {
        let runtime = runtime();
        let class = Synthesizer::new(&runtime)
            .synthesize(&StubSpec::new("Generated1").method("step", "(I)V"))
            .unwrap();
        assert_eq!(class.name(), "classbind/generated/Generated1");
        assert_eq!(class.super_class().unwrap().name(), OBJECT_CLASS);
        assert_eq!(class.access_flags(), ClassAccessFlag::PUBLIC | ClassAccessFlag::SUPER);
        assert_eq!(class.major_version(), 52);

        let handle = class.declared_field("rust_object").unwrap();
        assert_eq!(handle.field_type(), &FieldType::Long);
        assert!(handle.access_flags().contains(FieldAccessFlag::PUBLIC));

        let step = class.declared_method("step", &[FieldType::Int]).unwrap();
        assert_eq!(step.descriptor_text(), "(I)V");
        assert!(step.is_native());
        assert_eq!(
            step.access_flags(),
            MethodAccessFlag::PUBLIC | MethodAccessFlag::NATIVE
        );
        assert!(class.declared_constructor(&[]).is_some());
    }

    #[test]
    fn test_unbound_stub() {
        let runtime = runtime();
        let class = Synthesizer::new(&runtime)
            .synthesize(&StubSpec::new("Unbound").method("step", "(I)V"))
            .unwrap();
        let object = runtime.alloc_object(&class).unwrap();
        runtime.set_handle(object, 0x1234).unwrap();
        let err = runtime
            .invoke(object, "step", "(I)V", vec![NativeVariable::Int(1)])
            .unwrap_err();
        assert!(matches!(err, RuntimeError::UnsatisfiedLink { name, .. } if name == "step"));

        runtime
            .register_native(class.name(), "step", "(I)V", |env| {
                assert_eq!(env.handle()?, 0x1234);
                assert_eq!(env.arg(0)?.get_int()?, 1);
                Ok(None)
            })
            .unwrap();
        let result = runtime
            .invoke(object, "step", "(I)V", vec![NativeVariable::Int(1)])
            .unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_bad_descriptor_is_reported_first() {
        let runtime = runtime();
        let spec = StubSpec::new("Bad")
            .superclass("com/example/Missing")
            .method("step", "(Iz)V");
        let err = Synthesizer::new(&runtime).synthesize(&spec).unwrap_err();
        assert!(matches!(err, SynthesisError::Descriptor { method, .. } if method == "step"));
        assert!(runtime.find_loaded("classbind/generated/Bad").is_none());
    }

    #[test]
    fn test_rejections() {
        let runtime = runtime();
        let synthesizer = Synthesizer::new(&runtime);

        let err = synthesizer
            .synthesize(&StubSpec::new("A").superclass("com/example/Missing"))
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Superclass { .. }));

        let err = synthesizer
            .synthesize(&StubSpec::new("B").superclass("java.lang.String"))
            .unwrap_err();
        assert!(matches!(err, SynthesisError::IllegalSuperclass(_)));

        let err = synthesizer
            .synthesize(&StubSpec::new("C").method("<init>", "()V"))
            .unwrap_err();
        assert!(matches!(err, SynthesisError::IllegalMethodName(_)));

        let err = synthesizer
            .synthesize(&StubSpec::new("D").method("f", "()V").method("f", "()V"))
            .unwrap_err();
        assert!(matches!(err, SynthesisError::DuplicateMethod { .. }));

        let err = synthesizer
            .synthesize(&StubSpec::new("E").method("f", "(Lcom/example/Gone;)V"))
            .unwrap_err();
        assert!(matches!(
            err,
            SynthesisError::Type { source: RuntimeError::TypeNotPresent(_), .. }
        ));

        let err = synthesizer.synthesize(&StubSpec::new("a/B")).unwrap_err();
        assert!(matches!(err, SynthesisError::InvalidName(_)));
    }

    #[test]
    fn test_argument_slot_limit() {
        let runtime = runtime();
        let synthesizer = Synthesizer::new(&runtime);

        let widest = format!("({})V", "J".repeat(127));
        let blueprint = synthesizer
            .blueprint(&StubSpec::new("Wide").method("f", widest.as_str()))
            .unwrap();
        assert_eq!(blueprint.stubs[0].descriptor.parameter_slots(), 254);

        for descriptor in [format!("({})V", "I".repeat(255)), format!("({})V", "J".repeat(128))] {
            let err = synthesizer
                .synthesize(&StubSpec::new("TooWide").method("f", descriptor.as_str()))
                .unwrap_err();
            assert!(matches!(err, SynthesisError::TooManyParameters { .. }), "{err}");
        }
        assert!(runtime.find_loaded("classbind/generated/TooWide").is_none());
    }

    #[test]
    fn test_same_name_twice() {
        let runtime = runtime();
        let synthesizer = Synthesizer::new(&runtime);
        synthesizer.synthesize(&StubSpec::new("Twice")).unwrap();
        let err = synthesizer.synthesize(&StubSpec::new("Twice")).unwrap_err();
        assert!(matches!(
            err,
            SynthesisError::Define { source: RuntimeError::DuplicateClass(_), .. }
        ));
    }

    #[test]
    fn test_constructors_are_imitated() {
        let runtime = runtime();
        let synthesizer = Synthesizer::new(&runtime);
        let mut base = ClassWriter::new("demo/Base", Some(OBJECT_CLASS));
        base.method(MethodAccessFlag::PUBLIC, CONSTRUCTOR_NAME, "(JLjava/lang/String;D)V");
        base.method(MethodAccessFlag::PROTECTED, CONSTRUCTOR_NAME, "(I)V");
        base.method(MethodAccessFlag::PRIVATE, CONSTRUCTOR_NAME, "()V");
        runtime.define_class(&base.to_bytes().unwrap()).unwrap();

        let spec = StubSpec::new("Derived")
            .superclass("demo.Base")
            .method("tick", "(J[I)Ljava/lang/String;");
        let blueprint = synthesizer.blueprint(&spec).unwrap();
        assert_eq!(blueprint.constructors.len(), 2);

        let wide = delegating_constructor("demo/Base", &blueprint.constructors[0]);
        assert_eq!(wide.max_locals, 6);
        assert_eq!(
            wide.instructions[1..4],
            [
                Insn::Load { opcode: opcode::LLOAD, index: 1 },
                Insn::Load { opcode: opcode::ALOAD, index: 3 },
                Insn::Load { opcode: opcode::DLOAD, index: 4 },
            ]
        );

        let unit = CompiledUnit::parse(&blueprint.emit().unwrap()).unwrap();
        assert_eq!(unit.super_name.as_deref(), Some("demo/Base"));
        assert_eq!(unit.overloads(CONSTRUCTOR_NAME).count(), 2);
        assert!(unit.find_method("tick", "(J[I)Ljava/lang/String;").is_some());

        let class = synthesizer.synthesize(&spec).unwrap();
        assert_eq!(class.declared_constructors().count(), 2);
    }
}
