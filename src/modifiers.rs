//! Static and nullable facts for one exact member overload.
//!
//! Two independent views are joined here: the runtime's reflective view says
//! whether a member is static, the parsed compiled unit says whether it (or
//! one of its parameters) carries a nullable marker. Both are matched on the
//! member's exact name and descriptor.

use std::sync::Arc;

use thiserror::Error;

use crate::{
    descriptor::{
        DescriptorCache, FieldType, MethodDescriptor, parse_field_descriptor,
        parse_method_descriptor,
    },
    error::{DescriptorError, ExtractError, LoadError, RuntimeError},
    metadata::{CompiledUnit, MemberMethod, UnitCache},
    resolve::{resolve_signature, resolve_type},
    runtime::{Class, Runtime},
};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ModifierSet: u32 {
        const STATIC = 1;
        const NULLABLE = 1 << 1;
    }
}

/// Why a query produced no modifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupMiss {
    #[error("class {class} is not present: {reason}")]
    ClassNotPresent { class: String, reason: String },
    #[error(transparent)]
    InvalidDescriptor(#[from] DescriptorError),
    #[error("type {0} is not present")]
    TypeNotPresent(String),
    #[error("{descriptor} cannot be resolved: {reason}")]
    UnresolvableType { descriptor: String, reason: String },
    #[error("{class} declares no member {name}{descriptor}")]
    MemberNotFound {
        class: String,
        name: String,
        descriptor: String,
    },
    #[error("compiled unit of {class} has no member {name} {descriptor}")]
    MetadataNotFound {
        class: String,
        name: String,
        descriptor: String,
    },
    #[error("parameter {index} is out of range for {descriptor}")]
    ParameterOutOfRange { index: usize, descriptor: String },
}

/// Result of a modifier query that did not fail hard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(ModifierSet),
    Missing(LookupMiss),
}

impl Lookup {
    /// The modifiers, or the empty set on a miss.
    pub fn modifiers(&self) -> ModifierSet {
        match self {
            Lookup::Found(modifiers) => *modifiers,
            Lookup::Missing(_) => ModifierSet::empty(),
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn miss(&self) -> Option<&LookupMiss> {
        match self {
            Lookup::Found(_) => None,
            Lookup::Missing(miss) => Some(miss),
        }
    }
}

enum Failure {
    Miss(LookupMiss),
    Hard(ExtractError),
}

impl From<LookupMiss> for Failure {
    fn from(miss: LookupMiss) -> Self {
        Failure::Miss(miss)
    }
}

impl From<ExtractError> for Failure {
    fn from(err: ExtractError) -> Self {
        Failure::Hard(err)
    }
}

fn finish(result: Result<ModifierSet, Failure>) -> Result<Lookup, ExtractError> {
    match result {
        Ok(modifiers) => Ok(Lookup::Found(modifiers)),
        Err(Failure::Miss(miss)) => Ok(Lookup::Missing(miss)),
        Err(Failure::Hard(err)) => Err(err),
    }
}

/// Malformed bytes and unreadable class-path entries are hard failures;
/// everything else a runtime lookup can report is returned for the caller to
/// treat as a miss.
fn split_hard(err: RuntimeError) -> Result<RuntimeError, ExtractError> {
    match err {
        RuntimeError::ClassFormat { class, source } => Err(ExtractError::Unit { class, source }),
        RuntimeError::Load(err @ (LoadError::Io { .. } | LoadError::Archive { .. })) => {
            Err(ExtractError::Load(err))
        }
        err => Ok(err),
    }
}

fn degrade(lookup: Lookup) -> ModifierSet {
    match lookup {
        Lookup::Found(modifiers) => modifiers,
        Lookup::Missing(miss) => {
            log::warn!("no modifiers: {miss}");
            ModifierSet::empty()
        }
    }
}

/// Answers modifier queries against one [`Runtime`]. With
/// `cache_compiled_units` set, parsed units and descriptors are memoized for
/// the extractor's lifetime.
#[derive(Debug)]
pub struct ModifierExtractor<'a> {
    runtime: &'a Runtime,
    units: Option<UnitCache>,
    descriptors: Option<DescriptorCache>,
}

impl<'a> ModifierExtractor<'a> {
    pub fn new(runtime: &'a Runtime) -> Self {
        let cached = runtime.config().cache_compiled_units;
        Self {
            runtime,
            units: cached.then(UnitCache::new),
            descriptors: cached.then(DescriptorCache::new),
        }
    }

    /// Drops every memoized unit and descriptor.
    pub fn invalidate(&self) {
        if let Some(units) = &self.units {
            units.clear();
        }
        if let Some(descriptors) = &self.descriptors {
            descriptors.clear();
        }
    }

    pub fn lookup_method(
        &self,
        class_name: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<Lookup, ExtractError> {
        let markers = self.markers();
        finish(self.inspect_method(class_name, name, descriptor, |is_static, _, member| {
            let mut modifiers = ModifierSet::empty();
            modifiers.set(ModifierSet::STATIC, is_static);
            modifiers.set(ModifierSet::NULLABLE, member.is_annotated(markers));
            Ok(modifiers)
        }))
    }

    /// Modifiers of parameter `index` (zero-based). Only the nullable bit is
    /// ever set.
    pub fn lookup_parameter(
        &self,
        class_name: &str,
        name: &str,
        descriptor: &str,
        index: usize,
    ) -> Result<Lookup, ExtractError> {
        let markers = self.markers();
        finish(self.inspect_method(class_name, name, descriptor, |_, parsed, member| {
            if index >= parsed.parameters.len() {
                return Err(LookupMiss::ParameterOutOfRange {
                    index,
                    descriptor: descriptor.to_string(),
                });
            }
            let mut modifiers = ModifierSet::empty();
            modifiers.set(
                ModifierSet::NULLABLE,
                member.is_parameter_annotated(index, markers),
            );
            Ok(modifiers)
        }))
    }

    pub fn lookup_field(
        &self,
        class_name: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<Lookup, ExtractError> {
        finish(self.inspect_field(class_name, name, descriptor))
    }

    /// Like [`lookup_method`](Self::lookup_method), logging a miss and
    /// returning the empty set for it.
    pub fn method_modifiers(
        &self,
        class_name: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<ModifierSet, ExtractError> {
        Ok(degrade(self.lookup_method(class_name, name, descriptor)?))
    }

    pub fn parameter_modifiers(
        &self,
        class_name: &str,
        name: &str,
        descriptor: &str,
        index: usize,
    ) -> Result<ModifierSet, ExtractError> {
        Ok(degrade(
            self.lookup_parameter(class_name, name, descriptor, index)?,
        ))
    }

    pub fn field_modifiers(
        &self,
        class_name: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<ModifierSet, ExtractError> {
        Ok(degrade(self.lookup_field(class_name, name, descriptor)?))
    }

    fn markers(&self) -> &[String] {
        self.runtime.config().nullable_annotations.as_slice()
    }

    fn inspect_method(
        &self,
        class_name: &str,
        name: &str,
        descriptor: &str,
        select: impl FnOnce(bool, &MethodDescriptor, &MemberMethod) -> Result<ModifierSet, LookupMiss>,
    ) -> Result<ModifierSet, Failure> {
        let class = self.live_class(class_name)?;
        let parsed = self.method_descriptor(descriptor)?;
        resolve_signature(self.runtime, Arc::clone(&parsed)).map_err(type_miss(descriptor))?;

        let is_static = class
            .declared_overload(name, descriptor, &parsed.parameters)
            .ok_or_else(|| LookupMiss::MemberNotFound {
                class: class.name().to_string(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
            })?
            .is_static();

        let unit = self.compiled_unit(&class)?;
        let member = unit
            .find_method(name, descriptor)
            .ok_or_else(|| LookupMiss::MetadataNotFound {
                class: class.name().to_string(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
            })?;
        Ok(select(is_static, &parsed, member)?)
    }

    fn inspect_field(
        &self,
        class_name: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<ModifierSet, Failure> {
        let class = self.live_class(class_name)?;
        let field_type: FieldType = parse_field_descriptor(descriptor)
            .map_err(LookupMiss::InvalidDescriptor)?
            .0;
        resolve_type(self.runtime, &field_type).map_err(type_miss(descriptor))?;

        let is_static = class
            .declared_field(name)
            .ok_or_else(|| LookupMiss::MemberNotFound {
                class: class.name().to_string(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
            })?
            .is_static();

        let unit = self.compiled_unit(&class)?;
        let member = unit
            .find_field(name, descriptor)
            .ok_or_else(|| LookupMiss::MetadataNotFound {
                class: class.name().to_string(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
            })?;

        let mut modifiers = ModifierSet::empty();
        modifiers.set(ModifierSet::STATIC, is_static);
        modifiers.set(ModifierSet::NULLABLE, member.is_annotated(self.markers()));
        Ok(modifiers)
    }

    fn live_class(&self, class_name: &str) -> Result<Arc<Class>, Failure> {
        self.runtime.class_for_name(class_name).map_err(|err| {
            match split_hard(err) {
                Ok(err) => Failure::Miss(LookupMiss::ClassNotPresent {
                    class: class_name.to_string(),
                    reason: err.to_string(),
                }),
                Err(err) => Failure::Hard(err),
            }
        })
    }

    fn method_descriptor(&self, descriptor: &str) -> Result<Arc<MethodDescriptor>, LookupMiss> {
        let parsed = match &self.descriptors {
            Some(cache) => cache.method(descriptor)?,
            None => Arc::new(parse_method_descriptor(descriptor)?),
        };
        Ok(parsed)
    }

    fn compiled_unit(&self, class: &Class) -> Result<Arc<CompiledUnit>, ExtractError> {
        let parse = || -> Result<CompiledUnit, ExtractError> {
            let bytes = class.compiled_bytes(self.runtime.class_path())?;
            CompiledUnit::parse(&bytes).map_err(|source| ExtractError::Unit {
                class: class.name().to_string(),
                source,
            })
        };
        match &self.units {
            Some(cache) => cache.get_or_try_insert_with(class.name(), parse),
            None => parse().map(Arc::new),
        }
    }
}

fn type_miss(descriptor: &str) -> impl FnOnce(RuntimeError) -> Failure + '_ {
    move |err| match split_hard(err) {
        Ok(RuntimeError::TypeNotPresent(name)) => Failure::Miss(LookupMiss::TypeNotPresent(name)),
        Ok(err) => Failure::Miss(LookupMiss::UnresolvableType {
            descriptor: descriptor.to_string(),
            reason: err.to_string(),
        }),
        Err(err) => Failure::Hard(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        class::ClassWriter,
        config::BindingConfig,
        consts::{
            CONSTRUCTOR_NAME, FieldAccessFlag, MethodAccessFlag, NULLABLE_ANNOTATION, OBJECT_CLASS,
        },
        metadata::Annotation,
    };

    fn nullable() -> Annotation {
        Annotation::new(NULLABLE_ANNOTATION, false)
    }

    fn fixture(config: BindingConfig) -> Runtime {
        let runtime = Runtime::new(config).unwrap();
        let mut writer = ClassWriter::new("demo/Widget", Some(OBJECT_CLASS));
        writer.method(MethodAccessFlag::PUBLIC, "f", "(I)V");
        writer
            .method(MethodAccessFlag::PUBLIC, "f", "(Ljava/lang/String;)V")
            .parameter_annotation(0, nullable());
        writer
            .method(
                MethodAccessFlag::PUBLIC | MethodAccessFlag::STATIC,
                "create",
                "()Ljava/lang/String;",
            )
            .annotation(Annotation::new(NULLABLE_ANNOTATION, true));
        writer.method(MethodAccessFlag::PUBLIC, CONSTRUCTOR_NAME, "(J)V");
        writer
            .field(FieldAccessFlag::PUBLIC, "label", "Ljava/lang/String;")
            .annotation(nullable());
        writer.field(FieldAccessFlag::PUBLIC | FieldAccessFlag::STATIC, "count", "I");
        runtime.define_class(&writer.to_bytes().unwrap()).unwrap();
        runtime
    }

    #[test]
    fn test_overloads_are_disambiguated() {
        let runtime = fixture(BindingConfig::default());
        let extractor = ModifierExtractor::new(&runtime);

        let int = extractor.lookup_method("demo.Widget", "f", "(I)V").unwrap();
        assert_eq!(int, Lookup::Found(ModifierSet::empty()));
        let int_param = extractor
            .lookup_parameter("demo.Widget", "f", "(I)V", 0)
            .unwrap();
        assert_eq!(int_param, Lookup::Found(ModifierSet::empty()));
        let string_param = extractor
            .lookup_parameter("demo.Widget", "f", "(Ljava/lang/String;)V", 0)
            .unwrap();
        assert_eq!(string_param, Lookup::Found(ModifierSet::NULLABLE));
    }

    #[test]
    fn test_static_and_nullable_method() {
        let runtime = fixture(BindingConfig::default());
        let extractor = ModifierExtractor::new(&runtime);
        let modifiers = extractor
            .method_modifiers("demo/Widget", "create", "()Ljava/lang/String;")
            .unwrap();
        assert_eq!(modifiers, ModifierSet::STATIC | ModifierSet::NULLABLE);
    }

    #[test]
    fn test_constructor() {
        let runtime = fixture(BindingConfig::default());
        let extractor = ModifierExtractor::new(&runtime);
        let lookup = extractor
            .lookup_method("demo/Widget", CONSTRUCTOR_NAME, "(J)V")
            .unwrap();
        assert_eq!(lookup, Lookup::Found(ModifierSet::empty()));
    }

    #[test]
    fn test_fields() {
        let runtime = fixture(BindingConfig::default());
        let extractor = ModifierExtractor::new(&runtime);
        assert_eq!(
            extractor
                .field_modifiers("demo/Widget", "label", "Ljava/lang/String;")
                .unwrap(),
            ModifierSet::NULLABLE
        );
        assert_eq!(
            extractor.field_modifiers("demo/Widget", "count", "I").unwrap(),
            ModifierSet::STATIC
        );
        let wrong_type = extractor.lookup_field("demo/Widget", "count", "J").unwrap();
        assert!(matches!(
            wrong_type,
            Lookup::Missing(LookupMiss::MetadataNotFound { .. })
        ));
    }

    #[test]
    fn test_return_type_must_match() {
        let runtime = fixture(BindingConfig::default());
        let extractor = ModifierExtractor::new(&runtime);
        let lookup = extractor.lookup_method("demo/Widget", "f", "(I)I").unwrap();
        assert!(matches!(
            lookup,
            Lookup::Missing(LookupMiss::MetadataNotFound { .. })
        ));
    }

    #[test]
    fn test_overloads_differing_only_in_return_type() {
        let runtime = Runtime::new(BindingConfig::default()).unwrap();
        let mut writer = ClassWriter::new("demo/Twin", Some(OBJECT_CLASS));
        writer.method(
            MethodAccessFlag::PUBLIC | MethodAccessFlag::STATIC | MethodAccessFlag::NATIVE,
            "f",
            "(I)V",
        );
        writer
            .method(MethodAccessFlag::PUBLIC | MethodAccessFlag::NATIVE, "f", "(I)I")
            .annotation(nullable());
        runtime.define_class(&writer.to_bytes().unwrap()).unwrap();
        let extractor = ModifierExtractor::new(&runtime);

        assert_eq!(
            extractor.lookup_method("demo/Twin", "f", "(I)I").unwrap(),
            Lookup::Found(ModifierSet::NULLABLE)
        );
        assert_eq!(
            extractor.lookup_method("demo/Twin", "f", "(I)V").unwrap(),
            Lookup::Found(ModifierSet::STATIC)
        );
    }

    #[test]
    fn test_unresolvable_type_keeps_its_reason() {
        let runtime = fixture(BindingConfig::default());
        let extractor = ModifierExtractor::new(&runtime);
        let lookup = extractor.lookup_method("demo/Widget", "f", "(L/;)V").unwrap();
        let Lookup::Missing(LookupMiss::UnresolvableType { descriptor, reason }) = lookup else {
            panic!("unexpected lookup {lookup:?}");
        };
        assert_eq!(descriptor, "(L/;)V");
        assert!(reason.contains("invalid class name"), "{reason}");

        let lookup = extractor.lookup_field("demo/Widget", "label", "L/;").unwrap();
        assert!(matches!(
            lookup,
            Lookup::Missing(LookupMiss::UnresolvableType { .. })
        ));
    }

    #[test]
    fn test_misses() {
        let runtime = fixture(BindingConfig::default());
        let extractor = ModifierExtractor::new(&runtime);

        let lookup = extractor.lookup_method("demo/Nope", "f", "(I)V").unwrap();
        assert!(matches!(lookup, Lookup::Missing(LookupMiss::ClassNotPresent { .. })));
        assert_eq!(lookup.modifiers(), ModifierSet::empty());

        let lookup = extractor.lookup_method("demo/Widget", "g", "(I)V").unwrap();
        assert!(matches!(lookup, Lookup::Missing(LookupMiss::MemberNotFound { .. })));

        let lookup = extractor
            .lookup_method("demo/Widget", "f", "(Lcom/example/Gone;)V")
            .unwrap();
        assert_eq!(
            lookup.miss(),
            Some(&LookupMiss::TypeNotPresent("com/example/Gone".to_string()))
        );

        let lookup = extractor.lookup_method("demo/Widget", "f", "(Iz)V").unwrap();
        assert!(matches!(lookup, Lookup::Missing(LookupMiss::InvalidDescriptor(_))));

        let lookup = extractor
            .lookup_parameter("demo/Widget", "f", "(I)V", 1)
            .unwrap();
        assert!(matches!(
            lookup,
            Lookup::Missing(LookupMiss::ParameterOutOfRange { index: 1, .. })
        ));
    }

    #[test]
    fn test_cached_units() {
        let config = BindingConfig {
            cache_compiled_units: true,
            ..BindingConfig::default()
        };
        let runtime = fixture(config);
        let extractor = ModifierExtractor::new(&runtime);
        extractor.lookup_method("demo/Widget", "f", "(I)V").unwrap();
        extractor
            .lookup_parameter("demo/Widget", "f", "(Ljava/lang/String;)V", 0)
            .unwrap();
        assert_eq!(extractor.units.as_ref().unwrap().len(), 1);
        assert_eq!(extractor.descriptors.as_ref().unwrap().len(), 2);

        extractor.invalidate();
        assert!(extractor.units.as_ref().unwrap().is_empty());
    }
}
