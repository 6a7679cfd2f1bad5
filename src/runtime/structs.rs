use std::sync::Arc;

pub use object::*;

use crate::{
    consts::{CLASS_INITIALIZER_NAME, CONSTRUCTOR_NAME, ClassAccessFlag, FieldAccessFlag, MethodAccessFlag},
    descriptor::{FieldDescriptor, FieldType, MethodDescriptor},
    error::LoadError,
    loader::{ClassPath, ClassPathEntry},
    runtime::NativeVariable,
};

mod object;

/// Where a loaded class's bytes came from.
#[derive(Debug, Clone)]
pub enum ClassOrigin {
    Builtin(Arc<[u8]>),
    /// Handed to [`Runtime::define_class`](crate::runtime::Runtime::define_class).
    Defined(Arc<[u8]>),
    ClassPath(ClassPathEntry),
}

/// Reflective view of a linked class. Annotations are deliberately absent;
/// they are only reachable through the compiled bytes.
#[derive(Debug)]
pub struct Class {
    pub(crate) class_name: Arc<str>,
    pub(crate) access_flags: ClassAccessFlag,
    pub(crate) major_version: u16,
    pub(crate) super_class: Option<Arc<Class>>,
    pub(crate) interfaces: Vec<Arc<Class>>,
    pub(crate) fields: Vec<FieldInfo>,
    pub(crate) methods: Vec<MethodInfo>,
    // instance slots including those of every superclass
    pub(crate) instance_slots: usize,
    pub(crate) origin: ClassOrigin,
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub(crate) access_flags: FieldAccessFlag,
    pub(crate) name: Arc<str>,
    pub(crate) descriptor: FieldDescriptor,
    // `None` for static fields
    pub(crate) slot: Option<usize>,
}

#[derive(Debug)]
pub struct MethodInfo {
    pub(crate) access_flags: MethodAccessFlag,
    pub(crate) name: Arc<str>,
    pub(crate) descriptor: MethodDescriptor,
    pub(crate) descriptor_text: Arc<str>,
}

impl Class {
    /// Internal name, e.g. `java/lang/Object`.
    pub fn name(&self) -> &str {
        &self.class_name
    }

    pub fn java_name(&self) -> String {
        self.class_name.replace('/', ".")
    }

    pub fn package_name(&self) -> &str {
        let Some((package, _)) = self.class_name.rsplit_once('/') else {
            return "";
        };
        package
    }

    pub fn access_flags(&self) -> ClassAccessFlag {
        self.access_flags
    }

    pub fn major_version(&self) -> u16 {
        self.major_version
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlag::INTERFACE)
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(ClassAccessFlag::ABSTRACT)
    }

    pub fn is_final(&self) -> bool {
        self.access_flags.contains(ClassAccessFlag::FINAL)
    }

    pub fn super_class(&self) -> Option<&Arc<Class>> {
        self.super_class.as_ref()
    }

    pub fn interfaces(&self) -> &[Arc<Class>] {
        &self.interfaces
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    pub fn methods(&self) -> &[MethodInfo] {
        &self.methods
    }

    pub fn origin(&self) -> &ClassOrigin {
        &self.origin
    }

    /// The declared, non-constructor method called `name` taking exactly
    /// `parameters`.
    pub fn declared_method(&self, name: &str, parameters: &[FieldType]) -> Option<&MethodInfo> {
        if name == CONSTRUCTOR_NAME || name == CLASS_INITIALIZER_NAME {
            return None;
        }
        self.methods
            .iter()
            .find(|method| method.name.as_ref() == name && method.descriptor.parameters == parameters)
    }

    pub fn declared_constructor(&self, parameters: &[FieldType]) -> Option<&MethodInfo> {
        self.declared_constructors()
            .find(|method| method.descriptor.parameters == parameters)
    }

    /// The declared method or constructor `name` whose descriptor is exactly
    /// `descriptor`. When no overload matches exactly, the first one taking
    /// the same parameters is returned, as `declared_method` would.
    pub fn declared_overload(
        &self,
        name: &str,
        descriptor: &str,
        parameters: &[FieldType],
    ) -> Option<&MethodInfo> {
        if name == CLASS_INITIALIZER_NAME {
            return None;
        }
        let mut candidates = self
            .methods
            .iter()
            .filter(|method| method.name.as_ref() == name && method.descriptor.parameters == parameters);
        let first = candidates.next()?;
        if first.descriptor_text.as_ref() == descriptor {
            return Some(first);
        }
        Some(
            candidates
                .find(|method| method.descriptor_text.as_ref() == descriptor)
                .unwrap_or(first),
        )
    }

    pub fn declared_constructors(&self) -> impl Iterator<Item = &MethodInfo> {
        self.methods.iter().filter(|method| method.is_constructor())
    }

    pub fn declared_field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|field| field.name.as_ref() == name)
    }

    /// The instance field `name`, searching superclasses; the most derived
    /// declaration wins.
    pub fn instance_field(&self, name: &str) -> Option<&FieldInfo> {
        let own = self
            .fields
            .iter()
            .find(|field| field.slot.is_some() && field.name.as_ref() == name);
        match own {
            Some(field) => Some(field),
            None => self.super_class.as_ref()?.instance_field(name),
        }
    }

    /// Zeroed instance slots, typed by the declared field descriptors.
    pub(crate) fn zeroed_fields(&self) -> Vec<NativeVariable> {
        let mut slots = vec![NativeVariable::Reference(0); self.instance_slots];
        let mut class = Some(self);
        while let Some(current) = class {
            for field in &current.fields {
                if let Some(slot) = field.slot {
                    slots[slot] = NativeVariable::zero(&field.descriptor.0);
                }
            }
            class = current.super_class.as_deref();
        }
        slots
    }

    /// Raw bytes this class was defined from.
    pub fn compiled_bytes(&self, class_path: &ClassPath) -> Result<Arc<[u8]>, LoadError> {
        match &self.origin {
            ClassOrigin::Builtin(bytes) | ClassOrigin::Defined(bytes) => Ok(Arc::clone(bytes)),
            ClassOrigin::ClassPath(entry) => {
                // prefer the entry it was loaded from, even if the path changed order
                match entry.read_class_bytes(&self.class_name) {
                    Ok(bytes) => Ok(bytes.into()),
                    Err(LoadError::NotFound(_)) => class_path
                        .find_class_bytes(&self.class_name)
                        .map(|(bytes, _)| bytes.into()),
                    Err(err) => Err(err),
                }
            }
        }
    }
}

impl FieldInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn access_flags(&self) -> FieldAccessFlag {
        self.access_flags
    }

    pub fn field_type(&self) -> &FieldType {
        &self.descriptor.0
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(FieldAccessFlag::STATIC)
    }
}

impl MethodInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn access_flags(&self) -> MethodAccessFlag {
        self.access_flags
    }

    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    /// Descriptor text exactly as it appears in the class file.
    pub fn descriptor_text(&self) -> &str {
        &self.descriptor_text
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlag::STATIC)
    }

    pub fn is_native(&self) -> bool {
        self.access_flags.contains(MethodAccessFlag::NATIVE)
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(MethodAccessFlag::ABSTRACT)
    }

    pub fn is_constructor(&self) -> bool {
        self.name.as_ref() == CONSTRUCTOR_NAME
    }
}
