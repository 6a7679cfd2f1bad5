//! Resolution of parsed descriptors against the types loaded in a [`Runtime`].

use std::{fmt, sync::Arc};

use crate::{
    descriptor::{FieldType, MethodDescriptor, parse_method_descriptor},
    error::{ResolveError, RuntimeError},
    runtime::{Class, Runtime},
};

/// A descriptor type bound to the runtime's type universe.
#[derive(Debug, Clone)]
pub enum TypeHandle {
    /// Always a primitive [`FieldType`].
    Primitive(FieldType),
    Class(Arc<Class>),
    /// `element` is never itself an array.
    Array {
        element: Box<TypeHandle>,
        dimensions: usize,
    },
}

impl TypeHandle {
    pub fn class(&self) -> Option<&Arc<Class>> {
        match self {
            TypeHandle::Class(class) => Some(class),
            TypeHandle::Array { element, .. } => element.class(),
            TypeHandle::Primitive(_) => None,
        }
    }

    pub fn to_descriptor(&self) -> String {
        match self {
            TypeHandle::Primitive(field_type) => field_type.to_descriptor(),
            TypeHandle::Class(class) => format!("L{};", class.name()),
            TypeHandle::Array {
                element,
                dimensions,
            } => format!("{}{}", "[".repeat(*dimensions), element.to_descriptor()),
        }
    }
}

impl fmt::Display for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeHandle::Primitive(field_type) => f.write_str(primitive_name(field_type)),
            TypeHandle::Class(class) => f.write_str(&class.java_name()),
            TypeHandle::Array {
                element,
                dimensions,
            } => write!(f, "{element}{}", "[]".repeat(*dimensions)),
        }
    }
}

fn primitive_name(field_type: &FieldType) -> &'static str {
    match field_type {
        FieldType::Byte => "byte",
        FieldType::Char => "char",
        FieldType::Double => "double",
        FieldType::Float => "float",
        FieldType::Int => "int",
        FieldType::Long => "long",
        FieldType::Short => "short",
        FieldType::Boolean => "boolean",
        FieldType::Object(_) | FieldType::Array(_) => "?",
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedSignature {
    pub descriptor: Arc<MethodDescriptor>,
    pub parameters: Vec<TypeHandle>,
    /// `None` for `void`.
    pub return_type: Option<TypeHandle>,
}

/// Binds one type. A class that is absent, or whose own supertypes are
/// absent, surfaces as [`RuntimeError::TypeNotPresent`]; malformed class
/// bytes and I/O failures pass through unchanged.
pub fn resolve_type(runtime: &Runtime, field_type: &FieldType) -> Result<TypeHandle, RuntimeError> {
    match field_type {
        FieldType::Array(_) => Ok(TypeHandle::Array {
            element: Box::new(resolve_type(runtime, field_type.element_type())?),
            dimensions: field_type.dimensions(),
        }),
        FieldType::Object(name) => match runtime.class_for_name(name) {
            Ok(class) => Ok(TypeHandle::Class(class)),
            Err(
                RuntimeError::ClassNotFound(_)
                | RuntimeError::NoClassDefFound { .. }
                | RuntimeError::ClassCircularity(_),
            ) => Err(RuntimeError::TypeNotPresent(name.clone())),
            Err(err) => Err(err),
        },
        primitive => Ok(TypeHandle::Primitive(primitive.clone())),
    }
}

pub fn resolve_signature(
    runtime: &Runtime,
    descriptor: Arc<MethodDescriptor>,
) -> Result<ResolvedSignature, RuntimeError> {
    let parameters = descriptor
        .parameters
        .iter()
        .map(|parameter| resolve_type(runtime, parameter))
        .collect::<Result<Vec<_>, _>>()?;
    let return_type = match &descriptor.return_type {
        Some(return_type) => Some(resolve_type(runtime, return_type)?),
        None => None,
    };
    Ok(ResolvedSignature {
        descriptor,
        parameters,
        return_type,
    })
}

/// Parses `descriptor` and resolves every type it names. Grammar errors are
/// reported before any class is loaded.
pub fn resolve_method_descriptor(
    runtime: &Runtime,
    descriptor: &str,
) -> Result<ResolvedSignature, ResolveError> {
    let parsed = Arc::new(parse_method_descriptor(descriptor)?);
    Ok(resolve_signature(runtime, parsed)?)
}
