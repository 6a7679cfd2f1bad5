use std::{borrow::Cow, sync::Arc};

use crate::{class::JavaStr, error::UnitError};

#[derive(Debug, Clone, PartialEq)]
pub enum ConstantPoolInfo {
    Utf8(Arc<[u8]>),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class {
        name_index: u16,
    },
    String {
        string_index: u16,
    },
    Fieldref {
        class_index: u16,
        name_and_type_index: u16,
    },
    Methodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    MethodType {
        descriptor_index: u16,
    },
    Dynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    Module {
        name_index: u16,
    },
    Package {
        name_index: u16,
    },
    /// Second slot of a long or double.
    Empty,
}

impl ConstantPoolInfo {
    pub fn tag(&self) -> u8 {
        match self {
            ConstantPoolInfo::Utf8(_) => 1,
            ConstantPoolInfo::Integer(_) => 3,
            ConstantPoolInfo::Float(_) => 4,
            ConstantPoolInfo::Long(_) => 5,
            ConstantPoolInfo::Double(_) => 6,
            ConstantPoolInfo::Class { .. } => 7,
            ConstantPoolInfo::String { .. } => 8,
            ConstantPoolInfo::Fieldref { .. } => 9,
            ConstantPoolInfo::Methodref { .. } => 10,
            ConstantPoolInfo::InterfaceMethodref { .. } => 11,
            ConstantPoolInfo::NameAndType { .. } => 12,
            ConstantPoolInfo::MethodHandle { .. } => 15,
            ConstantPoolInfo::MethodType { .. } => 16,
            ConstantPoolInfo::Dynamic { .. } => 17,
            ConstantPoolInfo::InvokeDynamic { .. } => 18,
            ConstantPoolInfo::Module { .. } => 19,
            ConstantPoolInfo::Package { .. } => 20,
            ConstantPoolInfo::Empty => 0,
        }
    }
}

/// Pool indices are 1-based; index 0 and indices past the end are malformed.
pub fn constant(pool: &[ConstantPoolInfo], index: u16) -> Result<&ConstantPoolInfo, UnitError> {
    let entry = match index {
        0 => None,
        index => pool.get(index as usize - 1),
    };
    entry.ok_or(UnitError::BadConstant {
        index,
        expected: "constant",
    })
}

pub fn resolve_utf8(pool: &[ConstantPoolInfo], index: u16) -> Result<Cow<'_, str>, UnitError> {
    let ConstantPoolInfo::Utf8(bytes) = constant(pool, index)? else {
        return Err(UnitError::BadConstant {
            index,
            expected: "Utf8",
        });
    };
    JavaStr::new(bytes)
        .to_str()
        .ok_or(UnitError::InvalidUtf8 { index })
}

pub fn resolve_class(pool: &[ConstantPoolInfo], index: u16) -> Result<Cow<'_, str>, UnitError> {
    let ConstantPoolInfo::Class { name_index } = constant(pool, index)? else {
        return Err(UnitError::BadConstant {
            index,
            expected: "Class",
        });
    };
    resolve_utf8(pool, *name_index)
}
