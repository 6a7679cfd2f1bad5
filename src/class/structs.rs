use std::{borrow::Cow, sync::Arc};

mod constant_pool;
mod java_str;

pub use constant_pool::*;
pub use java_str::*;

use crate::{
    consts::{ClassAccessFlag, FieldAccessFlag, MethodAccessFlag},
    error::UnitError,
};

/// One class file, kept close to its on-disk layout: members and attributes
/// still refer to the constant pool by index.
#[derive(Debug)]
pub struct Class {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: Vec<ConstantPoolInfo>,
    pub access_flags: ClassAccessFlag,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Vec<AttributeInfo>,
}

#[derive(Debug)]
pub struct FieldInfo {
    pub access_flags: FieldAccessFlag,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<AttributeInfo>,
}

#[derive(Debug)]
pub struct MethodInfo {
    pub access_flags: MethodAccessFlag,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<AttributeInfo>,
}

#[derive(Debug)]
pub struct AttributeInfo {
    pub attribute_name_index: u16,
    pub info: Arc<[u8]>,
}

impl Class {
    pub fn constant(&self, index: u16) -> Result<&ConstantPoolInfo, UnitError> {
        constant(&self.constant_pool, index)
    }

    pub fn utf8(&self, index: u16) -> Result<Cow<'_, str>, UnitError> {
        resolve_utf8(&self.constant_pool, index)
    }

    pub fn class_name_at(&self, index: u16) -> Result<Cow<'_, str>, UnitError> {
        resolve_class(&self.constant_pool, index)
    }

    pub fn this_class_name(&self) -> Result<Cow<'_, str>, UnitError> {
        self.class_name_at(self.this_class)
    }

    /// `None` only for `java/lang/Object`, whose `super_class` is 0.
    pub fn super_class_name(&self) -> Result<Option<Cow<'_, str>>, UnitError> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.class_name_at(self.super_class).map(Some)
    }

    pub fn interface_names(&self) -> Result<Vec<Cow<'_, str>>, UnitError> {
        self.interfaces
            .iter()
            .map(|&index| self.class_name_at(index))
            .collect()
    }

    pub fn attribute_name(&self, attribute: &AttributeInfo) -> Result<Cow<'_, str>, UnitError> {
        self.utf8(attribute.attribute_name_index)
    }

    /// Finds the first attribute called `name` in `attributes`.
    pub fn find_attribute<'a>(
        &self,
        attributes: &'a [AttributeInfo],
        name: &str,
    ) -> Result<Option<&'a AttributeInfo>, UnitError> {
        for attribute in attributes {
            if self.attribute_name(attribute)? == name {
                return Ok(Some(attribute));
            }
        }
        Ok(None)
    }
}
