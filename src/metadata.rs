//! Structural view of a compiled unit: members, descriptors and annotation
//! tables, read straight from class-file bytes without linking anything.

use std::sync::Arc;

use dashmap::DashMap;

use crate::{
    class::{self, AttributeInfo},
    consts::{ClassAccessFlag, FieldAccessFlag, MethodAccessFlag, attribute},
    descriptor::{parse_field_descriptor, parse_method_descriptor},
    error::UnitError,
};

mod annotations;

pub use annotations::{parse_annotations, parse_parameter_annotations};

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledUnit {
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub access_flags: ClassAccessFlag,
    pub major_version: u16,
    pub minor_version: u16,
    pub methods: Vec<MemberMethod>,
    pub fields: Vec<MemberField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberMethod {
    pub name: String,
    pub descriptor: String,
    pub access_flags: MethodAccessFlag,
    pub annotations: Vec<Annotation>,
    /// Index-aligned with the descriptor's parameters. `None` when the unit
    /// carries no parameter table or its length disagrees with the descriptor.
    pub parameter_annotations: Option<Vec<Vec<Annotation>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberField {
    pub name: String,
    pub descriptor: String,
    pub access_flags: FieldAccessFlag,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Field descriptor of the annotation interface, e.g. `Lorg/jetbrains/annotations/Nullable;`.
    pub type_descriptor: String,
    /// Whether the annotation came from a `RuntimeVisible*` table.
    pub visible: bool,
    pub elements: Vec<ElementValuePair>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementValuePair {
    pub name: String,
    pub value: ElementValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    Const(Const),
    Enum {
        type_name: String,
        const_name: String,
    },
    /// Return descriptor of a class literal (`V` for `void.class`).
    Class(String),
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Byte(i32),
    Char(i32),
    Double(f64),
    Float(f32),
    Int(i32),
    Long(i64),
    Short(i32),
    Boolean(i32),
    String(String),
}

impl Const {
    /// Element-value tag written for this constant.
    pub fn tag(&self) -> u8 {
        match self {
            Const::Byte(_) => b'B',
            Const::Char(_) => b'C',
            Const::Double(_) => b'D',
            Const::Float(_) => b'F',
            Const::Int(_) => b'I',
            Const::Long(_) => b'J',
            Const::Short(_) => b'S',
            Const::Boolean(_) => b'Z',
            Const::String(_) => b's',
        }
    }
}

impl Annotation {
    pub fn new(type_descriptor: impl Into<String>, visible: bool) -> Self {
        Self {
            type_descriptor: type_descriptor.into(),
            visible,
            elements: Vec::new(),
        }
    }

    pub fn with_element(mut self, name: impl Into<String>, value: ElementValue) -> Self {
        self.elements.push(ElementValuePair {
            name: name.into(),
            value,
        });
        self
    }
}

fn has_any(annotations: &[Annotation], markers: &[impl AsRef<str>]) -> bool {
    annotations.iter().any(|annotation| {
        markers
            .iter()
            .any(|marker| annotation.type_descriptor == marker.as_ref())
    })
}

impl MemberMethod {
    pub fn is_annotated(&self, markers: &[impl AsRef<str>]) -> bool {
        has_any(&self.annotations, markers)
    }

    /// Annotations on parameter `index`; empty when the table is absent.
    pub fn parameter(&self, index: usize) -> &[Annotation] {
        self.parameter_annotations
            .as_ref()
            .and_then(|parameters| parameters.get(index))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_parameter_annotated(&self, index: usize, markers: &[impl AsRef<str>]) -> bool {
        has_any(self.parameter(index), markers)
    }
}

impl MemberField {
    pub fn is_annotated(&self, markers: &[impl AsRef<str>]) -> bool {
        has_any(&self.annotations, markers)
    }
}

impl CompiledUnit {
    pub fn parse(bytes: &[u8]) -> Result<CompiledUnit, UnitError> {
        let class_file = class::parser::class_file(bytes)?;
        Self::from_class(&class_file)
    }

    pub fn from_class(class_file: &class::Class) -> Result<CompiledUnit, UnitError> {
        let methods = class_file
            .methods
            .iter()
            .map(|method| parse_method(class_file, method))
            .collect::<Result<_, _>>()?;
        let fields = class_file
            .fields
            .iter()
            .map(|field| parse_field(class_file, field))
            .collect::<Result<_, _>>()?;

        Ok(CompiledUnit {
            name: class_file.this_class_name()?.into_owned(),
            super_name: class_file.super_class_name()?.map(|name| name.into_owned()),
            interfaces: class_file
                .interface_names()?
                .into_iter()
                .map(|name| name.into_owned())
                .collect(),
            access_flags: class_file.access_flags,
            major_version: class_file.major_version,
            minor_version: class_file.minor_version,
            methods,
            fields,
        })
    }

    /// The method whose name and descriptor both match exactly.
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MemberMethod> {
        self.methods
            .iter()
            .find(|method| method.name == name && method.descriptor == descriptor)
    }

    pub fn find_field(&self, name: &str, descriptor: &str) -> Option<&MemberField> {
        self.fields
            .iter()
            .find(|field| field.name == name && field.descriptor == descriptor)
    }

    pub fn overloads<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MemberMethod> + 'a {
        self.methods.iter().filter(move |method| method.name == name)
    }
}

fn parse_method(
    class_file: &class::Class,
    method: &class::MethodInfo,
) -> Result<MemberMethod, UnitError> {
    let name = class_file.utf8(method.name_index)?.into_owned();
    let descriptor = class_file.utf8(method.descriptor_index)?.into_owned();
    let parameter_count = parse_method_descriptor(&descriptor)?.parameters.len();

    let annotations = member_annotations(class_file, &method.attributes)?;

    let mut parameter_annotations: Option<Vec<Vec<Annotation>>> = None;
    for (name, visible) in [
        (attribute::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS, true),
        (attribute::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS, false),
    ] {
        let Some(attribute) = class_file.find_attribute(&method.attributes, name)? else {
            continue;
        };
        let table = parse_parameter_annotations(&attribute.info, &class_file.constant_pool, visible)?;
        if table.len() != parameter_count {
            // javac omits synthetic parameters from the table; the indices cannot be trusted
            log::debug!(
                "ignoring {name} of {descriptor}: {} entries for {parameter_count} parameters",
                table.len()
            );
            continue;
        }
        match &mut parameter_annotations {
            Some(merged) => {
                for (slot, annotations) in merged.iter_mut().zip(table) {
                    slot.extend(annotations);
                }
            }
            None => parameter_annotations = Some(table),
        }
    }

    Ok(MemberMethod {
        name,
        descriptor,
        access_flags: method.access_flags,
        annotations,
        parameter_annotations,
    })
}

fn parse_field(
    class_file: &class::Class,
    field: &class::FieldInfo,
) -> Result<MemberField, UnitError> {
    let descriptor = class_file.utf8(field.descriptor_index)?.into_owned();
    parse_field_descriptor(&descriptor)?;
    Ok(MemberField {
        name: class_file.utf8(field.name_index)?.into_owned(),
        descriptor,
        access_flags: field.access_flags,
        annotations: member_annotations(class_file, &field.attributes)?,
    })
}

fn member_annotations(
    class_file: &class::Class,
    attributes: &[AttributeInfo],
) -> Result<Vec<Annotation>, UnitError> {
    let mut annotations = Vec::new();
    for attribute in attributes {
        let visible = match class_file.attribute_name(attribute)?.as_ref() {
            attribute::RUNTIME_VISIBLE_ANNOTATIONS => true,
            attribute::RUNTIME_INVISIBLE_ANNOTATIONS => false,
            _ => continue,
        };
        annotations.extend(parse_annotations(
            &attribute.info,
            &class_file.constant_pool,
            visible,
        )?);
    }
    Ok(annotations)
}

/// Parsed units keyed by internal class name. Entries are replaced wholesale,
/// never mutated in place.
#[derive(Debug, Default)]
pub struct UnitCache {
    units: DashMap<String, Arc<CompiledUnit>>,
}

impl UnitCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, class_name: &str) -> Option<Arc<CompiledUnit>> {
        self.units.get(class_name).map(|unit| Arc::clone(unit.value()))
    }

    pub fn get_or_try_insert_with<E>(
        &self,
        class_name: &str,
        parse: impl FnOnce() -> Result<CompiledUnit, E>,
    ) -> Result<Arc<CompiledUnit>, E> {
        if let Some(unit) = self.get(class_name) {
            return Ok(unit);
        }
        let unit = Arc::new(parse()?);
        self.units
            .insert(class_name.to_string(), Arc::clone(&unit));
        Ok(unit)
    }

    pub fn invalidate(&self, class_name: &str) -> Option<Arc<CompiledUnit>> {
        self.units.remove(class_name).map(|(_, unit)| unit)
    }

    pub fn clear(&self) {
        self.units.clear();
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
