//! Class-file emission for generated units and builtin core classes.

use std::{collections::HashMap, sync::Arc};

use crate::{
    class::{ConstantPoolInfo, JavaStr},
    consts::{
        CLASS_MAGIC, ClassAccessFlag, FieldAccessFlag, GENERATED_MAJOR_VERSION, MethodAccessFlag,
        attribute, opcode,
    },
    descriptor::parse_method_descriptor,
    error::WriteError,
    metadata::{Annotation, Const, ElementValue},
};

/// Deduplicating constant pool. Indices are 1-based like the parsed pool;
/// longs and doubles are followed by an [`ConstantPoolInfo::Empty`] slot.
#[derive(Debug, Default)]
pub struct ConstantPoolBuilder {
    pool: Vec<ConstantPoolInfo>,
    utf8: HashMap<String, u16>,
    class: HashMap<String, u16>,
    string: HashMap<String, u16>,
    integer: HashMap<i32, u16>,
    long: HashMap<i64, u16>,
    float: HashMap<u32, u16>,
    double: HashMap<u64, u16>,
    name_and_type: HashMap<(String, String), u16>,
    method_ref: HashMap<(String, String, String), u16>,
}

impl ConstantPoolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_pool(self) -> Vec<ConstantPoolInfo> {
        self.pool
    }

    pub fn utf8(&mut self, value: &str) -> Result<u16, WriteError> {
        if let Some(index) = self.utf8.get(value) {
            return Ok(*index);
        }
        let bytes = JavaStr::encode(value);
        if bytes.len() > u16::MAX as usize {
            return Err(WriteError::TooLarge("utf8 constant"));
        }
        let index = self.push(ConstantPoolInfo::Utf8(Arc::from(bytes.as_ref())))?;
        self.utf8.insert(value.to_string(), index);
        Ok(index)
    }

    pub fn class(&mut self, name: &str) -> Result<u16, WriteError> {
        if let Some(index) = self.class.get(name) {
            return Ok(*index);
        }
        let name_index = self.utf8(name)?;
        let index = self.push(ConstantPoolInfo::Class { name_index })?;
        self.class.insert(name.to_string(), index);
        Ok(index)
    }

    pub fn string(&mut self, value: &str) -> Result<u16, WriteError> {
        if let Some(index) = self.string.get(value) {
            return Ok(*index);
        }
        let string_index = self.utf8(value)?;
        let index = self.push(ConstantPoolInfo::String { string_index })?;
        self.string.insert(value.to_string(), index);
        Ok(index)
    }

    pub fn integer(&mut self, value: i32) -> Result<u16, WriteError> {
        if let Some(index) = self.integer.get(&value) {
            return Ok(*index);
        }
        let index = self.push(ConstantPoolInfo::Integer(value))?;
        self.integer.insert(value, index);
        Ok(index)
    }

    pub fn long(&mut self, value: i64) -> Result<u16, WriteError> {
        if let Some(index) = self.long.get(&value) {
            return Ok(*index);
        }
        let index = self.push(ConstantPoolInfo::Long(value))?;
        self.push(ConstantPoolInfo::Empty)?;
        self.long.insert(value, index);
        Ok(index)
    }

    pub fn float(&mut self, value: f32) -> Result<u16, WriteError> {
        if let Some(index) = self.float.get(&value.to_bits()) {
            return Ok(*index);
        }
        let index = self.push(ConstantPoolInfo::Float(value))?;
        self.float.insert(value.to_bits(), index);
        Ok(index)
    }

    pub fn double(&mut self, value: f64) -> Result<u16, WriteError> {
        if let Some(index) = self.double.get(&value.to_bits()) {
            return Ok(*index);
        }
        let index = self.push(ConstantPoolInfo::Double(value))?;
        self.push(ConstantPoolInfo::Empty)?;
        self.double.insert(value.to_bits(), index);
        Ok(index)
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16, WriteError> {
        let key = (name.to_string(), descriptor.to_string());
        if let Some(index) = self.name_and_type.get(&key) {
            return Ok(*index);
        }
        let name_index = self.utf8(name)?;
        let descriptor_index = self.utf8(descriptor)?;
        let index = self.push(ConstantPoolInfo::NameAndType {
            name_index,
            descriptor_index,
        })?;
        self.name_and_type.insert(key, index);
        Ok(index)
    }

    pub fn method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16, WriteError> {
        let key = (owner.to_string(), name.to_string(), descriptor.to_string());
        if let Some(index) = self.method_ref.get(&key) {
            return Ok(*index);
        }
        let class_index = self.class(owner)?;
        let name_and_type_index = self.name_and_type(name, descriptor)?;
        let index = self.push(ConstantPoolInfo::Methodref {
            class_index,
            name_and_type_index,
        })?;
        self.method_ref.insert(key, index);
        Ok(index)
    }

    fn push(&mut self, entry: ConstantPoolInfo) -> Result<u16, WriteError> {
        // constant_pool_count is len + 1 and must fit in a u16
        if self.pool.len() + 1 >= u16::MAX as usize {
            return Err(WriteError::PoolOverflow);
        }
        self.pool.push(entry);
        Ok(self.pool.len() as u16)
    }
}

/// A single instruction of a generated method body.
#[derive(Debug, Clone, PartialEq)]
pub enum Insn {
    Op(u8),
    /// A local-variable load; widened automatically past slot 255.
    Load { opcode: u8, index: u16 },
    InvokeSpecial {
        owner: String,
        name: String,
        descriptor: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub instructions: Vec<Insn>,
}

#[derive(Debug)]
pub struct FieldData {
    access_flags: FieldAccessFlag,
    name: String,
    descriptor: String,
    annotations: Vec<Annotation>,
    attributes: Vec<(String, Vec<u8>)>,
}

impl FieldData {
    pub fn annotation(&mut self, annotation: Annotation) -> &mut Self {
        self.annotations.push(annotation);
        self
    }

    pub fn raw_attribute(&mut self, name: impl Into<String>, info: Vec<u8>) -> &mut Self {
        self.attributes.push((name.into(), info));
        self
    }
}

#[derive(Debug)]
pub struct MethodData {
    access_flags: MethodAccessFlag,
    name: String,
    descriptor: String,
    annotations: Vec<Annotation>,
    parameter_annotations: Vec<Vec<Annotation>>,
    code: Option<Code>,
    attributes: Vec<(String, Vec<u8>)>,
}

impl MethodData {
    pub fn annotation(&mut self, annotation: Annotation) -> &mut Self {
        self.annotations.push(annotation);
        self
    }

    pub fn parameter_annotation(&mut self, index: usize, annotation: Annotation) -> &mut Self {
        if self.parameter_annotations.len() <= index {
            self.parameter_annotations.resize_with(index + 1, Vec::new);
        }
        self.parameter_annotations[index].push(annotation);
        self
    }

    pub fn code(&mut self, code: Code) -> &mut Self {
        self.code = Some(code);
        self
    }

    pub fn raw_attribute(&mut self, name: impl Into<String>, info: Vec<u8>) -> &mut Self {
        self.attributes.push((name.into(), info));
        self
    }
}

#[derive(Debug)]
pub struct ClassWriter {
    minor_version: u16,
    major_version: u16,
    access_flags: ClassAccessFlag,
    name: String,
    super_name: Option<String>,
    interfaces: Vec<String>,
    annotations: Vec<Annotation>,
    fields: Vec<FieldData>,
    methods: Vec<MethodData>,
    source_file: Option<String>,
}

impl ClassWriter {
    /// A public class at the generated version. `super_name` is `None` only
    /// for `java/lang/Object`.
    pub fn new(name: impl Into<String>, super_name: Option<&str>) -> Self {
        Self {
            minor_version: 0,
            major_version: GENERATED_MAJOR_VERSION,
            access_flags: ClassAccessFlag::PUBLIC | ClassAccessFlag::SUPER,
            name: name.into(),
            super_name: super_name.map(str::to_string),
            interfaces: Vec::new(),
            annotations: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            source_file: None,
        }
    }

    pub fn version(&mut self, major: u16, minor: u16) -> &mut Self {
        self.major_version = major;
        self.minor_version = minor;
        self
    }

    pub fn access_flags(&mut self, access_flags: ClassAccessFlag) -> &mut Self {
        self.access_flags = access_flags;
        self
    }

    pub fn interface(&mut self, name: impl Into<String>) -> &mut Self {
        self.interfaces.push(name.into());
        self
    }

    pub fn source_file(&mut self, name: impl Into<String>) -> &mut Self {
        self.source_file = Some(name.into());
        self
    }

    pub fn annotation(&mut self, annotation: Annotation) -> &mut Self {
        self.annotations.push(annotation);
        self
    }

    pub fn field(
        &mut self,
        access_flags: FieldAccessFlag,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> &mut FieldData {
        self.fields.push(FieldData {
            access_flags,
            name: name.into(),
            descriptor: descriptor.into(),
            annotations: Vec::new(),
            attributes: Vec::new(),
        });
        let index = self.fields.len() - 1;
        &mut self.fields[index]
    }

    pub fn method(
        &mut self,
        access_flags: MethodAccessFlag,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> &mut MethodData {
        self.methods.push(MethodData {
            access_flags,
            name: name.into(),
            descriptor: descriptor.into(),
            annotations: Vec::new(),
            parameter_annotations: Vec::new(),
            code: None,
            attributes: Vec::new(),
        });
        let index = self.methods.len() - 1;
        &mut self.methods[index]
    }

    /// Serializes the class. The body is written first so that the pool is
    /// complete by the time the header is emitted.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WriteError> {
        let mut cp = ConstantPoolBuilder::new();
        let mut body = Vec::new();

        write_u2(&mut body, self.access_flags.bits());
        write_u2(&mut body, cp.class(&self.name)?);
        let super_class = match &self.super_name {
            Some(super_name) => cp.class(super_name)?,
            None => 0,
        };
        write_u2(&mut body, super_class);

        write_u2(&mut body, len_u16(self.interfaces.len(), "interface table")?);
        for interface in &self.interfaces {
            write_u2(&mut body, cp.class(interface)?);
        }

        write_u2(&mut body, len_u16(self.fields.len(), "field table")?);
        for field in &self.fields {
            write_field(&mut body, &mut cp, field)?;
        }

        write_u2(&mut body, len_u16(self.methods.len(), "method table")?);
        for method in &self.methods {
            write_method(&mut body, &mut cp, method)?;
        }

        let mut attributes = annotation_attributes(&mut cp, &self.annotations)?;
        if let Some(source_file) = &self.source_file {
            let mut info = Vec::new();
            write_u2(&mut info, cp.utf8(source_file)?);
            attributes.push((cp.utf8(attribute::SOURCE_FILE)?, info));
        }
        write_attributes(&mut body, &attributes)?;

        let pool = cp.into_pool();
        let mut out = Vec::with_capacity(body.len() + pool.len() * 8 + 10);
        out.extend_from_slice(&CLASS_MAGIC);
        write_u2(&mut out, self.minor_version);
        write_u2(&mut out, self.major_version);
        write_constant_pool(&mut out, &pool);
        out.extend_from_slice(&body);
        Ok(out)
    }
}

type Attribute = (u16, Vec<u8>);

fn write_field(
    out: &mut Vec<u8>,
    cp: &mut ConstantPoolBuilder,
    field: &FieldData,
) -> Result<(), WriteError> {
    write_u2(out, field.access_flags.bits());
    write_u2(out, cp.utf8(&field.name)?);
    write_u2(out, cp.utf8(&field.descriptor)?);

    let mut attributes = annotation_attributes(cp, &field.annotations)?;
    for (name, info) in &field.attributes {
        attributes.push((cp.utf8(name)?, info.clone()));
    }
    write_attributes(out, &attributes)
}

fn write_method(
    out: &mut Vec<u8>,
    cp: &mut ConstantPoolBuilder,
    method: &MethodData,
) -> Result<(), WriteError> {
    write_u2(out, method.access_flags.bits());
    write_u2(out, cp.utf8(&method.name)?);
    write_u2(out, cp.utf8(&method.descriptor)?);

    let mut attributes = Vec::new();
    if let Some(code) = &method.code {
        attributes.push((cp.utf8(attribute::CODE)?, code_attribute(cp, code)?));
    }
    attributes.extend(annotation_attributes(cp, &method.annotations)?);

    if !method.parameter_annotations.is_empty() {
        // a table always covers every declared parameter
        let declared = parse_method_descriptor(&method.descriptor)
            .map(|descriptor| descriptor.parameters.len())
            .unwrap_or(0);
        let num_parameters = declared.max(method.parameter_annotations.len());
        if num_parameters > u8::MAX as usize {
            return Err(WriteError::TooLarge("parameter annotation table"));
        }
        for (name, visible) in [
            (attribute::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS, true),
            (attribute::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS, false),
        ] {
            let any = method
                .parameter_annotations
                .iter()
                .flatten()
                .any(|annotation| annotation.visible == visible);
            if !any {
                continue;
            }
            let mut info = vec![num_parameters as u8];
            for index in 0..num_parameters {
                let annotations = method
                    .parameter_annotations
                    .get(index)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                write_annotation_table(&mut info, cp, annotations, visible)?;
            }
            attributes.push((cp.utf8(name)?, info));
        }
    }

    for (name, info) in &method.attributes {
        attributes.push((cp.utf8(name)?, info.clone()));
    }
    write_attributes(out, &attributes)
}

fn code_attribute(cp: &mut ConstantPoolBuilder, code: &Code) -> Result<Vec<u8>, WriteError> {
    let mut bytecode = Vec::new();
    for insn in &code.instructions {
        match insn {
            Insn::Op(op) => write_u1(&mut bytecode, *op),
            Insn::Load { opcode, index } => {
                if *index <= u8::MAX as u16 {
                    write_u1(&mut bytecode, *opcode);
                    write_u1(&mut bytecode, *index as u8);
                } else {
                    write_u1(&mut bytecode, opcode::WIDE);
                    write_u1(&mut bytecode, *opcode);
                    write_u2(&mut bytecode, *index);
                }
            }
            Insn::InvokeSpecial {
                owner,
                name,
                descriptor,
            } => {
                write_u1(&mut bytecode, opcode::INVOKESPECIAL);
                write_u2(&mut bytecode, cp.method_ref(owner, name, descriptor)?);
            }
        }
    }
    if bytecode.len() >= u16::MAX as usize {
        return Err(WriteError::TooLarge("method body"));
    }

    let mut info = Vec::with_capacity(bytecode.len() + 12);
    write_u2(&mut info, code.max_stack);
    write_u2(&mut info, code.max_locals);
    write_u4(&mut info, bytecode.len() as u32);
    info.extend_from_slice(&bytecode);
    // exception table, attributes
    write_u2(&mut info, 0);
    write_u2(&mut info, 0);
    Ok(info)
}

/// Splits `annotations` into a visible and an invisible table, omitting
/// tables that would be empty.
fn annotation_attributes(
    cp: &mut ConstantPoolBuilder,
    annotations: &[Annotation],
) -> Result<Vec<Attribute>, WriteError> {
    let mut attributes = Vec::new();
    for (name, visible) in [
        (attribute::RUNTIME_VISIBLE_ANNOTATIONS, true),
        (attribute::RUNTIME_INVISIBLE_ANNOTATIONS, false),
    ] {
        if !annotations.iter().any(|annotation| annotation.visible == visible) {
            continue;
        }
        let mut info = Vec::new();
        write_annotation_table(&mut info, cp, annotations, visible)?;
        attributes.push((cp.utf8(name)?, info));
    }
    Ok(attributes)
}

fn write_annotation_table(
    out: &mut Vec<u8>,
    cp: &mut ConstantPoolBuilder,
    annotations: &[Annotation],
    visible: bool,
) -> Result<(), WriteError> {
    let selected: Vec<_> = annotations
        .iter()
        .filter(|annotation| annotation.visible == visible)
        .collect();
    write_u2(out, len_u16(selected.len(), "annotation table")?);
    for annotation in selected {
        write_annotation(out, cp, annotation)?;
    }
    Ok(())
}

fn write_annotation(
    out: &mut Vec<u8>,
    cp: &mut ConstantPoolBuilder,
    annotation: &Annotation,
) -> Result<(), WriteError> {
    write_u2(out, cp.utf8(&annotation.type_descriptor)?);
    write_u2(out, len_u16(annotation.elements.len(), "annotation")?);
    for pair in &annotation.elements {
        write_u2(out, cp.utf8(&pair.name)?);
        write_element_value(out, cp, &pair.value)?;
    }
    Ok(())
}

fn write_element_value(
    out: &mut Vec<u8>,
    cp: &mut ConstantPoolBuilder,
    value: &ElementValue,
) -> Result<(), WriteError> {
    match value {
        ElementValue::Const(constant) => {
            write_u1(out, constant.tag());
            let index = match constant {
                Const::Byte(value)
                | Const::Char(value)
                | Const::Int(value)
                | Const::Short(value)
                | Const::Boolean(value) => cp.integer(*value)?,
                Const::Long(value) => cp.long(*value)?,
                Const::Float(value) => cp.float(*value)?,
                Const::Double(value) => cp.double(*value)?,
                Const::String(value) => cp.utf8(value)?,
            };
            write_u2(out, index);
        }
        ElementValue::Enum {
            type_name,
            const_name,
        } => {
            write_u1(out, b'e');
            write_u2(out, cp.utf8(type_name)?);
            write_u2(out, cp.utf8(const_name)?);
        }
        ElementValue::Class(descriptor) => {
            write_u1(out, b'c');
            write_u2(out, cp.utf8(descriptor)?);
        }
        ElementValue::Annotation(nested) => {
            write_u1(out, b'@');
            write_annotation(out, cp, nested)?;
        }
        ElementValue::Array(values) => {
            write_u1(out, b'[');
            write_u2(out, len_u16(values.len(), "element value array")?);
            for value in values {
                write_element_value(out, cp, value)?;
            }
        }
    }
    Ok(())
}

fn write_attributes(out: &mut Vec<u8>, attributes: &[Attribute]) -> Result<(), WriteError> {
    write_u2(out, len_u16(attributes.len(), "attribute table")?);
    for (name_index, info) in attributes {
        let length = u32::try_from(info.len()).map_err(|_| WriteError::TooLarge("attribute"))?;
        write_u2(out, *name_index);
        write_u4(out, length);
        out.extend_from_slice(info);
    }
    Ok(())
}

fn write_constant_pool(out: &mut Vec<u8>, pool: &[ConstantPoolInfo]) {
    write_u2(out, pool.len() as u16 + 1);
    for entry in pool {
        if !matches!(entry, ConstantPoolInfo::Empty) {
            write_u1(out, entry.tag());
        }
        match entry {
            ConstantPoolInfo::Empty => {}
            ConstantPoolInfo::Utf8(bytes) => {
                write_u2(out, bytes.len() as u16);
                out.extend_from_slice(bytes);
            }
            ConstantPoolInfo::Integer(value) => write_u4(out, *value as u32),
            ConstantPoolInfo::Float(value) => write_u4(out, value.to_bits()),
            ConstantPoolInfo::Long(value) => write_u8(out, *value as u64),
            ConstantPoolInfo::Double(value) => write_u8(out, value.to_bits()),
            ConstantPoolInfo::Class { name_index }
            | ConstantPoolInfo::Module { name_index }
            | ConstantPoolInfo::Package { name_index } => write_u2(out, *name_index),
            ConstantPoolInfo::String { string_index } => write_u2(out, *string_index),
            ConstantPoolInfo::MethodType { descriptor_index } => write_u2(out, *descriptor_index),
            ConstantPoolInfo::Fieldref {
                class_index,
                name_and_type_index,
            }
            | ConstantPoolInfo::Methodref {
                class_index,
                name_and_type_index,
            }
            | ConstantPoolInfo::InterfaceMethodref {
                class_index,
                name_and_type_index,
            } => {
                write_u2(out, *class_index);
                write_u2(out, *name_and_type_index);
            }
            ConstantPoolInfo::NameAndType {
                name_index,
                descriptor_index,
            } => {
                write_u2(out, *name_index);
                write_u2(out, *descriptor_index);
            }
            ConstantPoolInfo::MethodHandle {
                reference_kind,
                reference_index,
            } => {
                write_u1(out, *reference_kind);
                write_u2(out, *reference_index);
            }
            ConstantPoolInfo::Dynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            }
            | ConstantPoolInfo::InvokeDynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => {
                write_u2(out, *bootstrap_method_attr_index);
                write_u2(out, *name_and_type_index);
            }
        }
    }
}

fn len_u16(len: usize, what: &'static str) -> Result<u16, WriteError> {
    u16::try_from(len).map_err(|_| WriteError::TooLarge(what))
}

fn write_u1(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

fn write_u2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn write_u4(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn write_u8(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_be_bytes());
}
