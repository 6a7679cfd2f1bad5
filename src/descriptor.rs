use std::{borrow::Cow, fmt, sync::Arc};

use dashmap::DashMap;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, one_of},
    combinator::{eof, map},
    multi::many0,
    sequence::delimited,
};

use crate::error::DescriptorError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDescriptor(pub FieldType);

/// Parsed `(params)ret` descriptor. Serializes back to the exact text it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,
    pub return_type: ReturnType,
}

/// `None` is `void`.
pub type ReturnType = Option<FieldType>;

#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Object(String),
    Short,
    Boolean,
    Array(Box<FieldType>),
}

impl FieldType {
    pub fn is_long(&self) -> bool {
        matches!(self, FieldType::Long | FieldType::Double)
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self, FieldType::Object(_) | FieldType::Array(_))
    }

    /// Local-variable / operand-stack slots taken by a value of this type.
    pub fn slot_size(&self) -> u16 {
        if self.is_long() { 2 } else { 1 }
    }

    pub fn dimensions(&self) -> usize {
        match self {
            FieldType::Array(element) => 1 + element.dimensions(),
            _ => 0,
        }
    }

    /// Innermost non-array type.
    pub fn element_type(&self) -> &FieldType {
        match self {
            FieldType::Array(element) => element.element_type(),
            other => other,
        }
    }

    pub fn to_descriptor(&self) -> String {
        let mut out = String::new();
        self.write_descriptor(&mut out);
        out
    }

    fn write_descriptor(&self, out: &mut String) {
        match self {
            FieldType::Byte => out.push('B'),
            FieldType::Char => out.push('C'),
            FieldType::Double => out.push('D'),
            FieldType::Float => out.push('F'),
            FieldType::Int => out.push('I'),
            FieldType::Long => out.push('J'),
            FieldType::Short => out.push('S'),
            FieldType::Boolean => out.push('Z'),
            FieldType::Object(name) => {
                out.push('L');
                out.push_str(name);
                out.push(';');
            }
            FieldType::Array(element) => {
                out.push('[');
                element.write_descriptor(out);
            }
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_descriptor())
    }
}

impl fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl MethodDescriptor {
    pub fn to_descriptor(&self) -> String {
        let mut out = String::from("(");
        for parameter in &self.parameters {
            parameter.write_descriptor(&mut out);
        }
        out.push(')');
        match &self.return_type {
            Some(return_type) => return_type.write_descriptor(&mut out),
            None => out.push('V'),
        }
        out
    }

    /// Slots occupied by the parameters, not counting a receiver.
    pub fn parameter_slots(&self) -> u16 {
        self.parameters
            .iter()
            .fold(0u16, |slots, parameter| slots.saturating_add(parameter.slot_size()))
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_descriptor())
    }
}

pub fn parse_field_descriptor(input: &str) -> Result<FieldDescriptor, DescriptorError> {
    complete(input, field_descriptor(input))
}

pub fn parse_method_descriptor(input: &str) -> Result<MethodDescriptor, DescriptorError> {
    complete(input, method_descriptor(input))
}

pub fn parse_return_type_descriptor(input: &str) -> Result<ReturnType, DescriptorError> {
    complete(input, standalone_return_type(input))
}

fn standalone_return_type(input: &str) -> IResult<&str, ReturnType> {
    let (input, return_type) = return_type_descriptor(input)?;
    let (input, _) = eof(input)?;
    Ok((input, return_type))
}

fn complete<T>(input: &str, result: IResult<&str, T>) -> Result<T, DescriptorError> {
    match result {
        Ok((_, value)) => Ok(value),
        Err(nom::Err::Error(err) | nom::Err::Failure(err)) => Err(DescriptorError {
            input: input.to_string(),
            offset: input.len() - err.input.len(),
        }),
        Err(nom::Err::Incomplete(_)) => Err(DescriptorError {
            input: input.to_string(),
            offset: input.len(),
        }),
    }
}

fn field_descriptor(input: &str) -> IResult<&str, FieldDescriptor> {
    let (input, field_type) = field_type(input)?;
    let (input, _) = eof(input)?;
    Ok((input, FieldDescriptor(field_type)))
}

fn method_descriptor(input: &str) -> IResult<&str, MethodDescriptor> {
    let (input, parameters) = delimited(char('('), many0(field_type), char(')')).parse(input)?;

    let (input, return_type) = return_type_descriptor(input)?;

    let (input, _) = eof(input)?;
    Ok((
        input,
        MethodDescriptor {
            parameters,
            return_type,
        },
    ))
}

fn return_type_descriptor(input: &str) -> IResult<&str, ReturnType> {
    alt((map(field_type, Some), void_type)).parse(input)
}

fn field_type(input: &str) -> IResult<&str, FieldType> {
    alt((base_type, object_type, array_type)).parse(input)
}

fn base_type(input: &str) -> IResult<&str, FieldType> {
    map(one_of("BCDFIJSZ"), |ch| match ch {
        'B' => FieldType::Byte,
        'C' => FieldType::Char,
        'D' => FieldType::Double,
        'F' => FieldType::Float,
        'I' => FieldType::Int,
        'J' => FieldType::Long,
        'S' => FieldType::Short,
        _ => FieldType::Boolean,
    })
    .parse(input)
}

fn object_type(input: &str) -> IResult<&str, FieldType> {
    let (input, _) = char('L')(input)?;

    let (input, class_name) =
        take_while1(|c: char| !matches!(c, ';' | '.' | '[' | '(' | ')'))(input)?;

    let (input, _) = char(';')(input)?;

    Ok((input, FieldType::Object(class_name.to_string())))
}

fn array_type(input: &str) -> IResult<&str, FieldType> {
    let (input, _) = char('[')(input)?;

    let (input, field_type) = field_type(input)?;

    Ok((input, FieldType::Array(Box::new(field_type))))
}

fn void_type(input: &str) -> IResult<&str, ReturnType> {
    let (input, _) = char('V')(input)?;
    Ok((input, None))
}

/// Accepts `a.b.C`, `a/b/C` or `La/b/C;` and yields the internal `a/b/C` form.
/// Array names such as `[Ljava/lang/String;` are returned unchanged.
pub fn to_internal_name(name: &str) -> Cow<'_, str> {
    if name.starts_with('[') {
        return Cow::Borrowed(name);
    }
    let name = match name.strip_prefix('L').and_then(|n| n.strip_suffix(';')) {
        Some(stripped) => stripped,
        None => name,
    };
    if name.contains('.') {
        Cow::Owned(name.replace('.', "/"))
    } else {
        Cow::Borrowed(name)
    }
}

/// Memoizes parsed method descriptors by their text. Entries are shared and
/// never mutated; `clear` drops them all at once.
#[derive(Debug, Default)]
pub struct DescriptorCache {
    methods: DashMap<String, Arc<MethodDescriptor>>,
}

impl DescriptorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(&self, descriptor: &str) -> Result<Arc<MethodDescriptor>, DescriptorError> {
        if let Some(parsed) = self.methods.get(descriptor) {
            return Ok(Arc::clone(parsed.value()));
        }
        let parsed = Arc::new(parse_method_descriptor(descriptor)?);
        self.methods
            .insert(descriptor.to_string(), Arc::clone(&parsed));
        Ok(parsed)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn clear(&self) {
        self.methods.clear();
    }
}
