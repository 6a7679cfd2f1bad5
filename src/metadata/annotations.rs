use nom::{
    IResult, Parser,
    error::ErrorKind,
    error_position,
    multi::count,
    number::complete::{be_u16, u8},
};

use crate::{
    class::{ConstantPoolInfo, constant, resolve_utf8},
    descriptor::{parse_field_descriptor, parse_return_type_descriptor},
    error::UnitError,
    metadata::{Annotation, Const, ElementValue, ElementValuePair},
};

/// Element values may nest arrays and annotations at most this deep.
const MAX_NESTING: usize = 255;

// Layout is parsed first with pool indices left unresolved, so that nom only
// sees byte-level failures and pool failures keep their own error variants.

struct RawAnnotation {
    type_index: u16,
    pairs: Vec<(u16, RawElementValue)>,
}

enum RawElementValue {
    Const { tag: u8, index: u16 },
    Enum { type_index: u16, const_index: u16 },
    Class(u16),
    Annotation(RawAnnotation),
    Array(Vec<RawElementValue>),
}

/// Parses the body of a `Runtime{Visible,Invisible}Annotations` attribute.
pub fn parse_annotations(
    info: &[u8],
    constant_pool: &[ConstantPoolInfo],
    visible: bool,
) -> Result<Vec<Annotation>, UnitError> {
    let (_, raw) = exhaustive(info, annotation_table)?;
    raw.into_iter()
        .map(|annotation| resolve_annotation(constant_pool, annotation, visible))
        .collect()
}

/// Parses the body of a `Runtime{Visible,Invisible}ParameterAnnotations`
/// attribute into one annotation list per declared entry.
pub fn parse_parameter_annotations(
    info: &[u8],
    constant_pool: &[ConstantPoolInfo],
    visible: bool,
) -> Result<Vec<Vec<Annotation>>, UnitError> {
    let (_, raw) = exhaustive(info, parameter_table)?;
    raw.into_iter()
        .map(|parameter| {
            parameter
                .into_iter()
                .map(|annotation| resolve_annotation(constant_pool, annotation, visible))
                .collect()
        })
        .collect()
}

fn exhaustive<'a, T>(
    info: &'a [u8],
    parser: impl Fn(&'a [u8]) -> IResult<&'a [u8], T>,
) -> Result<(&'a [u8], T), UnitError> {
    let result = parser(info).and_then(|(rest, value)| {
        if rest.is_empty() {
            Ok((rest, value))
        } else {
            Err(nom::Err::Error(error_position!(rest, ErrorKind::NonEmpty)))
        }
    });
    result.map_err(|err| {
        let (offset, kind) = match err {
            nom::Err::Error(e) | nom::Err::Failure(e) => (info.len() - e.input.len(), e.code),
            nom::Err::Incomplete(_) => (info.len(), ErrorKind::Eof),
        };
        let reason = match kind {
            ErrorKind::Tag => "unknown element value tag",
            ErrorKind::NonEmpty => "annotation table shorter than its attribute",
            ErrorKind::TooLarge => "element values nested too deeply",
            _ => "truncated annotation table",
        };
        UnitError::Malformed {
            offset,
            reason: reason.to_string(),
        }
    })
}

fn annotation_table(input: &[u8]) -> IResult<&[u8], Vec<RawAnnotation>> {
    let (input, num_annotations) = be_u16(input)?;
    count(|input| annotation(input, 0), num_annotations as _).parse(input)
}

fn parameter_table(input: &[u8]) -> IResult<&[u8], Vec<Vec<RawAnnotation>>> {
    let (input, num_parameters) = u8(input)?;
    count(annotation_table, num_parameters as _).parse(input)
}

fn annotation(input: &[u8], depth: usize) -> IResult<&[u8], RawAnnotation> {
    let (input, type_index) = be_u16(input)?;
    let (input, num_element_value_pairs) = be_u16(input)?;
    let (input, pairs) = count(
        |input| element_value_pair(input, depth),
        num_element_value_pairs as _,
    )
    .parse(input)?;
    Ok((input, RawAnnotation { type_index, pairs }))
}

fn element_value_pair(input: &[u8], depth: usize) -> IResult<&[u8], (u16, RawElementValue)> {
    let (input, element_name_index) = be_u16(input)?;
    let (input, value) = element_value(input, depth)?;
    Ok((input, (element_name_index, value)))
}

fn element_value(input: &[u8], depth: usize) -> IResult<&[u8], RawElementValue> {
    let tag_input = input;
    let (mut input, tag) = u8(input)?;
    if matches!(tag, b'@' | b'[') && depth >= MAX_NESTING {
        return Err(nom::Err::Failure(error_position!(tag_input, ErrorKind::TooLarge)));
    }
    let value = match tag {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => {
            let index;
            (input, index) = be_u16(input)?;
            RawElementValue::Const { tag, index }
        }
        b'e' => {
            let (type_index, const_index);
            (input, type_index) = be_u16(input)?;
            (input, const_index) = be_u16(input)?;
            RawElementValue::Enum {
                type_index,
                const_index,
            }
        }
        b'c' => {
            let class_info_index;
            (input, class_info_index) = be_u16(input)?;
            RawElementValue::Class(class_info_index)
        }
        b'@' => {
            let nested;
            (input, nested) = annotation(input, depth + 1)?;
            RawElementValue::Annotation(nested)
        }
        b'[' => {
            let (num_values, values);
            (input, num_values) = be_u16(input)?;
            (input, values) = count(|input| element_value(input, depth + 1), num_values as _)
                .parse(input)?;
            RawElementValue::Array(values)
        }
        _ => {
            return Err(nom::Err::Error(error_position!(tag_input, ErrorKind::Tag)));
        }
    };
    Ok((input, value))
}

fn resolve_annotation(
    constant_pool: &[ConstantPoolInfo],
    raw: RawAnnotation,
    visible: bool,
) -> Result<Annotation, UnitError> {
    let type_descriptor = resolve_utf8(constant_pool, raw.type_index)?.into_owned();
    parse_field_descriptor(&type_descriptor)?;
    let elements = raw
        .pairs
        .into_iter()
        .map(|(name_index, value)| {
            Ok(ElementValuePair {
                name: resolve_utf8(constant_pool, name_index)?.into_owned(),
                value: resolve_element_value(constant_pool, value, visible)?,
            })
        })
        .collect::<Result<_, UnitError>>()?;
    Ok(Annotation {
        type_descriptor,
        visible,
        elements,
    })
}

fn resolve_element_value(
    constant_pool: &[ConstantPoolInfo],
    raw: RawElementValue,
    visible: bool,
) -> Result<ElementValue, UnitError> {
    let value = match raw {
        RawElementValue::Const { tag, index } => {
            ElementValue::Const(resolve_const(constant_pool, tag, index)?)
        }
        RawElementValue::Enum {
            type_index,
            const_index,
        } => ElementValue::Enum {
            type_name: resolve_utf8(constant_pool, type_index)?.into_owned(),
            const_name: resolve_utf8(constant_pool, const_index)?.into_owned(),
        },
        RawElementValue::Class(index) => {
            let descriptor = resolve_utf8(constant_pool, index)?.into_owned();
            parse_return_type_descriptor(&descriptor)?;
            ElementValue::Class(descriptor)
        }
        RawElementValue::Annotation(nested) => {
            ElementValue::Annotation(resolve_annotation(constant_pool, nested, visible)?)
        }
        RawElementValue::Array(values) => ElementValue::Array(
            values
                .into_iter()
                .map(|value| resolve_element_value(constant_pool, value, visible))
                .collect::<Result<_, _>>()?,
        ),
    };
    Ok(value)
}

fn resolve_const(
    constant_pool: &[ConstantPoolInfo],
    tag: u8,
    index: u16,
) -> Result<Const, UnitError> {
    let entry = constant(constant_pool, index)?;
    let value = match (tag, entry) {
        (b'B', ConstantPoolInfo::Integer(int)) => Const::Byte(*int as i8 as i32),
        (b'C', ConstantPoolInfo::Integer(int)) => Const::Char(*int as u16 as i32),
        (b'S', ConstantPoolInfo::Integer(int)) => Const::Short(*int as i16 as i32),
        (b'Z', ConstantPoolInfo::Integer(int)) => Const::Boolean((*int != 0) as i32),
        (b'I', ConstantPoolInfo::Integer(int)) => Const::Int(*int),
        (b'J', ConstantPoolInfo::Long(long)) => Const::Long(*long),
        (b'F', ConstantPoolInfo::Float(float)) => Const::Float(*float),
        (b'D', ConstantPoolInfo::Double(double)) => Const::Double(*double),
        (b's', ConstantPoolInfo::Utf8(_)) => {
            Const::String(resolve_utf8(constant_pool, index)?.into_owned())
        }
        _ => {
            return Err(UnitError::BadConstant {
                index,
                expected: match tag {
                    b'J' => "Long",
                    b'F' => "Float",
                    b'D' => "Double",
                    b's' => "Utf8",
                    _ => "Integer",
                },
            });
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        class::ClassWriter,
        consts::{MethodAccessFlag, attribute},
        metadata::CompiledUnit,
    };

    fn pool() -> Vec<ConstantPoolInfo> {
        vec![
            ConstantPoolInfo::Utf8(Arc::from(&b"Lorg/jetbrains/annotations/Nullable;"[..])),
            ConstantPoolInfo::Utf8(Arc::from(&b"value"[..])),
            ConstantPoolInfo::Integer(300),
            ConstantPoolInfo::Utf8(Arc::from(&b"Ljava/lang/String;"[..])),
        ]
    }

    #[test]
    fn test_marker_annotation() {
        let info = [0, 1, 0, 1, 0, 0];
        let annotations = parse_annotations(&info, &pool(), false).unwrap();
        assert_eq!(
            annotations,
            vec![Annotation::new("Lorg/jetbrains/annotations/Nullable;", false)]
        );
    }

    #[test]
    fn test_element_values() {
        // @A(value = {(byte) 300, String.class})
        let info = [0, 1, 0, 1, 0, 1, 0, 2, b'[', 0, 2, b'B', 0, 3, b'c', 0, 4];
        let annotations = parse_annotations(&info, &pool(), true).unwrap();
        assert_eq!(
            annotations[0].elements[0].value,
            ElementValue::Array(vec![
                ElementValue::Const(Const::Byte(44)),
                ElementValue::Class("Ljava/lang/String;".to_string()),
            ])
        );
        assert!(annotations[0].visible);
    }

    #[test]
    fn test_parameter_table() {
        let info = [2, 0, 0, 0, 1, 0, 1, 0, 0];
        let table = parse_parameter_annotations(&info, &pool(), false).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table[0].is_empty());
        assert_eq!(table[1].len(), 1);
    }

    #[test]
    fn test_unknown_tag() {
        let info = [0, 1, 0, 1, 0, 1, 0, 2, b'x', 0, 0];
        assert_eq!(
            parse_annotations(&info, &pool(), true).unwrap_err(),
            UnitError::Malformed {
                offset: 8,
                reason: "unknown element value tag".to_string()
            }
        );
    }

    fn nested_arrays(depth: usize) -> Vec<u8> {
        let mut info = vec![0, 1, 0, 1, 0, 1, 0, 2];
        for _ in 0..depth {
            info.extend([b'[', 0, 1]);
        }
        info.extend([b'I', 0, 3]);
        info
    }

    #[test]
    fn test_nesting_limit() {
        let info = nested_arrays(MAX_NESTING);
        let annotations = parse_annotations(&info, &pool(), true).unwrap();
        assert_eq!(annotations[0].elements.len(), 1);

        let info = nested_arrays(MAX_NESTING + 1);
        assert_eq!(
            parse_annotations(&info, &pool(), true).unwrap_err(),
            UnitError::Malformed {
                offset: 8 + 3 * MAX_NESTING,
                reason: "element values nested too deeply".to_string()
            }
        );
    }

    #[test]
    fn test_deeply_nested_unit_is_malformed() {
        let mut writer = ClassWriter::new("demo/Deep", Some("java/lang/Object"));
        writer
            .method(MethodAccessFlag::PUBLIC, "f", "()V")
            .raw_attribute(
                attribute::RUNTIME_VISIBLE_ANNOTATIONS,
                nested_arrays(200_000),
            );
        let bytes = writer.to_bytes().unwrap();
        assert!(matches!(
            CompiledUnit::parse(&bytes),
            Err(UnitError::Malformed { .. })
        ));
    }

    #[test]
    fn test_length_mismatch() {
        assert!(matches!(
            parse_annotations(&[0, 1, 0, 1], &pool(), true),
            Err(UnitError::Malformed { .. })
        ));
        assert!(matches!(
            parse_annotations(&[0, 0, 0], &pool(), true),
            Err(UnitError::Malformed { offset: 2, .. })
        ));
    }

    #[test]
    fn test_wrong_constant_kind() {
        let info = [0, 1, 0, 1, 0, 1, 0, 2, b'J', 0, 3];
        assert_eq!(
            parse_annotations(&info, &pool(), true).unwrap_err(),
            UnitError::BadConstant {
                index: 3,
                expected: "Long"
            }
        );
    }
}
