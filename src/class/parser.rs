use nom::{
    IResult, Parser,
    bytes::complete::tag,
    combinator::map,
    error::ErrorKind,
    error_position,
    multi::{length_count, length_data},
    number::complete::{be_f32, be_f64, be_i32, be_i64, be_u16, be_u32, u8},
};

use crate::{
    class::{AttributeInfo, Class, ConstantPoolInfo, FieldInfo, MethodInfo},
    consts::{CLASS_MAGIC, ClassAccessFlag, FieldAccessFlag, MethodAccessFlag, SUPPORTED_MAJOR_VERSIONS},
    error::UnitError,
};

/// Parses a complete class file. Trailing bytes are an error.
pub fn class_file(input: &[u8]) -> Result<Class, UnitError> {
    let (rest, (minor, major)) = header(input).map_err(|err| malformed(input, err))?;
    if !SUPPORTED_MAJOR_VERSIONS.contains(&major) {
        return Err(UnitError::UnsupportedVersion { major, minor });
    }
    let (_, class) = body(rest, minor, major).map_err(|err| malformed(input, err))?;
    Ok(class)
}

fn malformed(input: &[u8], err: nom::Err<nom::error::Error<&[u8]>>) -> UnitError {
    let (offset, kind) = match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => (input.len() - e.input.len(), e.code),
        nom::Err::Incomplete(_) => (input.len(), ErrorKind::Eof),
    };
    let reason = match kind {
        ErrorKind::Tag => "unexpected tag",
        ErrorKind::NonEmpty => "trailing bytes after last attribute",
        ErrorKind::Verify => "invalid constant pool size",
        _ => "truncated table",
    };
    UnitError::Malformed {
        offset,
        reason: reason.to_string(),
    }
}

fn header(input: &[u8]) -> IResult<&[u8], (u16, u16)> {
    let (input, _) = tag(&CLASS_MAGIC[..])(input)?;
    (be_u16, be_u16).parse(input)
}

fn body(input: &[u8], minor_version: u16, major_version: u16) -> IResult<&[u8], Class> {
    let (input, constant_pool) = constant_pool(input)?;
    let (input, (access_flags, this_class, super_class)) = (be_u16, be_u16, be_u16).parse(input)?;
    let (input, interfaces) = length_count(be_u16, be_u16).parse(input)?;
    let (input, fields) = length_count(be_u16, field).parse(input)?;
    let (input, methods) = length_count(be_u16, method).parse(input)?;
    let (input, attributes) = attributes(input)?;
    if !input.is_empty() {
        return Err(nom::Err::Error(error_position!(input, ErrorKind::NonEmpty)));
    }

    Ok((
        input,
        Class {
            minor_version,
            major_version,
            constant_pool,
            access_flags: ClassAccessFlag::from_bits_retain(access_flags),
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        },
    ))
}

/// Entries 1..count; a long or double also occupies the following index.
fn constant_pool(input: &[u8]) -> IResult<&[u8], Vec<ConstantPoolInfo>> {
    let (mut input, declared) = be_u16(input)?;
    let slots = match declared.checked_sub(1) {
        Some(slots) => slots as usize,
        None => return Err(nom::Err::Error(error_position!(input, ErrorKind::Verify))),
    };

    let mut pool = Vec::with_capacity(slots);
    while pool.len() < slots {
        let entry;
        (input, entry) = constant(input)?;
        let wide = matches!(entry, ConstantPoolInfo::Long(_) | ConstantPoolInfo::Double(_));
        pool.push(entry);
        if wide {
            pool.push(ConstantPoolInfo::Empty);
        }
    }
    // a wide entry in the last slot overruns the declared count
    if pool.len() != slots {
        return Err(nom::Err::Error(error_position!(input, ErrorKind::Verify)));
    }
    Ok((input, pool))
}

fn ref_pair(input: &[u8]) -> IResult<&[u8], (u16, u16)> {
    (be_u16, be_u16).parse(input)
}

fn constant(input: &[u8]) -> IResult<&[u8], ConstantPoolInfo> {
    use ConstantPoolInfo as Cp;

    let (rest, tag) = u8(input)?;
    match tag {
        1 => map(length_data(be_u16), |bytes: &[u8]| Cp::Utf8(bytes.into())).parse(rest),
        3 => map(be_i32, Cp::Integer).parse(rest),
        4 => map(be_f32, Cp::Float).parse(rest),
        5 => map(be_i64, Cp::Long).parse(rest),
        6 => map(be_f64, Cp::Double).parse(rest),
        7 => map(be_u16, |name_index| Cp::Class { name_index }).parse(rest),
        8 => map(be_u16, |string_index| Cp::String { string_index }).parse(rest),
        9 => map(ref_pair, |(class_index, name_and_type_index)| Cp::Fieldref {
            class_index,
            name_and_type_index,
        })
        .parse(rest),
        10 => map(ref_pair, |(class_index, name_and_type_index)| Cp::Methodref {
            class_index,
            name_and_type_index,
        })
        .parse(rest),
        11 => map(ref_pair, |(class_index, name_and_type_index)| {
            Cp::InterfaceMethodref {
                class_index,
                name_and_type_index,
            }
        })
        .parse(rest),
        12 => map(ref_pair, |(name_index, descriptor_index)| Cp::NameAndType {
            name_index,
            descriptor_index,
        })
        .parse(rest),
        15 => map((u8, be_u16), |(reference_kind, reference_index)| {
            Cp::MethodHandle {
                reference_kind,
                reference_index,
            }
        })
        .parse(rest),
        16 => map(be_u16, |descriptor_index| Cp::MethodType { descriptor_index }).parse(rest),
        17 => map(ref_pair, |(bootstrap_method_attr_index, name_and_type_index)| {
            Cp::Dynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            }
        })
        .parse(rest),
        18 => map(ref_pair, |(bootstrap_method_attr_index, name_and_type_index)| {
            Cp::InvokeDynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            }
        })
        .parse(rest),
        19 => map(be_u16, |name_index| Cp::Module { name_index }).parse(rest),
        20 => map(be_u16, |name_index| Cp::Package { name_index }).parse(rest),
        _ => Err(nom::Err::Error(error_position!(input, ErrorKind::Tag))),
    }
}

/// `access_flags name_index descriptor_index attributes`, shared by fields
/// and methods.
fn member(input: &[u8]) -> IResult<&[u8], (u16, u16, u16, Vec<AttributeInfo>)> {
    (be_u16, be_u16, be_u16, attributes).parse(input)
}

fn field(input: &[u8]) -> IResult<&[u8], FieldInfo> {
    map(member, |(access_flags, name_index, descriptor_index, attributes)| FieldInfo {
        access_flags: FieldAccessFlag::from_bits_retain(access_flags),
        name_index,
        descriptor_index,
        attributes,
    })
    .parse(input)
}

fn method(input: &[u8]) -> IResult<&[u8], MethodInfo> {
    map(member, |(access_flags, name_index, descriptor_index, attributes)| MethodInfo {
        access_flags: MethodAccessFlag::from_bits_retain(access_flags),
        name_index,
        descriptor_index,
        attributes,
    })
    .parse(input)
}

fn attributes(input: &[u8]) -> IResult<&[u8], Vec<AttributeInfo>> {
    length_count(
        be_u16,
        map(
            (be_u16, length_data(be_u32)),
            |(attribute_name_index, info): (u16, &[u8])| AttributeInfo {
                attribute_name_index,
                info: info.into(),
            },
        ),
    )
    .parse(input)
}
