use std::sync::Arc;

use crate::{
    class,
    consts::FieldAccessFlag,
    descriptor::{parse_field_descriptor, parse_method_descriptor},
    error::UnitError,
    runtime::{self, ClassOrigin, FieldInfo, MethodInfo},
};

mod bootstrap;
pub(in crate::runtime) use bootstrap::ClassLoader;

/// Builds the reflective view of `class_file` on top of its already linked
/// superclass and interfaces.
pub(in crate::runtime) fn parse_class(
    class_file: &class::Class,
    super_class: Option<Arc<runtime::Class>>,
    interfaces: Vec<Arc<runtime::Class>>,
    origin: ClassOrigin,
) -> Result<runtime::Class, UnitError> {
    // instance slots continue after the superclass's
    let mut instance_slots = super_class
        .as_ref()
        .map(|super_class| super_class.instance_slots)
        .unwrap_or(0);

    let mut fields = Vec::with_capacity(class_file.fields.len());
    for field in &class_file.fields {
        let descriptor = parse_field_descriptor(&class_file.utf8(field.descriptor_index)?)?;
        let slot = if field.access_flags.contains(FieldAccessFlag::STATIC) {
            None
        } else {
            instance_slots += 1;
            Some(instance_slots - 1)
        };
        fields.push(FieldInfo {
            access_flags: field.access_flags,
            name: Arc::from(class_file.utf8(field.name_index)?.as_ref()),
            descriptor,
            slot,
        });
    }

    let methods = class_file
        .methods
        .iter()
        .map(|method| parse_method(class_file, method))
        .collect::<Result<_, _>>()?;

    Ok(runtime::Class {
        class_name: Arc::from(class_file.this_class_name()?.as_ref()),
        access_flags: class_file.access_flags,
        major_version: class_file.major_version,
        super_class,
        interfaces,
        fields,
        methods,
        instance_slots,
        origin,
    })
}

fn parse_method(
    class_file: &class::Class,
    method: &class::MethodInfo,
) -> Result<MethodInfo, UnitError> {
    let descriptor_text = class_file.utf8(method.descriptor_index)?;
    let descriptor = parse_method_descriptor(&descriptor_text)?;
    Ok(MethodInfo {
        access_flags: method.access_flags,
        name: Arc::from(class_file.utf8(method.name_index)?.as_ref()),
        descriptor,
        descriptor_text: Arc::from(descriptor_text.as_ref()),
    })
}
