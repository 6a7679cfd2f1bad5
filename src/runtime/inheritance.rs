use std::sync::Arc;

use crate::{
    consts::OBJECT_CLASS,
    runtime::{Class, MethodInfo},
};

/// Whether an instance of `source` may be stored where `target` (internal
/// name) is expected.
pub(in crate::runtime) fn is_assignable_to(source: &Class, target: &str) -> bool {
    if target == OBJECT_CLASS {
        return true;
    }
    is_same_or_sub_class_of(source, target) || is_class_implements(source, target)
}

pub(in crate::runtime) fn is_same_or_sub_class_of(source: &Class, target: &str) -> bool {
    if source.name() == target {
        return true;
    }
    match &source.super_class {
        Some(super_class) => is_same_or_sub_class_of(super_class, target),
        None => false,
    }
}

pub(in crate::runtime) fn is_class_implements(class: &Class, interface: &str) -> bool {
    for class_intf in &class.interfaces {
        if class_intf.name() == interface || is_class_implements(class_intf, interface) {
            return true;
        }
    }
    if let Some(super_class) = &class.super_class {
        return is_class_implements(super_class, interface);
    }
    false
}

/// Resolves `name` + `descriptor` the way virtual dispatch does: the class
/// itself, then its superclasses, then superinterfaces.
pub(in crate::runtime) fn find_method<'a>(
    class: &'a Arc<Class>,
    name: &str,
    descriptor: &str,
) -> Option<(&'a Arc<Class>, &'a MethodInfo)> {
    let mut current = Some(class);
    while let Some(candidate) = current {
        let found = candidate
            .methods
            .iter()
            .find(|method| method.name.as_ref() == name && method.descriptor_text.as_ref() == descriptor);
        if let Some(method) = found {
            return Some((candidate, method));
        }
        current = candidate.super_class.as_ref();
    }

    let mut current = Some(class);
    while let Some(candidate) = current {
        for interface in &candidate.interfaces {
            if let Some(found) = find_method(interface, name, descriptor) {
                return Some(found);
            }
        }
        current = candidate.super_class.as_ref();
    }
    None
}
