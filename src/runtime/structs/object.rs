use std::sync::Arc;

use parking_lot::RwLock;

use crate::runtime::{Class, NativeVariable};

#[derive(Debug)]
pub struct Object {
    class: Arc<Class>,
    fields: RwLock<Vec<NativeVariable>>,
}

impl Object {
    /// An instance with every slot at its zero value; no constructor runs.
    pub(in crate::runtime) fn new(class: Arc<Class>) -> Object {
        let fields = class.zeroed_fields();
        Object {
            class,
            fields: RwLock::new(fields),
        }
    }

    pub fn class(&self) -> &Arc<Class> {
        &self.class
    }

    pub(in crate::runtime) fn get_field(&self, slot: usize) -> Option<NativeVariable> {
        self.fields.read().get(slot).copied()
    }

    pub(in crate::runtime) fn put_field(&self, slot: usize, value: NativeVariable) -> bool {
        match self.fields.write().get_mut(slot) {
            Some(field) => {
                *field = value;
                true
            }
            None => false,
        }
    }
}
