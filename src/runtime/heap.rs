use std::sync::Arc;

use crate::{
    error::RuntimeError,
    runtime::{Class, Object},
};

/// Object table. References are 1-based ids; 0 is `null`.
#[derive(Debug, Default)]
pub struct Heap {
    heap: Vec<Option<Arc<Object>>>,
    next_id: u32,
}

impl Heap {
    pub const fn new() -> Heap {
        Heap {
            heap: vec![],
            next_id: 0,
        }
    }

    pub fn allocate(&mut self, class: Arc<Class>) -> Result<u32, RuntimeError> {
        if self.next_id >= u32::MAX - 1 {
            return Err(RuntimeError::IllegalArgument("heap exhausted".to_string()));
        }
        let id = self.next_id;
        let object = Arc::new(Object::new(class));
        if (id as usize) < self.heap.len() {
            self.heap[id as usize] = Some(object);
        } else {
            self.heap.push(Some(object));
        }
        // next free slot
        while (self.next_id as usize) < self.heap.len() && self.heap[self.next_id as usize].is_some()
        {
            self.next_id += 1;
        }
        Ok(id + 1)
    }

    pub fn deallocate(&mut self, id: u32) -> Result<(), RuntimeError> {
        let slot = self.slot_mut(id)?;
        slot.take();
        self.next_id = self.next_id.min(id - 1);
        Ok(())
    }

    pub fn get(&self, id: u32) -> Result<Arc<Object>, RuntimeError> {
        if id == 0 {
            return Err(RuntimeError::NullReference);
        }
        self.heap
            .get((id - 1) as usize)
            .and_then(Option::as_ref)
            .map(Arc::clone)
            .ok_or(RuntimeError::InvalidReference(id))
    }

    fn slot_mut(&mut self, id: u32) -> Result<&mut Option<Arc<Object>>, RuntimeError> {
        if id == 0 {
            return Err(RuntimeError::NullReference);
        }
        match self.heap.get_mut((id - 1) as usize) {
            Some(slot) if slot.is_some() => Ok(slot),
            _ => Err(RuntimeError::InvalidReference(id)),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
