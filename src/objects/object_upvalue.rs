use crate::{
    objects::object::{Object, ObjectType},
    value::Value,
};

/// Aliases a stack slot while open; owns its value once closed (spec.md
/// §3, glossary "Open/Closed upvalue"). `location` always points somewhere
/// valid to read/write through: into the VM's value stack while open, or
/// at `closed` (this object's own field, address-stable once boxed) once
/// the frame that owned the slot has returned.
#[repr(C)]
pub struct ObjectUpvalue {
    pub object: Object,
    pub location: *mut Value,
    pub closed: Value,
}

impl ObjectUpvalue {
    pub fn new(location: *mut Value) -> Box<Self> {
        Box::new(ObjectUpvalue {
            object: Object::header(ObjectType::Upvalue),
            location,
            closed: Value::Nil,
        })
    }

    pub fn is_open(&self) -> bool {
        !std::ptr::eq(self.location, &self.closed as *const Value as *mut Value)
    }

    /// Hoists the aliased stack value into this upvalue's own cell and
    /// redirects `location` to point at it. Idempotent.
    pub fn close(&mut self) {
        if !self.is_open() {
            return;
        }
        unsafe {
            self.closed = *self.location;
        }
        self.location = &mut self.closed as *mut Value;
    }

    pub fn get(&self) -> Value {
        unsafe { *self.location }
    }

    pub fn set(&mut self, value: Value) {
        unsafe {
            *self.location = value;
        }
    }
}
