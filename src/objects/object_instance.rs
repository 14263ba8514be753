use crate::{
    objects::{
        object::{Object, ObjectType},
        object_class::ObjectClass,
    },
    table::Table,
};

/// A runtime instance of a class (spec.md §3): the class it was stamped
/// from and its own field table. `class` is a non-owning pointer — the
/// class object outlives every instance of it for as long as the GC can
/// prove the instance itself is reachable.
#[repr(C)]
pub struct ObjectInstance {
    pub object: Object,
    pub class: *mut ObjectClass,
    pub fields: Table,
}

impl ObjectInstance {
    pub fn new(class: *mut ObjectClass) -> Box<Self> {
        Box::new(ObjectInstance {
            object: Object::header(ObjectType::Instance),
            class,
            fields: Table::new(),
        })
    }
}
