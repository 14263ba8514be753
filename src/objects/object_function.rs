use crate::{
    chunk::Chunk,
    objects::object::{Object, ObjectType},
};

/// A compiled function body: arity, its owned chunk, and (for closures
/// capturing it) how many upvalues it needs. `name` is empty for the
/// implicit top-level script function (spec.md §3).
#[repr(C)]
pub struct ObjectFunction {
    pub object: Object,
    pub arity: u8,
    pub chunk: Chunk,
    pub name: String,
    pub upvalue_count: usize,
}

impl ObjectFunction {
    pub fn new(arity: u8, name: String) -> Box<Self> {
        Box::new(ObjectFunction {
            object: Object::header(ObjectType::Function),
            arity,
            chunk: Chunk::new(),
            name,
            upvalue_count: 0,
        })
    }
}
