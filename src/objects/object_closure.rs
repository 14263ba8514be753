use crate::objects::{
    object::{Object, ObjectType},
    object_function::ObjectFunction,
    object_upvalue::ObjectUpvalue,
};

/// Pairs a function with its captured upvalues. Distinct closures may
/// share a function (spec.md §3): `function` is a non-owning pointer into
/// the object heap, not a `Box`.
#[repr(C)]
pub struct ObjectClosure {
    pub object: Object,
    pub function: *mut ObjectFunction,
    pub upvalues: Vec<*mut ObjectUpvalue>,
}

impl ObjectClosure {
    pub fn new(function: *mut ObjectFunction) -> Box<Self> {
        let upvalue_count = unsafe { (*function).upvalue_count };
        Box::new(ObjectClosure {
            object: Object::header(ObjectType::Closure),
            function,
            upvalues: Vec::with_capacity(upvalue_count),
        })
    }
}
