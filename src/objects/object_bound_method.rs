use crate::{
    objects::{object::{Object, ObjectType}, object_closure::ObjectClosure},
    value::Value,
};

/// The result of a `GET_PROPERTY` that resolved to a method rather than a
/// field (spec.md §3): the closure to call, bundled with the receiver so
/// `this` is bound correctly regardless of how many hops the bound method
/// travels before it's called.
#[repr(C)]
pub struct ObjectBoundMethod {
    pub object: Object,
    pub receiver: Value,
    pub method: *mut ObjectClosure,
}

impl ObjectBoundMethod {
    pub fn new(receiver: Value, method: *mut ObjectClosure) -> Box<Self> {
        Box::new(ObjectBoundMethod {
            object: Object::header(ObjectType::BoundMethod),
            receiver,
            method,
        })
    }
}
