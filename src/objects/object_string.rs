use crate::objects::object::{Object, ObjectType};

/// Immutable, interned UTF-8 string (spec.md §3). Two `ObjectString`s with
/// equal bytes are always the same allocation — enforced by the intern
/// table in `value::make_string_value`, never by this type itself.
#[repr(C)]
pub struct ObjectString {
    pub object: Object,
    pub content: String,
}

impl ObjectString {
    pub fn new(content: &str, hash: u64) -> Box<ObjectString> {
        Box::new(ObjectString {
            object: Object::header_with_hash(ObjectType::String, hash),
            content: content.to_string(),
        })
    }
}
