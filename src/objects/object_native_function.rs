use crate::{
    objects::object::{NativeObject, Object, ObjectType},
    value::{Value, ValueArray},
};

/// A host-provided builtin (spec.md §6's native ABI: `(argc, argv) -> Value`).
/// Arity checking happens here; the body itself is an opaque `NativeObject`.
#[repr(C)]
pub struct ObjectNativeFunction {
    pub object: Object,
    pub name: String,
    pub arity: u8,
    pub native_object: Box<dyn NativeObject>,
}

impl ObjectNativeFunction {
    pub fn new(name: String, arity: u8, native_object: impl NativeObject + 'static) -> Box<Self> {
        Box::new(ObjectNativeFunction {
            object: Object::header(ObjectType::Native),
            name,
            arity,
            native_object: Box::new(native_object),
        })
    }

    pub fn invoke(&self, args: &Option<ValueArray>) -> Result<Value, String> {
        let given = args.as_ref().map_or(0, |a| a.len());
        if given != self.arity as usize {
            return Err(format!(
                "Expected {} arguments but got {}.",
                self.arity, given
            ));
        }
        self.native_object.run(args)
    }
}
