//! The common heap-object header and the downcast helpers the GC and VM
//! use to interpret an `Object` pointer as its concrete payload type.

use crate::value::{Value, ValueArray};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    String,
    Function,
    Native,
    Closure,
    Upvalue,
    Class,
    Instance,
    BoundMethod,
}

/// Every heap object begins with this header (spec.md §3). `next` links
/// the object into the process-wide intrusive list described by the spec;
/// `ObjectManager`'s owning `Vec<*mut Object>` is what sweep actually
/// walks today, but the field is kept and maintained so a sweep could walk
/// the linked list directly without touching any other module. `hash` is
/// pre-computed for strings and 0 for every other kind.
#[repr(C)]
pub struct Object {
    pub obj_type: ObjectType,
    pub marked: bool,
    pub next: *mut Object,
    pub hash: u64,
}

impl Object {
    pub fn header(obj_type: ObjectType) -> Self {
        Object {
            obj_type,
            marked: false,
            next: std::ptr::null_mut(),
            hash: 0,
        }
    }

    pub fn header_with_hash(obj_type: ObjectType, hash: u64) -> Self {
        Object {
            obj_type,
            marked: false,
            next: std::ptr::null_mut(),
            hash,
        }
    }
}

/// Trait implemented by native function bodies (`clock`, and whatever a
/// host embeds via the native registry in §6 of the spec).
pub trait NativeObject {
    fn run(&self, args: &Option<ValueArray>) -> Result<Value, String>;
}

/// Approximate heap footprint of an object, used only to drive the GC's
/// allocation-pressure trigger (spec.md §4.3) — not exposed to the
/// language, so it need not be exact.
pub unsafe fn deep_size(ptr: *mut Object) -> usize {
    use crate::objects::{
        object_bound_method::ObjectBoundMethod, object_class::ObjectClass,
        object_closure::ObjectClosure, object_function::ObjectFunction,
        object_instance::ObjectInstance, object_native_function::ObjectNativeFunction,
        object_string::ObjectString, object_upvalue::ObjectUpvalue,
    };
    unsafe {
        match (*ptr).obj_type {
            ObjectType::String => {
                std::mem::size_of::<ObjectString>() + (*(ptr as *const ObjectString)).content.len()
            }
            ObjectType::Function => std::mem::size_of::<ObjectFunction>(),
            ObjectType::Native => std::mem::size_of::<ObjectNativeFunction>(),
            ObjectType::Closure => {
                std::mem::size_of::<ObjectClosure>()
                    + (*(ptr as *const ObjectClosure)).upvalues.len() * std::mem::size_of::<usize>()
            }
            ObjectType::Upvalue => std::mem::size_of::<ObjectUpvalue>(),
            ObjectType::Class => std::mem::size_of::<ObjectClass>(),
            ObjectType::Instance => std::mem::size_of::<ObjectInstance>(),
            ObjectType::BoundMethod => std::mem::size_of::<ObjectBoundMethod>(),
        }
    }
}

#[cfg(feature = "debug_trace_object")]
mod debug_feature {
    use super::Object;

    impl Drop for Object {
        fn drop(&mut self) {
            eprintln!(
                "[gc-trace] drop object type={:?} ptr={:p}",
                self.obj_type, self as *mut Object
            );
        }
    }
}
