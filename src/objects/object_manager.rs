//! Owns every heap-allocated `Object` for the life of the VM (spec.md §3,
//! §4.3). Each `alloc_*` boxes the payload, leaks it onto the heap via
//! `Box::into_raw`, links it into the intrusive `next` chain, records its
//! approximate size against the GC's allocation-pressure counter, and
//! hands back a raw pointer the caller embeds in a `Value::Obj`.

use crate::{
    objects::{
        object::{deep_size, NativeObject, Object, ObjectType},
        object_bound_method::ObjectBoundMethod,
        object_class::ObjectClass,
        object_closure::ObjectClosure,
        object_function::ObjectFunction,
        object_instance::ObjectInstance,
        object_native_function::ObjectNativeFunction,
        object_string::ObjectString,
        object_upvalue::ObjectUpvalue,
    },
    value::Value,
};

pub struct ObjectManager {
    objects: Vec<*mut Object>,
    head: *mut Object,
    // Bytes allocated since the last drain; feeds the GC's next_gc trigger.
    pending_bytes: usize,
}

impl ObjectManager {
    pub fn new() -> Self {
        ObjectManager {
            objects: Vec::new(),
            head: std::ptr::null_mut(),
            pending_bytes: 0,
        }
    }

    pub fn drain_pending_bytes(&mut self) -> usize {
        std::mem::take(&mut self.pending_bytes)
    }

    fn register<T>(&mut self, boxed: Box<T>) -> *mut T {
        let ptr = Box::into_raw(boxed);
        let obj_ptr = ptr as *mut Object;
        unsafe {
            (*obj_ptr).next = self.head;
        }
        self.head = obj_ptr;
        self.pending_bytes += unsafe { deep_size(obj_ptr) };
        self.objects.push(obj_ptr);
        ptr
    }

    pub fn alloc_string(&mut self, content: &str, hash: u64) -> *mut ObjectString {
        self.register(ObjectString::new(content, hash))
    }

    pub fn alloc_function(&mut self, arity: u8, name: String) -> *mut ObjectFunction {
        self.register(ObjectFunction::new(arity, name))
    }

    /// Registers a function built incrementally by the compiler (its chunk
    /// filled in over many emit calls before the object ever touches the
    /// heap) rather than constructed fully-formed like the other `alloc_*`
    /// entry points.
    pub fn adopt_function(&mut self, function: Box<ObjectFunction>) -> *mut ObjectFunction {
        self.register(function)
    }

    pub fn alloc_closure(&mut self, function: *mut ObjectFunction) -> *mut ObjectClosure {
        self.register(ObjectClosure::new(function))
    }

    pub fn alloc_native_function(
        &mut self,
        name: String,
        arity: u8,
        native_object: impl NativeObject + 'static,
    ) -> *mut ObjectNativeFunction {
        self.register(ObjectNativeFunction::new(name, arity, native_object))
    }

    pub fn alloc_upvalue(&mut self, location: *mut Value) -> *mut ObjectUpvalue {
        self.register(ObjectUpvalue::new(location))
    }

    pub fn alloc_class(&mut self, name: String) -> *mut ObjectClass {
        self.register(ObjectClass::new(name))
    }

    pub fn alloc_instance(&mut self, class: *mut ObjectClass) -> *mut ObjectInstance {
        self.register(ObjectInstance::new(class))
    }

    pub fn alloc_bound_method(
        &mut self,
        receiver: Value,
        method: *mut ObjectClosure,
    ) -> *mut ObjectBoundMethod {
        self.register(ObjectBoundMethod::new(receiver, method))
    }

    pub fn iter(&self) -> impl Iterator<Item = &*mut Object> {
        self.objects.iter()
    }

    /// Frees one object and unlinks it, called only by the GC's sweep
    /// phase (spec.md §4.3 phase 3) on objects that survived mark with
    /// `marked == false`.
    pub unsafe fn free(&mut self, ptr: *mut Object) {
        if let Some(pos) = self.objects.iter().position(|&p| p == ptr) {
            self.objects.swap_remove(pos);
        }
        unsafe {
            drop_object(ptr);
        }
    }
}

/// Drops a heap object through its concrete type so the payload (e.g. a
/// `String`, a `Table`, a `Vec`) is freed along with the header.
unsafe fn drop_object(ptr: *mut Object) {
    unsafe {
        match (*ptr).obj_type {
            ObjectType::String => drop(Box::from_raw(ptr as *mut ObjectString)),
            ObjectType::Function => drop(Box::from_raw(ptr as *mut ObjectFunction)),
            ObjectType::Native => drop(Box::from_raw(ptr as *mut ObjectNativeFunction)),
            ObjectType::Closure => drop(Box::from_raw(ptr as *mut ObjectClosure)),
            ObjectType::Upvalue => drop(Box::from_raw(ptr as *mut ObjectUpvalue)),
            ObjectType::Class => drop(Box::from_raw(ptr as *mut ObjectClass)),
            ObjectType::Instance => drop(Box::from_raw(ptr as *mut ObjectInstance)),
            ObjectType::BoundMethod => drop(Box::from_raw(ptr as *mut ObjectBoundMethod)),
        }
    }
}

impl Default for ObjectManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ObjectManager {
    fn drop(&mut self) {
        for &ptr in &self.objects {
            unsafe {
                drop_object(ptr);
            }
        }
        self.objects.clear();
    }
}
