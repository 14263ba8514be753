//! Tri-color mark-sweep garbage collector (spec.md §4.3). Three explicit
//! `HashSet<*mut Object>`s stand in for the white/gray/black color of
//! classic mark-sweep: an object is white until `mark_object` moves it to
//! gray, and `trace_references` drains gray into black by blackening each
//! object's own outgoing references.

use crate::{
    call_frame::CallFrame,
    objects::{
        object::{deep_size, Object, ObjectType},
        object_bound_method::ObjectBoundMethod,
        object_class::ObjectClass,
        object_closure::ObjectClosure,
        object_function::ObjectFunction,
        object_instance::ObjectInstance,
        object_manager::ObjectManager,
        object_upvalue::ObjectUpvalue,
    },
    table::Table,
    value::{as_object, is_object, Value},
};
use std::collections::HashSet;

pub struct GarbageCollector {
    white_set: HashSet<*mut Object>,
    gray_set: HashSet<*mut Object>,
    black_set: HashSet<*mut Object>,
    stats: GCStats,
}

/// Aggregated GC statistics (does not include currently-live total bytes;
/// the VM tracks that separately).
#[derive(Default, Debug, Clone)]
pub struct GCStats {
    pub cycles: u64,
    pub total_freed_bytes: usize,
    pub last_freed_bytes: usize,
    pub last_before_bytes: usize,
    pub last_after_bytes: usize,
    pub last_next_trigger_bytes: usize,
}

impl GCStats {
    fn record(&mut self, before: usize, freed: usize, after: usize, next_trigger: usize) {
        self.cycles += 1;
        self.total_freed_bytes += freed;
        self.last_freed_bytes = freed;
        self.last_before_bytes = before;
        self.last_after_bytes = after;
        self.last_next_trigger_bytes = next_trigger;
    }
}

#[cfg(feature = "gc_debug")]
macro_rules! gc_trace {
    ($($arg:tt)*) => { tracing::trace!(target: "dynac::gc", "{}", format_args!($($arg)*)); };
}
#[cfg(not(feature = "gc_debug"))]
macro_rules! gc_trace { ($($arg:tt)*) => {} }
pub(crate) use gc_trace;

impl GarbageCollector {
    pub fn new() -> Self {
        GarbageCollector {
            white_set: HashSet::new(),
            gray_set: HashSet::new(),
            black_set: HashSet::new(),
            stats: GCStats::default(),
        }
    }

    pub fn prepare_collection(&mut self, object_manager: &ObjectManager) {
        self.reset();
        for &obj_ptr in object_manager.iter() {
            self.white_set.insert(obj_ptr);
            // `marked` is the durable side-channel `Table::remove_white` reads
            // to prune the intern set; it must reflect *this* cycle's trace,
            // not a stale one, since sweep never gets a chance to clear it on
            // objects that stay white (they're freed, not walked again).
            unsafe {
                (*obj_ptr).marked = false;
            }
        }
    }

    pub fn mark_object(&mut self, obj: *mut Object) {
        if obj.is_null() || self.black_set.contains(&obj) {
            return;
        }
        if self.white_set.remove(&obj) {
            unsafe {
                (*obj).marked = true;
            }
            self.gray_set.insert(obj);
            gc_trace!("mark_object enqueue gray ptr={:p}", obj);
        }
    }

    pub fn mark_value(&mut self, value: &Value) {
        if !is_object(value) {
            return;
        }
        self.mark_object(as_object(value));
    }

    pub fn mark_table(&mut self, table: &Table) {
        for (key, value) in table.iter() {
            self.mark_value(key);
            self.mark_value(value);
        }
    }

    pub fn trace_references(&mut self) {
        while !self.gray_set.is_empty() {
            let obj = *self.gray_set.iter().next().unwrap();
            self.gray_set.remove(&obj);
            self.black_set.insert(obj);
            unsafe {
                gc_trace!("trace gray -> black ptr={:p}", obj);
                self.blacken_object(obj);
            }
        }
    }

    unsafe fn blacken_object(&mut self, object: *mut Object) {
        unsafe {
            match (*object).obj_type {
                ObjectType::Closure => {
                    let closure = &*(object as *const ObjectClosure);
                    self.mark_object(closure.function as *mut Object);
                    for &upvalue in &closure.upvalues {
                        self.mark_object(upvalue as *mut Object);
                    }
                }
                ObjectType::Function => {
                    let function = &*(object as *const ObjectFunction);
                    for constant in &function.chunk.constants {
                        self.mark_value(constant);
                    }
                }
                ObjectType::Upvalue => {
                    let upvalue = &*(object as *const ObjectUpvalue);
                    self.mark_value(&upvalue.get());
                }
                ObjectType::Class => {
                    let class = &*(object as *const ObjectClass);
                    self.mark_table(&class.methods);
                }
                ObjectType::Instance => {
                    let instance = &*(object as *const ObjectInstance);
                    self.mark_object(instance.class as *mut Object);
                    self.mark_table(&instance.fields);
                }
                ObjectType::BoundMethod => {
                    let bound = &*(object as *const ObjectBoundMethod);
                    self.mark_value(&bound.receiver);
                    self.mark_object(bound.method as *mut Object);
                }
                ObjectType::String | ObjectType::Native => {}
            }
        }
    }

    /// Returns total bytes freed.
    pub fn sweep(&mut self, object_manager: &mut ObjectManager) -> usize {
        let mut freed_bytes = 0;
        for &obj_ptr in self.white_set.iter() {
            unsafe {
                freed_bytes += deep_size(obj_ptr);
                object_manager.free(obj_ptr);
            }
        }
        self.white_set.clear();
        gc_trace!("sweep freed_bytes={}", freed_bytes);
        freed_bytes
    }

    pub fn reset(&mut self) {
        self.white_set.clear();
        self.gray_set.clear();
        self.black_set.clear();
    }

    /// Marks every GC root: the value stack up to `stack_top`, globals,
    /// each live call frame's owning closure, and every open upvalue
    /// (spec.md §4.3 phase 1). The interning table is deliberately *not*
    /// marked here — its string keys are weak references (spec.md §5) and
    /// are only kept alive if reachable from one of these real roots;
    /// `Table::remove_white` prunes whatever didn't survive this trace.
    pub fn mark_roots(
        &mut self,
        stack: &[Value],
        stack_top: usize,
        globals: &Table,
        frames: &[CallFrame],
        open_upvalues: &[*mut ObjectUpvalue],
    ) {
        for value in &stack[0..stack_top] {
            self.mark_value(value);
        }

        self.mark_table(globals);

        for frame in frames {
            self.mark_object(frame.closure as *mut Object);
        }

        for &upvalue in open_upvalues {
            self.mark_object(upvalue as *mut Object);
        }
    }

    pub fn record_cycle(&mut self, before: usize, freed: usize, after: usize, next_trigger: usize) {
        self.stats.record(before, freed, after, next_trigger);
        gc_trace!(
            "cycle summary cycles={} freed={} before={} after={} next_trigger={}",
            self.stats.cycles,
            freed,
            before,
            after,
            next_trigger
        );
    }

    pub fn stats(&self) -> &GCStats {
        &self.stats
    }
}

impl Default for GarbageCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::object_manager::ObjectManager;

    fn obj_value(ptr: *mut Object) -> Value {
        Value::Obj(ptr)
    }

    #[test]
    fn gc_collects_unreachable_objects() {
        let mut manager = ObjectManager::new();
        let keep = manager.alloc_string("keep", crate::value::fnv1a_hash(b"keep"));
        manager.alloc_string("drop1", crate::value::fnv1a_hash(b"drop1"));
        manager.alloc_string("drop2", crate::value::fnv1a_hash(b"drop2"));
        manager.alloc_string("drop3", crate::value::fnv1a_hash(b"drop3"));

        let mut gc = GarbageCollector::new();
        let mut stack = vec![Value::Nil; 8];
        stack[0] = obj_value(keep as *mut Object);
        let stack_top = 1;
        let globals = Table::new();
        let frames: Vec<CallFrame> = vec![];
        let open_upvalues: Vec<*mut ObjectUpvalue> = vec![];

        gc.prepare_collection(&manager);
        gc.mark_roots(&stack, stack_top, &globals, &frames, &open_upvalues);
        gc.trace_references();
        let freed = gc.sweep(&mut manager);
        assert!(freed > 0, "expected some bytes to be freed");
        assert_eq!(manager.iter().count(), 1);
    }

    #[test]
    fn gc_preserves_reachable_closure_and_function() {
        let mut manager = ObjectManager::new();
        let func_root = manager.alloc_function(0, "f1".to_string());
        let closure_root = manager.alloc_closure(func_root);
        manager.alloc_function(0, "f2".to_string());

        let mut gc = GarbageCollector::new();
        let mut stack = vec![Value::Nil; 8];
        stack[0] = obj_value(closure_root as *mut Object);
        let stack_top = 1;
        let globals = Table::new();
        let frames: Vec<CallFrame> = vec![];
        let open_upvalues: Vec<*mut ObjectUpvalue> = vec![];

        gc.prepare_collection(&manager);
        gc.mark_roots(&stack, stack_top, &globals, &frames, &open_upvalues);
        gc.trace_references();
        gc.sweep(&mut manager);
        assert_eq!(manager.iter().count(), 2, "closure and its function should remain");
    }

    #[test]
    fn gc_marks_via_upvalue() {
        let mut manager = ObjectManager::new();
        let string_ptr = manager.alloc_string("captured", crate::value::fnv1a_hash(b"captured"));
        let mut stack = vec![Value::Nil; 8];
        stack[0] = obj_value(string_ptr as *mut Object);
        let stack_top = 1;
        let upvalue_ptr = manager.alloc_upvalue(&mut stack[0] as *mut Value);

        let mut gc = GarbageCollector::new();
        let globals = Table::new();
        let frames: Vec<CallFrame> = vec![];
        let open_upvalues: Vec<*mut ObjectUpvalue> = vec![upvalue_ptr];

        gc.prepare_collection(&manager);
        gc.mark_roots(&stack, stack_top, &globals, &frames, &open_upvalues);
        gc.trace_references();
        gc.sweep(&mut manager);
        assert_eq!(manager.iter().count(), 2, "upvalue and captured string should remain");
    }

    #[test]
    fn gc_stats_record_cycle() {
        let mut gc = GarbageCollector::new();
        assert_eq!(gc.stats().cycles, 0);
        gc.record_cycle(1000, 400, 600, 1200);
        assert_eq!(gc.stats().cycles, 1);
        assert_eq!(gc.stats().last_before_bytes, 1000);
        assert_eq!(gc.stats().last_freed_bytes, 400);
        assert_eq!(gc.stats().last_after_bytes, 600);
        assert_eq!(gc.stats().last_next_trigger_bytes, 1200);
        assert_eq!(gc.stats().total_freed_bytes, 400);
    }
}
