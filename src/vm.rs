//! The stack-based bytecode interpreter (spec.md §4.6). One `VM` owns the
//! whole runtime: value stack, call frames, globals, the object heap and
//! its garbage collector, and the open-upvalue list. `interpret()` is the
//! only entry point a host calls; everything else is internal dispatch.

use crate::{
    call_frame::CallFrame,
    chunk::OpCode,
    compiler::Parser,
    constants::{FRAMES_MAX, GC_GROW_FACTOR, GC_INITIAL_THRESHOLD, GC_STRESS_GROW_FACTOR, STACK_MAX},
    error::RuntimeError,
    gc::GarbageCollector,
    objects::{
        object::{NativeObject, Object, ObjectType},
        object_bound_method::ObjectBoundMethod,
        object_class::ObjectClass,
        object_closure::ObjectClosure,
        object_function::ObjectFunction,
        object_instance::ObjectInstance,
        object_manager::ObjectManager,
        object_native_function::ObjectNativeFunction,
        object_string::ObjectString,
        object_upvalue::ObjectUpvalue,
    },
    std_mod::time::ClockTime,
    table::Table,
    value::{
        as_number, as_object, format_value, is_class, is_instance, is_number, is_object, is_string,
        make_bool_value, make_nil_value, make_numer_value, make_object_value, make_string_value, Value,
    },
};

#[derive(Debug, PartialEq, Eq)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

pub struct VM {
    stack: Vec<Value>,
    stack_top: usize,
    frames: Vec<CallFrame>,
    globals: Table,
    intern_strings: Table,
    object_manager: ObjectManager,
    gc: GarbageCollector,
    open_upvalues: Vec<*mut ObjectUpvalue>,
    bytes_allocated: usize,
    next_gc: usize,
    init_string: *mut ObjectString,
    had_runtime_error: bool,
}

impl VM {
    pub fn new() -> Self {
        let mut object_manager = ObjectManager::new();
        let mut intern_strings = Table::new();
        let init_string = match make_string_value(&mut object_manager, &mut intern_strings, "init") {
            Value::Obj(ptr) => ptr as *mut ObjectString,
            _ => unreachable!("make_string_value always returns Value::Obj"),
        };

        let mut vm = VM {
            stack: vec![Value::Nil; STACK_MAX],
            stack_top: 0,
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: Table::new(),
            intern_strings,
            object_manager,
            gc: GarbageCollector::new(),
            open_upvalues: Vec::new(),
            bytes_allocated: 0,
            next_gc: GC_INITIAL_THRESHOLD,
            init_string,
            had_runtime_error: false,
        };
        vm.define_native("clock", 0, ClockTime::new());
        vm
    }

    fn define_native(&mut self, name: &str, arity: u8, native: impl NativeObject + 'static) {
        let name_value = make_string_value(&mut self.object_manager, &mut self.intern_strings, name);
        let native_ptr = self.object_manager.alloc_native_function(name.to_string(), arity, native);
        self.globals.set(name_value, make_object_value(native_ptr as *mut Object));
    }

    fn init_value(&self) -> Value {
        make_object_value(self.init_string as *mut Object)
    }

    /// Compiles and runs `source` in this VM's persistent global state —
    /// globals and the object heap survive across calls, matching a REPL's
    /// expectations (spec.md §6).
    pub fn interpret(&mut self, source: &str) -> InterpretResult {
        let _span = tracing::debug_span!("interpret", source_len = source.len()).entered();
        let function_ptr = {
            let mut parser = Parser::new(&mut self.object_manager, &mut self.intern_strings);
            parser.compile(source)
        };
        let function_ptr = match function_ptr {
            Some(ptr) => ptr,
            None => {
                tracing::debug!("compile error, not executing");
                return InterpretResult::CompileError;
            }
        };

        self.reset_stack();
        self.had_runtime_error = false;
        self.push(make_object_value(function_ptr as *mut Object));
        let closure_ptr = self.object_manager.alloc_closure(function_ptr);
        self.pop();
        self.push(make_object_value(closure_ptr as *mut Object));
        self.call(closure_ptr, 0);

        self.run()
    }

    fn reset_stack(&mut self) {
        self.stack_top = 0;
        self.frames.clear();
        self.open_upvalues.clear();
    }

    // ---- stack primitives ----

    /// Pushes onto the value stack. The stack is preallocated to
    /// `STACK_MAX`; a program that drives it past that (spec.md §7's
    /// "Value-stack overflow") gets a runtime error instead of an
    /// out-of-bounds write, mirroring how `call()` bounds `FRAMES_MAX`.
    fn push(&mut self, value: Value) {
        if self.stack_top >= STACK_MAX {
            self.runtime_error(RuntimeError::ValueStackOverflow);
            return;
        }
        self.stack[self.stack_top] = value;
        self.stack_top += 1;
    }

    fn pop(&mut self) -> Value {
        self.stack_top -= 1;
        self.stack[self.stack_top]
    }

    fn peek(&self) -> Value {
        self.stack[self.stack_top - 1]
    }

    fn peek_steps(&self, distance: usize) -> Value {
        self.stack[self.stack_top - 1 - distance]
    }

    // ---- frame / bytecode cursor ----

    fn current_frame(&self) -> &CallFrame {
        self.frames.last().expect("run() called with no active frame")
    }

    fn current_frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("run() called with no active frame")
    }

    fn read_byte(&mut self) -> u8 {
        let frame = self.frames.last_mut().expect("no active frame");
        let chunk = unsafe { &(*(*frame.closure).function).chunk };
        let byte = chunk.code[frame.ip];
        frame.ip += 1;
        byte
    }

    fn read_short(&mut self) -> u16 {
        let hi = self.read_byte() as u16;
        let lo = self.read_byte() as u16;
        (hi << 8) | lo
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_byte() as usize;
        let frame = self.frames.last().expect("no active frame");
        unsafe { (*(*frame.closure).function).chunk.constants[index] }
    }

    /// Reads the 3-byte big-endian pool index written by `CONSTANT_LONG`
    /// (spec.md §4.4).
    fn read_constant_long(&mut self) -> Value {
        let hi = self.read_byte() as usize;
        let mid = self.read_byte() as usize;
        let lo = self.read_byte() as usize;
        let index = (hi << 16) | (mid << 8) | lo;
        let frame = self.frames.last().expect("no active frame");
        unsafe { (*(*frame.closure).function).chunk.constants[index] }
    }

    // ---- calling convention ----

    fn call_value(&mut self, callee: Value, arg_count: u8) -> bool {
        if is_object(&callee) {
            let ptr = as_object(&callee);
            unsafe {
                match (*ptr).obj_type {
                    ObjectType::Closure => return self.call(ptr as *mut ObjectClosure, arg_count),
                    ObjectType::Native => return self.call_native(ptr as *mut ObjectNativeFunction, arg_count),
                    ObjectType::Class => return self.instantiate(ptr as *mut ObjectClass, arg_count),
                    ObjectType::BoundMethod => {
                        let bound = &*(ptr as *const ObjectBoundMethod);
                        let receiver = bound.receiver;
                        let method = bound.method;
                        let slot = self.stack_top - arg_count as usize - 1;
                        self.stack[slot] = receiver;
                        return self.call(method, arg_count);
                    }
                    _ => {}
                }
            }
        }
        self.runtime_error(RuntimeError::NotCallable);
        false
    }

    fn call(&mut self, closure: *mut ObjectClosure, arg_count: u8) -> bool {
        let arity = unsafe { (*(*closure).function).arity };
        if arg_count != arity {
            self.runtime_error(RuntimeError::ArityMismatch { expected: arity, got: arg_count });
            return false;
        }
        if self.frames.len() >= FRAMES_MAX {
            self.runtime_error(RuntimeError::StackOverflow);
            return false;
        }
        let slots_base = self.stack_top - arg_count as usize - 1;
        self.frames.push(CallFrame::new(closure, slots_base));
        true
    }

    fn call_native(&mut self, native_ptr: *mut ObjectNativeFunction, arg_count: u8) -> bool {
        let native = unsafe { &*native_ptr };
        let args = if arg_count == 0 {
            None
        } else {
            let start = self.stack_top - arg_count as usize;
            Some(self.stack[start..self.stack_top].to_vec())
        };
        match native.invoke(&args) {
            Ok(result) => {
                self.stack_top -= arg_count as usize + 1;
                self.push(result);
                true
            }
            Err(message) => {
                self.runtime_error(RuntimeError::Native(message));
                false
            }
        }
    }

    fn instantiate(&mut self, class_ptr: *mut ObjectClass, arg_count: u8) -> bool {
        let instance_ptr = self.object_manager.alloc_instance(class_ptr);
        let slot = self.stack_top - arg_count as usize - 1;
        self.stack[slot] = make_object_value(instance_ptr as *mut Object);

        let initializer = unsafe { (*class_ptr).methods.get(&self.init_value()) };
        match initializer {
            Some(Value::Obj(init_ptr)) => self.call(init_ptr as *mut ObjectClosure, arg_count),
            Some(_) | None if arg_count != 0 => {
                self.runtime_error(RuntimeError::ArityMismatch { expected: 0, got: arg_count });
                false
            }
            _ => true,
        }
    }

    fn invoke(&mut self, name: Value, arg_count: u8) -> bool {
        let receiver = self.peek_steps(arg_count as usize);
        if !is_instance(&receiver) {
            self.runtime_error(RuntimeError::NotAnInstanceForInvoke);
            return false;
        }
        let instance_ptr = as_object(&receiver) as *mut ObjectInstance;
        let field = unsafe { (*instance_ptr).fields.get(&name) };
        if let Some(field_value) = field {
            let slot = self.stack_top - arg_count as usize - 1;
            self.stack[slot] = field_value;
            return self.call_value(field_value, arg_count);
        }
        let class_ptr = unsafe { (*instance_ptr).class };
        self.invoke_from_class(class_ptr, name, arg_count)
    }

    fn invoke_from_class(&mut self, class: *mut ObjectClass, name: Value, arg_count: u8) -> bool {
        match unsafe { (*class).methods.get(&name) } {
            Some(Value::Obj(method_ptr)) => self.call(method_ptr as *mut ObjectClosure, arg_count),
            _ => {
                self.runtime_error(RuntimeError::UndefinedProperty(format_value(&name)));
                false
            }
        }
    }

    fn bind_method(&mut self, class: *mut ObjectClass, name: Value) -> bool {
        match unsafe { (*class).methods.get(&name) } {
            Some(Value::Obj(method_ptr)) => {
                let receiver = self.peek();
                let bound_ptr =
                    self.object_manager.alloc_bound_method(receiver, method_ptr as *mut ObjectClosure);
                self.pop();
                self.push(make_object_value(bound_ptr as *mut Object));
                true
            }
            _ => {
                self.runtime_error(RuntimeError::UndefinedProperty(format_value(&name)));
                false
            }
        }
    }

    // ---- upvalues ----

    fn capture_upvalue(&mut self, stack_slot: usize) -> *mut ObjectUpvalue {
        let location = &mut self.stack[stack_slot] as *mut Value;

        for &upvalue_ptr in &self.open_upvalues {
            let existing_location = unsafe { (*upvalue_ptr).location };
            if existing_location == location {
                return upvalue_ptr;
            }
            if (existing_location as usize) < (location as usize) {
                break;
            }
        }

        let created = self.object_manager.alloc_upvalue(location);
        let insert_pos = self
            .open_upvalues
            .iter()
            .position(|&p| (unsafe { (*p).location } as usize) < (location as usize))
            .unwrap_or(self.open_upvalues.len());
        self.open_upvalues.insert(insert_pos, created);
        created
    }

    /// Closes every open upvalue aliasing a stack slot at or above
    /// `from_slot`, hoisting its value onto the heap before the owning
    /// frame's locals go out of scope.
    fn close_upvalues(&mut self, from_slot: usize) {
        let threshold = &self.stack[from_slot] as *const Value as usize;
        while let Some(&upvalue_ptr) = self.open_upvalues.first() {
            let location = unsafe { (*upvalue_ptr).location } as usize;
            if location < threshold {
                break;
            }
            unsafe {
                (*upvalue_ptr).close();
            }
            self.open_upvalues.remove(0);
        }
    }

    // ---- arithmetic helpers ----

    fn binary_number_op(&mut self, op: impl Fn(f64, f64) -> Value) -> bool {
        let b = self.peek();
        let a = self.peek_steps(1);
        if !is_number(&a) || !is_number(&b) {
            self.runtime_error(RuntimeError::OperandsMustBeNumbers);
            return false;
        }
        self.pop();
        self.pop();
        self.push(op(as_number(&a), as_number(&b)));
        true
    }

    // ---- GC ----

    fn maybe_collect_garbage(&mut self) {
        self.bytes_allocated += self.object_manager.drain_pending_bytes();
        if cfg!(feature = "debug_stress_gc") || self.bytes_allocated > self.next_gc {
            self.collect_garbage();
        }
    }

    fn collect_garbage(&mut self) {
        let _span = tracing::debug_span!("gc_cycle").entered();
        let before = self.bytes_allocated;
        self.gc.prepare_collection(&self.object_manager);
        self.gc.mark_roots(
            &self.stack,
            self.stack_top,
            &self.globals,
            &self.frames,
            &self.open_upvalues,
        );
        self.gc.mark_object(self.init_string as *mut Object);
        self.gc.trace_references();
        self.intern_strings.remove_white();
        let freed = self.gc.sweep(&mut self.object_manager);
        self.bytes_allocated = before.saturating_sub(freed);
        let grow_factor =
            if cfg!(feature = "debug_stress_gc") { GC_STRESS_GROW_FACTOR } else { GC_GROW_FACTOR };
        self.next_gc = (self.bytes_allocated * grow_factor).max(GC_INITIAL_THRESHOLD);
        self.gc.record_cycle(before, freed, self.bytes_allocated, self.next_gc);
        tracing::debug!(
            target: "dynac::gc",
            before_bytes = before,
            freed_bytes = freed,
            after_bytes = self.bytes_allocated,
            next_gc = self.next_gc,
            "collection cycle complete"
        );
    }

    // ---- errors ----

    fn runtime_error(&mut self, error: RuntimeError) {
        eprintln!("{}", error);
        for frame in self.frames.iter().rev() {
            let function = frame.function();
            let line = function.chunk.lines.get(frame.ip.saturating_sub(1)).copied().unwrap_or(0);
            if function.name.is_empty() {
                eprintln!("[line {}] in script", line);
            } else {
                eprintln!("[line {}] in {}()", line, function.name);
            }
        }
        self.reset_stack();
        self.had_runtime_error = true;
    }

    // ---- dispatch loop ----

    fn run(&mut self) -> InterpretResult {
        loop {
            if self.had_runtime_error {
                return InterpretResult::RuntimeError;
            }
            debug_feature::trace(self);
            self.maybe_collect_garbage();

            let instruction = self.read_byte();
            let op = match OpCode::try_from(instruction) {
                Ok(op) => op,
                Err(byte) => {
                    self.runtime_error(RuntimeError::UnknownOpcode(byte));
                    return InterpretResult::RuntimeError;
                }
            };

            match op {
                OpCode::Constant => {
                    let value = self.read_constant();
                    self.push(value);
                }
                OpCode::ConstantLong => {
                    let value = self.read_constant_long();
                    self.push(value);
                }
                OpCode::Nil => self.push(make_nil_value()),
                OpCode::True => self.push(make_bool_value(true)),
                OpCode::False => self.push(make_bool_value(false)),
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.current_frame().slots_base;
                    self.push(self.stack[base + slot]);
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.current_frame().slots_base;
                    self.stack[base + slot] = self.peek();
                }
                OpCode::GetGlobal => {
                    let name = self.read_constant();
                    match self.globals.get(&name) {
                        Some(value) => self.push(value),
                        None => {
                            self.runtime_error(RuntimeError::UndefinedVariable(format_value(&name)));
                            return InterpretResult::RuntimeError;
                        }
                    }
                }
                OpCode::DefineGlobal => {
                    let name = self.read_constant();
                    let value = self.peek();
                    self.globals.set(name, value);
                    self.pop();
                }
                OpCode::SetGlobal => {
                    let name = self.read_constant();
                    let value = self.peek();
                    if self.globals.set(name, value) {
                        self.globals.delete(&name);
                        self.runtime_error(RuntimeError::UndefinedVariable(format_value(&name)));
                        return InterpretResult::RuntimeError;
                    }
                }
                OpCode::GetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let closure = self.current_frame().closure;
                    let upvalue_ptr = unsafe { (*closure).upvalues[slot] };
                    self.push(unsafe { (*upvalue_ptr).get() });
                }
                OpCode::SetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let closure = self.current_frame().closure;
                    let upvalue_ptr = unsafe { (*closure).upvalues[slot] };
                    let value = self.peek();
                    unsafe {
                        (*upvalue_ptr).set(value);
                    }
                }
                OpCode::GetProperty => {
                    let receiver = self.peek();
                    if !is_instance(&receiver) {
                        self.runtime_error(RuntimeError::NotAnInstanceForGet);
                        return InterpretResult::RuntimeError;
                    }
                    let instance_ptr = as_object(&receiver) as *mut ObjectInstance;
                    let name = self.read_constant();
                    let field = unsafe { (*instance_ptr).fields.get(&name) };
                    match field {
                        Some(value) => {
                            self.pop();
                            self.push(value);
                        }
                        None => {
                            let class_ptr = unsafe { (*instance_ptr).class };
                            if !self.bind_method(class_ptr, name) {
                                return InterpretResult::RuntimeError;
                            }
                        }
                    }
                }
                OpCode::SetProperty => {
                    let receiver = self.peek_steps(1);
                    if !is_instance(&receiver) {
                        self.runtime_error(RuntimeError::NotAnInstanceForSet);
                        return InterpretResult::RuntimeError;
                    }
                    let instance_ptr = as_object(&receiver) as *mut ObjectInstance;
                    let name = self.read_constant();
                    let value = self.pop();
                    unsafe {
                        (*instance_ptr).fields.set(name, value);
                    }
                    self.pop();
                    self.push(value);
                }
                OpCode::GetSuper => {
                    let name = self.read_constant();
                    let superclass_value = self.pop();
                    let superclass_ptr = as_object(&superclass_value) as *mut ObjectClass;
                    if !self.bind_method(superclass_ptr, name) {
                        return InterpretResult::RuntimeError;
                    }
                }
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(make_bool_value(a == b));
                }
                OpCode::EqualPreserve => {
                    let b = self.pop();
                    let a = self.peek();
                    self.push(make_bool_value(a == b));
                }
                OpCode::Greater => {
                    if !self.binary_number_op(|a, b| make_bool_value(a > b)) {
                        return InterpretResult::RuntimeError;
                    }
                }
                OpCode::Less => {
                    if !self.binary_number_op(|a, b| make_bool_value(a < b)) {
                        return InterpretResult::RuntimeError;
                    }
                }
                OpCode::Add => {
                    let b = self.peek();
                    let a = self.peek_steps(1);
                    if is_number(&a) && is_number(&b) {
                        self.pop();
                        self.pop();
                        self.push(make_numer_value(as_number(&a) + as_number(&b)));
                    } else if is_string(&a) && is_string(&b) {
                        let b_value = self.pop();
                        let a_value = self.pop();
                        let concatenated = format!("{}{}", format_value(&a_value), format_value(&b_value));
                        let value =
                            make_string_value(&mut self.object_manager, &mut self.intern_strings, &concatenated);
                        self.push(value);
                    } else {
                        self.runtime_error(RuntimeError::OperandsMustBeNumbersOrStrings);
                        return InterpretResult::RuntimeError;
                    }
                }
                OpCode::Subtract => {
                    if !self.binary_number_op(|a, b| make_numer_value(a - b)) {
                        return InterpretResult::RuntimeError;
                    }
                }
                OpCode::Multiply => {
                    if !self.binary_number_op(|a, b| make_numer_value(a * b)) {
                        return InterpretResult::RuntimeError;
                    }
                }
                OpCode::Divide => {
                    if !self.binary_number_op(|a, b| make_numer_value(a / b)) {
                        return InterpretResult::RuntimeError;
                    }
                }
                OpCode::Not => {
                    let value = self.pop();
                    self.push(make_bool_value(value.is_falsey()));
                }
                OpCode::Negate => {
                    let value = self.peek();
                    if !is_number(&value) {
                        self.runtime_error(RuntimeError::OperandMustBeNumber);
                        return InterpretResult::RuntimeError;
                    }
                    self.pop();
                    self.push(make_numer_value(-as_number(&value)));
                }
                OpCode::Print => {
                    let value = self.pop();
                    println!("{}", format_value(&value));
                }
                OpCode::Jump => {
                    let offset = self.read_short();
                    self.current_frame_mut().ip += offset as usize;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_short();
                    if self.peek().is_falsey() {
                        self.current_frame_mut().ip += offset as usize;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_short();
                    self.current_frame_mut().ip -= offset as usize;
                }
                OpCode::Call => {
                    let arg_count = self.read_byte();
                    let callee = self.peek_steps(arg_count as usize);
                    if !self.call_value(callee, arg_count) {
                        return InterpretResult::RuntimeError;
                    }
                }
                OpCode::Invoke => {
                    let method_name = self.read_constant();
                    let arg_count = self.read_byte();
                    if !self.invoke(method_name, arg_count) {
                        return InterpretResult::RuntimeError;
                    }
                }
                OpCode::SuperInvoke => {
                    let method_name = self.read_constant();
                    let arg_count = self.read_byte();
                    let superclass_value = self.pop();
                    let superclass_ptr = as_object(&superclass_value) as *mut ObjectClass;
                    if !self.invoke_from_class(superclass_ptr, method_name, arg_count) {
                        return InterpretResult::RuntimeError;
                    }
                }
                OpCode::Closure => {
                    let function_value = self.read_constant();
                    let function_ptr = as_object(&function_value) as *mut ObjectFunction;
                    let closure_ptr = self.object_manager.alloc_closure(function_ptr);
                    let upvalue_count = unsafe { (*function_ptr).upvalue_count };
                    for _ in 0..upvalue_count {
                        let is_local = self.read_byte();
                        let index = self.read_byte() as usize;
                        let upvalue_ptr = if is_local != 0 {
                            let base = self.current_frame().slots_base;
                            self.capture_upvalue(base + index)
                        } else {
                            let enclosing = self.current_frame().closure;
                            unsafe { (*enclosing).upvalues[index] }
                        };
                        unsafe {
                            (*closure_ptr).upvalues.push(upvalue_ptr);
                        }
                    }
                    self.push(make_object_value(closure_ptr as *mut Object));
                }
                OpCode::CloseUpvalue => {
                    self.close_upvalues(self.stack_top - 1);
                    self.pop();
                }
                OpCode::Return => {
                    let result = self.pop();
                    let frame = self.frames.pop().expect("return with no active frame");
                    self.close_upvalues(frame.slots_base);
                    self.stack_top = frame.slots_base;
                    if self.frames.is_empty() {
                        return InterpretResult::Ok;
                    }
                    self.push(result);
                }
                OpCode::Class => {
                    let name_value = self.read_constant();
                    let class_ptr = self.object_manager.alloc_class(format_value(&name_value));
                    self.push(make_object_value(class_ptr as *mut Object));
                }
                OpCode::Inherit => {
                    let superclass_value = self.peek_steps(1);
                    if !is_class(&superclass_value) {
                        self.runtime_error(RuntimeError::SuperclassMustBeClass);
                        return InterpretResult::RuntimeError;
                    }
                    let superclass_ptr = as_object(&superclass_value) as *mut ObjectClass;
                    let subclass_value = self.peek();
                    let subclass_ptr = as_object(&subclass_value) as *mut ObjectClass;
                    unsafe {
                        (*superclass_ptr).methods.add_all(&mut (*subclass_ptr).methods);
                    }
                    self.pop();
                }
                OpCode::Method => {
                    let name = self.read_constant();
                    let method_value = self.peek();
                    let class_value = self.peek_steps(1);
                    let class_ptr = as_object(&class_value) as *mut ObjectClass;
                    unsafe {
                        (*class_ptr).methods.set(name, method_value);
                    }
                    self.pop();
                }
            }
        }
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "debug_trace_execution")]
mod debug_feature {
    use super::VM;
    use crate::{debug, value::format_value};

    pub fn trace(vm: &VM) {
        print!("          ");
        for value in &vm.stack[0..vm.stack_top] {
            print!("[ {} ]", format_value(value));
        }
        println!();
        let frame = vm.frames.last().expect("no active frame");
        let chunk = unsafe { &(*(*frame.closure).function).chunk };
        debug::disassemble_instruction(chunk, frame.ip);
    }
}

#[cfg(not(feature = "debug_trace_execution"))]
mod debug_feature {
    use super::VM;

    pub fn trace(_vm: &VM) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_arithmetic_and_prints() {
        let mut vm = VM::new();
        assert_eq!(vm.interpret("print 1 + 2 * 3;"), InterpretResult::Ok);
    }

    #[test]
    fn concatenates_strings() {
        let mut vm = VM::new();
        assert_eq!(vm.interpret("print \"foo\" + \"bar\";"), InterpretResult::Ok);
    }

    #[test]
    fn globals_persist_across_interpret_calls() {
        let mut vm = VM::new();
        assert_eq!(vm.interpret("var x = 10;"), InterpretResult::Ok);
        assert_eq!(vm.interpret("print x + 5;"), InterpretResult::Ok);
    }

    #[test]
    fn runs_closures_over_shared_upvalues() {
        let mut vm = VM::new();
        let source = "fun counter() { var i = 0; fun inc() { i = i + 1; return i; } return inc; } \
                      var c = counter(); print c(); print c(); print c();";
        assert_eq!(vm.interpret(source), InterpretResult::Ok);
    }

    #[test]
    fn runs_classes_with_inheritance_and_super_calls() {
        let mut vm = VM::new();
        let source = "class A { greet() { return \"hi from A\"; } } \
                      class B < A { greet() { return super.greet(); } } \
                      print B().greet();";
        assert_eq!(vm.interpret(source), InterpretResult::Ok);
    }

    #[test]
    fn initializer_returns_the_instance_implicitly() {
        let mut vm = VM::new();
        let source = "class Point { init(x, y) { this.x = x; this.y = y; } } \
                      var p = Point(1, 2); print p.x + p.y;";
        assert_eq!(vm.interpret(source), InterpretResult::Ok);
    }

    #[test]
    fn reports_runtime_error_on_undefined_global() {
        let mut vm = VM::new();
        assert_eq!(vm.interpret("print nonexistent;"), InterpretResult::RuntimeError);
    }

    #[test]
    fn reports_compile_error_without_running() {
        let mut vm = VM::new();
        assert_eq!(vm.interpret("1 +;"), InterpretResult::CompileError);
    }

    #[test]
    fn native_clock_is_callable() {
        let mut vm = VM::new();
        assert_eq!(vm.interpret("print clock();"), InterpretResult::Ok);
    }

    #[test]
    fn switch_statement_runs_matching_case_only() {
        let mut vm = VM::new();
        let source = "var a = 2; switch (a) { case 1: print \"one\"; case 2: print \"two\"; default: print \"other\"; }";
        assert_eq!(vm.interpret(source), InterpretResult::Ok);
    }

    #[test]
    fn runs_past_256_distinct_constants_via_constant_long() {
        // 300 distinct numeric literals overflow the 1-byte CONSTANT pool
        // index, forcing CONSTANT_LONG for the tail; a non-error result
        // confirms the VM decodes the 3-byte operand correctly.
        let mut vm = VM::new();
        let mut source = String::new();
        for i in 0..300 {
            source.push_str(&format!("print {};", i));
        }
        assert_eq!(vm.interpret(&source), InterpretResult::Ok);
    }

    #[test]
    fn pushing_past_stack_max_is_a_graceful_runtime_error_not_a_panic() {
        // Drives the value stack past STACK_MAX directly, bypassing the
        // compiler (no legal program reliably reaches this without also
        // tripping FRAMES_MAX first) to confirm push() degrades to a
        // runtime error instead of an out-of-bounds panic (spec.md §7).
        let mut vm = VM::new();
        for _ in 0..STACK_MAX {
            vm.push(Value::Nil);
        }
        assert!(!vm.had_runtime_error);
        vm.push(Value::Nil);
        assert!(vm.had_runtime_error);
        assert_eq!(vm.stack_top, 0, "overflow should reset the stack");
    }

    #[test]
    fn break_exits_loop_early() {
        let mut vm = VM::new();
        let source = "var total = 0; for (var i = 0; i < 10; i = i + 1) { if (i == 3) break; total = total + i; } print total;";
        assert_eq!(vm.interpret(source), InterpretResult::Ok);
    }
}
