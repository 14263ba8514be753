//! Sizing constants shared by the compiler, VM and call-frame stack.

/// Maximum number of nested call frames.
pub const FRAMES_MAX: usize = 64;

/// Number of value-stack slots reserved per call frame.
pub const STACK_SLOTS_PER_FRAME: usize = 256;

/// Total value-stack capacity.
pub const STACK_MAX: usize = FRAMES_MAX * STACK_SLOTS_PER_FRAME;

/// GC heap-growth trigger, production mode: next collection fires once
/// bytes_allocated exceeds bytes_allocated_at_last_collection * this factor.
pub const GC_GROW_FACTOR: usize = 2;

/// Same, under the `debug_stress_gc` feature: collect on every allocation.
pub const GC_STRESS_GROW_FACTOR: usize = 1;

/// Initial threshold (bytes) before the first collection can fire.
pub const GC_INITIAL_THRESHOLD: usize = 1024 * 1024;

/// Initial table capacity; doubles once load factor exceeds 0.75.
pub const TABLE_INITIAL_CAPACITY: usize = 8;

/// Max load factor before a table grows.
pub const TABLE_MAX_LOAD: f64 = 0.75;
