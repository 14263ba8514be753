use crate::{objects::object::NativeObject, value::{make_numer_value, Value, ValueArray}};
use std::time::Instant;

/// The sole built-in native (spec.md §6): seconds elapsed since this
/// `ClockTime` was registered, i.e. since program start.
pub struct ClockTime {
    start: Instant,
}

impl NativeObject for ClockTime {
    fn run(&self, _args: &Option<ValueArray>) -> Result<Value, String> {
        Ok(make_numer_value(self.start.elapsed().as_secs_f64()))
    }
}

impl ClockTime {
    pub fn new() -> Self {
        ClockTime { start: Instant::now() }
    }
}

impl Default for ClockTime {
    fn default() -> Self {
        Self::new()
    }
}