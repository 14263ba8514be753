//! Library surface for `dynac`: the compile-and-execute pipeline described
//! in spec.md, exposed so integration tests (and any future embedder) can
//! drive `VM::interpret` directly rather than shelling out to the CLI.

pub mod call_frame;
pub mod chunk;
pub mod compiler;
pub mod constants;
pub mod debug;
pub mod error;
pub mod gc;
pub mod objects;
pub mod scanner;
pub mod std_mod;
pub mod table;
pub mod value;
pub mod vm;
