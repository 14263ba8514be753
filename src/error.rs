//! Runtime error taxonomy (SPEC_FULL.md §7). Compile errors stay as parser
//! diagnostics printed synchronously through the `has_error`/`panic_mode`
//! flags in `compiler.rs` — mirroring the teacher's design — but runtime
//! errors get a concrete `thiserror`-derived enum so `VM::run` has a single
//! typed value to format into a stack trace and `main.rs` a single value to
//! map to an exit code.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Operand must be a number.")]
    OperandMustBeNumber,
    #[error("Operands must be numbers.")]
    OperandsMustBeNumbers,
    #[error("Operands must be two numbers or two strings.")]
    OperandsMustBeNumbersOrStrings,
    #[error("Undefined variable '{0}'.")]
    UndefinedVariable(String),
    #[error("Undefined property '{0}'.")]
    UndefinedProperty(String),
    #[error("Only instances have properties.")]
    NotAnInstanceForGet,
    #[error("Only instances have fields.")]
    NotAnInstanceForSet,
    #[error("Only instances have methods.")]
    NotAnInstanceForInvoke,
    #[error("Superclass must be a class.")]
    SuperclassMustBeClass,
    #[error("Can only call functions and classes.")]
    NotCallable,
    #[error("Expected {expected} arguments but got {got}.")]
    ArityMismatch { expected: u8, got: u8 },
    #[error("Stack overflow.")]
    StackOverflow,
    #[error("Value stack overflow.")]
    ValueStackOverflow,
    #[error("Unknown opcode {0}.")]
    UnknownOpcode(u8),
    #[error("{0}")]
    Native(String),
}
