//! Error types, split into compile-time and run-time kinds.

use thiserror::Error;

/// Errors raised while building an expression or while `gen_converter` lowers
/// it — never while a converter is executing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("label `{0}` is read before any write dominates it")]
    UnknownLabel(String),

    #[error("group-by key `{0}` used in the aggregate expression does not match any declared group-by key")]
    UndeclaredGroupKey(String),

    #[error("reducer nested inside another reducer's input is not allowed")]
    NestedReducer,

    #[error("reducer `{0}` and `{1}` over the same slot have incompatible kinds")]
    IncompatibleReducerKinds(String, String),

    #[error("`{0}` requires at least one equality or residual term")]
    EmptyJoinPredicate(String),
}

/// A stable tag identifying a kind of run-time error, used to match
/// `try_().except_(Kind, ...)` handlers in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeErrorKind {
    DivisionByZero,
    KeyNotFound,
    AttributeMissing,
    IndexOutOfBounds,
    TypeMismatch,
    Expect,
    Custom,
}

/// Errors raised by generated (compiled) code while executing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("attribute not found: {0}")]
    AttributeMissing(String),

    #[error("index out of bounds: {0}")]
    IndexOutOfBounds(i64),

    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("{0}")]
    Expect(String),

    #[error("no date format matched input `{0}`")]
    DateParse(String),

    #[error("{0}")]
    Custom(String),
}

impl RuntimeError {
    pub fn kind(&self) -> RuntimeErrorKind {
        match self {
            RuntimeError::DivisionByZero => RuntimeErrorKind::DivisionByZero,
            RuntimeError::KeyNotFound(_) => RuntimeErrorKind::KeyNotFound,
            RuntimeError::AttributeMissing(_) => RuntimeErrorKind::AttributeMissing,
            RuntimeError::IndexOutOfBounds(_) => RuntimeErrorKind::IndexOutOfBounds,
            RuntimeError::TypeMismatch { .. } => RuntimeErrorKind::TypeMismatch,
            RuntimeError::Expect(_) => RuntimeErrorKind::Expect,
            RuntimeError::DateParse(_) => RuntimeErrorKind::Custom,
            RuntimeError::Custom(_) => RuntimeErrorKind::Custom,
        }
    }
}

/// Top-level crate error, returned by both compilation and execution paths.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConvtoolsError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl ConvtoolsError {
    /// Wraps a runtime error with the path to its debug sidecar, matching
    /// The "converter opens this file on first uncaught exception" design
    /// (the Rust analogue: the error message names the file for an IDE/human
    /// to open).
    pub fn in_converter(err: RuntimeError, sidecar_path: Option<&std::path::Path>) -> Self {
        match sidecar_path {
            Some(path) => ConvtoolsError::Runtime(RuntimeError::Custom(format!(
                "{err} (see debug source at {})",
                path.display()
            ))),
            None => ConvtoolsError::Runtime(err),
        }
    }
}
