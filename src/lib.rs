//! # convtools: declarative data-transformation pipelines, compiled
//!
//! `convtools` lets you build a transformation as data — an `Expr` tree
//! assembled with the `c::` constructors — and then compile it once into a
//! `Converter`, a reusable object that can be invoked many times without
//! re-walking or re-validating the pipeline.
//!
//! There is no runtime source-text generation here: Rust has no safe way to
//! compile and load code at runtime, so a pipeline lowers to an `Expr` tree
//! walked by a small recursive evaluator against a per-call `Frame`, instead
//! of textual codegen. The debug sidecar (`Options::debug(true)`) renders
//! that tree as text for inspection, standing in for the generated-source
//! dump this design would produce in a host language with runtime `eval`.
//!
//! ## Example
//!
//! ```
//! use convtools::c::*;
//!
//! let converter = item(["amount"]).as_type_int().gen_converter(Default::default()).unwrap();
//! ```
//!
//! See `src/builder.rs` for the full `c::` surface.

pub mod aggregate;
pub mod builder;
pub mod collaborators;
pub mod context;
pub mod control;
pub mod converter;
pub mod debug;
pub mod deps;
pub mod error;
pub mod expr;
pub mod frame;
pub mod join;
pub mod lower;
pub mod options;
pub mod reducer;
pub mod value;

pub use converter::Converter;
pub use error::{CompileError, ConvtoolsError, RuntimeError, RuntimeErrorKind};
pub use options::Options;
pub use value::Value;

pub mod c {
    //! The public builder surface: smart-constructor free functions that
    //! assemble `Expr` trees, plus chain methods (`ExprExt`) for everything
    //! that reads naturally as a method call off an already-built node.
    pub use crate::builder::*;
}
