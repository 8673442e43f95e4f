//! Scoped compile-time options.
//!
//! `Options` is a small, cheaply-`Clone`d record threaded through
//! `CompileContext`'s stack; `with_options(...)` pushes a merged child scope
//! for the duration of building a sub-expression and pops it back off once
//! that sub-expression is built, so a nested `debug(true)` never leaks out to
//! a sibling branch.

/// A partial override of the ambient compile options. `None` fields mean
/// "inherit the enclosing scope's value."
#[derive(Clone, Debug, Default)]
pub struct Options {
    pub debug: bool,
    /// When set, a compiled converter's debug sidecar is written
    /// under this directory instead of the crate-wide default.
    pub debug_dir: Option<std::path::PathBuf>,
}

impl Options {
    pub fn debug(mut self, on: bool) -> Self {
        self.debug = on;
        self
    }

    pub fn debug_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.debug_dir = Some(dir.into());
        self
    }

    /// Merge `other` over `self` — fields explicitly set on `other` win.
    /// `debug` has no "unset" representation, so a narrower scope always
    /// adopts the child's value; `debug_dir` only overrides when `Some`.
    pub fn merge(&self, other: &Options) -> Options {
        Options {
            debug: other.debug,
            debug_dir: other.debug_dir.clone().or_else(|| self.debug_dir.clone()),
        }
    }
}
