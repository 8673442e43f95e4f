//! The compiled, reusable object a pipeline becomes.
//!
//! `gen_converter` is the one place compile-time validation runs: nested
//! reducers, undeclared group-by keys, and `label(name)` reads with no
//! write-dominator are caught here, once, before a `Converter` is ever
//! invoked — never inside the row loop.

use crate::context::CompileContext;
use crate::debug;
use crate::deps;
use crate::error::ConvtoolsError;
use crate::expr::Expr;
use crate::frame::Frame;
use crate::options::Options;
use crate::value::Value;
use std::collections::HashMap;
use std::rc::Rc;

/// A compiled pipeline. Built once via `gen_converter`, then `convert`ed as
/// many times as needed — each call gets its own `Frame`, so nothing about
/// evaluating one call depends on any other.
///
/// `Expr`/`ReducerSpec`/`NativeFn` are `Rc`-based (matching the rest of this
/// crate's single-allocator style), so a `Converter` itself is `!Send` and
/// `!Sync`: sharing one compiled pipeline across OS threads means compiling
/// it once per thread rather than behind an `Arc`. Compilation is cheap
/// relative to running a pipeline over real data, so this is the simpler
/// trade against introducing atomic refcounting crate-wide for a capability
/// most callers (single-threaded ETL scripts, async tasks pinned to one
/// executor thread) don't need.
pub struct Converter {
    root: Rc<Expr>,
    options: Options,
    debug_id: String,
    unused_labels: Vec<String>,
}

impl Converter {
    /// Validate and wrap `root` into a reusable `Converter`.
    pub fn gen_converter(root: Rc<Expr>, options: Options) -> Result<Converter, ConvtoolsError> {
        deps::validate_tree(&root)?;
        let mut ctx = CompileContext::new(options.clone());
        deps::validate_labels(&root, &mut ctx)?;
        let unused_labels = ctx.unused_labels();
        for name in &unused_labels {
            tracing::warn!(label = %name, "label declared but never read");
        }
        let debug_id = format!("{:x}", Rc::as_ptr(&root) as usize);
        if options.debug {
            let rendering = debug::render(&root);
            let dir = options
                .debug_dir
                .clone()
                .or_else(|| std::env::var_os("CONVTOOLS_DEBUG_DIR").map(std::path::PathBuf::from))
                .unwrap_or_else(|| std::path::PathBuf::from(".convtools_debug"));
            if let Ok(path) = debug::write_sidecar(&dir, &debug_id, &rendering) {
                tracing::debug!(sidecar = %path.display(), "wrote converter debug sidecar");
            }
        }
        tracing::info!(debug_id = %debug_id, "compiled converter");
        Ok(Converter {
            root,
            options,
            debug_id,
            unused_labels,
        })
    }

    /// Label names written via `pipe`/`cumulative`/`cumulative_reset` but
    /// never read by any `label(name)` in the compiled tree — a warning
    /// surfaced alongside a successful compile, not a compile error.
    pub fn unused_labels(&self) -> &[String] {
        &self.unused_labels
    }

    /// Run the converter once over `input`, with no bound input arguments.
    pub fn convert(&self, input: Value) -> Result<Value, ConvtoolsError> {
        self.convert_with_args(input, &HashMap::new())
    }

    /// Run the converter once over `input`, with `input_args` available to
    /// any `InputArg` node (the named-parameter mechanism).
    pub fn convert_with_args(
        &self,
        input: Value,
        input_args: &HashMap<Rc<str>, Value>,
    ) -> Result<Value, ConvtoolsError> {
        let frame = Frame::new(input, input_args);
        crate::lower::eval(&self.root, &frame).map_err(|err| {
            let sidecar = self.options.debug.then(|| {
                self.options
                    .debug_dir
                    .clone()
                    .unwrap_or_else(|| std::path::PathBuf::from(".convtools_debug"))
                    .join(format!("{}.convtools.ir", self.debug_id))
            });
            ConvtoolsError::in_converter(err, sidecar.as_deref())
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }
}

/// Build a converter from an already-assembled `Rc<Expr>`. A thin wrapper
/// over `Converter::gen_converter` kept as a free function so `Expr::compile`
/// (the builder-surface entry point) doesn't need to name the type.
pub fn gen_converter(root: Rc<Expr>, options: Options) -> Result<Converter, ConvtoolsError> {
    Converter::gen_converter(root, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::BinOp;

    #[test]
    fn gen_converter_rejects_undeclared_group_keys() {
        let bad_post = Expr::Item {
            base: Expr::This.rc(),
            keys: vec![Expr::Const(Value::str("other")).rc()],
            default: None,
        }
        .rc();
        let root = Expr::GroupBy {
            source: Expr::This.rc(),
            keys: vec![Expr::Item {
                base: Expr::This.rc(),
                keys: vec![Expr::Const(Value::str("id")).rc()],
                default: None,
            }
            .rc()],
            post: bad_post,
        }
        .rc();
        assert!(gen_converter(root, Options::default()).is_err());
    }

    #[test]
    fn convert_runs_a_simple_arithmetic_pipeline() {
        let root = Expr::BinOp(BinOp::Add, Expr::This.rc(), Expr::Const(Value::Int(1)).rc()).rc();
        let converter = gen_converter(root, Options::default()).unwrap();
        assert_eq!(converter.convert(Value::Int(41)).unwrap(), Value::Int(42));
    }

    #[test]
    fn gen_converter_rejects_a_label_read_with_no_write_dominator() {
        let root = Expr::Label(Rc::from("total")).rc();
        let err = gen_converter(root, Options::default()).unwrap_err();
        assert!(matches!(err, ConvtoolsError::Compile(crate::error::CompileError::UnknownLabel(_))));
    }

    #[test]
    fn gen_converter_surfaces_an_unread_label_as_a_warning_not_an_error() {
        let root = Expr::Pipe {
            from: Expr::This.rc(),
            to: Expr::This.rc(),
            label_input: vec![(Rc::from("unread"), Expr::This.rc())],
            label_output: vec![],
        }
        .rc();
        let converter = gen_converter(root, Options::default()).unwrap();
        assert_eq!(converter.unused_labels(), &["unread".to_string()]);
    }
}
