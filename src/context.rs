//! Per-compilation mutable state.
//!
//! A `CompileContext` is created once per `gen_converter` call, threaded
//! through label write-dominance validation (`deps::validate_labels`), and
//! dropped once the `Converter` is assembled. Nothing in it survives into
//! the returned `Converter` except the `unused_labels()` snapshot, copied out
//! as a plain `Vec<String>` — a `Converter` otherwise only keeps the
//! validated `Expr` tree and the options it was compiled with.

use crate::options::Options;
use rustc_hash::FxHashSet;
use std::cell::Cell;

/// Mutable compile-time state. Not `Clone`, not shared across compilations —
/// the context belongs to exactly one `gen_converter` call.
///
/// The name sets here are compiler-internal bookkeeping, never exposed to a
/// caller and never used as a cross-process cache key, so the faster
/// non-DoS-resistant `FxHashSet` (already a dependency of the wider
/// compiler-tooling pack this crate draws its stack from) is the right
/// default instead of the randomized `std::collections::HashSet`.
pub struct CompileContext {
    counter: Cell<u64>,
    options_stack: Vec<Options>,
    input_args: FxHashSet<String>,
    labels: FxHashSet<String>,
    unused_labels: FxHashSet<String>,
}

impl CompileContext {
    pub fn new(base_options: Options) -> Self {
        CompileContext {
            counter: Cell::new(0),
            options_stack: vec![base_options],
            input_args: FxHashSet::default(),
            labels: FxHashSet::default(),
            unused_labels: FxHashSet::default(),
        }
    }

    /// Mint a short, word-unique identifier — never a substring merge of an
    /// already-minted name.
    pub fn mint(&self, prefix: &str) -> String {
        let n = self.counter.get();
        self.counter.set(n + 1);
        format!("__{prefix}_{n}")
    }

    pub fn register_input_arg(&mut self, name: &str) {
        self.input_args.insert(name.to_string());
    }

    pub fn input_args(&self) -> &FxHashSet<String> {
        &self.input_args
    }

    pub fn register_label(&mut self, name: &str) {
        self.labels.insert(name.to_string());
        self.unused_labels.insert(name.to_string());
    }

    pub fn mark_label_used(&mut self, name: &str) {
        self.unused_labels.remove(name);
    }

    /// Labels declared but never read — a warning, not an error.
    pub fn unused_labels(&self) -> Vec<String> {
        let mut v: Vec<_> = self.unused_labels.iter().cloned().collect();
        v.sort();
        v
    }

    pub fn push_options(&mut self, partial: Options) {
        let merged = self.current_options().merge(&partial);
        self.options_stack.push(merged);
    }

    pub fn pop_options(&mut self) {
        if self.options_stack.len() > 1 {
            self.options_stack.pop();
        }
    }

    pub fn current_options(&self) -> Options {
        self.options_stack
            .last()
            .cloned()
            .unwrap_or_default()
    }
}
