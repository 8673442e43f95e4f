//! Per-invocation evaluation state, threaded through as an extra parameter
//! rather than kept in any module-global cell.
//!
//! A `Frame` is created fresh for every `Converter::convert` call (and for
//! every nested row inside a comprehension/aggregate/join, via `with_this`).
//! Nothing in it survives across invocations — label writes from one call
//! are invisible to the next.

use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub struct Frame<'a> {
    pub this: Value,
    pub left: Option<Value>,
    pub right: Option<Value>,
    pub chunk: Option<Value>,
    pub prev: Option<Value>,
    pub input_args: &'a HashMap<Rc<str>, Value>,
    labels: Rc<RefCell<HashMap<Rc<str>, Value>>>,
    /// Set only while evaluating an `Aggregate` node's output literal: maps
    /// a reducer's identity (`ReducerSpec::identity`) to its already-folded
    /// value, so a `Reduce` node found while walking that literal returns
    /// the precomputed result instead of attempting a live fold outside its
    /// accumulation pass.
    reduced: Option<Rc<HashMap<usize, Value>>>,
}

impl<'a> Frame<'a> {
    pub fn new(this: Value, input_args: &'a HashMap<Rc<str>, Value>) -> Self {
        Frame {
            this,
            left: None,
            right: None,
            chunk: None,
            prev: None,
            input_args,
            labels: Rc::new(RefCell::new(HashMap::new())),
            reduced: None,
        }
    }

    /// A child frame sharing this frame's label scratch map (so a label
    /// written while evaluating one row of a comprehension/aggregate/pipe
    /// is visible to the next — needed for `cumulative`) but with a new
    /// `this`.
    pub fn with_this(&self, this: Value) -> Frame<'a> {
        Frame {
            this,
            left: self.left.clone(),
            right: self.right.clone(),
            chunk: self.chunk.clone(),
            prev: self.prev.clone(),
            input_args: self.input_args,
            labels: self.labels.clone(),
            reduced: self.reduced.clone(),
        }
    }

    pub fn with_reduced(&self, reduced: HashMap<usize, Value>) -> Frame<'a> {
        let mut f = self.with_this(self.this.clone());
        f.reduced = Some(Rc::new(reduced));
        f
    }

    pub fn reduced_value(&self, identity: usize) -> Option<Value> {
        self.reduced.as_ref().and_then(|m| m.get(&identity).cloned())
    }

    pub fn with_left_right(&self, left: Value, right: Value) -> Frame<'a> {
        let mut f = self.with_this(self.this.clone());
        f.left = Some(left);
        f.right = Some(right);
        f
    }

    pub fn with_prev(&self, this: Value, prev: Option<Value>) -> Frame<'a> {
        let mut f = self.with_this(this);
        f.prev = prev;
        f
    }

    /// A child frame with `chunk` bound to the in-progress accumulator, for
    /// evaluating a `chunk_by_condition` predicate against `c.CHUNK`.
    pub fn with_chunk(&self, chunk: Value) -> Frame<'a> {
        let mut f = self.with_this(self.this.clone());
        f.chunk = Some(chunk);
        f
    }

    pub fn set_label(&self, name: &Rc<str>, value: Value) {
        self.labels.borrow_mut().insert(name.clone(), value);
    }

    pub fn get_label(&self, name: &str) -> Option<Value> {
        self.labels.borrow().get(name).cloned()
    }
}
