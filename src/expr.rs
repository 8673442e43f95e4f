//! The conversion algebra: an immutable, structurally-shared expression DAG.
//!
//! Every node is data, never a parent-pointing or self-mutating structure.
//! Smart constructors that appear to "mutate" a
//! node (`.filter`, `.as_type`, `.pipe`, ...) always return a new `Expr`
//! wrapping the old one as a child — see `src/builder.rs` for the `c::`
//! surface that calls these constructors.

use crate::reducer::ReducerSpec;
use crate::value::Value;
use std::rc::Rc;

/// A captured native function, addressed by a mint-assigned identity rather
/// than compared structurally (closures have no useful `Eq`). Two `NativeFn`s
/// are "the same" iff they share the same `Rc` allocation.
#[derive(Clone)]
pub struct NativeFn {
    pub name: Rc<str>,
    pub func: Rc<dyn Fn(&[Value]) -> Result<Value, crate::error::RuntimeError>>,
}

impl NativeFn {
    pub fn new(name: impl Into<Rc<str>>, f: impl Fn(&[Value]) -> Result<Value, crate::error::RuntimeError> + 'static) -> Self {
        NativeFn {
            name: name.into(),
            func: Rc::new(f),
        }
    }

    fn same_as(&self, other: &NativeFn) -> bool {
        Rc::ptr_eq(&self.func, &other.func)
    }
}

impl std::fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NativeFn({})", self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    Int,
    Float,
    Str,
    Bool,
    List,
    Set,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinHow {
    Inner,
    Left,
    Right,
    Outer,
    Cross,
}

/// One item inside a `list`/`tuple`/`set`/`dict` literal builder: either a
/// plain expression, an `optional(value, skip_if / keep_if)` slot that may
/// vanish from the built collection, or a `spread(mapping)` that splices
/// another mapping's entries in (dict only).
#[derive(Clone)]
pub enum CollectionItem {
    Plain(Rc<Expr>),
    Optional {
        value: Rc<Expr>,
        skip_if: Option<Rc<Expr>>,
        keep_if: Option<Rc<Expr>>,
    },
    Spread(Rc<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComprehensionKind {
    List,
    Tuple,
    Set,
    Generator,
}

/// One `.except_(kind, value?, re_raise_if?)` clause, tried in declaration
/// order.
#[derive(Clone)]
pub struct ExceptHandler {
    pub kind: crate::error::RuntimeErrorKind,
    pub value: Option<Rc<Expr>>,
    pub re_raise_if: Option<Rc<Expr>>,
}

/// A conversion expression node.
///
/// `Expr` never stores a compiled closure; `crate::lower` renders an `Expr`
/// tree into executable form. The only "code" an `Expr` carries directly is
/// a `NativeFn` (for `call`/`call_method`/`inline` escape hatches), which is
/// opaque data from the algebra's point of view.
#[derive(Clone)]
pub enum Expr {
    This,
    Left,
    Right,
    Chunk,
    Prev,
    Const(Value),
    InputArg(Rc<str>),
    /// Deep indexing with an optional fallback: `this[k1][k2]…` or `default`.
    Item {
        base: Rc<Expr>,
        keys: Vec<Rc<Expr>>,
        default: Option<Rc<Expr>>,
    },
    /// Sugar over `Item` with string keys, kept distinct so dependency
    /// analysis / debug rendering can tell "attribute" from "index" access
    /// apart, per the algebra's documented closed set.
    Attr {
        base: Rc<Expr>,
        names: Vec<Rc<str>>,
        default: Option<Rc<Expr>>,
    },
    BinOp(BinOp, Rc<Expr>, Rc<Expr>),
    Not(Rc<Expr>),
    And(Vec<Rc<Expr>>),
    Or(Vec<Rc<Expr>>),
    Call(NativeFn, Vec<Rc<Expr>>),
    CallMethod(Rc<Expr>, Rc<str>, Vec<Rc<Expr>>),
    AsType(Rc<Expr>, TargetType),
    If(Rc<Expr>, Rc<Expr>, Rc<Expr>),
    IfMultiple(Vec<(Rc<Expr>, Rc<Expr>)>, Rc<Expr>),
    Dispatch {
        key: Rc<Expr>,
        table: Vec<(Value, Rc<Expr>)>,
        default: Rc<Expr>,
    },
    AndThen(Rc<Expr>, Option<Rc<Expr>>),

    ListLit(Vec<CollectionItem>),
    TupleLit(Vec<CollectionItem>),
    SetLit(Vec<CollectionItem>),
    DictLit(Vec<(CollectionItem, Rc<Expr>)>),

    /// `list_comp`/`tuple_comp`/`set_comp`/`generator_comp`, all with an
    /// optional `where`. Iterates `this` (expected to be a sequence).
    Comprehension {
        kind: ComprehensionKind,
        elt: Rc<Expr>,
        where_: Option<Rc<Expr>>,
    },
    /// `dict_comp(key, value, where?)`.
    DictComprehension {
        key: Rc<Expr>,
        value: Rc<Expr>,
        where_: Option<Rc<Expr>>,
    },
    /// `iter(elt, where?)`; `iter_mut` reuses this node with `elt` an
    /// in-place-mutating expression — the algebra does not distinguish the
    /// two at the node level, only at the builder surface.
    Iter {
        elt: Rc<Expr>,
        where_: Option<Rc<Expr>>,
    },

    Pipe {
        from: Rc<Expr>,
        to: Rc<Expr>,
        label_input: Vec<(Rc<str>, Rc<Expr>)>,
        label_output: Vec<(Rc<str>, Rc<Expr>)>,
    },
    Label(Rc<str>),

    /// `.filter(cond)` — filters the **result** of the preceding stage,
    /// distinct from a `where` clause which filters elements entering it.
    Filter(Rc<Expr>, Rc<Expr>),
    Sort {
        source: Rc<Expr>,
        key: Option<Rc<Expr>>,
        reverse: bool,
    },
    TakeWhile(Rc<Expr>, Rc<Expr>),
    DropWhile(Rc<Expr>, Rc<Expr>),
    IterUnique {
        source: Rc<Expr>,
        by: Option<Rc<Expr>>,
    },
    IterWindows {
        source: Rc<Expr>,
        size: usize,
        step: usize,
    },
    ChunkBy {
        source: Rc<Expr>,
        keys: Vec<Rc<Expr>>,
        size: Option<usize>,
    },
    ChunkByCondition {
        source: Rc<Expr>,
        pred: Rc<Expr>,
    },
    UnorderedChunkBy {
        source: Rc<Expr>,
        key: Rc<Expr>,
        size: Option<usize>,
        max_items_in_memory: Option<usize>,
        portion_to_pop: f64,
    },

    Cumulative {
        source: Rc<Expr>,
        initial: Rc<Expr>,
        fold: Rc<Expr>,
        label_name: Rc<str>,
    },
    CumulativeReset(Rc<str>, Rc<Expr>),

    /// Holds an aggregate "spec" expression (typically a collection literal)
    /// whose leaves may contain `Reduce` nodes, evaluated over `this` (a
    /// sequence of rows) in a single fused pass.
    Aggregate(Rc<Expr>),
    GroupBy {
        source: Rc<Expr>,
        keys: Vec<Rc<Expr>>,
        post: Rc<Expr>,
    },
    /// A reducer participating in an enclosing `Aggregate`/`GroupBy`.
    Reduce(ReducerSpec),

    Join {
        left: Rc<Expr>,
        right: Rc<Expr>,
        predicate: Rc<Expr>,
        how: JoinHow,
    },

    Zip(Vec<Rc<Expr>>),
    ZipLongest(Vec<Rc<Expr>>, Rc<Expr>),
    Flatten(Rc<Expr>),

    Try(Rc<Expr>, Vec<ExceptHandler>),
    Expect(Rc<Expr>, Rc<Expr>),
}

impl std::fmt::Debug for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // A debug rendering is all the IR dump the debug sidecar needs —
        // there is no textual source to pretty-print in this lowering
        // strategy.
        write!(f, "{}", crate::debug::render(self))
    }
}

impl Expr {
    pub fn rc(self) -> Rc<Expr> {
        Rc::new(self)
    }

    // ---- smart constructors that "mutate" by wrapping -------------------

    pub fn filter(self: &Rc<Self>, cond: Rc<Expr>) -> Rc<Expr> {
        Expr::Filter(self.clone(), cond).rc()
    }

    pub fn pipe(self: &Rc<Self>, to: Rc<Expr>) -> Rc<Expr> {
        Expr::Pipe {
            from: self.clone(),
            to,
            label_input: vec![],
            label_output: vec![],
        }
        .rc()
    }

    pub fn pipe_with_labels(
        self: &Rc<Self>,
        to: Rc<Expr>,
        label_input: Vec<(Rc<str>, Rc<Expr>)>,
        label_output: Vec<(Rc<str>, Rc<Expr>)>,
    ) -> Rc<Expr> {
        Expr::Pipe {
            from: self.clone(),
            to,
            label_input,
            label_output,
        }
        .rc()
    }

    pub fn as_type(self: &Rc<Self>, t: TargetType) -> Rc<Expr> {
        Expr::AsType(self.clone(), t).rc()
    }

    pub fn sort(self: &Rc<Self>, key: Option<Rc<Expr>>, reverse: bool) -> Rc<Expr> {
        Expr::Sort {
            source: self.clone(),
            key,
            reverse,
        }
        .rc()
    }

    pub fn take_while(self: &Rc<Self>, cond: Rc<Expr>) -> Rc<Expr> {
        Expr::TakeWhile(self.clone(), cond).rc()
    }

    pub fn drop_while(self: &Rc<Self>, cond: Rc<Expr>) -> Rc<Expr> {
        Expr::DropWhile(self.clone(), cond).rc()
    }

    pub fn aggregate(self: &Rc<Self>, spec: Rc<Expr>) -> Rc<Expr> {
        // `self` is the row source (`this` by convention when omitted), kept
        // as an explicit pipe so `X.aggregate(...)` and `group_by(...).aggregate(...)`
        // share one representation.
        Expr::Pipe {
            from: self.clone(),
            to: Expr::Aggregate(spec).rc(),
            label_input: vec![],
            label_output: vec![],
        }
        .rc()
    }

    pub fn group_by(self: &Rc<Self>, keys: Vec<Rc<Expr>>) -> GroupByBuilder {
        GroupByBuilder {
            source: self.clone(),
            keys,
        }
    }
}

/// Intermediate builder for `X.group_by(keys).aggregate(post)`.
pub struct GroupByBuilder {
    source: Rc<Expr>,
    keys: Vec<Rc<Expr>>,
}

impl GroupByBuilder {
    pub fn aggregate(self, post: Rc<Expr>) -> Rc<Expr> {
        Expr::GroupBy {
            source: self.source,
            keys: self.keys,
            post,
        }
        .rc()
    }
}

/// Structural equality used only to validate that a group key referenced
/// outside a reducer inside an aggregate expression matches a declared
/// group-by key exactly. Two `Call`/`Reduce`
/// nodes compare equal only when they share the same captured identity —
/// closures have no meaningful structural equality otherwise.
pub fn expr_eq(a: &Expr, b: &Expr) -> bool {
    use Expr::*;
    match (a, b) {
        (This, This) | (Left, Left) | (Right, Right) | (Chunk, Chunk) | (Prev, Prev) => true,
        (Const(x), Const(y)) => x == y,
        (InputArg(x), InputArg(y)) => x == y,
        (
            Item {
                base: b1,
                keys: k1,
                default: d1,
            },
            Item {
                base: b2,
                keys: k2,
                default: d2,
            },
        ) => {
            expr_eq(b1, b2)
                && k1.len() == k2.len()
                && k1.iter().zip(k2).all(|(x, y)| expr_eq(x, y))
                && opt_expr_eq(d1, d2)
        }
        (
            Attr {
                base: b1,
                names: n1,
                default: d1,
            },
            Attr {
                base: b2,
                names: n2,
                default: d2,
            },
        ) => expr_eq(b1, b2) && n1 == n2 && opt_expr_eq(d1, d2),
        (BinOp(o1, l1, r1), BinOp(o2, l2, r2)) => o1 == o2 && expr_eq(l1, l2) && expr_eq(r1, r2),
        (Call(f1, a1), Call(f2, a2)) => {
            f1.same_as(f2) && a1.len() == a2.len() && a1.iter().zip(a2).all(|(x, y)| expr_eq(x, y))
        }
        (Reduce(r1), Reduce(r2)) => r1.same_as(r2),
        _ => false,
    }
}

fn opt_expr_eq(a: &Option<Rc<Expr>>, b: &Option<Rc<Expr>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => expr_eq(x, y),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expr_eq_matches_structurally_identical_item_access() {
        let a = Expr::Item {
            base: Expr::This.rc(),
            keys: vec![Expr::Const(Value::str("b")).rc()],
            default: None,
        };
        let b = Expr::Item {
            base: Expr::This.rc(),
            keys: vec![Expr::Const(Value::str("b")).rc()],
            default: None,
        };
        assert!(expr_eq(&a, &b));
        let c = Expr::Item {
            base: Expr::This.rc(),
            keys: vec![Expr::Const(Value::str("a")).rc()],
            default: None,
        };
        assert!(!expr_eq(&a, &c));
    }
}
