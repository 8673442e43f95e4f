//! The `c::` surface: free functions and chain methods that assemble an
//! `Expr` tree, one free function and one method at a time. Nothing here
//! evaluates anything — every function just builds and returns a new
//! `Rc<Expr>`.

use crate::converter::{self, Converter};
use crate::error::{ConvtoolsError, RuntimeError, RuntimeErrorKind};
use crate::expr::{
    CollectionItem, ComprehensionKind, Expr, ExceptHandler, JoinHow, NativeFn, TargetType,
};
use crate::options::Options;
use crate::reducer::{ReducerKind, ReducerSpec};
use crate::value::Value;
use std::rc::Rc;

// ---- pseudo-inputs -------------------------------------------------------

pub fn this() -> Rc<Expr> {
    Expr::This.rc()
}
pub fn left() -> Rc<Expr> {
    Expr::Left.rc()
}
pub fn right() -> Rc<Expr> {
    Expr::Right.rc()
}
pub fn chunk() -> Rc<Expr> {
    Expr::Chunk.rc()
}
pub fn prev() -> Rc<Expr> {
    Expr::Prev.rc()
}

/// A runtime constant captured by the expression (a "naive value").
pub fn naive(v: impl Into<Value>) -> Rc<Expr> {
    Expr::Const(v.into()).rc()
}

pub fn input_arg(name: impl Into<Rc<str>>) -> Rc<Expr> {
    Expr::InputArg(name.into()).rc()
}

pub fn label(name: impl Into<Rc<str>>) -> Rc<Expr> {
    Expr::Label(name.into()).rc()
}

// ---- indexing -------------------------------------------------------------

/// `c::item([k1, k2, ...])` — deep indexing into `this`.
pub fn item<K, I>(keys: K) -> Rc<Expr>
where
    K: IntoIterator<Item = I>,
    I: Into<Value>,
{
    item_or(keys, None)
}

pub fn item_or<K, I>(keys: K, default: Option<Rc<Expr>>) -> Rc<Expr>
where
    K: IntoIterator<Item = I>,
    I: Into<Value>,
{
    Expr::Item {
        base: Expr::This.rc(),
        keys: keys
            .into_iter()
            .map(|k| Expr::Const(k.into()).rc())
            .collect(),
        default,
    }
    .rc()
}

pub fn attr<N, S>(names: N) -> Rc<Expr>
where
    N: IntoIterator<Item = S>,
    S: Into<Rc<str>>,
{
    attr_or(names, None)
}

pub fn attr_or<N, S>(names: N, default: Option<Rc<Expr>>) -> Rc<Expr>
where
    N: IntoIterator<Item = S>,
    S: Into<Rc<str>>,
{
    Expr::Attr {
        base: Expr::This.rc(),
        names: names.into_iter().map(Into::into).collect(),
        default,
    }
    .rc()
}

// ---- calls ------------------------------------------------------------

pub fn call_func(
    name: impl Into<Rc<str>>,
    f: impl Fn(&[Value]) -> Result<Value, RuntimeError> + 'static,
    args: Vec<Rc<Expr>>,
) -> Rc<Expr> {
    Expr::Call(NativeFn::new(name, f), args).rc()
}

// ---- control flow -------------------------------------------------------

pub fn if_(cond: Rc<Expr>, then: Rc<Expr>, else_: Rc<Expr>) -> Rc<Expr> {
    Expr::If(cond, then, else_).rc()
}

pub fn if_multiple(branches: Vec<(Rc<Expr>, Rc<Expr>)>, default: Rc<Expr>) -> Rc<Expr> {
    Expr::IfMultiple(branches, default).rc()
}

pub fn dispatch(key: Rc<Expr>, table: Vec<(Value, Rc<Expr>)>, default: Rc<Expr>) -> Rc<Expr> {
    Expr::Dispatch { key, table, default }.rc()
}

pub fn and_(exprs: Vec<Rc<Expr>>) -> Rc<Expr> {
    Expr::And(exprs).rc()
}
pub fn or_(exprs: Vec<Rc<Expr>>) -> Rc<Expr> {
    Expr::Or(exprs).rc()
}

pub fn expect(cond: Rc<Expr>, msg: Rc<Expr>) -> Rc<Expr> {
    Expr::Expect(cond, msg).rc()
}

/// `c::try_(body).except_(kind, value?, re_raise_if?)...`. The chain is
/// finished with `.finish()`, the same terminal-call shape `Expr::group_by`
/// uses for `GroupByBuilder`.
pub struct TryBuilder {
    body: Rc<Expr>,
    handlers: Vec<ExceptHandler>,
}

pub fn try_(body: Rc<Expr>) -> TryBuilder {
    TryBuilder {
        body,
        handlers: Vec::new(),
    }
}

impl TryBuilder {
    pub fn except_(
        mut self,
        kind: RuntimeErrorKind,
        value: Option<Rc<Expr>>,
        re_raise_if: Option<Rc<Expr>>,
    ) -> Self {
        self.handlers.push(ExceptHandler {
            kind,
            value,
            re_raise_if,
        });
        self
    }

    pub fn finish(self) -> Rc<Expr> {
        Expr::Try(self.body, self.handlers).rc()
    }
}

// ---- collections ---------------------------------------------------------

pub fn plain(e: Rc<Expr>) -> CollectionItem {
    CollectionItem::Plain(e)
}

pub fn optional(
    value: Rc<Expr>,
    skip_if: Option<Rc<Expr>>,
    keep_if: Option<Rc<Expr>>,
) -> CollectionItem {
    CollectionItem::Optional {
        value,
        skip_if,
        keep_if,
    }
}

pub fn spread(e: Rc<Expr>) -> CollectionItem {
    CollectionItem::Spread(e)
}

pub fn list(items: Vec<CollectionItem>) -> Rc<Expr> {
    Expr::ListLit(items).rc()
}

pub fn tuple(items: Vec<CollectionItem>) -> Rc<Expr> {
    Expr::TupleLit(items).rc()
}

pub fn set(items: Vec<CollectionItem>) -> Rc<Expr> {
    Expr::SetLit(items).rc()
}

/// One plain `key: value` entry for `c::dict`.
pub fn entry(key: Rc<Expr>, value: Rc<Expr>) -> (CollectionItem, Rc<Expr>) {
    (CollectionItem::Plain(key), value)
}

/// `**mapping` splice for `c::dict`; the second element of the pair is
/// unused by the dict lowering for a spread entry but kept for a uniform
/// tuple shape.
pub fn dict_spread(mapping: Rc<Expr>) -> (CollectionItem, Rc<Expr>) {
    (CollectionItem::Spread(mapping.clone()), mapping)
}

pub fn dict(pairs: Vec<(CollectionItem, Rc<Expr>)>) -> Rc<Expr> {
    Expr::DictLit(pairs).rc()
}

// ---- comprehensions --------------------------------------------------

pub fn list_comp(elt: Rc<Expr>, where_: Option<Rc<Expr>>) -> Rc<Expr> {
    Expr::Comprehension {
        kind: ComprehensionKind::List,
        elt,
        where_,
    }
    .rc()
}
pub fn tuple_comp(elt: Rc<Expr>, where_: Option<Rc<Expr>>) -> Rc<Expr> {
    Expr::Comprehension {
        kind: ComprehensionKind::Tuple,
        elt,
        where_,
    }
    .rc()
}
pub fn set_comp(elt: Rc<Expr>, where_: Option<Rc<Expr>>) -> Rc<Expr> {
    Expr::Comprehension {
        kind: ComprehensionKind::Set,
        elt,
        where_,
    }
    .rc()
}
pub fn generator_comp(elt: Rc<Expr>, where_: Option<Rc<Expr>>) -> Rc<Expr> {
    Expr::Comprehension {
        kind: ComprehensionKind::Generator,
        elt,
        where_,
    }
    .rc()
}
pub fn dict_comp(key: Rc<Expr>, value: Rc<Expr>, where_: Option<Rc<Expr>>) -> Rc<Expr> {
    Expr::DictComprehension { key, value, where_ }.rc()
}
pub fn iter(elt: Rc<Expr>, where_: Option<Rc<Expr>>) -> Rc<Expr> {
    Expr::Iter { elt, where_ }.rc()
}

// ---- labels, cumulative state ------------------------------------------

/// `add_label(name, e)` — sugar for `this.pipe(this, label_input={name: e})`.
pub fn add_label(name: impl Into<Rc<str>>, e: Rc<Expr>) -> Rc<Expr> {
    Expr::This
        .rc()
        .pipe_with_labels(Expr::This.rc(), vec![(name.into(), e)], vec![])
}

pub fn cumulative(
    source: Rc<Expr>,
    initial: Rc<Expr>,
    fold: Rc<Expr>,
    label_name: Option<&str>,
) -> Rc<Expr> {
    let name: Rc<str> = match label_name {
        Some(n) => n.into(),
        None => format!("__cumulative_{:x}", Rc::as_ptr(&fold) as usize).into(),
    };
    Expr::Cumulative {
        source,
        initial,
        fold,
        label_name: name,
    }
    .rc()
}

pub fn cumulative_reset(label_name: impl Into<Rc<str>>, inner: Rc<Expr>) -> Rc<Expr> {
    Expr::CumulativeReset(label_name.into(), inner).rc()
}

// ---- joins, zips ----------------------------------------------------------

pub fn join(left: Rc<Expr>, right: Rc<Expr>, predicate: Rc<Expr>, how: JoinHow) -> Rc<Expr> {
    Expr::Join {
        left,
        right,
        predicate,
        how,
    }
    .rc()
}

pub fn zip(items: Vec<Rc<Expr>>) -> Rc<Expr> {
    Expr::Zip(items).rc()
}

pub fn zip_longest(items: Vec<Rc<Expr>>, fill: Rc<Expr>) -> Rc<Expr> {
    Expr::ZipLongest(items, fill).rc()
}

// ---- reducers (`c::ReduceFuncs.*`, flattened to free functions) ----------

fn reduce(kind: ReducerKind, input: Rc<Expr>) -> Rc<Expr> {
    Expr::Reduce(ReducerSpec::new(kind, input)).rc()
}

pub fn sum(input: Rc<Expr>) -> Rc<Expr> {
    reduce(ReducerKind::Sum, input)
}
pub fn sum_or_none(input: Rc<Expr>) -> Rc<Expr> {
    reduce(ReducerKind::SumOrNone, input)
}
pub fn max(input: Rc<Expr>) -> Rc<Expr> {
    reduce(ReducerKind::Max, input)
}
pub fn min(input: Rc<Expr>) -> Rc<Expr> {
    reduce(ReducerKind::Min, input)
}
pub fn max_row(input: Rc<Expr>) -> Rc<Expr> {
    reduce(ReducerKind::MaxRow, input)
}
pub fn min_row(input: Rc<Expr>) -> Rc<Expr> {
    reduce(ReducerKind::MinRow, input)
}
pub fn count(input: Rc<Expr>) -> Rc<Expr> {
    reduce(ReducerKind::Count, input)
}
pub fn count_distinct(input: Rc<Expr>) -> Rc<Expr> {
    reduce(ReducerKind::CountDistinct, input)
}
pub fn first(input: Rc<Expr>) -> Rc<Expr> {
    reduce(ReducerKind::First, input)
}
pub fn last(input: Rc<Expr>) -> Rc<Expr> {
    reduce(ReducerKind::Last, input)
}
pub fn average(input: Rc<Expr>) -> Rc<Expr> {
    reduce(ReducerKind::Average, input)
}
pub fn median(input: Rc<Expr>) -> Rc<Expr> {
    reduce(ReducerKind::Median, input)
}
pub fn mode(input: Rc<Expr>) -> Rc<Expr> {
    reduce(ReducerKind::Mode, input)
}
pub fn array(input: Rc<Expr>) -> Rc<Expr> {
    reduce(ReducerKind::Array, input)
}
pub fn array_distinct(input: Rc<Expr>) -> Rc<Expr> {
    reduce(ReducerKind::ArrayDistinct, input)
}
pub fn array_sorted(input: Rc<Expr>) -> Rc<Expr> {
    reduce(ReducerKind::ArraySorted, input)
}

pub fn percentile(input: Rc<Expr>, p: f64) -> Rc<Expr> {
    Expr::Reduce(ReducerSpec::new(ReducerKind::Percentile, input).with_param(p)).rc()
}
pub fn top_k(input: Rc<Expr>, k: usize) -> Rc<Expr> {
    Expr::Reduce(ReducerSpec::new(ReducerKind::TopK, input).with_param(k as f64)).rc()
}

fn dict_reduce(kind: ReducerKind, dict_key: Rc<Expr>, input: Rc<Expr>) -> Rc<Expr> {
    Expr::Reduce(ReducerSpec::new(kind, input).with_dict_key(dict_key)).rc()
}
pub fn dict_sum(key: Rc<Expr>, input: Rc<Expr>) -> Rc<Expr> {
    dict_reduce(ReducerKind::DictSum, key, input)
}
pub fn dict_array(key: Rc<Expr>, input: Rc<Expr>) -> Rc<Expr> {
    dict_reduce(ReducerKind::DictArray, key, input)
}
pub fn dict_count(key: Rc<Expr>, input: Rc<Expr>) -> Rc<Expr> {
    dict_reduce(ReducerKind::DictCount, key, input)
}
pub fn dict_first(key: Rc<Expr>, input: Rc<Expr>) -> Rc<Expr> {
    dict_reduce(ReducerKind::DictFirst, key, input)
}
pub fn dict_last(key: Rc<Expr>, input: Rc<Expr>) -> Rc<Expr> {
    dict_reduce(ReducerKind::DictLast, key, input)
}

// ---- chain methods on an already-built expression ------------------------

/// Chain methods that read naturally off any `Rc<Expr>` — arithmetic,
/// comparisons, type coercion, reducer modifiers, and the terminal
/// `gen_converter`/`execute` calls. Kept as a trait (rather than more
/// inherent methods on `Expr` in `src/expr.rs`) because several of these —
/// the reducer modifiers, `gen_converter` — reach into sibling modules
/// (`reducer`, `converter`) that `expr.rs` has no reason to depend on.
pub trait ExprExt {
    fn add(&self, other: Rc<Expr>) -> Rc<Expr>;
    fn sub(&self, other: Rc<Expr>) -> Rc<Expr>;
    fn mul(&self, other: Rc<Expr>) -> Rc<Expr>;
    fn div(&self, other: Rc<Expr>) -> Rc<Expr>;
    fn floordiv(&self, other: Rc<Expr>) -> Rc<Expr>;
    fn modulo(&self, other: Rc<Expr>) -> Rc<Expr>;
    fn eq_(&self, other: Rc<Expr>) -> Rc<Expr>;
    fn ne_(&self, other: Rc<Expr>) -> Rc<Expr>;
    fn lt_(&self, other: Rc<Expr>) -> Rc<Expr>;
    fn le_(&self, other: Rc<Expr>) -> Rc<Expr>;
    fn gt_(&self, other: Rc<Expr>) -> Rc<Expr>;
    fn ge_(&self, other: Rc<Expr>) -> Rc<Expr>;
    fn in_(&self, other: Rc<Expr>) -> Rc<Expr>;
    fn not_in(&self, other: Rc<Expr>) -> Rc<Expr>;
    fn is_(&self, other: Rc<Expr>) -> Rc<Expr>;
    fn is_not(&self, other: Rc<Expr>) -> Rc<Expr>;
    fn not_(&self) -> Rc<Expr>;
    fn and_then(&self, cond: Option<Rc<Expr>>) -> Rc<Expr>;

    fn item(&self, keys: Vec<Rc<Expr>>, default: Option<Rc<Expr>>) -> Rc<Expr>;
    fn attr(&self, names: Vec<Rc<str>>, default: Option<Rc<Expr>>) -> Rc<Expr>;
    fn call_method(&self, name: impl Into<Rc<str>>, args: Vec<Rc<Expr>>) -> Rc<Expr>;

    fn as_type_int(&self) -> Rc<Expr>;
    fn as_type_float(&self) -> Rc<Expr>;
    fn as_type_str(&self) -> Rc<Expr>;
    fn as_type_bool(&self) -> Rc<Expr>;
    fn as_type_list(&self) -> Rc<Expr>;
    fn as_type_set(&self) -> Rc<Expr>;

    fn iter_unique(&self, by: Option<Rc<Expr>>) -> Rc<Expr>;
    fn iter_windows(&self, size: usize, step: usize) -> Rc<Expr>;
    fn chunk_by(&self, keys: Vec<Rc<Expr>>, size: Option<usize>) -> Rc<Expr>;
    fn chunk_by_condition(&self, pred: Rc<Expr>) -> Rc<Expr>;
    fn unordered_chunk_by(
        &self,
        key: Rc<Expr>,
        size: Option<usize>,
        max_items_in_memory: Option<usize>,
        portion_to_pop: f64,
    ) -> Rc<Expr>;
    fn flatten(&self) -> Rc<Expr>;

    /// Attach a `where` guard to a reducer built by one of the free
    /// functions above (`c::sum`, `c::array`, ...).
    fn where_(&self, cond: Rc<Expr>) -> Rc<Expr>;
    /// Override a reducer's declared "no rows observed" default.
    fn reducer_default(&self, default: Value) -> Rc<Expr>;

    fn gen_converter(&self, options: Options) -> Result<Converter, ConvtoolsError>;
    /// One-shot compile-then-run, for call sites that don't reuse the
    /// converter.
    fn execute(&self, input: Value) -> Result<Value, ConvtoolsError>;
}

impl ExprExt for Rc<Expr> {
    fn add(&self, other: Rc<Expr>) -> Rc<Expr> {
        Expr::BinOp(crate::expr::BinOp::Add, self.clone(), other).rc()
    }
    fn sub(&self, other: Rc<Expr>) -> Rc<Expr> {
        Expr::BinOp(crate::expr::BinOp::Sub, self.clone(), other).rc()
    }
    fn mul(&self, other: Rc<Expr>) -> Rc<Expr> {
        Expr::BinOp(crate::expr::BinOp::Mul, self.clone(), other).rc()
    }
    fn div(&self, other: Rc<Expr>) -> Rc<Expr> {
        Expr::BinOp(crate::expr::BinOp::Div, self.clone(), other).rc()
    }
    fn floordiv(&self, other: Rc<Expr>) -> Rc<Expr> {
        Expr::BinOp(crate::expr::BinOp::FloorDiv, self.clone(), other).rc()
    }
    fn modulo(&self, other: Rc<Expr>) -> Rc<Expr> {
        Expr::BinOp(crate::expr::BinOp::Mod, self.clone(), other).rc()
    }
    fn eq_(&self, other: Rc<Expr>) -> Rc<Expr> {
        Expr::BinOp(crate::expr::BinOp::Eq, self.clone(), other).rc()
    }
    fn ne_(&self, other: Rc<Expr>) -> Rc<Expr> {
        Expr::BinOp(crate::expr::BinOp::Ne, self.clone(), other).rc()
    }
    fn lt_(&self, other: Rc<Expr>) -> Rc<Expr> {
        Expr::BinOp(crate::expr::BinOp::Lt, self.clone(), other).rc()
    }
    fn le_(&self, other: Rc<Expr>) -> Rc<Expr> {
        Expr::BinOp(crate::expr::BinOp::Le, self.clone(), other).rc()
    }
    fn gt_(&self, other: Rc<Expr>) -> Rc<Expr> {
        Expr::BinOp(crate::expr::BinOp::Gt, self.clone(), other).rc()
    }
    fn ge_(&self, other: Rc<Expr>) -> Rc<Expr> {
        Expr::BinOp(crate::expr::BinOp::Ge, self.clone(), other).rc()
    }
    fn in_(&self, other: Rc<Expr>) -> Rc<Expr> {
        Expr::BinOp(crate::expr::BinOp::In, self.clone(), other).rc()
    }
    fn not_in(&self, other: Rc<Expr>) -> Rc<Expr> {
        Expr::BinOp(crate::expr::BinOp::NotIn, self.clone(), other).rc()
    }
    fn is_(&self, other: Rc<Expr>) -> Rc<Expr> {
        Expr::BinOp(crate::expr::BinOp::Is, self.clone(), other).rc()
    }
    fn is_not(&self, other: Rc<Expr>) -> Rc<Expr> {
        Expr::BinOp(crate::expr::BinOp::IsNot, self.clone(), other).rc()
    }
    fn not_(&self) -> Rc<Expr> {
        Expr::Not(self.clone()).rc()
    }
    fn and_then(&self, cond: Option<Rc<Expr>>) -> Rc<Expr> {
        Expr::AndThen(self.clone(), cond).rc()
    }

    fn item(&self, keys: Vec<Rc<Expr>>, default: Option<Rc<Expr>>) -> Rc<Expr> {
        Expr::Item {
            base: self.clone(),
            keys,
            default,
        }
        .rc()
    }
    fn attr(&self, names: Vec<Rc<str>>, default: Option<Rc<Expr>>) -> Rc<Expr> {
        Expr::Attr {
            base: self.clone(),
            names,
            default,
        }
        .rc()
    }
    fn call_method(&self, name: impl Into<Rc<str>>, args: Vec<Rc<Expr>>) -> Rc<Expr> {
        Expr::CallMethod(self.clone(), name.into(), args).rc()
    }

    fn as_type_int(&self) -> Rc<Expr> {
        self.as_type(TargetType::Int)
    }
    fn as_type_float(&self) -> Rc<Expr> {
        self.as_type(TargetType::Float)
    }
    fn as_type_str(&self) -> Rc<Expr> {
        self.as_type(TargetType::Str)
    }
    fn as_type_bool(&self) -> Rc<Expr> {
        self.as_type(TargetType::Bool)
    }
    fn as_type_list(&self) -> Rc<Expr> {
        self.as_type(TargetType::List)
    }
    fn as_type_set(&self) -> Rc<Expr> {
        self.as_type(TargetType::Set)
    }

    fn iter_unique(&self, by: Option<Rc<Expr>>) -> Rc<Expr> {
        Expr::IterUnique {
            source: self.clone(),
            by,
        }
        .rc()
    }
    fn iter_windows(&self, size: usize, step: usize) -> Rc<Expr> {
        Expr::IterWindows {
            source: self.clone(),
            size,
            step,
        }
        .rc()
    }
    fn chunk_by(&self, keys: Vec<Rc<Expr>>, size: Option<usize>) -> Rc<Expr> {
        Expr::ChunkBy {
            source: self.clone(),
            keys,
            size,
        }
        .rc()
    }
    fn chunk_by_condition(&self, pred: Rc<Expr>) -> Rc<Expr> {
        Expr::ChunkByCondition {
            source: self.clone(),
            pred,
        }
        .rc()
    }
    fn unordered_chunk_by(
        &self,
        key: Rc<Expr>,
        size: Option<usize>,
        max_items_in_memory: Option<usize>,
        portion_to_pop: f64,
    ) -> Rc<Expr> {
        Expr::UnorderedChunkBy {
            source: self.clone(),
            key,
            size,
            max_items_in_memory,
            portion_to_pop,
        }
        .rc()
    }
    fn flatten(&self) -> Rc<Expr> {
        Expr::Flatten(self.clone()).rc()
    }

    fn where_(&self, cond: Rc<Expr>) -> Rc<Expr> {
        match &**self {
            Expr::Reduce(spec) => Expr::Reduce(spec.clone().with_where(cond)).rc(),
            _ => panic!("`.where_` only applies to a reducer expression"),
        }
    }
    fn reducer_default(&self, default: Value) -> Rc<Expr> {
        match &**self {
            Expr::Reduce(spec) => Expr::Reduce(spec.clone().with_default(default)).rc(),
            _ => panic!("`.reducer_default` only applies to a reducer expression"),
        }
    }

    fn gen_converter(&self, options: Options) -> Result<Converter, ConvtoolsError> {
        converter::gen_converter(self.clone(), options)
    }
    fn execute(&self, input: Value) -> Result<Value, ConvtoolsError> {
        self.gen_converter(Options::default())?.convert(input)
    }
}
