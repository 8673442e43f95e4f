//! Dependency analysis: per-node content-type bitmask and free names.
//!
//! The full inlining heuristic ("materialize when
//! referenced at more than one use site and EXPENSIVE") is a source-emission
//! concern; this lowering strategy renders every node to one `Rc`-shared
//! closure regardless; duplication of *work*, not of *text*, is what the
//! bitmask here is used to prevent (and to validate group-by keys / reject
//! nested reducers — the two places analysis is compile-time-observable
//! rather than purely an optimization).

use crate::context::CompileContext;
use crate::expr::{expr_eq, CollectionItem, Expr};
use crate::reducer::ReducerSpec;
use crate::error::CompileError;
use rustc_hash::FxHashSet;
use std::rc::Rc;

/// A minimal hand-rolled bitmask — six constants don't earn a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentType(u8);

impl ContentType {
    pub const CONST: ContentType = ContentType(1 << 0);
    pub const USES_INPUT: ContentType = ContentType(1 << 1);
    pub const USES_INPUT_ARG: ContentType = ContentType(1 << 2);
    pub const USES_LABEL: ContentType = ContentType(1 << 3);
    pub const SIDE_EFFECT: ContentType = ContentType(1 << 4);
    pub const CONTAINS_REDUCER: ContentType = ContentType(1 << 5);

    pub const EMPTY: ContentType = ContentType(0);

    pub fn contains(self, other: ContentType) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: ContentType) -> ContentType {
        ContentType(self.0 | other.0)
    }
}

impl std::ops::BitOr for ContentType {
    type Output = ContentType;
    fn bitor(self, rhs: ContentType) -> ContentType {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for ContentType {
    fn bitor_assign(&mut self, rhs: ContentType) {
        *self = self.union(rhs);
    }
}

impl Default for ContentType {
    fn default() -> Self {
        ContentType::EMPTY
    }
}

/// Computes the content-type bitmask for `expr` by walking its full subtree.
/// Used to decide, e.g., whether a pipe stage's `from` side may write a
/// label (`SIDE_EFFECT`) and therefore must be evaluated exactly once.
pub fn content_type(expr: &Expr) -> ContentType {
    let mut ty = match expr {
        Expr::Const(_) => ContentType::CONST,
        Expr::This | Expr::Left | Expr::Right | Expr::Chunk | Expr::Prev => ContentType::USES_INPUT,
        Expr::InputArg(_) => ContentType::USES_INPUT_ARG,
        Expr::Label(_) => ContentType::USES_LABEL,
        Expr::Pipe { label_input, label_output, .. } => {
            if label_input.is_empty() && label_output.is_empty() {
                ContentType::EMPTY
            } else {
                ContentType::SIDE_EFFECT
            }
        }
        Expr::Cumulative { .. } | Expr::CumulativeReset(..) => ContentType::SIDE_EFFECT,
        Expr::Reduce(_) => ContentType::CONTAINS_REDUCER,
        _ => ContentType::EMPTY,
    };
    walk_children(expr, &mut |child| ty |= content_type(child));
    ty
}

/// Collects every `Reduce` node reachable from `expr` without descending
/// into another `Reduce`'s subtree (reducers cannot nest, so the first one
/// found on any path is the boundary).
pub fn collect_reducers(expr: &Expr, out: &mut Vec<ReducerSpec>) {
    match expr {
        Expr::Reduce(spec) => {
            out.push(spec.clone());
            // do not descend into spec.input/where_/dict_key here — nested
            // reducer validation does that separately, deliberately.
        }
        _ => walk_children(expr, &mut |child| collect_reducers(child, out)),
    }
}

/// Invariant: a reducer may not appear inside another
/// reducer's input/guard/secondary-key.
pub fn validate_no_nested_reducers(spec: &ReducerSpec) -> Result<(), CompileError> {
    let mut found = Vec::new();
    collect_reducers(&spec.input, &mut found);
    if let Some(where_) = &spec.where_ {
        collect_reducers(where_, &mut found);
    }
    if let Some(k) = &spec.dict_key {
        collect_reducers(k, &mut found);
    }
    if found.is_empty() {
        Ok(())
    } else {
        Err(CompileError::NestedReducer)
    }
}

/// Invariant: every group-key reference in the
/// post-aggregate expression, outside of a reducer, must match a declared
/// group-by key expression exactly.
pub fn validate_group_keys(post: &Expr, keys: &[Rc<Expr>]) -> Result<(), CompileError> {
    check_keys(post, keys)
}

/// Walk the whole tree once, up front (`gen_converter` time, never inside
/// the per-row evaluation loop), validating every `GroupBy` it finds: its
/// reducers must not nest, and its post-expression may only reference a
/// group key it declared.
pub fn validate_tree(expr: &Expr) -> Result<(), CompileError> {
    if let Expr::GroupBy { keys, post, .. } = expr {
        validate_group_keys(post, keys)?;
        for reducer in crate::aggregate::collect_reducer_table(post) {
            validate_no_nested_reducers(&reducer)?;
        }
    }
    if let Expr::Reduce(spec) = expr {
        validate_no_nested_reducers(spec)?;
    }
    let mut result = Ok(());
    walk_children(expr, &mut |child| {
        if result.is_ok() {
            result = validate_tree(child);
        }
    });
    result
}

/// Invariant: a `label(name)` read must be dominated, in `crate::lower::eval`'s
/// actual evaluation order, by a write to that name — `pipe`'s
/// `label_input`/`label_output` entries, `cumulative`'s `label_name`, or
/// `cumulative_reset`'s target. Unlike `walk_children`'s purely structural
/// enumeration, writes performed in only one arm of a conditional (`if`,
/// `dispatch`, an `except_` handler, a short-circuited `and`/`or` operand) do
/// not dominate code that runs after the conditional, and nothing written
/// inside a comprehension/aggregate/join/group-by body escapes it — the
/// source feeding that body may be empty, so no write there is guaranteed.
///
/// Every write site registers its name with `ctx`; every read that resolves
/// marks its name used, so `ctx.unused_labels()` reports genuinely dead
/// labels once the whole tree has been walked.
pub fn validate_labels(expr: &Expr, ctx: &mut CompileContext) -> Result<(), CompileError> {
    walk_labels(expr, &FxHashSet::default(), ctx)?;
    Ok(())
}

fn intersect_all(mut sets: Vec<FxHashSet<Rc<str>>>) -> FxHashSet<Rc<str>> {
    match sets.pop() {
        None => FxHashSet::default(),
        Some(first) => sets.into_iter().fold(first, |acc, s| acc.intersection(&s).cloned().collect()),
    }
}

/// Returns the set of label names guaranteed written after evaluating
/// `expr`, starting from `avail` (what's guaranteed written before it).
fn walk_labels(
    expr: &Expr,
    avail: &FxHashSet<Rc<str>>,
    ctx: &mut CompileContext,
) -> Result<FxHashSet<Rc<str>>, CompileError> {
    use Expr::*;
    match expr {
        Label(name) => {
            if avail.contains(name) {
                ctx.mark_label_used(name);
                Ok(avail.clone())
            } else {
                Err(CompileError::UnknownLabel(name.to_string()))
            }
        }

        Pipe { from, to, label_input, label_output } => {
            let mut cur = walk_labels(from, avail, ctx)?;
            for (name, e) in label_input {
                cur = walk_labels(e, &cur, ctx)?;
                ctx.register_label(name);
                cur.insert(name.clone());
            }
            cur = walk_labels(to, &cur, ctx)?;
            for (name, e) in label_output {
                cur = walk_labels(e, &cur, ctx)?;
                ctx.register_label(name);
                cur.insert(name.clone());
            }
            Ok(cur)
        }

        CumulativeReset(name, source) => {
            let mut cur = walk_labels(source, avail, ctx)?;
            ctx.register_label(name);
            cur.insert(name.clone());
            Ok(cur)
        }

        Cumulative { source, initial, fold, label_name } => {
            let cur = walk_labels(source, avail, ctx)?;
            ctx.register_label(label_name);
            // `initial` only ever runs for the first element, before any
            // write has happened — it may not read `label_name`.
            walk_labels(initial, &cur, ctx)?;
            // `fold` only ever runs from the second element on, by which
            // point the first element's branch already wrote `label_name`.
            let mut fold_avail = cur.clone();
            fold_avail.insert(label_name.clone());
            walk_labels(fold, &fold_avail, ctx)?;
            // The construct as a whole does not guarantee the write: an
            // empty source runs neither branch.
            Ok(cur)
        }

        If(cond, then_, else_) => {
            let cur = walk_labels(cond, avail, ctx)?;
            let a = walk_labels(then_, &cur, ctx)?;
            let b = walk_labels(else_, &cur, ctx)?;
            Ok(intersect_all(vec![a, b]))
        }
        IfMultiple(branches, default) => {
            let mut cur = avail.clone();
            let mut outs = Vec::new();
            for (c, t) in branches {
                cur = walk_labels(c, &cur, ctx)?;
                outs.push(walk_labels(t, &cur, ctx)?);
            }
            outs.push(walk_labels(default, &cur, ctx)?);
            Ok(intersect_all(outs))
        }
        Dispatch { key, table, default } => {
            let cur = walk_labels(key, avail, ctx)?;
            let mut outs = Vec::new();
            for (_, v) in table {
                outs.push(walk_labels(v, &cur, ctx)?);
            }
            outs.push(walk_labels(default, &cur, ctx)?);
            Ok(intersect_all(outs))
        }
        And(items) | Or(items) => match items.split_first() {
            // Short-circuiting: only the first operand always runs.
            Some((first, rest)) => {
                let cur = walk_labels(first, avail, ctx)?;
                for r in rest {
                    walk_labels(r, &cur, ctx)?;
                }
                Ok(cur)
            }
            None => Ok(avail.clone()),
        },
        Try(body, handlers) => {
            walk_labels(body, avail, ctx)?;
            for h in handlers {
                if let Some(v) = &h.value {
                    walk_labels(v, avail, ctx)?;
                }
                if let Some(r) = &h.re_raise_if {
                    walk_labels(r, avail, ctx)?;
                }
            }
            // A handler may run instead of `body` reaching its end, so
            // nothing past `try_` can assume `body`'s writes happened.
            Ok(avail.clone())
        }

        // Loop-shaped bodies: the source may be empty, so nothing written
        // inside escapes to the surrounding scope. Each sub-expression is
        // still validated against `avail` (or the source's resulting set,
        // where evaluation genuinely runs once before the loop).
        Comprehension { elt, where_, .. } => {
            walk_labels(elt, avail, ctx)?;
            if let Some(w) = where_ {
                walk_labels(w, avail, ctx)?;
            }
            Ok(avail.clone())
        }
        DictComprehension { key, value, where_ } => {
            walk_labels(key, avail, ctx)?;
            walk_labels(value, avail, ctx)?;
            if let Some(w) = where_ {
                walk_labels(w, avail, ctx)?;
            }
            Ok(avail.clone())
        }
        Iter { elt, where_ } => {
            walk_labels(elt, avail, ctx)?;
            if let Some(w) = where_ {
                walk_labels(w, avail, ctx)?;
            }
            Ok(avail.clone())
        }
        Filter(src, cond) => {
            let cur = walk_labels(src, avail, ctx)?;
            walk_labels(cond, &cur, ctx)?;
            Ok(cur)
        }
        Sort { source, key, .. } => {
            let cur = walk_labels(source, avail, ctx)?;
            if let Some(k) = key {
                walk_labels(k, &cur, ctx)?;
            }
            Ok(cur)
        }
        TakeWhile(src, cond) | DropWhile(src, cond) => {
            let cur = walk_labels(src, avail, ctx)?;
            walk_labels(cond, &cur, ctx)?;
            Ok(cur)
        }
        IterUnique { source, by } => {
            let cur = walk_labels(source, avail, ctx)?;
            if let Some(b) = by {
                walk_labels(b, &cur, ctx)?;
            }
            Ok(cur)
        }
        IterWindows { source, .. } => walk_labels(source, avail, ctx),
        ChunkBy { source, keys, .. } => {
            let cur = walk_labels(source, avail, ctx)?;
            for k in keys {
                walk_labels(k, &cur, ctx)?;
            }
            Ok(cur)
        }
        ChunkByCondition { source, pred } => {
            let cur = walk_labels(source, avail, ctx)?;
            walk_labels(pred, &cur, ctx)?;
            Ok(cur)
        }
        UnorderedChunkBy { source, key, .. } => {
            let cur = walk_labels(source, avail, ctx)?;
            walk_labels(key, &cur, ctx)?;
            Ok(cur)
        }
        Aggregate(spec) => {
            walk_labels(spec, avail, ctx)?;
            Ok(avail.clone())
        }
        GroupBy { source, keys, post } => {
            let cur = walk_labels(source, avail, ctx)?;
            for k in keys {
                walk_labels(k, &cur, ctx)?;
            }
            walk_labels(post, &cur, ctx)?;
            Ok(cur)
        }
        Reduce(spec) => {
            walk_labels(&spec.input, avail, ctx)?;
            if let Some(w) = &spec.where_ {
                walk_labels(w, avail, ctx)?;
            }
            if let Some(k) = &spec.dict_key {
                walk_labels(k, avail, ctx)?;
            }
            Ok(avail.clone())
        }
        Join { left, right, predicate, .. } => {
            let cur = walk_labels(left, avail, ctx)?;
            let cur = walk_labels(right, &cur, ctx)?;
            walk_labels(predicate, &cur, ctx)?;
            Ok(cur)
        }

        // Plain sequential, unconditional, single-shot children: threading
        // availability forward in evaluation order is exact, not merely
        // conservative.
        Item { base, keys, default } => {
            let mut cur = walk_labels(base, avail, ctx)?;
            for k in keys {
                cur = walk_labels(k, &cur, ctx)?;
            }
            if let Some(d) = default {
                // Only runs on a lookup miss, so it cannot add to `cur`.
                walk_labels(d, &cur, ctx)?;
            }
            Ok(cur)
        }
        Attr { base, default, .. } => {
            let cur = walk_labels(base, avail, ctx)?;
            if let Some(d) = default {
                walk_labels(d, &cur, ctx)?;
            }
            Ok(cur)
        }
        BinOp(_, l, r) => {
            let cur = walk_labels(l, avail, ctx)?;
            walk_labels(r, &cur, ctx)
        }
        Not(e) | AsType(e, _) | Flatten(e) => walk_labels(e, avail, ctx),
        Call(_, args) => {
            let mut cur = avail.clone();
            for a in args {
                cur = walk_labels(a, &cur, ctx)?;
            }
            Ok(cur)
        }
        CallMethod(base, _, args) => {
            let mut cur = walk_labels(base, avail, ctx)?;
            for a in args {
                cur = walk_labels(a, &cur, ctx)?;
            }
            Ok(cur)
        }
        AndThen(e, cond) => {
            let cur = walk_labels(e, avail, ctx)?;
            if let Some(c) = cond {
                walk_labels(c, &cur, ctx)?;
            }
            Ok(cur)
        }
        ListLit(items) | TupleLit(items) | SetLit(items) => walk_collection_items_labels(items, avail, ctx),
        DictLit(pairs) => {
            let mut cur = avail.clone();
            for (k, v) in pairs {
                cur = walk_collection_item_labels(k, &cur, ctx)?;
                cur = walk_labels(v, &cur, ctx)?;
            }
            Ok(cur)
        }
        Zip(items) => {
            let mut cur = avail.clone();
            for e in items {
                cur = walk_labels(e, &cur, ctx)?;
            }
            Ok(cur)
        }
        ZipLongest(items, fill) => {
            let mut cur = avail.clone();
            for e in items {
                cur = walk_labels(e, &cur, ctx)?;
            }
            walk_labels(fill, &cur, ctx)
        }
        Expect(cond, msg) => {
            let cur = walk_labels(cond, avail, ctx)?;
            walk_labels(msg, &cur, ctx)
        }

        This | Left | Right | Chunk | Prev | Const(_) | InputArg(_) => Ok(avail.clone()),
    }
}

fn walk_collection_items_labels(
    items: &[CollectionItem],
    avail: &FxHashSet<Rc<str>>,
    ctx: &mut CompileContext,
) -> Result<FxHashSet<Rc<str>>, CompileError> {
    let mut cur = avail.clone();
    for item in items {
        cur = walk_collection_item_labels(item, &cur, ctx)?;
    }
    Ok(cur)
}

fn walk_collection_item_labels(
    item: &CollectionItem,
    avail: &FxHashSet<Rc<str>>,
    ctx: &mut CompileContext,
) -> Result<FxHashSet<Rc<str>>, CompileError> {
    match item {
        CollectionItem::Plain(e) | CollectionItem::Spread(e) => walk_labels(e, avail, ctx),
        CollectionItem::Optional { value, skip_if, keep_if } => {
            let cur = walk_labels(value, avail, ctx)?;
            // `skip_if`/`keep_if` only gate whether the slot is kept, not
            // whether `value` ran, so they don't change `cur`.
            if let Some(s) = skip_if {
                walk_labels(s, avail, ctx)?;
            }
            if let Some(k) = keep_if {
                walk_labels(k, avail, ctx)?;
            }
            Ok(cur)
        }
    }
}

fn check_keys(expr: &Expr, keys: &[Rc<Expr>]) -> Result<(), CompileError> {
    match expr {
        Expr::Reduce(_) => Ok(()), // reducer inputs are not key references
        Expr::This => {
            // With exactly one declared key, `eval_group_by` rebinds `this`
            // to that key's bare value for the post-expression, so a bare
            // `this` reference there is always valid shorthand for it.
            if keys.len() <= 1 || keys.iter().any(|k| expr_eq(k, &Expr::This)) {
                Ok(())
            } else {
                Err(CompileError::UndeclaredGroupKey("this".to_string()))
            }
        }
        Expr::Item { .. } | Expr::Attr { .. } => {
            if keys.iter().any(|k| expr_eq(k, expr)) {
                Ok(())
            } else {
                Err(CompileError::UndeclaredGroupKey(render_short(expr)))
            }
        }
        _ => {
            let mut result = Ok(());
            walk_children(expr, &mut |child| {
                if result.is_ok() {
                    result = check_keys(child, keys);
                }
            });
            result
        }
    }
}

fn render_short(expr: &Expr) -> String {
    format!("{expr:?}")
}

pub(crate) fn walk_children(expr: &Expr, f: &mut dyn FnMut(&Expr)) {
    use Expr::*;
    match expr {
        This | Left | Right | Chunk | Prev | Const(_) | InputArg(_) | Label(_)
        | CumulativeReset(..) => {}
        Item { base, keys, default } => {
            f(base);
            for k in keys {
                f(k);
            }
            if let Some(d) = default {
                f(d);
            }
        }
        Attr { base, default, .. } => {
            f(base);
            if let Some(d) = default {
                f(d);
            }
        }
        BinOp(_, l, r) => {
            f(l);
            f(r);
        }
        Not(e) | AsType(e, _) => f(e),
        And(v) | Or(v) => {
            for e in v {
                f(e);
            }
        }
        Call(_, args) => {
            for a in args {
                f(a);
            }
        }
        CallMethod(base, _, args) => {
            f(base);
            for a in args {
                f(a);
            }
        }
        If(c, t, e) => {
            f(c);
            f(t);
            f(e);
        }
        IfMultiple(branches, default) => {
            for (c, t) in branches {
                f(c);
                f(t);
            }
            f(default);
        }
        Dispatch { key, table, default } => {
            f(key);
            for (_, v) in table {
                f(v);
            }
            f(default);
        }
        AndThen(e, cond) => {
            f(e);
            if let Some(c) = cond {
                f(c);
            }
        }
        ListLit(items) | TupleLit(items) | SetLit(items) => {
            for item in items {
                walk_collection_item(item, f);
            }
        }
        DictLit(pairs) => {
            for (k, v) in pairs {
                walk_collection_item(k, f);
                f(v);
            }
        }
        Comprehension { elt, where_, .. } => {
            f(elt);
            if let Some(w) = where_ {
                f(w);
            }
        }
        DictComprehension { key, value, where_ } => {
            f(key);
            f(value);
            if let Some(w) = where_ {
                f(w);
            }
        }
        Iter { elt, where_ } => {
            f(elt);
            if let Some(w) = where_ {
                f(w);
            }
        }
        Pipe { from, to, label_input, label_output } => {
            f(from);
            f(to);
            for (_, e) in label_input {
                f(e);
            }
            for (_, e) in label_output {
                f(e);
            }
        }
        Filter(src, cond) => {
            f(src);
            f(cond);
        }
        Sort { source, key, .. } => {
            f(source);
            if let Some(k) = key {
                f(k);
            }
        }
        TakeWhile(src, cond) | DropWhile(src, cond) => {
            f(src);
            f(cond);
        }
        IterUnique { source, by } => {
            f(source);
            if let Some(b) = by {
                f(b);
            }
        }
        IterWindows { source, .. } => f(source),
        ChunkBy { source, keys, .. } => {
            f(source);
            for k in keys {
                f(k);
            }
        }
        ChunkByCondition { source, pred } => {
            f(source);
            f(pred);
        }
        UnorderedChunkBy { source, key, .. } => {
            f(source);
            f(key);
        }
        Cumulative { source, initial, fold, .. } => {
            f(source);
            f(initial);
            f(fold);
        }
        Aggregate(spec) => f(spec),
        GroupBy { source, keys, post } => {
            f(source);
            for k in keys {
                f(k);
            }
            f(post);
        }
        Reduce(spec) => {
            f(&spec.input);
            if let Some(w) = &spec.where_ {
                f(w);
            }
            if let Some(k) = &spec.dict_key {
                f(k);
            }
        }
        Join { left, right, predicate, .. } => {
            f(left);
            f(right);
            f(predicate);
        }
        Zip(items) => {
            for e in items {
                f(e);
            }
        }
        ZipLongest(items, fill) => {
            for e in items {
                f(e);
            }
            f(fill);
        }
        Flatten(e) => f(e),
        Try(body, handlers) => {
            f(body);
            for h in handlers {
                if let Some(v) = &h.value {
                    f(v);
                }
                if let Some(r) = &h.re_raise_if {
                    f(r);
                }
            }
        }
        Expect(cond, msg) => {
            f(cond);
            f(msg);
        }
    }
}

fn walk_collection_item(item: &CollectionItem, f: &mut dyn FnMut(&Expr)) {
    match item {
        CollectionItem::Plain(e) => f(e),
        CollectionItem::Optional { value, skip_if, keep_if } => {
            f(value);
            if let Some(s) = skip_if {
                f(s);
            }
            if let Some(k) = keep_if {
                f(k);
            }
        }
        CollectionItem::Spread(e) => f(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducer::{ReducerKind, ReducerSpec};

    #[test]
    fn nested_reducer_is_rejected() {
        let inner = ReducerSpec::new(ReducerKind::Sum, Expr::This.rc());
        let outer = ReducerSpec::new(ReducerKind::Count, Expr::Reduce(inner).rc());
        assert!(validate_no_nested_reducers(&outer).is_err());
    }

    #[test]
    fn undeclared_group_key_is_rejected() {
        let key = Expr::Item {
            base: Expr::This.rc(),
            keys: vec![Expr::Const(crate::value::Value::str("b")).rc()],
            default: None,
        }
        .rc();
        let stray = Expr::Item {
            base: Expr::This.rc(),
            keys: vec![Expr::Const(crate::value::Value::str("c")).rc()],
            default: None,
        };
        assert!(validate_group_keys(&stray, &[key]).is_err());
    }

    #[test]
    fn label_read_with_no_write_anywhere_is_rejected() {
        let mut ctx = CompileContext::new(crate::options::Options::default());
        let expr = Expr::Label(Rc::from("x"));
        assert!(validate_labels(&expr, &mut ctx).is_err());
    }

    #[test]
    fn label_read_dominated_by_a_pipe_write_is_accepted() {
        let mut ctx = CompileContext::new(crate::options::Options::default());
        let expr = Expr::Pipe {
            from: Expr::This.rc(),
            to: Expr::Label(Rc::from("x")).rc(),
            label_input: vec![(Rc::from("x"), Expr::This.rc())],
            label_output: vec![],
        };
        assert!(validate_labels(&expr, &mut ctx).is_ok());
        assert!(ctx.unused_labels().is_empty());
    }

    #[test]
    fn label_written_in_only_one_if_branch_does_not_dominate_the_read_after_it() {
        let mut ctx = CompileContext::new(crate::options::Options::default());
        let write_only_in_then = Expr::If(
            Expr::Const(crate::value::Value::Bool(true)).rc(),
            Expr::CumulativeReset(Rc::from("x"), Expr::This.rc()).rc(),
            Expr::This.rc(),
        );
        let expr = Expr::Pipe {
            from: write_only_in_then.rc(),
            to: Expr::Label(Rc::from("x")).rc(),
            label_input: vec![],
            label_output: vec![],
        };
        assert!(validate_labels(&expr, &mut ctx).is_err());
    }

    #[test]
    fn label_written_in_every_if_branch_dominates_the_read_after_it() {
        let mut ctx = CompileContext::new(crate::options::Options::default());
        let write_in_both = Expr::If(
            Expr::Const(crate::value::Value::Bool(true)).rc(),
            Expr::CumulativeReset(Rc::from("x"), Expr::This.rc()).rc(),
            Expr::CumulativeReset(Rc::from("x"), Expr::This.rc()).rc(),
        );
        let expr = Expr::Pipe {
            from: write_in_both.rc(),
            to: Expr::Label(Rc::from("x")).rc(),
            label_input: vec![],
            label_output: vec![],
        };
        assert!(validate_labels(&expr, &mut ctx).is_ok());
    }

    #[test]
    fn declared_label_never_read_is_reported_unused_but_not_rejected() {
        let mut ctx = CompileContext::new(crate::options::Options::default());
        let expr = Expr::Pipe {
            from: Expr::This.rc(),
            to: Expr::This.rc(),
            label_input: vec![(Rc::from("x"), Expr::This.rc())],
            label_output: vec![],
        };
        assert!(validate_labels(&expr, &mut ctx).is_ok());
        assert_eq!(ctx.unused_labels(), vec!["x".to_string()]);
    }
}
