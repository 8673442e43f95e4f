//! The expression evaluator: since Rust has
//! no safe way to compile and load source at runtime, an `Expr` tree is not
//! turned into text — it is walked directly against a `Frame` each time a
//! `Converter` runs. `Converter::convert` is the only public entry point;
//! everything here is the machinery behind it.

use crate::aggregate::{collect_reducer_table, GroupAccumulator};
use crate::control;
use crate::error::{CompileError, RuntimeError};
use crate::expr::{BinOp, CollectionItem, ComprehensionKind, Expr, JoinHow, TargetType};
use crate::frame::Frame;
use crate::join;
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::HashMap;

pub fn eval(expr: &Expr, frame: &Frame) -> Result<Value, RuntimeError> {
    match expr {
        Expr::This => Ok(frame.this.clone()),
        Expr::Left => frame
            .left
            .clone()
            .ok_or_else(|| RuntimeError::Custom("`left` read outside a join".into())),
        Expr::Right => frame
            .right
            .clone()
            .ok_or_else(|| RuntimeError::Custom("`right` read outside a join".into())),
        Expr::Chunk => Ok(frame.chunk.clone().unwrap_or(Value::Null)),
        Expr::Prev => Ok(frame.prev.clone().unwrap_or(Value::Null)),
        Expr::Const(v) => Ok(v.clone()),
        Expr::InputArg(name) => frame
            .input_args
            .get(name.as_ref())
            .cloned()
            .ok_or_else(|| RuntimeError::Custom(format!("input arg `{name}` was never bound"))),

        Expr::Item { base, keys, default } => {
            let mut cur = eval(base, frame)?;
            for key_expr in keys {
                let key = eval(key_expr, frame)?;
                // Integer-indexing a list/tuple out of range is a distinct
                // error kind from a missing map key, so `except_` can match
                // on it separately.
                let seq_index = match (&cur, &key) {
                    (Value::List(items), Value::Int(i)) | (Value::Tuple(items), Value::Int(i)) => {
                        Some(index_into(items, &key).ok_or(*i))
                    }
                    _ => None,
                };
                match seq_index {
                    Some(Ok(v)) => cur = v,
                    Some(Err(i)) => {
                        return match default {
                            Some(d) => eval(d, frame),
                            None => Err(RuntimeError::IndexOutOfBounds(i)),
                        }
                    }
                    None => match get_item(&cur, &key) {
                        Some(v) => cur = v,
                        None => {
                            return match default {
                                Some(d) => eval(d, frame),
                                None => Err(RuntimeError::KeyNotFound(key.to_string())),
                            }
                        }
                    },
                }
            }
            Ok(cur)
        }
        Expr::Attr { base, names, default } => {
            let mut cur = eval(base, frame)?;
            for name in names {
                match &cur {
                    Value::Map(m) => match m.get(&Value::str(name.as_ref())) {
                        Some(v) => cur = v.clone(),
                        None => {
                            return match default {
                                Some(d) => eval(d, frame),
                                None => Err(RuntimeError::AttributeMissing(name.to_string())),
                            }
                        }
                    },
                    _ => {
                        return match default {
                            Some(d) => eval(d, frame),
                            None => Err(RuntimeError::AttributeMissing(name.to_string())),
                        }
                    }
                }
            }
            Ok(cur)
        }

        Expr::BinOp(op, l, r) => eval_binop(*op, eval(l, frame)?, eval(r, frame)?),
        Expr::Not(e) => Ok(Value::Bool(!eval(e, frame)?.is_truthy())),
        Expr::And(items) => {
            let mut last = Value::Bool(true);
            for item in items {
                last = eval(item, frame)?;
                if !last.is_truthy() {
                    break;
                }
            }
            Ok(last)
        }
        Expr::Or(items) => {
            let mut last = Value::Bool(false);
            for item in items {
                last = eval(item, frame)?;
                if last.is_truthy() {
                    break;
                }
            }
            Ok(last)
        }
        Expr::Call(f, args) => {
            let values: Result<Vec<Value>, RuntimeError> =
                args.iter().map(|a| eval(a, frame)).collect();
            (f.func)(&values?)
        }
        Expr::CallMethod(base, name, args) => {
            let recv = eval(base, frame)?;
            let values: Result<Vec<Value>, RuntimeError> =
                args.iter().map(|a| eval(a, frame)).collect();
            call_method(&recv, name, &values?)
        }
        Expr::AsType(e, t) => as_type(eval(e, frame)?, *t),
        Expr::If(c, t, e) => {
            if eval(c, frame)?.is_truthy() {
                eval(t, frame)
            } else {
                eval(e, frame)
            }
        }
        Expr::IfMultiple(branches, default) => {
            for (cond, then) in branches {
                if eval(cond, frame)?.is_truthy() {
                    return eval(then, frame);
                }
            }
            eval(default, frame)
        }
        Expr::Dispatch { key, table, default } => {
            let k = eval(key, frame)?;
            for (case, value_expr) in table {
                if *case == k {
                    return eval(value_expr, frame);
                }
            }
            eval(default, frame)
        }
        Expr::AndThen(e, cond) => {
            let v = eval(e, frame)?;
            if v.is_null() {
                return Ok(Value::Null);
            }
            if let Some(cond) = cond {
                let child = frame.with_this(v.clone());
                if !eval(cond, &child)?.is_truthy() {
                    return Ok(Value::Null);
                }
            }
            Ok(v)
        }

        Expr::ListLit(items) => Ok(Value::list(eval_collection(items, frame)?)),
        Expr::TupleLit(items) => Ok(Value::tuple(eval_collection(items, frame)?)),
        Expr::SetLit(items) => {
            let values = eval_collection(items, frame)?;
            let mut seen = indexmap::IndexSet::new();
            for v in values {
                seen.insert(crate::reducer::DedupKey(v));
            }
            Ok(Value::list(seen.into_iter().map(|k| k.0).collect()))
        }
        Expr::DictLit(pairs) => {
            let mut map = IndexMap::new();
            for (key_item, value_expr) in pairs {
                match key_item {
                    CollectionItem::Spread(e) => {
                        if let Value::Map(m) = eval(e, frame)? {
                            for (k, v) in m.iter() {
                                map.insert(k.clone(), v.clone());
                            }
                        }
                    }
                    CollectionItem::Plain(key_expr) => {
                        map.insert(eval(key_expr, frame)?, eval(value_expr, frame)?);
                    }
                    CollectionItem::Optional { value, skip_if, keep_if } => {
                        let key = eval(value, frame)?;
                        if should_keep(skip_if, keep_if, &key, frame)? {
                            map.insert(key, eval(value_expr, frame)?);
                        }
                    }
                }
            }
            Ok(Value::map(map))
        }

        Expr::Comprehension { kind, elt, where_ } => {
            let rows = as_rows(&frame.this)?;
            let mut out = Vec::new();
            for row in rows {
                let child = frame.with_this(row);
                if let Some(w) = where_ {
                    if !eval(w, &child)?.is_truthy() {
                        continue;
                    }
                }
                out.push(eval(elt, &child)?);
            }
            Ok(match kind {
                ComprehensionKind::Tuple => Value::tuple(out),
                ComprehensionKind::Set => {
                    let mut seen = indexmap::IndexSet::new();
                    for v in out {
                        seen.insert(crate::reducer::DedupKey(v));
                    }
                    Value::list(seen.into_iter().map(|k| k.0).collect())
                }
                ComprehensionKind::List | ComprehensionKind::Generator => Value::list(out),
            })
        }
        Expr::DictComprehension { key, value, where_ } => {
            let rows = as_rows(&frame.this)?;
            let mut map = IndexMap::new();
            for row in rows {
                let child = frame.with_this(row);
                if let Some(w) = where_ {
                    if !eval(w, &child)?.is_truthy() {
                        continue;
                    }
                }
                map.insert(eval(key, &child)?, eval(value, &child)?);
            }
            Ok(Value::map(map))
        }
        Expr::Iter { elt, where_ } => {
            let rows = as_rows(&frame.this)?;
            let mut out = Vec::new();
            for row in rows {
                let child = frame.with_this(row);
                if let Some(w) = where_ {
                    if !eval(w, &child)?.is_truthy() {
                        continue;
                    }
                }
                out.push(eval(elt, &child)?);
            }
            Ok(Value::list(out))
        }

        Expr::Pipe { from, to, label_input, label_output } => {
            let from_value = eval(from, frame)?;
            let child = frame.with_this(from_value);
            for (name, e) in label_input {
                let v = eval(e, &child)?;
                child.set_label(name, v);
            }
            let result = eval(to, &child)?;
            if !label_output.is_empty() {
                let out_frame = child.with_this(result.clone());
                for (name, e) in label_output {
                    let v = eval(e, &out_frame)?;
                    out_frame.set_label(name, v);
                }
            }
            Ok(result)
        }
        Expr::Label(name) => frame
            .get_label(name)
            .ok_or_else(|| RuntimeError::Custom(format!("label `{name}` read before it was written"))),

        Expr::Filter(src, cond) => {
            let v = eval(src, frame)?;
            let rows = as_rows(&v)?;
            let mut out = Vec::new();
            for row in rows {
                let child = frame.with_this(row.clone());
                if eval(cond, &child)?.is_truthy() {
                    out.push(row);
                }
            }
            Ok(rewrap_like(&v, out))
        }
        Expr::Sort { source, key, reverse } => {
            let v = eval(source, frame)?;
            let mut rows = as_rows(&v)?;
            let mut keyed: Vec<(Value, Value)> = Vec::with_capacity(rows.len());
            for row in rows.drain(..) {
                let k = match key {
                    Some(k) => eval(k, &frame.with_this(row.clone()))?,
                    None => row.clone(),
                };
                keyed.push((k, row));
            }
            keyed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
            if *reverse {
                keyed.reverse();
            }
            Ok(Value::list(keyed.into_iter().map(|(_, row)| row).collect()))
        }
        Expr::TakeWhile(src, cond) => {
            let v = eval(src, frame)?;
            let rows = as_rows(&v)?;
            let mut out = Vec::new();
            for row in rows {
                let child = frame.with_this(row.clone());
                if !eval(cond, &child)?.is_truthy() {
                    break;
                }
                out.push(row);
            }
            Ok(Value::list(out))
        }
        Expr::DropWhile(src, cond) => {
            let v = eval(src, frame)?;
            let rows = as_rows(&v)?;
            let mut out = Vec::new();
            let mut dropping = true;
            for row in rows {
                if dropping {
                    let child = frame.with_this(row.clone());
                    if eval(cond, &child)?.is_truthy() {
                        continue;
                    }
                    dropping = false;
                }
                out.push(row);
            }
            Ok(Value::list(out))
        }
        Expr::IterUnique { source, by } => {
            let v = eval(source, frame)?;
            let rows = as_rows(&v)?;
            let mut seen = indexmap::IndexSet::new();
            let mut out = Vec::new();
            for row in rows {
                let key = match by {
                    Some(b) => eval(b, &frame.with_this(row.clone()))?,
                    None => row.clone(),
                };
                if seen.insert(crate::reducer::DedupKey(key)) {
                    out.push(row);
                }
            }
            Ok(Value::list(out))
        }
        Expr::IterWindows { source, size, step } => {
            let v = eval(source, frame)?;
            let rows = as_rows(&v)?;
            let mut out = Vec::new();
            let len = rows.len();
            if *size > 0 && len > 0 {
                let n = *size;
                let s = (*step).max(1);
                // leading partial windows, growing from a single element.
                let lead = n.saturating_sub(1).min(len - 1);
                for end in 1..=lead {
                    out.push(Value::list(rows[0..end].to_vec()));
                }
                // full-size windows, sliding by `step`.
                if len >= n {
                    let mut start = 0;
                    while start + n <= len {
                        out.push(Value::list(rows[start..start + n].to_vec()));
                        start += s;
                    }
                }
                // trailing partial windows, shrinking down to the last element.
                let trail = n.saturating_sub(1).min(len - 1);
                for width in (1..=trail).rev() {
                    out.push(Value::list(rows[len - width..len].to_vec()));
                }
            }
            Ok(Value::list(out))
        }
        Expr::ChunkBy { source, keys, size } => {
            let v = eval(source, frame)?;
            let rows = as_rows(&v)?;
            let mut out = Vec::new();
            let mut current: Vec<Value> = Vec::new();
            let mut current_key: Option<Vec<Value>> = None;
            for row in rows {
                let child = frame.with_this(row.clone());
                let key: Result<Vec<Value>, RuntimeError> =
                    keys.iter().map(|k| eval(k, &child)).collect();
                let key = key?;
                let key_changed = current_key.as_ref().map(|ck| ck != &key).unwrap_or(false);
                let size_exceeded = size.map(|s| current.len() >= s).unwrap_or(false);
                if current_key.is_some() && (key_changed || size_exceeded) {
                    out.push(Value::list(std::mem::take(&mut current)));
                }
                current.push(row);
                current_key = Some(key);
            }
            if !current.is_empty() {
                out.push(Value::list(current));
            }
            Ok(Value::list(out))
        }
        Expr::ChunkByCondition { source, pred } => {
            let v = eval(source, frame)?;
            let rows = as_rows(&v)?;
            let mut out = Vec::new();
            let mut current: Vec<Value> = Vec::new();
            let mut prev: Option<Value> = None;
            for row in rows {
                if let Some(prev_row) = &prev {
                    let child = frame
                        .with_prev(row.clone(), Some(prev_row.clone()))
                        .with_chunk(Value::list(current.clone()));
                    if !eval(pred, &child)?.is_truthy() {
                        out.push(Value::list(std::mem::take(&mut current)));
                    }
                }
                prev = Some(row.clone());
                current.push(row);
            }
            if !current.is_empty() {
                out.push(Value::list(current));
            }
            Ok(Value::list(out))
        }
        Expr::UnorderedChunkBy { source, key, size, max_items_in_memory, portion_to_pop } => {
            let v = eval(source, frame)?;
            let rows = as_rows(&v)?;
            let mut open: IndexMap<Value, Vec<Value>> = IndexMap::new();
            let mut out = Vec::new();
            let mut total = 0usize;
            for row in rows {
                let k = eval(key, &frame.with_this(row.clone()))?;
                let chunk = open.entry(k.clone()).or_insert_with(Vec::new);
                chunk.push(row);
                total += 1;
                let full = size.map(|s| chunk.len() >= s).unwrap_or(false);
                if full {
                    if let Some(chunk) = open.shift_remove(&k) {
                        total -= chunk.len();
                        out.push(Value::list(chunk));
                    }
                }
                if let Some(max) = max_items_in_memory {
                    if total > *max && !open.is_empty() {
                        let to_evict = ((open.len() as f64) * portion_to_pop).ceil().max(1.0) as usize;
                        let evict_keys: Vec<Value> =
                            open.keys().take(to_evict).cloned().collect();
                        for ek in evict_keys {
                            if let Some(chunk) = open.shift_remove(&ek) {
                                total -= chunk.len();
                                out.push(Value::list(chunk));
                            }
                        }
                    }
                }
            }
            for (_, chunk) in open {
                out.push(Value::list(chunk));
            }
            Ok(Value::list(out))
        }

        Expr::Cumulative { source, initial, fold, label_name } => {
            let v = eval(source, frame)?;
            let rows = as_rows(&v)?;
            let mut out = Vec::new();
            let mut acc: Option<Value> = None;
            for row in rows {
                let next = match &acc {
                    Some(prev) => {
                        let child = frame.with_prev(row.clone(), Some(prev.clone()));
                        let next = eval(fold, &child)?;
                        child.set_label(label_name, next.clone());
                        next
                    }
                    None => {
                        let child = frame.with_this(row.clone());
                        let next = eval(initial, &child)?;
                        child.set_label(label_name, next.clone());
                        next
                    }
                };
                acc = Some(next.clone());
                out.push(next);
            }
            Ok(Value::list(out))
        }
        Expr::CumulativeReset(name, source) => {
            let v = eval(source, frame)?;
            frame.set_label(name, Value::Null);
            Ok(v)
        }

        Expr::Aggregate(spec) => eval_aggregate(spec, frame),
        Expr::GroupBy { source, keys, post } => eval_group_by(source, keys, post, frame),
        Expr::Reduce(spec) => match frame.reduced_value(spec.identity()) {
            Some(v) => Ok(v),
            None => Err(RuntimeError::Custom(
                "reducer evaluated outside its enclosing aggregate".into(),
            )),
        },

        Expr::Join { left, right, predicate, how } => eval_join(left, right, predicate, *how, frame),


        Expr::Zip(items) => {
            let lists: Result<Vec<Vec<Value>>, RuntimeError> =
                items.iter().map(|e| as_rows(&eval(e, frame)?)).collect();
            let lists = lists?;
            let len = lists.iter().map(Vec::len).min().unwrap_or(0);
            let mut out = Vec::with_capacity(len);
            for i in 0..len {
                out.push(Value::tuple(lists.iter().map(|l| l[i].clone()).collect()));
            }
            Ok(Value::list(out))
        }
        Expr::ZipLongest(items, fill) => {
            let lists: Result<Vec<Vec<Value>>, RuntimeError> =
                items.iter().map(|e| as_rows(&eval(e, frame)?)).collect();
            let lists = lists?;
            let len = lists.iter().map(Vec::len).max().unwrap_or(0);
            let fill_value = eval(fill, frame)?;
            let mut out = Vec::with_capacity(len);
            for i in 0..len {
                out.push(Value::tuple(
                    lists
                        .iter()
                        .map(|l| l.get(i).cloned().unwrap_or_else(|| fill_value.clone()))
                        .collect(),
                ));
            }
            Ok(Value::list(out))
        }
        Expr::Flatten(e) => {
            let v = eval(e, frame)?;
            let rows = as_rows(&v)?;
            let mut out = Vec::new();
            for row in rows {
                out.extend(as_rows(&row)?);
            }
            Ok(Value::list(out))
        }

        Expr::Try(body, handlers) => match eval(body, frame) {
            Ok(v) => Ok(v),
            Err(err) => {
                let outcome = match control::select_handler(&err, handlers) {
                    None => control::Resolution::Unhandled,
                    Some(handler) => {
                        let re_raise = match &handler.re_raise_if {
                            Some(cond) => eval(cond, frame)?.is_truthy(),
                            None => false,
                        };
                        if re_raise {
                            control::Resolution::ReRaise
                        } else {
                            let v = match &handler.value {
                                Some(v) => eval(v, frame)?,
                                None => Value::Null,
                            };
                            control::Resolution::Recovered(v)
                        }
                    }
                };
                match outcome {
                    control::Resolution::Unhandled | control::Resolution::ReRaise => Err(err),
                    control::Resolution::Recovered(v) => Ok(v),
                }
            }
        },
        Expr::Expect(cond, msg) => {
            if eval(cond, frame)?.is_truthy() {
                Ok(frame.this.clone())
            } else {
                let m = eval(msg, frame)?;
                Err(RuntimeError::Expect(m.to_string()))
            }
        }
    }
}

fn should_keep(
    skip_if: &Option<std::rc::Rc<Expr>>,
    keep_if: &Option<std::rc::Rc<Expr>>,
    value: &Value,
    frame: &Frame,
) -> Result<bool, RuntimeError> {
    let child = frame.with_this(value.clone());
    if let Some(skip_if) = skip_if {
        if eval(skip_if, &child)?.is_truthy() {
            return Ok(false);
        }
    }
    if let Some(keep_if) = keep_if {
        return eval(keep_if, &child).map(|v| v.is_truthy());
    }
    Ok(true)
}

fn eval_collection(items: &[CollectionItem], frame: &Frame) -> Result<Vec<Value>, RuntimeError> {
    let mut out = Vec::new();
    for item in items {
        match item {
            CollectionItem::Plain(e) => out.push(eval(e, frame)?),
            CollectionItem::Spread(e) => out.extend(as_rows(&eval(e, frame)?)?),
            CollectionItem::Optional { value, skip_if, keep_if } => {
                let v = eval(value, frame)?;
                if should_keep(skip_if, keep_if, &v, frame)? {
                    out.push(v);
                }
            }
        }
    }
    Ok(out)
}

/// Interpret a `Value` as a row sequence for iteration-shaped operators.
fn as_rows(v: &Value) -> Result<Vec<Value>, RuntimeError> {
    match v {
        Value::List(l) => Ok((**l).clone()),
        Value::Tuple(t) => Ok((**t).clone()),
        Value::Null => Ok(vec![]),
        other => Err(RuntimeError::TypeMismatch {
            expected: "list".into(),
            got: other.type_name().into(),
        }),
    }
}

fn rewrap_like(original: &Value, rows: Vec<Value>) -> Value {
    match original {
        Value::Tuple(_) => Value::tuple(rows),
        _ => Value::list(rows),
    }
}

fn get_item(container: &Value, key: &Value) -> Option<Value> {
    match container {
        Value::Map(m) => m.get(key).cloned(),
        Value::List(l) => index_into(l, key),
        Value::Tuple(t) => index_into(t, key),
        _ => None,
    }
}

fn index_into(items: &[Value], key: &Value) -> Option<Value> {
    let Value::Int(i) = key else { return None };
    let len = items.len() as i64;
    let idx = if *i < 0 { i + len } else { *i };
    if idx < 0 || idx >= len {
        None
    } else {
        Some(items[idx as usize].clone())
    }
}

fn eval_binop(op: BinOp, l: Value, r: Value) -> Result<Value, RuntimeError> {
    use BinOp::*;
    Ok(match op {
        Add => l.checked_add(&r).ok_or_else(type_mismatch(&l, &r))?,
        Sub => numeric(&l, &r, |a, b| a - b)?,
        Mul => numeric(&l, &r, |a, b| a * b)?,
        Div => {
            let (a, b) = (numeric_f64(&l)?, numeric_f64(&r)?);
            if b == 0.0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Value::Float(a / b)
        }
        FloorDiv => {
            let (a, b) = (numeric_f64(&l)?, numeric_f64(&r)?);
            if b == 0.0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Value::Int((a / b).floor() as i64)
        }
        Mod => {
            let (a, b) = (numeric_f64(&l)?, numeric_f64(&r)?);
            if b == 0.0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Value::Float(a.rem_euclid(b))
        }
        Eq => Value::Bool(l == r),
        Ne => Value::Bool(l != r),
        Lt => Value::Bool(matches!(l.partial_cmp(&r), Some(std::cmp::Ordering::Less))),
        Le => Value::Bool(matches!(
            l.partial_cmp(&r),
            Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
        )),
        Gt => Value::Bool(matches!(l.partial_cmp(&r), Some(std::cmp::Ordering::Greater))),
        Ge => Value::Bool(matches!(
            l.partial_cmp(&r),
            Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
        )),
        In => Value::Bool(contains(&r, &l)),
        NotIn => Value::Bool(!contains(&r, &l)),
        Is => Value::Bool(l.is_null() && r.is_null()),
        IsNot => Value::Bool(!(l.is_null() && r.is_null())),
    })
}

fn type_mismatch(l: &Value, r: &Value) -> impl FnOnce() -> RuntimeError + '_ {
    move || RuntimeError::TypeMismatch {
        expected: l.type_name().into(),
        got: r.type_name().into(),
    }
}

fn numeric(l: &Value, r: &Value, f: impl Fn(f64, f64) -> f64) -> Result<Value, RuntimeError> {
    let (a, b) = (numeric_f64(l)?, numeric_f64(r)?);
    let result = f(a, b);
    if matches!((l, r), (Value::Int(_), Value::Int(_))) && result.fract() == 0.0 {
        Ok(Value::Int(result as i64))
    } else {
        Ok(Value::Float(result))
    }
}

fn numeric_f64(v: &Value) -> Result<f64, RuntimeError> {
    v.as_f64().ok_or_else(|| RuntimeError::TypeMismatch {
        expected: "number".into(),
        got: v.type_name().into(),
    })
}

/// `as_type(int)`/`as_type(float)` over a string parses it, matching a
/// dynamic language's `int("42")`/`float("3.5")` conversion builtins —
/// distinct from `numeric_f64`, which arithmetic uses and which never
/// coerces a string.
fn parse_str_number(s: &str) -> Result<f64, RuntimeError> {
    s.trim().parse::<f64>().map_err(|_| RuntimeError::TypeMismatch {
        expected: "number".into(),
        got: format!("str({s:?})"),
    })
}

fn contains(container: &Value, needle: &Value) -> bool {
    match container {
        Value::List(l) => l.contains(needle),
        Value::Tuple(t) => t.contains(needle),
        Value::Map(m) => m.contains_key(needle),
        Value::Str(s) => match needle {
            Value::Str(n) => s.contains(n.as_ref()),
            _ => false,
        },
        _ => false,
    }
}

fn as_type(v: Value, t: TargetType) -> Result<Value, RuntimeError> {
    Ok(match t {
        TargetType::Int => match &v {
            Value::Str(s) => Value::Int(parse_str_number(s)? as i64),
            _ => Value::Int(numeric_f64(&v)? as i64),
        },
        TargetType::Float => match &v {
            Value::Str(s) => Value::Float(parse_str_number(s)?),
            _ => Value::Float(numeric_f64(&v)?),
        },
        TargetType::Bool => Value::Bool(v.is_truthy()),
        TargetType::Str => Value::str(v.to_string()),
        TargetType::List => Value::list(as_rows(&v)?),
        TargetType::Set => {
            let mut seen = indexmap::IndexSet::new();
            for item in as_rows(&v)? {
                seen.insert(crate::reducer::DedupKey(item));
            }
            Value::list(seen.into_iter().map(|k| k.0).collect())
        }
    })
}

fn call_method(recv: &Value, name: &str, args: &[Value]) -> Result<Value, RuntimeError> {
    match (recv, name) {
        (Value::Str(s), "upper") => Ok(Value::str(s.to_uppercase())),
        (Value::Str(s), "lower") => Ok(Value::str(s.to_lowercase())),
        (Value::Str(s), "strip") => Ok(Value::str(s.trim().to_string())),
        (Value::Str(s), "split") => {
            let sep = match args.first() {
                Some(Value::Str(sep)) => sep.as_ref().to_string(),
                _ => " ".to_string(),
            };
            Ok(Value::list(s.split(sep.as_str()).map(Value::str).collect()))
        }
        (Value::Str(s), "startswith") => match args.first() {
            Some(Value::Str(prefix)) => Ok(Value::Bool(s.starts_with(prefix.as_ref()))),
            _ => Ok(Value::Bool(false)),
        },
        (Value::Str(s), "endswith") => match args.first() {
            Some(Value::Str(suffix)) => Ok(Value::Bool(s.ends_with(suffix.as_ref()))),
            _ => Ok(Value::Bool(false)),
        },
        (Value::List(l) | Value::Tuple(l), "get") => {
            let idx = args.first().ok_or_else(|| {
                RuntimeError::Custom("`get` requires an index argument".into())
            })?;
            Ok(index_into(l, idx).unwrap_or(Value::Null))
        }
        (Value::Map(m), "get") => {
            let key = args
                .first()
                .ok_or_else(|| RuntimeError::Custom("`get` requires a key argument".into()))?;
            Ok(m.get(key).cloned().unwrap_or_else(|| {
                args.get(1).cloned().unwrap_or(Value::Null)
            }))
        }
        (Value::Map(m), "keys") => Ok(Value::list(m.keys().cloned().collect())),
        (Value::Map(m), "values") => Ok(Value::list(m.values().cloned().collect())),
        _ => Err(RuntimeError::Custom(format!(
            "no method `{name}` for a {}",
            recv.type_name()
        ))),
    }
}

fn eval_aggregate(spec: &Expr, frame: &Frame) -> Result<Value, RuntimeError> {
    let table = collect_reducer_table(spec);
    let rows = as_rows(&frame.this)?;
    let mut states: Vec<Option<Value>> = vec![None; table.len()];
    for row in &rows {
        let child = frame.with_this(row.clone());
        for (i, reducer) in table.iter().enumerate() {
            if let Some(w) = &reducer.where_ {
                if !eval(w, &child)?.is_truthy() {
                    continue;
                }
            }
            let input = eval(&reducer.input, &child)?;
            let secondary_key = match &reducer.dict_key {
                Some(k) => Some(eval(k, &child)?),
                None => None,
            };
            match &mut states[i] {
                None => states[i] = Some(reducer.init(&input, secondary_key.as_ref(), row)),
                Some(state) => reducer.fold(state, &input, secondary_key.as_ref(), row),
            }
        }
    }
    let mut reduced = HashMap::new();
    for (reducer, state) in table.iter().zip(states.into_iter()) {
        reduced.insert(reducer.identity(), reducer.finalize(state)?);
    }
    let out_frame = frame.with_reduced(reduced);
    eval(spec, &out_frame)
}

fn eval_group_by(
    source: &Expr,
    keys: &[std::rc::Rc<Expr>],
    post: &Expr,
    frame: &Frame,
) -> Result<Value, RuntimeError> {
    // Group-key usage and nested-reducer validation run once, up front, in
    // `Converter::gen_converter` — not here, on every execution.
    let table = collect_reducer_table(post);
    let v = eval(source, frame)?;
    let rows = as_rows(&v)?;
    let mut acc = GroupAccumulator::new(table);
    for row in rows {
        let child = frame.with_this(row.clone());
        let key_parts: Result<Vec<Value>, RuntimeError> =
            keys.iter().map(|k| eval(k, &child)).collect();
        let group_key = Value::tuple(key_parts?);
        let mut inputs = Vec::with_capacity(acc.table().len());
        let mut secondary_keys = Vec::with_capacity(acc.table().len());
        for reducer in acc.table().to_vec() {
            let passes = match &reducer.where_ {
                Some(w) => eval(w, &child)?.is_truthy(),
                None => true,
            };
            if passes {
                inputs.push(Some(eval(&reducer.input, &child)?));
                secondary_keys.push(match &reducer.dict_key {
                    Some(k) => Some(eval(k, &child)?),
                    None => None,
                });
            } else {
                inputs.push(None);
                secondary_keys.push(None);
            }
        }
        acc.observe_row(group_key, inputs, secondary_keys, &row);
    }
    let groups = acc.try_into_groups()?;
    let mut out = Vec::with_capacity(groups.len());
    for (group_key, values) in groups {
        let key_frame = frame.with_this(group_key.clone());
        let mut reduced = HashMap::new();
        for (reducer, value) in {
            let table2 = collect_reducer_table(post);
            table2.into_iter().zip(values.into_iter())
        } {
            reduced.insert(reducer.identity(), value);
        }
        let mut post_frame = key_frame.with_reduced(reduced);
        // post expression may reference the declared keys positionally via
        // `this[0]`/`this[1]`/... when there is more than one, or `this`
        // directly when there is exactly one.
        if keys.len() == 1 {
            if let Value::Tuple(t) = &group_key {
                post_frame.this = t[0].clone();
            }
        }
        out.push(eval(post, &post_frame)?);
    }
    Ok(Value::list(out))
}

fn compile_error_at_runtime(e: CompileError) -> RuntimeError {
    RuntimeError::Custom(e.to_string())
}

fn eval_join(
    left: &Expr,
    right: &Expr,
    predicate: &std::rc::Rc<Expr>,
    how: JoinHow,
    frame: &Frame,
) -> Result<Value, RuntimeError> {
    let left_rows = as_rows(&eval(left, frame)?)?;
    let right_rows = as_rows(&eval(right, frame)?)?;
    let plan = join::split_predicate(predicate, how).map_err(compile_error_at_runtime)?;

    let eval_left_key = |row: &Value| -> Result<Value, RuntimeError> {
        let child = frame.with_left_right(row.clone(), Value::Null);
        let parts: Result<Vec<Value>, RuntimeError> =
            plan.left_keys.iter().map(|k| eval(k, &child)).collect();
        Ok(Value::tuple(parts?))
    };
    let eval_right_key = |row: &Value| -> Result<Value, RuntimeError> {
        let child = frame.with_left_right(Value::Null, row.clone());
        let parts: Result<Vec<Value>, RuntimeError> =
            plan.right_keys.iter().map(|k| eval(k, &child)).collect();
        Ok(Value::tuple(parts?))
    };
    let residual_expr = plan.residual.clone();
    let eval_residual = |l: &Value, r: &Value| -> Result<bool, RuntimeError> {
        match &residual_expr {
            Some(pred) => {
                let child = frame.with_left_right(l.clone(), r.clone());
                Ok(eval(pred, &child)?.is_truthy())
            }
            None => Ok(true),
        }
    };

    let pairs = join::execute(
        &left_rows,
        &right_rows,
        how,
        !plan.left_keys.is_empty(),
        eval_left_key,
        eval_right_key,
        eval_residual,
    )?;

    Ok(Value::list(
        pairs
            .into_iter()
            .map(|(li, ri)| {
                let l = li.map(|i| left_rows[i].clone()).unwrap_or(Value::Null);
                let r = ri.map(|i| right_rows[i].clone()).unwrap_or(Value::Null);
                Value::tuple(vec![l, r])
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::BinOp as B;
    use std::collections::HashMap as Map;

    fn frame(this: Value) -> (Map<std::rc::Rc<str>, Value>, Value) {
        (Map::new(), this)
    }

    #[test]
    fn item_access_with_default_on_missing_key() {
        let args = Map::new();
        let mut map = IndexMap::new();
        map.insert(Value::str("a"), Value::Int(1));
        let f = Frame::new(Value::map(map), &args);
        let expr = Expr::Item {
            base: Expr::This.rc(),
            keys: vec![Expr::Const(Value::str("missing")).rc()],
            default: Some(Expr::Const(Value::Int(-1)).rc()),
        };
        assert_eq!(eval(&expr, &f).unwrap(), Value::Int(-1));
    }

    #[test]
    fn list_index_out_of_bounds_with_no_default_is_a_distinct_error_kind() {
        let args = Map::new();
        let f = Frame::new(Value::list(vec![Value::Int(1), Value::Int(2)]), &args);
        let expr = Expr::Item {
            base: Expr::This.rc(),
            keys: vec![Expr::Const(Value::Int(5)).rc()],
            default: None,
        };
        assert_eq!(eval(&expr, &f), Err(RuntimeError::IndexOutOfBounds(5)));
    }

    #[test]
    fn list_index_out_of_bounds_with_default_falls_back() {
        let args = Map::new();
        let f = Frame::new(Value::list(vec![Value::Int(1), Value::Int(2)]), &args);
        let expr = Expr::Item {
            base: Expr::This.rc(),
            keys: vec![Expr::Const(Value::Int(5)).rc()],
            default: Some(Expr::Const(Value::Int(-1)).rc()),
        };
        assert_eq!(eval(&expr, &f).unwrap(), Value::Int(-1));
    }

    #[test]
    fn binop_add_on_ints() {
        let args = Map::new();
        let f = Frame::new(Value::Null, &args);
        let expr = Expr::BinOp(B::Add, Expr::Const(Value::Int(2)).rc(), Expr::Const(Value::Int(3)).rc());
        assert_eq!(eval(&expr, &f).unwrap(), Value::Int(5));
    }

    #[test]
    fn comprehension_filters_and_maps_rows() {
        let args = Map::new();
        let f = Frame::new(Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]), &args);
        let expr = Expr::Comprehension {
            kind: ComprehensionKind::List,
            elt: Expr::BinOp(B::Mul, Expr::This.rc(), Expr::Const(Value::Int(10)).rc()).rc(),
            where_: Some(Expr::BinOp(B::Gt, Expr::This.rc(), Expr::Const(Value::Int(2)).rc()).rc()),
        };
        assert_eq!(
            eval(&expr, &f).unwrap(),
            Value::list(vec![Value::Int(30), Value::Int(40)])
        );
    }

    #[test]
    fn aggregate_sums_and_counts_in_one_pass() {
        let args = Map::new();
        let f = Frame::new(Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]), &args);
        let total = crate::reducer::ReducerSpec::new(crate::reducer::ReducerKind::Sum, Expr::This.rc());
        let count = crate::reducer::ReducerSpec::new(crate::reducer::ReducerKind::Count, Expr::This.rc());
        let spec = Expr::TupleLit(vec![
            CollectionItem::Plain(Expr::Reduce(total).rc()),
            CollectionItem::Plain(Expr::Reduce(count).rc()),
        ]);
        let result = eval_aggregate(&spec, &f).unwrap();
        assert_eq!(result, Value::tuple(vec![Value::Int(6), Value::Int(3)]));
    }
}
