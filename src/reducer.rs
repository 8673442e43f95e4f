//! Reducer contracts: the realization of "a kind of expression that
//! participates in aggregation."
//!
//! Each reducer slot carries an initializer/fold/finalize triple plus an
//! input selector, optional `where` guard, and optional default — exactly
//! the attributes a reducer needs. The `UNSET` sentinel is
//! `Option<Value>::None`; the aggregation compiler (`src/aggregate.rs`)
//! drives the fill/hot split around it.

use crate::error::RuntimeError;
use crate::expr::Expr;
use crate::value::Value;
use indexmap::IndexMap;
use std::rc::Rc;

/// One of the built-in reducer kinds from the contract table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReducerKind {
    Sum,
    SumOrNone,
    Max,
    Min,
    MaxRow,
    MinRow,
    Count,
    CountDistinct,
    First,
    Last,
    Average,
    Median,
    Percentile,
    Mode,
    TopK,
    Array,
    ArrayDistinct,
    ArraySorted,
    DictSum,
    DictArray,
    DictCount,
    DictFirst,
    DictLast,
}

/// A reducer node's full declaration: kind, input selector, optional
/// per-row guard, optional declared default, and kind-specific parameters
/// (e.g. `Percentile`'s `p`, `TopK`'s `k`).
#[derive(Clone)]
pub struct ReducerSpec {
    id: Rc<()>,
    pub kind: ReducerKind,
    pub input: Rc<Expr>,
    /// `DictSum`/`DictArray`/... reducers fold over a secondary key.
    pub dict_key: Option<Rc<Expr>>,
    pub where_: Option<Rc<Expr>>,
    pub default: Option<Value>,
    pub param: Option<f64>,
}

impl ReducerSpec {
    pub fn new(kind: ReducerKind, input: Rc<Expr>) -> Self {
        ReducerSpec {
            id: Rc::new(()),
            kind,
            input,
            dict_key: None,
            where_: None,
            default: None,
            param: None,
        }
    }

    pub fn with_where(mut self, where_: Rc<Expr>) -> Self {
        self.where_ = Some(where_);
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_param(mut self, param: f64) -> Self {
        self.param = Some(param);
        self
    }

    pub fn with_dict_key(mut self, key: Rc<Expr>) -> Self {
        self.dict_key = Some(key);
        self
    }

    pub fn same_as(&self, other: &ReducerSpec) -> bool {
        Rc::ptr_eq(&self.id, &other.id)
    }

    /// A stable per-slot identity usable as a hash-map key, for matching a
    /// `Reduce` node back to its precomputed value once aggregation has run.
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.id) as usize
    }

    /// The declared "no rows observed" default, absent
    /// an explicit override.
    pub fn declared_default(&self) -> Value {
        if let Some(d) = &self.default {
            return d.clone();
        }
        use ReducerKind::*;
        match self.kind {
            Sum | Count | CountDistinct => Value::Int(0),
            Array | ArrayDistinct | ArraySorted => Value::list(vec![]),
            DictSum | DictArray | DictCount | DictFirst | DictLast => Value::map(IndexMap::new()),
            _ => Value::Null,
        }
    }

    /// Initialize a slot's state from the first row it observes.
    pub fn init(&self, input: &Value, secondary_key: Option<&Value>, row: &Value) -> Value {
        use ReducerKind::*;
        match self.kind {
            // A leading `None`/non-numeric input must contribute nothing, not
            // poison the slot to `Null` forever — seed from zero so a later
            // numeric input still sums in via `fold`'s `checked_add`.
            Sum => {
                if input.as_f64().is_some() {
                    input.clone()
                } else {
                    Value::Int(0)
                }
            }
            SumOrNone => input.clone(),
            Max | Min => input.clone(),
            MaxRow | MinRow => Value::tuple(vec![input.clone(), row.clone()]),
            Count => Value::Int(1),
            CountDistinct | ArrayDistinct => {
                Value::list(vec![input.clone()])
            }
            First | Last => input.clone(),
            Average => Value::tuple(vec![input.clone(), Value::Int(1)]),
            Median | Percentile | Mode | TopK => Value::list(vec![input.clone()]),
            Array | ArraySorted => Value::list(vec![input.clone()]),
            DictSum => {
                let mut m = IndexMap::new();
                if let Some(k) = secondary_key {
                    m.insert(k.clone(), input.clone());
                }
                Value::map(m)
            }
            DictArray => {
                let mut m = IndexMap::new();
                if let Some(k) = secondary_key {
                    m.insert(k.clone(), Value::list(vec![input.clone()]));
                }
                Value::map(m)
            }
            DictCount => {
                let mut m = IndexMap::new();
                if let Some(k) = secondary_key {
                    m.insert(k.clone(), Value::Int(1));
                }
                Value::map(m)
            }
            DictFirst | DictLast => {
                let mut m = IndexMap::new();
                if let Some(k) = secondary_key {
                    m.insert(k.clone(), input.clone());
                }
                Value::map(m)
            }
        }
    }

    /// Fold one more row's input into an already-initialized state (hot
    /// loop — no `UNSET` checks here by construction).
    pub fn fold(&self, state: &mut Value, input: &Value, secondary_key: Option<&Value>, row: &Value) {
        use ReducerKind::*;
        match self.kind {
            Sum => {
                if let Some(sum) = state.checked_add(input) {
                    *state = sum;
                }
            }
            SumOrNone => {
                *state = match state.checked_add(input) {
                    Some(v) => v,
                    None => Value::Null,
                };
            }
            Max => {
                if cmp_gt(input, state) {
                    *state = input.clone();
                }
            }
            Min => {
                if cmp_lt(input, state) {
                    *state = input.clone();
                }
            }
            MaxRow => {
                if let Value::Tuple(t) = state {
                    if cmp_gt(input, &t[0]) {
                        *state = Value::tuple(vec![input.clone(), row.clone()]);
                    }
                }
            }
            MinRow => {
                if let Value::Tuple(t) = state {
                    if cmp_lt(input, &t[0]) {
                        *state = Value::tuple(vec![input.clone(), row.clone()]);
                    }
                }
            }
            Count => {
                if let Value::Int(n) = state {
                    *n += 1;
                }
            }
            CountDistinct | ArrayDistinct | Array | ArraySorted | Median | Percentile | Mode
            | TopK => {
                if let Value::List(v) = state {
                    let mut v2 = (**v).clone();
                    v2.push(input.clone());
                    *state = Value::list(v2);
                }
            }
            First => { /* first-write-wins: state already holds the first */ }
            Last => {
                *state = input.clone();
            }
            Average => {
                if let Value::Tuple(t) = state {
                    if let (Some(sum), Value::Int(n)) = (t[0].checked_add(input), &t[1]) {
                        *state = Value::tuple(vec![sum, Value::Int(n + 1)]);
                    }
                }
            }
            DictSum => {
                if let (Value::Map(m), Some(k)) = (&state, secondary_key) {
                    let mut m2 = (**m).clone();
                    let entry = m2.entry(k.clone()).or_insert(Value::Int(0));
                    if let Some(s) = entry.checked_add(input) {
                        *entry = s;
                    }
                    *state = Value::map(m2);
                }
            }
            DictArray => {
                if let (Value::Map(m), Some(k)) = (&state, secondary_key) {
                    let mut m2 = (**m).clone();
                    let entry = m2.entry(k.clone()).or_insert_with(|| Value::list(vec![]));
                    if let Value::List(v) = entry {
                        let mut v2 = (**v).clone();
                        v2.push(input.clone());
                        *entry = Value::list(v2);
                    }
                    *state = Value::map(m2);
                }
            }
            DictCount => {
                if let (Value::Map(m), Some(k)) = (&state, secondary_key) {
                    let mut m2 = (**m).clone();
                    let entry = m2.entry(k.clone()).or_insert(Value::Int(0));
                    if let Value::Int(n) = entry {
                        *n += 1;
                    }
                    *state = Value::map(m2);
                }
            }
            DictFirst => { /* first write per key already holds */ }
            DictLast => {
                if let (Value::Map(m), Some(k)) = (&state, secondary_key) {
                    let mut m2 = (**m).clone();
                    m2.insert(k.clone(), input.clone());
                    *state = Value::map(m2);
                }
            }
        }
    }

    /// Produce the final value for a slot, or the declared default if the
    /// slot is still `UNSET`.
    pub fn finalize(&self, state: Option<Value>) -> Result<Value, RuntimeError> {
        use ReducerKind::*;
        let Some(state) = state else {
            return Ok(self.declared_default());
        };
        Ok(match self.kind {
            MaxRow | MinRow => {
                if let Value::Tuple(t) = &state {
                    t[1].clone()
                } else {
                    state
                }
            }
            Average => {
                if let Value::Tuple(t) = &state {
                    match (t[0].as_f64(), &t[1]) {
                        (Some(sum), Value::Int(n)) if *n > 0 => Value::Float(sum / *n as f64),
                        _ => self.declared_default(),
                    }
                } else {
                    state
                }
            }
            CountDistinct => {
                if let Value::List(v) = &state {
                    let mut seen = std::collections::HashSet::new();
                    for item in v.iter() {
                        seen.insert(DedupKey(item.clone()));
                    }
                    Value::Int(seen.len() as i64)
                } else {
                    state
                }
            }
            ArrayDistinct => {
                if let Value::List(v) = &state {
                    let mut seen = indexmap::IndexSet::new();
                    for item in v.iter() {
                        seen.insert(DedupKey(item.clone()));
                    }
                    Value::list(seen.into_iter().map(|k| k.0).collect())
                } else {
                    state
                }
            }
            ArraySorted => {
                if let Value::List(v) = &state {
                    let mut v2 = (**v).clone();
                    v2.sort_by(|a, b| {
                        a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
                    });
                    Value::list(v2)
                } else {
                    state
                }
            }
            Median => {
                if let Value::List(v) = &state {
                    percentile(v, 0.5)
                } else {
                    state
                }
            }
            Percentile => {
                if let Value::List(v) = &state {
                    percentile(v, self.param.unwrap_or(0.5))
                } else {
                    state
                }
            }
            Mode => {
                if let Value::List(v) = &state {
                    mode_last_tie_wins(v)
                } else {
                    state
                }
            }
            TopK => {
                if let Value::List(v) = &state {
                    let k = self.param.unwrap_or(1.0) as usize;
                    top_k(v, k)
                } else {
                    state
                }
            }
            _ => state,
        })
    }
}

/// Wraps a `Value` so it can live in a `HashSet`/`IndexSet` used purely for
/// distinctness bookkeeping, independent of whether `Value` is `Ord`.
#[derive(Clone)]
pub(crate) struct DedupKey(pub(crate) Value);
impl PartialEq for DedupKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for DedupKey {}
impl std::hash::Hash for DedupKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

fn cmp_gt(a: &Value, b: &Value) -> bool {
    matches!(a.partial_cmp(b), Some(std::cmp::Ordering::Greater))
}
fn cmp_lt(a: &Value, b: &Value) -> bool {
    matches!(a.partial_cmp(b), Some(std::cmp::Ordering::Less))
}

/// Nearest-rank percentile selection, 0.0..=1.0.
fn percentile(values: &[Value], p: f64) -> Value {
    if values.is_empty() {
        return Value::Null;
    }
    let mut nums: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
    nums.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let idx = ((nums.len() as f64 - 1.0) * p.clamp(0.0, 1.0)).round() as usize;
    Value::Float(nums[idx.min(nums.len() - 1)])
}

/// Mode's documented tie-break rule: "last one with the highest frequency"
/// (the tie-break open question).
fn mode_last_tie_wins(values: &[Value]) -> Value {
    let mut counts: IndexMap<DedupKey, i64> = IndexMap::new();
    for v in values {
        *counts.entry(DedupKey(v.clone())).or_insert(0) += 1;
    }
    let mut best: Option<(DedupKey, i64)> = None;
    for (k, c) in counts {
        let replace = match &best {
            None => true,
            Some((_, bc)) => c >= *bc,
        };
        if replace {
            best = Some((k, c));
        }
    }
    best.map(|(k, _)| k.0).unwrap_or(Value::Null)
}

fn top_k(values: &[Value], k: usize) -> Value {
    let mut counts: IndexMap<DedupKey, i64> = IndexMap::new();
    for v in values {
        *counts.entry(DedupKey(v.clone())).or_insert(0) += 1;
    }
    let mut entries: Vec<(DedupKey, i64)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    Value::list(entries.into_iter().take(k).map(|(k, _)| k.0).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;

    fn spec(kind: ReducerKind) -> ReducerSpec {
        ReducerSpec::new(kind, Expr::This.rc())
    }

    #[test]
    fn sum_default_is_zero() {
        assert_eq!(spec(ReducerKind::Sum).finalize(None).unwrap(), Value::Int(0));
    }

    #[test]
    fn sum_ignores_a_leading_null_input() {
        let s = spec(ReducerKind::Sum);
        let mut state = s.init(&Value::Null, None, &Value::Null);
        s.fold(&mut state, &Value::Int(5), None, &Value::Null);
        assert_eq!(s.finalize(Some(state)).unwrap(), Value::Int(5));
    }

    #[test]
    fn sum_or_none_poisons_to_null_on_a_non_numeric_input() {
        let s = spec(ReducerKind::SumOrNone);
        let mut state = s.init(&Value::Int(5), None, &Value::Null);
        s.fold(&mut state, &Value::Null, None, &Value::Null);
        assert_eq!(s.finalize(Some(state)).unwrap(), Value::Null);
    }

    #[test]
    fn mode_breaks_ties_to_the_last_highest_frequency_value() {
        let values = vec![
            Value::Int(1),
            Value::Int(2),
            Value::Int(2),
            Value::Int(3),
            Value::Int(3),
        ];
        assert_eq!(mode_last_tie_wins(&values), Value::Int(3));
    }

    #[test]
    fn array_distinct_preserves_first_occurrence_order() {
        let values = vec![Value::Int(1), Value::Int(2), Value::Int(1), Value::Int(3)];
        let r = spec(ReducerKind::ArrayDistinct).finalize(Some(Value::list(values))).unwrap();
        assert_eq!(r, Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
    }
}
