//! Group-by / aggregate execution: one pass over the row source,
//! folding every reducer slot into its running state, keyed by group.
//!
//! A plain `aggregate(...)` (no `group_by`) is the same machinery with a
//! single implicit group. Group order is insertion order — the first row
//! that introduces a new key decides where that group sits in the output,
//! matching `IndexMap`'s iteration guarantee.

use crate::error::RuntimeError;
use crate::expr::Expr;
use crate::reducer::ReducerSpec;
use crate::value::Value;
use indexmap::IndexMap;

/// Every distinct reducer slot reachable from an aggregate/group-by's post
/// expression, deduplicated by identity — two `Reduce` nodes built from the
/// same `ReducerSpec` handle (the common case: `total.clone()` reused at
/// two leaves of the output literal) share one slot.
pub fn collect_reducer_table(post: &Expr) -> Vec<ReducerSpec> {
    let mut found = Vec::new();
    crate::deps::collect_reducers(post, &mut found);
    let mut table: Vec<ReducerSpec> = Vec::new();
    for spec in found {
        if !table.iter().any(|existing| existing.same_as(&spec)) {
            table.push(spec);
        }
    }
    table
}

/// Running state for one group's worth of reducer slots.
pub struct GroupState {
    states: Vec<Option<Value>>,
}

impl GroupState {
    fn new(n: usize) -> Self {
        GroupState {
            states: vec![None; n],
        }
    }

    pub fn observe(
        &mut self,
        slot: usize,
        reducer: &ReducerSpec,
        input: Value,
        secondary_key: Option<&Value>,
        row: &Value,
    ) {
        match &mut self.states[slot] {
            None => self.states[slot] = Some(reducer.init(&input, secondary_key, row)),
            Some(state) => reducer.fold(state, &input, secondary_key, row),
        }
    }

    pub fn finalize(&self, table: &[ReducerSpec]) -> Result<Vec<Value>, RuntimeError> {
        table
            .iter()
            .zip(self.states.iter())
            .map(|(r, s)| r.finalize(s.clone()))
            .collect()
    }
}

/// Insertion-ordered group accumulator for `group_by(...).aggregate(...)`.
/// A plain `aggregate(...)` uses this with a single fixed key.
pub struct GroupAccumulator {
    table: Vec<ReducerSpec>,
    groups: IndexMap<Value, GroupState>,
}

impl GroupAccumulator {
    pub fn new(table: Vec<ReducerSpec>) -> Self {
        GroupAccumulator {
            table,
            groups: IndexMap::new(),
        }
    }

    pub fn table(&self) -> &[ReducerSpec] {
        &self.table
    }

    /// Record one row already keyed by `group_key` for every reducer slot.
    /// `inputs[i]` and `secondary_keys[i]` line up positionally with
    /// `self.table()[i]`; a `None` input means the slot's `where` guard
    /// rejected this row.
    pub fn observe_row(
        &mut self,
        group_key: Value,
        inputs: Vec<Option<Value>>,
        secondary_keys: Vec<Option<Value>>,
        row: &Value,
    ) {
        let n = self.table.len();
        let state = self
            .groups
            .entry(group_key)
            .or_insert_with(|| GroupState::new(n));
        for (slot, (input, secondary_key)) in inputs.into_iter().zip(secondary_keys).enumerate() {
            if let Some(input) = input {
                state.observe(slot, &self.table[slot], input, secondary_key.as_ref(), row);
            }
        }
    }

    pub fn into_groups(self) -> Vec<(Value, Vec<Value>)> {
        self.groups
            .into_iter()
            .map(|(key, state)| {
                let finalized = state.finalize(&self.table).unwrap_or_else(|_| {
                    self.table.iter().map(ReducerSpec::declared_default).collect()
                });
                (key, finalized)
            })
            .collect()
    }

    /// Like `into_groups` but surfaces the first finalize error instead of
    /// silently falling back to declared defaults.
    pub fn try_into_groups(self) -> Result<Vec<(Value, Vec<Value>)>, RuntimeError> {
        self.groups
            .into_iter()
            .map(|(key, state)| Ok((key, state.finalize(&self.table)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducer::ReducerKind;

    #[test]
    fn groups_preserve_first_seen_insertion_order() {
        let table = vec![ReducerSpec::new(ReducerKind::Sum, Expr::This.rc())];
        let mut acc = GroupAccumulator::new(table);
        acc.observe_row(Value::str("b"), vec![Some(Value::Int(1))], vec![None], &Value::Null);
        acc.observe_row(Value::str("a"), vec![Some(Value::Int(2))], vec![None], &Value::Null);
        acc.observe_row(Value::str("b"), vec![Some(Value::Int(3))], vec![None], &Value::Null);
        let groups = acc.try_into_groups().unwrap();
        assert_eq!(groups[0].0, Value::str("b"));
        assert_eq!(groups[0].1[0], Value::Int(4));
        assert_eq!(groups[1].0, Value::str("a"));
    }

    #[test]
    fn a_row_rejected_by_where_does_not_initialize_the_slot() {
        let table = vec![ReducerSpec::new(ReducerKind::Sum, Expr::This.rc())];
        let mut acc = GroupAccumulator::new(table);
        acc.observe_row(Value::str("a"), vec![None], vec![None], &Value::Null);
        let groups = acc.try_into_groups().unwrap();
        assert_eq!(groups[0].1[0], Value::Int(0));
    }
}
