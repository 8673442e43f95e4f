//! Hash-join compiler: split a join predicate into the equality
//! terms that can drive a hash lookup plus whatever residual predicate is
//! left over, then execute one of the five `JoinHow` strategies against
//! that split.
//!
//! Grounded in the general shape of equi-join planning seen across stream-
//! processing join implementations in the reference pack: pull `a == b`
//! conjuncts referencing exactly one side each out of the top-level `AND`,
//! hash on those, and fall back to a nested-loop scan of whatever remains.

use crate::error::{CompileError, RuntimeError};
use crate::expr::{BinOp, Expr, JoinHow};
use crate::value::Value;
use indexmap::IndexMap;
use std::rc::Rc;

pub struct HashJoinPlan {
    pub left_keys: Vec<Rc<Expr>>,
    pub right_keys: Vec<Rc<Expr>>,
    pub residual: Option<Rc<Expr>>,
}

fn mentions(expr: &Expr, left: bool) -> bool {
    match expr {
        Expr::Left if left => true,
        Expr::Right if !left => true,
        Expr::Left | Expr::Right => false,
        _ => {
            let mut found = false;
            crate::deps::walk_children(expr, &mut |child| {
                found = found || mentions(child, left);
            });
            found
        }
    }
}

fn flatten_and(expr: &Rc<Expr>, out: &mut Vec<Rc<Expr>>) {
    match expr.as_ref() {
        Expr::And(terms) => {
            for t in terms {
                flatten_and(t, out);
            }
        }
        _ => out.push(expr.clone()),
    }
}

/// Split `predicate` into hashable equality terms and a residual AND of
/// whatever's left. `how == Cross` tolerates an empty/absent predicate;
/// every other mode requires at least one term.
pub fn split_predicate(predicate: &Rc<Expr>, how: JoinHow) -> Result<HashJoinPlan, CompileError> {
    let mut terms = Vec::new();
    flatten_and(predicate, &mut terms);

    let mut left_keys = Vec::new();
    let mut right_keys = Vec::new();
    let mut residual_terms = Vec::new();

    for term in &terms {
        if let Expr::BinOp(BinOp::Eq, a, b) = term.as_ref() {
            let a_left = mentions(a, true) && !mentions(a, false);
            let a_right = mentions(a, false) && !mentions(a, true);
            let b_left = mentions(b, true) && !mentions(b, false);
            let b_right = mentions(b, false) && !mentions(b, true);
            if a_left && b_right {
                left_keys.push(a.clone());
                right_keys.push(b.clone());
                continue;
            }
            if a_right && b_left {
                left_keys.push(b.clone());
                right_keys.push(a.clone());
                continue;
            }
        }
        residual_terms.push(term.clone());
    }

    let residual = match residual_terms.len() {
        0 => None,
        1 => Some(residual_terms.into_iter().next().unwrap()),
        _ => Some(Expr::And(residual_terms).rc()),
    };

    if left_keys.is_empty() && residual.is_none() && how != JoinHow::Cross {
        return Err(CompileError::EmptyJoinPredicate(format!("{how:?}")));
    }

    Ok(HashJoinPlan {
        left_keys,
        right_keys,
        residual,
    })
}

/// Execute a join over materialized row vectors. `left_key`/`right_key`
/// evaluate a row's composite equality key (already built from
/// `HashJoinPlan::{left,right}_keys` by the caller, since only the caller
/// has a `Frame` to evaluate them in); `residual` re-checks whatever the
/// equality split couldn't express. Returns paired row indices so the
/// caller builds the output row shape (no fixed shape is mandated).
pub fn execute<FL, FR, FRes>(
    left_rows: &[Value],
    right_rows: &[Value],
    how: JoinHow,
    has_keys: bool,
    mut left_key: FL,
    mut right_key: FR,
    mut residual: FRes,
) -> Result<Vec<(Option<usize>, Option<usize>)>, RuntimeError>
where
    FL: FnMut(&Value) -> Result<Value, RuntimeError>,
    FR: FnMut(&Value) -> Result<Value, RuntimeError>,
    FRes: FnMut(&Value, &Value) -> Result<bool, RuntimeError>,
{
    let mut pairs = Vec::new();
    let mut right_matched = vec![false; right_rows.len()];
    let mut left_matched = vec![false; left_rows.len()];

    if how == JoinHow::Cross {
        for (li, l) in left_rows.iter().enumerate() {
            for (ri, r) in right_rows.iter().enumerate() {
                if residual(l, r)? {
                    pairs.push((Some(li), Some(ri)));
                    left_matched[li] = true;
                    right_matched[ri] = true;
                }
            }
        }
    } else if has_keys {
        let mut index: IndexMap<Value, Vec<usize>> = IndexMap::new();
        for (ri, r) in right_rows.iter().enumerate() {
            let key = right_key(r)?;
            index.entry(key).or_default().push(ri);
        }
        for (li, l) in left_rows.iter().enumerate() {
            let key = left_key(l)?;
            if let Some(candidates) = index.get(&key) {
                for &ri in candidates {
                    let r = &right_rows[ri];
                    if residual(l, r)? {
                        pairs.push((Some(li), Some(ri)));
                        left_matched[li] = true;
                        right_matched[ri] = true;
                    }
                }
            }
        }
    } else {
        for (li, l) in left_rows.iter().enumerate() {
            for (ri, r) in right_rows.iter().enumerate() {
                if residual(l, r)? {
                    pairs.push((Some(li), Some(ri)));
                    left_matched[li] = true;
                    right_matched[ri] = true;
                }
            }
        }
    }

    if matches!(how, JoinHow::Left | JoinHow::Outer) {
        for (li, matched) in left_matched.iter().enumerate() {
            if !matched {
                pairs.push((Some(li), None));
            }
        }
    }
    if matches!(how, JoinHow::Right | JoinHow::Outer) {
        for (ri, matched) in right_matched.iter().enumerate() {
            if !matched {
                pairs.push((None, Some(ri)));
            }
        }
    }

    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_pulls_left_eq_right_out_of_conjunction() {
        let predicate = Expr::And(vec![
            Expr::BinOp(
                BinOp::Eq,
                Expr::Attr { base: Expr::Left.rc(), names: vec!["id".into()], default: None }.rc(),
                Expr::Attr { base: Expr::Right.rc(), names: vec!["id".into()], default: None }.rc(),
            )
            .rc(),
            Expr::BinOp(BinOp::Gt, Expr::Left.rc(), Expr::Right.rc()).rc(),
        ])
        .rc();
        let plan = split_predicate(&predicate, JoinHow::Inner).unwrap();
        assert_eq!(plan.left_keys.len(), 1);
        assert_eq!(plan.right_keys.len(), 1);
        assert!(plan.residual.is_some());
    }

    #[test]
    fn cross_join_tolerates_no_predicate() {
        let predicate = Expr::Const(Value::Bool(true)).rc();
        let plan = split_predicate(&predicate, JoinHow::Cross).unwrap();
        assert!(plan.left_keys.is_empty());
    }

    #[test]
    fn left_join_emits_unmatched_left_rows() {
        let left = vec![Value::Int(1), Value::Int(2)];
        let right = vec![Value::Int(1)];
        let pairs = execute(
            &left,
            &right,
            JoinHow::Left,
            true,
            |v| Ok(v.clone()),
            |v| Ok(v.clone()),
            |_, _| Ok(true),
        )
        .unwrap();
        assert!(pairs.contains(&(Some(1), None)));
    }
}
