//! `try_`/`except_`/`expect`/`dispatch` matching logic.
//!
//! Handler selection is the one piece of this arithmetic that needs to
//! inspect an error's *kind* rather than its full value, so it is kept
//! separate from the general expression evaluator in `lower`.

use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::expr::ExceptHandler;
use crate::value::Value;

/// The outcome of running a guarded body through its `except_` clauses.
#[derive(Debug, PartialEq)]
pub enum Resolution {
    /// No handler matched (or the body didn't fail) — caller's value stands.
    Unhandled,
    /// A handler matched and produced a replacement value.
    Recovered(Value),
    /// A handler matched but asked to re-raise (`re_raise_if`).
    ReRaise,
}

/// Walk `handlers` in declaration order; the first whose `kind` matches
/// `err.kind()` wins, unless its `re_raise_if` (evaluated by the caller
/// against the failed row, since it needs a `Frame`) says otherwise.
///
/// Callers evaluate `re_raise_if` themselves (it needs frame access this
/// module doesn't have) and pass the result in as `re_raise`.
pub fn select_handler<'a>(
    err: &RuntimeError,
    handlers: &'a [ExceptHandler],
) -> Option<&'a ExceptHandler> {
    let kind = err.kind();
    handlers.iter().find(|h| h.kind == kind || h.kind == RuntimeErrorKind::Custom && matches!(err, RuntimeError::Custom(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_handler_picks_the_first_matching_kind_in_declaration_order() {
        let handlers = vec![
            ExceptHandler {
                kind: RuntimeErrorKind::KeyNotFound,
                value: None,
                re_raise_if: None,
            },
            ExceptHandler {
                kind: RuntimeErrorKind::DivisionByZero,
                value: None,
                re_raise_if: None,
            },
        ];
        let err = RuntimeError::DivisionByZero;
        let picked = select_handler(&err, &handlers).unwrap();
        assert_eq!(picked.kind, RuntimeErrorKind::DivisionByZero);
    }

    #[test]
    fn select_handler_returns_none_when_no_kind_matches() {
        let handlers = vec![ExceptHandler {
            kind: RuntimeErrorKind::KeyNotFound,
            value: None,
            re_raise_if: None,
        }];
        assert!(select_handler(&RuntimeError::DivisionByZero, &handlers).is_none());
    }

    #[test]
    fn resolution_variants_are_distinguishable() {
        assert_eq!(Resolution::Recovered(Value::Int(1)), Resolution::Recovered(Value::Int(1)));
        assert_ne!(Resolution::Unhandled, Resolution::ReRaise);
    }
}
