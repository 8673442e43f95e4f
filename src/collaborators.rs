//! Seams for the out-of-scope collaborators (table IO, date/time parsing)
//! that the core pipeline is exercised against, without building those
//! subsystems here.

use crate::error::ConvtoolsError;
use crate::value::Value;

/// What a table/CSV/JSONL reader hands the core: an iterator of rows.
pub trait RowSource {
    fn rows(&mut self) -> Box<dyn Iterator<Item = Value> + '_>;
}

/// What a table writer consumes from the core.
pub trait RowSink {
    fn write_row(&mut self, row: &Value) -> Result<(), ConvtoolsError>;
}

/// The seam `c::date_parse`/`c::format_dt` would plug into.
pub trait DateFormat {
    fn parse(&self, s: &str) -> Option<Value>;
    fn format(&self, v: &Value) -> Option<String>;
}

/// A trivial worked example: RFC 3339 timestamps stored as `Value::Str`,
/// parsed/formatted only well enough to demonstrate the seam — the real
/// format-table engine is the out-of-scope collaborator this stands in for.
pub struct Rfc3339;

impl DateFormat for Rfc3339 {
    fn parse(&self, s: &str) -> Option<Value> {
        if looks_like_rfc3339(s) {
            Some(Value::str(s))
        } else {
            None
        }
    }

    fn format(&self, v: &Value) -> Option<String> {
        match v {
            Value::Str(s) if looks_like_rfc3339(s) => Some(s.to_string()),
            _ => None,
        }
    }
}

/// Cheap structural check — not a calendar validator. `YYYY-MM-DDTHH:MM:SS`
/// with an optional fractional-seconds/timezone suffix.
fn looks_like_rfc3339(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() < 19 {
        return false;
    }
    let digit = |i: usize| bytes.get(i).is_some_and(u8::is_ascii_digit);
    digit(0) && digit(1) && digit(2) && digit(3)
        && bytes[4] == b'-'
        && digit(5) && digit(6)
        && bytes[7] == b'-'
        && digit(8) && digit(9)
        && (bytes[10] == b'T' || bytes[10] == b' ')
        && digit(11) && digit(12)
        && bytes[13] == b':'
        && digit(14) && digit(15)
        && bytes[16] == b':'
        && digit(17) && digit(18)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3339_round_trips_a_well_formed_timestamp() {
        let fmt = Rfc3339;
        let parsed = fmt.parse("2024-01-02T03:04:05Z").unwrap();
        assert_eq!(fmt.format(&parsed).as_deref(), Some("2024-01-02T03:04:05Z"));
    }

    #[test]
    fn rfc3339_rejects_obviously_malformed_input() {
        assert!(Rfc3339.parse("not-a-date").is_none());
    }
}
