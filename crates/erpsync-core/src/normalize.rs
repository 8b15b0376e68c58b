//! Canonical form for free-text and identifier fields so that comparisons
//! across sources ignore surrounding whitespace, letter case and nulls.

use crate::types::{Record, Value};

/// Text of `value`, Null as empty, trimmed, upper-cased.
pub fn normalize_value(value: &Value) -> String {
    value.to_text().trim().to_uppercase()
}

/// Copy of `record` with each named field replaced by its normalized text.
/// Fields absent from the record are added as the empty string.
pub fn normalize(record: &Record, fields: &[&str]) -> Record {
    let mut normalized = record.clone();
    for field in fields {
        let value = normalize_value(record.get(field));
        normalized.set(*field, Value::Text(value));
    }
    normalized
}
