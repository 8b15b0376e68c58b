use std::fmt;

use serde::Serialize;

pub use erpsync_parser::{FieldKind, Record, Value};

/// Business identifier of a dimension row: ERP codes plus tenant, each part
/// trimmed and with Null read as the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NaturalKey(Vec<String>);

impl NaturalKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            parts
                .into_iter()
                .map(|part| part.as_ref().trim().to_string())
                .collect(),
        )
    }

    pub fn from_record(record: &Record, fields: &[&str]) -> Self {
        Self(
            fields
                .iter()
                .map(|field| record.get(field).to_text().trim().to_string())
                .collect(),
        )
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// True when every part is empty.
    pub fn is_blank(&self) -> bool {
        self.0.iter().all(String::is_empty)
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("|"))
    }
}

/// Warehouse-assigned identifier. Never reassigned or reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SurrogateKey(pub i64);

impl fmt::Display for SurrogateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<SurrogateKey> for Value {
    fn from(key: SurrogateKey) -> Self {
        Value::Int(key.0)
    }
}
