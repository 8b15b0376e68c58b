use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::formats::common::{parse_bool, parse_decimal, parse_erp_date};

/// A raw item as returned by the ERP API, before column mapping.
pub type RawItem = serde_json::Map<String, serde_json::Value>;

/// Storage kind of a warehouse column; drives coercion and parameter binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Int,
    Decimal,
    Bool,
    Date,
    Timestamp,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FieldKind::Text => "text",
            FieldKind::Int => "integer",
            FieldKind::Decimal => "decimal",
            FieldKind::Bool => "boolean",
            FieldKind::Date => "date",
            FieldKind::Timestamp => "timestamp",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Text(String),
    Int(i64),
    Decimal(f64),
    Bool(bool),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
}

static NULL: Value = Value::Null;

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null or text that is empty once trimmed.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    /// Text rendering of any value. Null renders as the empty string and
    /// integral decimals drop their fractional part.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Text(text) => text.clone(),
            Value::Int(value) => value.to_string(),
            Value::Decimal(value) => format_decimal(*value),
            Value::Bool(value) => value.to_string(),
            Value::Date(date) => date.format("%Y-%m-%d").to_string(),
            Value::Timestamp(ts) => ts.to_rfc3339(),
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(date) => Some(*date),
            Value::Text(text) => parse_erp_date(text),
            Value::Timestamp(ts) => Some(ts.date_naive()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.coerce(FieldKind::Int) {
            Ok(Value::Int(value)) => Some(value),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<f64> {
        match self.coerce(FieldKind::Decimal) {
            Ok(Value::Decimal(value)) => Some(value),
            _ => None,
        }
    }

    /// Convert to the representation expected by a column of `kind`.
    /// Blank text becomes Null for every non-text kind.
    pub fn coerce(&self, kind: FieldKind) -> Result<Value, String> {
        if self.is_null() {
            return Ok(Value::Null);
        }
        if kind != FieldKind::Text && self.is_blank() {
            return Ok(Value::Null);
        }

        let mismatch = || format!("cannot convert {:?} to {kind}", self);

        match kind {
            FieldKind::Text => Ok(Value::Text(self.to_text())),
            FieldKind::Int => match self {
                Value::Int(value) => Ok(Value::Int(*value)),
                Value::Decimal(value) if value.fract() == 0.0 => Ok(Value::Int(*value as i64)),
                Value::Bool(value) => Ok(Value::Int(i64::from(*value))),
                Value::Text(text) => {
                    let trimmed = text.trim();
                    if let Ok(value) = trimmed.parse::<i64>() {
                        return Ok(Value::Int(value));
                    }
                    match parse_decimal(trimmed) {
                        Some(value) if value.fract() == 0.0 => Ok(Value::Int(value as i64)),
                        _ => Err(mismatch()),
                    }
                }
                _ => Err(mismatch()),
            },
            FieldKind::Decimal => match self {
                Value::Decimal(value) => Ok(Value::Decimal(*value)),
                Value::Int(value) => Ok(Value::Decimal(*value as f64)),
                Value::Text(text) => parse_decimal(text).map(Value::Decimal).ok_or_else(mismatch),
                _ => Err(mismatch()),
            },
            FieldKind::Bool => match self {
                Value::Bool(value) => Ok(Value::Bool(*value)),
                Value::Int(value) => Ok(Value::Bool(*value != 0)),
                Value::Text(text) => parse_bool(text).map(Value::Bool).ok_or_else(mismatch),
                _ => Err(mismatch()),
            },
            FieldKind::Date => self.as_date().map(Value::Date).ok_or_else(mismatch),
            FieldKind::Timestamp => match self {
                Value::Timestamp(ts) => Ok(Value::Timestamp(*ts)),
                Value::Date(date) => date
                    .and_hms_opt(0, 0, 0)
                    .map(|naive| Value::Timestamp(naive.and_utc()))
                    .ok_or_else(mismatch),
                Value::Text(text) => DateTime::parse_from_rfc3339(text.trim())
                    .map(|ts| Value::Timestamp(ts.with_timezone(&Utc)))
                    .map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
        }
    }

    /// Lossy conversion of an API JSON scalar. Nested arrays and objects are
    /// kept as their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(flag) => Value::Bool(*flag),
            serde_json::Value::Number(number) => match number.as_i64() {
                Some(int) => Value::Int(int),
                None => number.as_f64().map(Value::Decimal).unwrap_or(Value::Null),
            },
            serde_json::Value::String(text) => Value::Text(text.clone()),
            other => Value::Text(other.to_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Decimal(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Timestamp(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

fn format_decimal(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// A flat, named set of values. Missing fields read as Null.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&NULL)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn remove(&mut self, field: &str) -> Value {
        self.fields.remove(field).unwrap_or_default()
    }

    /// Trimmed text of a field, or `None` when the field is blank.
    pub fn text(&self, field: &str) -> Option<String> {
        let value = self.get(field);
        if value.is_blank() {
            None
        } else {
            Some(value.to_text().trim().to_string())
        }
    }

    pub fn date(&self, field: &str) -> Option<NaiveDate> {
        self.get(field).as_date()
    }

    pub fn int(&self, field: &str) -> Option<i64> {
        self.get(field).as_int()
    }

    pub fn decimal(&self, field: &str) -> Option<f64> {
        self.get(field).as_decimal()
    }

    /// Copy of the named fields only (missing ones as Null).
    pub fn project(&self, fields: &[&str]) -> Record {
        let mut projected = Record::new();
        for field in fields {
            projected.set(*field, self.get(field).clone());
        }
        projected
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (field, value) in iter {
            record.set(field, value);
        }
        record
    }
}
