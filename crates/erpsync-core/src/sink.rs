use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::error::Result;
use crate::schema::TableSpec;
use crate::types::{NaturalKey, Record, Value};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Identity of a sink batch, carried by every [`SinkFailure`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchId {
    pub table: &'static str,
    pub label: String,
    pub rows: usize,
    /// blake3 digest of the batch rows.
    pub fingerprint: String,
}

impl BatchId {
    fn new(table: &'static str, label: &str, rows: &[Record]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for row in rows {
            for (field, value) in row.iter() {
                hasher.update(field.as_bytes());
                hasher.update(b"=");
                hasher.update(value.to_text().as_bytes());
                hasher.update(b"\x1f");
            }
            hasher.update(b"\x1e");
        }
        Self {
            table,
            label: label.to_string(),
            rows: rows.len(),
            fingerprint: hasher.finalize().to_hex().to_string(),
        }
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.fingerprint.get(..12).unwrap_or(&self.fingerprint);
        write!(
            f,
            "{}[{}] ({} rows, {})",
            self.table, self.label, self.rows, short
        )
    }
}

#[derive(Debug, Error)]
pub enum SinkCause {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid batch: {0}")]
    Invalid(String),
}

/// A rolled-back sink batch. Batches committed before it are unaffected.
#[derive(Debug, Error)]
#[error("sink batch {batch} failed: {cause}")]
pub struct SinkFailure {
    pub batch: BatchId,
    #[source]
    pub cause: SinkCause,
}

impl SinkFailure {
    pub fn new(batch: BatchId, cause: impl Into<SinkCause>) -> Self {
        Self {
            batch,
            cause: cause.into(),
        }
    }

    pub fn invalid(batch: BatchId, message: impl Into<String>) -> Self {
        Self {
            batch,
            cause: SinkCause::Invalid(message.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SinkOutcome {
    pub inserted: usize,
    pub updated: usize,
    /// Conflicting rows left untouched by an insert-if-absent batch.
    pub skipped: usize,
    pub deleted: usize,
}

impl SinkOutcome {
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }

    pub fn absorb(&mut self, other: SinkOutcome) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.deleted += other.deleted;
    }
}

/// Rows merged on the table's conflict key.
#[derive(Debug, Clone)]
pub struct UpsertBatch {
    pub table: &'static TableSpec,
    pub label: String,
    pub rows: Vec<Record>,
    pub chunk_size: usize,
    collapsed: usize,
}

impl UpsertBatch {
    /// Rows repeating a conflict key are collapsed into one, keeping the
    /// position of the first and the values of the last.
    pub fn new(
        table: &'static TableSpec,
        label: impl Into<String>,
        rows: Vec<Record>,
        chunk_size: usize,
    ) -> Self {
        let mut positions: HashMap<NaturalKey, usize> = HashMap::new();
        let mut unique: Vec<Record> = Vec::with_capacity(rows.len());
        let mut collapsed = 0;

        for row in rows {
            let key = NaturalKey::from_record(&row, table.conflict_key);
            match positions.get(&key) {
                Some(&position) if !table.conflict_key.is_empty() => {
                    unique[position] = row;
                    collapsed += 1;
                }
                _ => {
                    positions.insert(key, unique.len());
                    unique.push(row);
                }
            }
        }

        Self {
            table,
            label: label.into(),
            rows: unique,
            chunk_size: chunk_size.max(1),
            collapsed,
        }
    }

    pub fn collapsed(&self) -> usize {
        self.collapsed
    }

    pub fn id(&self) -> BatchId {
        BatchId::new(self.table.name, &self.label, &self.rows)
    }
}

/// Inclusive date range on a date column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub column: &'static str,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Rows removed by a replace batch before its rows are inserted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReplaceScope {
    pub window: Option<DateWindow>,
    pub partition: Option<(&'static str, Value)>,
}

impl ReplaceScope {
    pub fn entire_table() -> Self {
        Self::default()
    }

    pub fn window(column: &'static str, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            window: Some(DateWindow { column, start, end }),
            partition: None,
        }
    }

    /// Narrow the scope to rows whose `column` equals `value`.
    pub fn within(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.partition = Some((column, value.into()));
        self
    }

    pub fn contains(&self, row: &Record) -> bool {
        let in_window = self.window.map_or(true, |window| {
            row.date(window.column)
                .is_some_and(|date| window.contains(date))
        });
        let in_partition = self.partition.as_ref().map_or(true, |(column, value)| {
            row.get(column).to_text().trim() == value.to_text().trim()
        });
        in_window && in_partition
    }

    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(window) = &self.window {
            parts.push(format!(
                "{} in [{}, {}]",
                window.column, window.start, window.end
            ));
        }
        if let Some((column, value)) = &self.partition {
            parts.push(format!("{column} = {}", value.to_text()));
        }
        if parts.is_empty() {
            "entire table".to_string()
        } else {
            parts.join(" and ")
        }
    }
}

/// Rows that replace everything inside a scope.
#[derive(Debug, Clone)]
pub struct ReplaceBatch {
    pub table: &'static TableSpec,
    pub label: String,
    pub scope: ReplaceScope,
    pub rows: Vec<Record>,
    pub chunk_size: usize,
}

impl ReplaceBatch {
    pub fn new(
        table: &'static TableSpec,
        label: impl Into<String>,
        scope: ReplaceScope,
        rows: Vec<Record>,
        chunk_size: usize,
    ) -> Self {
        Self {
            table,
            label: label.into(),
            scope,
            rows,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn id(&self) -> BatchId {
        BatchId::new(self.table.name, &self.label, &self.rows)
    }

    /// Every row must fall inside the scope it replaces, otherwise a rerun
    /// would not remove it.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(window) = &self.scope.window {
            if window.start > window.end {
                return Err(format!(
                    "window starts ({}) after it ends ({})",
                    window.start, window.end
                ));
            }
        }
        match self.rows.iter().position(|row| !self.scope.contains(row)) {
            Some(index) => Err(format!(
                "row {index} lies outside the replaced scope ({})",
                self.scope.describe()
            )),
            None => Ok(()),
        }
    }
}

/// Coerce rows to the table's written columns, in declaration order.
/// Fields the table does not declare are not written.
pub fn prepare_rows(
    table: &TableSpec,
    rows: &[Record],
) -> std::result::Result<Vec<Vec<Value>>, String> {
    rows.iter()
        .enumerate()
        .map(|(index, row)| {
            table
                .columns
                .iter()
                .map(|column| {
                    let value = row
                        .get(column.name)
                        .coerce(column.kind)
                        .map_err(|err| format!("row {index} column {}: {err}", column.name))?;
                    if value.is_null() && !column.nullable {
                        return Err(format!("row {index}: {} is required", column.name));
                    }
                    Ok(value)
                })
                .collect()
        })
        .collect()
}

/// The warehouse as seen by the loaders.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Every row of `table`, surrogate column included.
    async fn snapshot(&self, table: &'static TableSpec) -> Result<Vec<Record>>;

    /// Insert; on conflict overwrite the table's update columns. One
    /// transaction per batch.
    async fn merge_upsert(
        &self,
        batch: &UpsertBatch,
    ) -> std::result::Result<SinkOutcome, SinkFailure>;

    /// Delete the batch scope, then insert the batch. One transaction.
    async fn replace(&self, batch: &ReplaceBatch)
        -> std::result::Result<SinkOutcome, SinkFailure>;
}
