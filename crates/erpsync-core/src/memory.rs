use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::Result;
use crate::schema::TableSpec;
use crate::sink::{prepare_rows, ReplaceBatch, SinkFailure, SinkOutcome, UpsertBatch, Warehouse};
use crate::types::{NaturalKey, Record, Value};

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    rows: Vec<Record>,
    last_id: i64,
}

impl MemoryTable {
    fn insert(&mut self, table: &TableSpec, mut row: Record) {
        if let Some(surrogate) = table.surrogate {
            self.last_id += 1;
            row.set(surrogate, self.last_id);
        }
        self.rows.push(row);
    }
}

/// In-process warehouse with the same batch semantics as Postgres: rows are
/// validated up front and each batch is applied to a copy that replaces the
/// table only when the whole batch succeeded.
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    tables: Mutex<HashMap<&'static str, MemoryTable>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current rows of a table, surrogate column included.
    pub fn rows(&self, table: &TableSpec) -> Vec<Record> {
        self.lock()
            .get(table.name)
            .map(|stored| stored.rows.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<&'static str, MemoryTable>> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn to_record(table: &TableSpec, values: Vec<Value>) -> Record {
    table
        .columns
        .iter()
        .zip(values)
        .map(|(column, value)| (column.name, value))
        .collect()
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn snapshot(&self, table: &'static TableSpec) -> Result<Vec<Record>> {
        Ok(self.rows(table))
    }

    async fn merge_upsert(
        &self,
        batch: &UpsertBatch,
    ) -> std::result::Result<SinkOutcome, SinkFailure> {
        let spec = batch.table;
        let prepared = prepare_rows(spec, &batch.rows)
            .map_err(|message| SinkFailure::invalid(batch.id(), message))?;

        let mut tables = self.lock();
        let mut working = tables.get(spec.name).cloned().unwrap_or_default();
        let mut positions: HashMap<NaturalKey, usize> = if spec.conflict_key.is_empty() {
            HashMap::new()
        } else {
            working
                .rows
                .iter()
                .enumerate()
                .map(|(index, row)| (NaturalKey::from_record(row, spec.conflict_key), index))
                .collect()
        };

        let mut outcome = SinkOutcome::default();
        for values in prepared {
            let row = to_record(spec, values);
            let existing = if spec.conflict_key.is_empty() {
                None
            } else {
                positions
                    .get(&NaturalKey::from_record(&row, spec.conflict_key))
                    .copied()
            };

            match existing {
                Some(_) if spec.update_columns.is_empty() => outcome.skipped += 1,
                Some(index) => {
                    let stored = &mut working.rows[index];
                    for column in spec.update_columns {
                        stored.set(*column, row.get(column).clone());
                    }
                    outcome.updated += 1;
                }
                None => {
                    if !spec.conflict_key.is_empty() {
                        positions.insert(
                            NaturalKey::from_record(&row, spec.conflict_key),
                            working.rows.len(),
                        );
                    }
                    working.insert(spec, row);
                    outcome.inserted += 1;
                }
            }
        }

        tables.insert(spec.name, working);
        Ok(outcome)
    }

    async fn replace(
        &self,
        batch: &ReplaceBatch,
    ) -> std::result::Result<SinkOutcome, SinkFailure> {
        let spec = batch.table;
        batch
            .validate()
            .map_err(|message| SinkFailure::invalid(batch.id(), message))?;
        let prepared = prepare_rows(spec, &batch.rows)
            .map_err(|message| SinkFailure::invalid(batch.id(), message))?;

        let mut tables = self.lock();
        let mut working = tables.get(spec.name).cloned().unwrap_or_default();

        let before = working.rows.len();
        working.rows.retain(|row| !batch.scope.contains(row));
        let mut outcome = SinkOutcome {
            deleted: before - working.rows.len(),
            ..SinkOutcome::default()
        };

        for values in prepared {
            working.insert(spec, to_record(spec, values));
            outcome.inserted += 1;
        }

        tables.insert(spec.name, working);
        Ok(outcome)
    }
}
