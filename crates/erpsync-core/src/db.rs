use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Pool, Postgres, QueryBuilder, Row};
use tracing::{debug, info};

use crate::error::Result;
use crate::schema::TableSpec;
use crate::sink::{
    prepare_rows, BatchId, ReplaceBatch, SinkFailure, SinkOutcome, UpsertBatch, Warehouse,
};
use crate::types::{FieldKind, Record, Value};

pub type DbPool = Pool<Postgres>;

/// Open the single connection a loader run works on.
pub async fn connect(database_url: &str) -> anyhow::Result<DbPool> {
    PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await
        .with_context(|| "failed to connect to Postgres")
}

/// Postgres-backed [`Warehouse`].
#[derive(Debug, Clone)]
pub struct PgWarehouse {
    pool: DbPool,
}

impl PgWarehouse {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        Ok(Self::new(connect(database_url).await?))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Release the connection. Pending statements finish first.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn insert_chunks(
        &self,
        tx: &mut sqlx::Transaction<'_, Postgres>,
        table: &TableSpec,
        rows: &[Vec<Value>],
        chunk_size: usize,
        on_conflict: Option<&str>,
    ) -> std::result::Result<SinkOutcome, sqlx::Error> {
        let mut outcome = SinkOutcome::default();

        for chunk in rows.chunks(chunk_size.max(1)) {
            let mut builder = insert_statement(table, chunk);
            if let Some(clause) = on_conflict {
                builder.push(clause);
            }
            builder.push(" RETURNING (xmax = 0) AS inserted");

            let returned = builder.build().fetch_all(&mut **tx).await?;
            for row in &returned {
                if row.try_get::<bool, _>("inserted")? {
                    outcome.inserted += 1;
                } else {
                    outcome.updated += 1;
                }
            }
            outcome.skipped += chunk.len() - returned.len();
            debug!(table = table.name, rows = chunk.len(), "chunk written");
        }

        Ok(outcome)
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn sql_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Text => "TEXT",
        FieldKind::Int => "BIGINT",
        FieldKind::Decimal => "DOUBLE PRECISION",
        FieldKind::Bool => "BOOLEAN",
        FieldKind::Date => "DATE",
        FieldKind::Timestamp => "TIMESTAMPTZ",
    }
}

/// Bind a coerced value; typed nulls keep Postgres from guessing parameter
/// types.
fn push_value(builder: &mut QueryBuilder<'_, Postgres>, kind: FieldKind, value: Value) {
    match value {
        Value::Null => match kind {
            FieldKind::Text => builder.push_bind(None::<String>),
            FieldKind::Int => builder.push_bind(None::<i64>),
            FieldKind::Decimal => builder.push_bind(None::<f64>),
            FieldKind::Bool => builder.push_bind(None::<bool>),
            FieldKind::Date => builder.push_bind(None::<NaiveDate>),
            FieldKind::Timestamp => builder.push_bind(None::<DateTime<Utc>>),
        },
        Value::Text(text) => builder.push_bind(text),
        Value::Int(int) => builder.push_bind(int),
        Value::Decimal(decimal) => builder.push_bind(decimal),
        Value::Bool(flag) => builder.push_bind(flag),
        Value::Date(date) => builder.push_bind(date),
        Value::Timestamp(ts) => builder.push_bind(ts),
    };
}

fn insert_statement<'args>(
    table: &TableSpec,
    rows: &[Vec<Value>],
) -> QueryBuilder<'args, Postgres> {
    let columns: Vec<String> = table.column_names().map(quote).collect();
    let mut builder = QueryBuilder::new(format!(
        "INSERT INTO {} ({}) VALUES ",
        quote(table.name),
        columns.join(", ")
    ));

    for (row_index, values) in rows.iter().enumerate() {
        if row_index > 0 {
            builder.push(", ");
        }
        builder.push("(");
        for (column_index, (column, value)) in table.columns.iter().zip(values).enumerate() {
            if column_index > 0 {
                builder.push(", ");
            }
            push_value(&mut builder, column.kind, value.clone());
        }
        builder.push(")");
    }

    builder
}

fn on_conflict_clause(table: &TableSpec) -> Option<String> {
    if table.conflict_key.is_empty() {
        return None;
    }
    let key: Vec<String> = table.conflict_key.iter().map(|c| quote(c)).collect();
    if table.update_columns.is_empty() {
        return Some(format!(" ON CONFLICT ({}) DO NOTHING", key.join(", ")));
    }
    let assignments: Vec<String> = table
        .update_columns
        .iter()
        .map(|column| format!("{0} = EXCLUDED.{0}", quote(column)))
        .collect();
    Some(format!(
        " ON CONFLICT ({}) DO UPDATE SET {}",
        key.join(", "),
        assignments.join(", ")
    ))
}

fn decode(row: &PgRow, name: &str, kind: FieldKind) -> std::result::Result<Value, sqlx::Error> {
    Ok(match kind {
        FieldKind::Text => Value::from(row.try_get::<Option<String>, _>(name)?),
        FieldKind::Int => Value::from(row.try_get::<Option<i64>, _>(name)?),
        FieldKind::Decimal => Value::from(row.try_get::<Option<f64>, _>(name)?),
        FieldKind::Bool => Value::from(row.try_get::<Option<bool>, _>(name)?),
        FieldKind::Date => Value::from(row.try_get::<Option<NaiveDate>, _>(name)?),
        FieldKind::Timestamp => Value::from(row.try_get::<Option<DateTime<Utc>>, _>(name)?),
    })
}

fn delete_statement<'args>(
    batch: &ReplaceBatch,
) -> std::result::Result<QueryBuilder<'args, Postgres>, String> {
    let mut builder = QueryBuilder::new(format!("DELETE FROM {}", quote(batch.table.name)));
    let mut connector = " WHERE ";

    if let Some(window) = &batch.scope.window {
        builder.push(connector);
        builder.push(quote(window.column));
        builder.push(" BETWEEN ");
        builder.push_bind(window.start);
        builder.push(" AND ");
        builder.push_bind(window.end);
        connector = " AND ";
    }

    if let Some((column, value)) = &batch.scope.partition {
        let kind = batch
            .table
            .column(column)
            .map(|spec| spec.kind)
            .ok_or_else(|| format!("partition column {column} is not declared"))?;
        let value = value.coerce(kind)?;
        builder.push(connector);
        builder.push(quote(column));
        builder.push(" = ");
        push_value(&mut builder, kind, value);
    }

    Ok(builder)
}

#[async_trait]
impl Warehouse for PgWarehouse {
    async fn snapshot(&self, table: &'static TableSpec) -> Result<Vec<Record>> {
        let columns = table.all_columns();
        let select: Vec<String> = columns
            .iter()
            .map(|(name, kind)| format!("{0}::{1} AS {0}", quote(name), sql_type(*kind)))
            .collect();
        let sql = format!("SELECT {} FROM {}", select.join(", "), quote(table.name));

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut record = Record::new();
            for (name, kind) in &columns {
                record.set(*name, decode(row, name, *kind)?);
            }
            records.push(record);
        }

        debug!(table = table.name, rows = records.len(), "snapshot read");
        Ok(records)
    }

    async fn merge_upsert(
        &self,
        batch: &UpsertBatch,
    ) -> std::result::Result<SinkOutcome, SinkFailure> {
        let id = batch.id();
        let prepared = prepare_rows(batch.table, &batch.rows)
            .map_err(|message| SinkFailure::invalid(id.clone(), message))?;
        if prepared.is_empty() {
            return Ok(SinkOutcome::default());
        }

        let fail = |err: sqlx::Error| SinkFailure::new(id.clone(), err);
        let conflict = on_conflict_clause(batch.table);

        let mut tx = self.pool.begin().await.map_err(fail)?;
        let outcome = self
            .insert_chunks(
                &mut tx,
                batch.table,
                &prepared,
                batch.chunk_size,
                conflict.as_deref(),
            )
            .await
            .map_err(fail)?;
        tx.commit().await.map_err(fail)?;

        log_committed("merge-upsert", &id, &outcome);
        Ok(outcome)
    }

    async fn replace(
        &self,
        batch: &ReplaceBatch,
    ) -> std::result::Result<SinkOutcome, SinkFailure> {
        let id = batch.id();
        batch
            .validate()
            .map_err(|message| SinkFailure::invalid(id.clone(), message))?;
        let prepared = prepare_rows(batch.table, &batch.rows)
            .map_err(|message| SinkFailure::invalid(id.clone(), message))?;
        let mut delete =
            delete_statement(batch).map_err(|message| SinkFailure::invalid(id.clone(), message))?;

        let fail = |err: sqlx::Error| SinkFailure::new(id.clone(), err);

        let mut tx = self.pool.begin().await.map_err(fail)?;
        let deleted = delete
            .build()
            .execute(&mut *tx)
            .await
            .map_err(fail)?
            .rows_affected();
        let mut outcome = self
            .insert_chunks(&mut tx, batch.table, &prepared, batch.chunk_size, None)
            .await
            .map_err(fail)?;
        tx.commit().await.map_err(fail)?;

        outcome.deleted = deleted as usize;
        log_committed("replace", &id, &outcome);
        Ok(outcome)
    }
}

fn log_committed(strategy: &str, id: &BatchId, outcome: &SinkOutcome) {
    info!(
        strategy,
        table = id.table,
        batch = %id.label,
        fingerprint = %id.fingerprint,
        inserted = outcome.inserted,
        updated = outcome.updated,
        skipped = outcome.skipped,
        deleted = outcome.deleted,
        "sink batch committed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CUSTOMERS, LINES, SALES};
    use crate::sink::ReplaceScope;

    #[test]
    fn conflict_clause_overwrites_only_update_columns() {
        let clause = on_conflict_clause(&CUSTOMERS).expect("clause");
        assert!(clause.starts_with(" ON CONFLICT (\"customer_code\", \"tenant\") DO UPDATE SET "));
        assert!(clause.contains("\"name\" = EXCLUDED.\"name\""));
        assert!(!clause.contains("id_customer_master"));

        assert_eq!(
            on_conflict_clause(&LINES).as_deref(),
            Some(" ON CONFLICT (\"line_code\") DO NOTHING")
        );
        assert_eq!(on_conflict_clause(&SALES), None);
    }

    #[test]
    fn insert_statement_binds_every_column_of_every_row() {
        let rows = vec![
            vec![Value::text("L1"), Value::Null],
            vec![Value::text("L2"), Value::text("Dulces")],
        ];
        let mut builder = insert_statement(&LINES, &rows);
        assert_eq!(
            builder.sql(),
            "INSERT INTO \"dim_lines\" (\"line_code\", \"line_description\") VALUES ($1, $2), ($3, $4)"
        );
        let _ = builder.build();
    }

    #[test]
    fn delete_statement_scopes_window_and_partition() {
        let start = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        let batch = ReplaceBatch::new(
            &SALES,
            "sales:CAMDUN",
            ReplaceScope::window("sale_date", start, end).within("tenant", "CAMDUN"),
            Vec::new(),
            1000,
        );
        let builder = delete_statement(&batch).expect("statement");
        assert_eq!(
            builder.sql(),
            "DELETE FROM \"fact_sales\" WHERE \"sale_date\" BETWEEN $1 AND $2 AND \"tenant\" = $3"
        );

        let everything =
            ReplaceBatch::new(&SALES, "all", ReplaceScope::entire_table(), Vec::new(), 1000);
        assert_eq!(
            delete_statement(&everything).expect("statement").sql(),
            "DELETE FROM \"fact_sales\""
        );
    }
}
