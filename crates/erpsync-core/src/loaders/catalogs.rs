use tracing::info;

use super::{LoaderContext, LoaderReport};
use crate::error::Result;
use crate::schema::{TableSpec, BRANDS, DEPARTMENTS, GROUPS, LINES, WAREHOUSES};
use crate::sink::UpsertBatch;

/// Catalog file → dimension. Columns are named as the dimension's columns.
pub const CATALOG_FILES: [(&str, &TableSpec); 5] = [
    ("lines.csv", &LINES),
    ("brands.csv", &BRANDS),
    ("departments.csv", &DEPARTMENTS),
    ("groups.csv", &GROUPS),
    ("warehouses.csv", &WAREHOUSES),
];

/// Insert catalog rows whose code is not stored yet. Existing rows are
/// never changed; a missing file is noted and skipped.
pub async fn load(ctx: &LoaderContext<'_>) -> Result<LoaderReport> {
    let mut report = LoaderReport::new("catalogs");

    for (file, table) in CATALOG_FILES {
        let Some(rows) = ctx.manual.read_optional(file, table.conflict_key)? else {
            report.note(format!("{file} not found in {}", ctx.manual.dir().display()));
            continue;
        };
        report.extracted += rows.len();

        let rows = rows
            .into_iter()
            .filter(|row| table.conflict_key.iter().all(|field| row.text(field).is_some()))
            .collect();
        let batch = UpsertBatch::new(table, table.name, rows, ctx.chunk_size());
        let outcome = ctx.warehouse.merge_upsert(&batch).await?;
        info!(
            table = table.name,
            inserted = outcome.inserted,
            already_present = outcome.skipped,
            "Catalog loaded"
        );
        report.sink.absorb(outcome);
    }

    Ok(report)
}
