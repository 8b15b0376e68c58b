//! Syncs of the hand-curated CSV files. A row whose natural key has no match
//! in its dimension aborts the whole sync after writing an `unmatched_*`
//! report, so a partially curated file never reaches the warehouse.
//!
//! Dated histories (roles, customer classification) are merged on
//! `(key, valid_from)`. Stored versions missing from the file are reported
//! as REMOVED and kept, since facts outside the current window still
//! reference their surrogates.

use tracing::info;

use super::{LoaderContext, LoaderReport};
use crate::diff::{diff, DiffSpec};
use crate::error::{EtlError, Result};
use crate::resolver::{KeyResolver, TemporalResolver};
use crate::schema::{
    TableSpec, CUSTOMER_CLASSIFICATION, CUSTOMER_MASTER, PEOPLE, PRODUCTS, PRODUCT_MANAGEMENT,
    SALES_ROLES,
};
use crate::sink::UpsertBatch;
use crate::types::{FieldKind, NaturalKey, Record, Value};

pub const PRODUCT_MANAGEMENT_FILE: &str = "product_management.csv";
pub const CUSTOMER_MASTER_FILE: &str = "customer_master.csv";
pub const CUSTOMER_CLASSIFICATION_FILE: &str = "customer_classification.csv";
pub const PEOPLE_FILE: &str = "people.csv";
pub const ROLES_FILE: &str = "roles.csv";

/// Columns of the product management file, in template order.
pub const PRODUCT_MANAGEMENT_COLUMNS: &[&str] = &[
    "product_code",
    "reference",
    "category",
    "subcategory_1",
    "subcategory_2",
    "guide_description",
    "py_classification",
    "py_equivalence",
    "net_weight",
];

/// One foreign key looked up for every curated row.
struct Lookup<'r> {
    /// Column receiving the surrogate.
    column: &'static str,
    /// Fields of the curated row forming the natural key.
    key_fields: &'static [&'static str],
    resolver: &'r KeyResolver,
    dimension: &'static TableSpec,
    /// A blank key leaves the column null instead of failing.
    optional: bool,
}

/// Attach every lookup's surrogate to `rows`, or fail with
/// [`EtlError::UnresolvedManualRows`] naming the first dimension that missed.
fn attach(
    ctx: &LoaderContext<'_>,
    report: &mut LoaderReport,
    file: &str,
    rows: Vec<Record>,
    lookups: &[Lookup<'_>],
) -> Result<Vec<Record>> {
    let mut resolved = Vec::with_capacity(rows.len());
    let mut unmatched = Vec::new();
    let mut missed_dimension = None;

    for mut row in rows {
        let mut missed = Vec::new();
        for lookup in lookups {
            let key = NaturalKey::from_record(&row, lookup.key_fields);
            if lookup.optional && key.is_blank() {
                row.set(lookup.column, Value::Null);
                continue;
            }
            match lookup.resolver.resolve(&key) {
                Some(surrogate) => row.set(lookup.column, surrogate),
                None => {
                    missed_dimension.get_or_insert(lookup.dimension.name);
                    missed.push(lookup.column);
                }
            }
        }

        if missed.is_empty() {
            resolved.push(row);
        } else {
            unmatched.push(row.with("unmatched", missed.join(";")));
        }
    }

    let Some(dimension) = missed_dimension else {
        return Ok(resolved);
    };

    let stem = format!("unmatched_{}", file.trim_end_matches(".csv"));
    let path = ctx.reports.write_records(&stem, &unmatched)?;
    report.reports.push(path.clone());
    Err(EtlError::UnresolvedManualRows {
        file: file.to_string(),
        dimension,
        count: unmatched.len(),
        report: path,
    })
}

async fn upsert(
    ctx: &LoaderContext<'_>,
    report: &mut LoaderReport,
    table: &'static TableSpec,
    label: &str,
    rows: Vec<Record>,
) -> Result<()> {
    let batch = UpsertBatch::new(table, label, rows, ctx.chunk_size());
    if batch.collapsed() > 0 {
        report.note(format!(
            "{label}: {} rows repeated {}",
            batch.collapsed(),
            table.conflict_key.join(", ")
        ));
    }
    report.sink.absorb(ctx.warehouse.merge_upsert(&batch).await?);
    Ok(())
}

/// Validity columns as dates, so file rows key the same way as stored ones.
fn with_dates(file: &str, rows: Vec<Record>) -> Result<Vec<Record>> {
    rows.into_iter()
        .enumerate()
        .map(|(index, mut row)| {
            for column in ["valid_from", "valid_to"] {
                let date = row.get(column).coerce(FieldKind::Date).map_err(|err| {
                    EtlError::Validation(format!("{file} row {}: {column}: {err}", index + 1))
                })?;
                row.set(column, date);
            }
            Ok(row)
        })
        .collect()
}

async fn merge_history(
    ctx: &LoaderContext<'_>,
    report: &mut LoaderReport,
    table: &'static TableSpec,
    label: &str,
    rows: Vec<Record>,
) -> Result<()> {
    let existing = ctx.warehouse.snapshot(table).await?;
    let changes = diff(
        &existing,
        &rows,
        &DiffSpec {
            key: table.conflict_key,
            compare: table.update_columns,
        },
    );
    ctx.report_changes(report, &format!("changes_{label}"), &changes)?;
    upsert(ctx, report, table, label, rows).await
}

/// Products ordered by surrogate, so "first product" is stable across runs.
fn products_by_id(mut products: Vec<Record>) -> Vec<Record> {
    products.sort_by_key(|row| row.int("id_product"));
    products
}

/// Product classification is global: each `(product_code, reference)` row
/// attaches to the first matching product of any tenant.
pub async fn load_product_management(ctx: &LoaderContext<'_>) -> Result<LoaderReport> {
    let mut report = LoaderReport::new("product_management");
    let rows = ctx
        .manual
        .read(PRODUCT_MANAGEMENT_FILE, &["product_code", "reference"])?;
    report.extracted = rows.len();

    let products = products_by_id(ctx.warehouse.snapshot(&PRODUCTS).await?);
    let resolver =
        KeyResolver::from_records(&products, &["product_code", "reference"], "id_product");

    let rows = attach(
        ctx,
        &mut report,
        PRODUCT_MANAGEMENT_FILE,
        rows,
        &[Lookup {
            column: "id_product",
            key_fields: &["product_code", "reference"],
            resolver: &resolver,
            dimension: &PRODUCTS,
            optional: false,
        }],
    )?;

    upsert(ctx, &mut report, &PRODUCT_MANAGEMENT, "product_management", rows).await?;
    info!(written = report.sink.written(), "Product management synchronized");
    Ok(report)
}

pub async fn load_customer_master(ctx: &LoaderContext<'_>) -> Result<LoaderReport> {
    let mut report = LoaderReport::new("customer_master");
    let rows = ctx
        .manual
        .read(CUSTOMER_MASTER_FILE, &["master_code", "unified_name"])?;
    report.extracted = rows.len();

    let rows: Vec<Record> = rows
        .into_iter()
        .filter(|row| row.text("master_code").is_some())
        .collect();
    upsert(ctx, &mut report, &CUSTOMER_MASTER, "customer_master", rows).await?;
    info!(written = report.sink.written(), "Customer master synchronized");
    Ok(report)
}

pub async fn load_customer_classification(ctx: &LoaderContext<'_>) -> Result<LoaderReport> {
    let mut report = LoaderReport::new("customer_classification");
    let rows = ctx
        .manual
        .read(CUSTOMER_CLASSIFICATION_FILE, &["master_code", "valid_from"])?;
    report.extracted = rows.len();

    let rows = with_dates(CUSTOMER_CLASSIFICATION_FILE, rows)?;

    let masters = ctx.warehouse.snapshot(&CUSTOMER_MASTER).await?;
    let resolver = KeyResolver::from_records(&masters, &["master_code"], "id_customer_master");

    let rows = attach(
        ctx,
        &mut report,
        CUSTOMER_CLASSIFICATION_FILE,
        rows,
        &[Lookup {
            column: "id_customer_master",
            key_fields: &["master_code"],
            resolver: &resolver,
            dimension: &CUSTOMER_MASTER,
            optional: false,
        }],
    )?;

    merge_history(
        ctx,
        &mut report,
        &CUSTOMER_CLASSIFICATION,
        "customer_classification",
        rows,
    )
    .await?;
    info!(
        new = report.new,
        modified = report.modified,
        removed = report.removed,
        "Customer classification synchronized"
    );
    Ok(report)
}

pub async fn load_people(ctx: &LoaderContext<'_>) -> Result<LoaderReport> {
    let mut report = LoaderReport::new("people");
    let rows = ctx
        .manual
        .read(PEOPLE_FILE, &["document_number", "full_name"])?;
    report.extracted = rows.len();

    let rows: Vec<Record> = rows
        .into_iter()
        .filter(|row| row.text("document_number").is_some())
        .collect();
    upsert(ctx, &mut report, &PEOPLE, "people", rows).await?;
    info!(written = report.sink.written(), "People synchronized");
    Ok(report)
}

/// Sales-role history. Person and supervisor documents must exist in
/// `dim_people`; interval problems are reported but do not stop the load.
pub async fn load_roles(ctx: &LoaderContext<'_>) -> Result<LoaderReport> {
    let mut report = LoaderReport::new("roles");
    let rows = ctx.manual.read(
        ROLES_FILE,
        &["person_document", "role_code", "tenant", "valid_from"],
    )?;
    report.extracted = rows.len();
    let rows = with_dates(ROLES_FILE, rows)?;

    let people = ctx.warehouse.snapshot(&PEOPLE).await?;
    let resolver = KeyResolver::from_records(&people, &["document_number"], "id_person");

    let rows = attach(
        ctx,
        &mut report,
        ROLES_FILE,
        rows,
        &[
            Lookup {
                column: "id_person",
                key_fields: &["person_document"],
                resolver: &resolver,
                dimension: &PEOPLE,
                optional: false,
            },
            Lookup {
                column: "id_supervisor",
                key_fields: &["supervisor_document"],
                resolver: &resolver,
                dimension: &PEOPLE,
                optional: true,
            },
        ],
    )?;

    // Versions have no surrogate yet; issues name the 1-based file row.
    let numbered: Vec<Record> = rows
        .iter()
        .enumerate()
        .map(|(index, row)| row.clone().with("file_row", index as i64 + 1))
        .collect();
    let check = TemporalResolver::from_records(
        &numbered,
        &["role_code", "tenant"],
        "valid_from",
        "valid_to",
        "file_row",
    );
    ctx.report_interval_issues(&mut report, "role_issues", &check)?;

    merge_history(ctx, &mut report, &SALES_ROLES, "roles", rows).await?;
    info!(
        new = report.new,
        modified = report.modified,
        removed = report.removed,
        issues = check.issues().len(),
        "Sales roles synchronized"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::memory::MemoryWarehouse;
    use crate::sink::Warehouse;
    use crate::testing::{config, StaticSource};

    #[tokio::test]
    async fn roles_with_an_unknown_person_abort_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        fs::write(
            config.input_dir.join(PEOPLE_FILE),
            "document_number,full_name\n1010,Ana\n",
        )
        .unwrap();
        fs::write(
            config.input_dir.join(ROLES_FILE),
            "person_document,supervisor_document,role_code,tenant,position,valid_from,valid_to\n\
             1010,,V001,CAMDUN,Vendedor,2024-01-01,2024-05-31\n\
             9999,1010,V002,CAMDUN,Vendedor,2024-01-01,\n",
        )
        .unwrap();

        let source = StaticSource::default();
        let warehouse = MemoryWarehouse::new();
        let ctx = LoaderContext::new(&config, &source, &warehouse);
        load_people(&ctx).await.unwrap();

        let err = load_roles(&ctx).await.unwrap_err();
        match err {
            EtlError::UnresolvedManualRows {
                dimension,
                count,
                report,
                ..
            } => {
                assert_eq!(dimension, "dim_people");
                assert_eq!(count, 1);
                let written = fs::read_to_string(report).unwrap();
                assert!(written.contains("9999"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(warehouse.rows(&SALES_ROLES).is_empty());
    }

    #[tokio::test]
    async fn roles_resolve_people_and_optional_supervisors() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        fs::write(
            config.input_dir.join(PEOPLE_FILE),
            "document_number,full_name\n1010,Ana\n2020,Luis\n",
        )
        .unwrap();
        fs::write(
            config.input_dir.join(ROLES_FILE),
            "person_document,supervisor_document,role_code,tenant,position,valid_from,valid_to\n\
             1010,,V001,CAMDUN,Vendedor,2024-01-01,2024-05-31\n\
             2020,1010,V001,CAMDUN,Vendedor,2024-05-01,2024-12-31\n",
        )
        .unwrap();

        let source = StaticSource::default();
        let warehouse = MemoryWarehouse::new();
        let ctx = LoaderContext::new(&config, &source, &warehouse);
        load_people(&ctx).await.unwrap();
        let report = load_roles(&ctx).await.unwrap();

        let roles = warehouse.rows(&SALES_ROLES);
        assert_eq!(roles.len(), 2);
        assert!(roles[0].get("id_supervisor").is_null());
        assert_eq!(roles[1].int("id_supervisor"), roles[0].int("id_person"));
        assert_eq!(report.notes.len(), 1);
        assert_eq!(report.new, 2);
        // role_issues and changes_roles
        assert_eq!(report.reports.len(), 2);
    }

    #[tokio::test]
    async fn product_management_attaches_to_the_first_product_of_any_tenant() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let warehouse = MemoryWarehouse::new();
        let products = ["CAMDUN", "ESTRADA"]
            .into_iter()
            .map(|tenant| {
                Record::new()
                    .with("product_code", "P1")
                    .with("reference", "R1")
                    .with("tenant", tenant)
            })
            .collect();
        warehouse
            .merge_upsert(&UpsertBatch::new(&PRODUCTS, "seed", products, 10))
            .await
            .unwrap();
        fs::write(
            config.input_dir.join(PRODUCT_MANAGEMENT_FILE),
            "product_code,reference,category,net_weight\nP1,R1,Bebidas,0.5\n",
        )
        .unwrap();

        let source = StaticSource::default();
        let ctx = LoaderContext::new(&config, &source, &warehouse);
        load_product_management(&ctx).await.unwrap();

        let managed = warehouse.rows(&PRODUCT_MANAGEMENT);
        assert_eq!(managed.len(), 1);
        assert_eq!(managed[0].int("id_product"), Some(1));
        assert_eq!(managed[0].decimal("net_weight"), Some(0.5));
    }

    #[tokio::test]
    async fn classification_versions_keep_their_ids_and_dropped_ones_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        fs::write(
            config.input_dir.join(CUSTOMER_MASTER_FILE),
            "master_code,unified_name\nM1,Tiendas Uno\n",
        )
        .unwrap();
        let classification = config.input_dir.join(CUSTOMER_CLASSIFICATION_FILE);
        fs::write(
            &classification,
            "master_code,channel,valid_from,valid_to\n\
             M1,Tradicional,2024-01-01,2024-05-31\n\
             M1,Moderno,2024-06-01,\n",
        )
        .unwrap();

        let source = StaticSource::default();
        let warehouse = MemoryWarehouse::new();
        let ctx = LoaderContext::new(&config, &source, &warehouse);
        load_customer_master(&ctx).await.unwrap();
        load_customer_classification(&ctx).await.unwrap();
        let ids = |rows: Vec<Record>| -> Vec<Option<i64>> {
            rows.iter().map(|row| row.int("id_classification")).collect()
        };
        let before = ids(warehouse.rows(&CUSTOMER_CLASSIFICATION));

        fs::write(
            &classification,
            "master_code,channel,valid_from,valid_to\n\
             M1,Moderno,2024-06-01,\n",
        )
        .unwrap();
        let report = load_customer_classification(&ctx).await.unwrap();

        assert_eq!(report.removed, 1);
        assert_eq!(report.sink.inserted, 0);
        assert_eq!(report.sink.deleted, 0);
        assert_eq!(ids(warehouse.rows(&CUSTOMER_CLASSIFICATION)), before);
    }
}
