use erpsync_parser::{ApiEntity, RawItem};
use tracing::info;

use super::{LoaderContext, LoaderReport};
use crate::diff::{diff, DiffSpec};
use crate::error::Result;
use crate::schema::CUSTOMERS;
use crate::sink::UpsertBatch;
use crate::source::{extract_all, Endpoint};
use crate::types::Record;

pub const KEY: &[&str] = &["customer_code", "tenant"];
pub const COMPARED: &[&str] = &["tax_id", "name", "address"];

pub fn prepare(items: &[RawItem], tenant: &str) -> Vec<Record> {
    ApiEntity::Customers
        .map_items(items)
        .into_iter()
        .filter(|record| record.text("customer_code").is_some())
        .map(|record| record.with("tenant", tenant))
        .collect()
}

/// Third parties into `dim_customers`. The master link is maintained by the
/// curated sync and never touched here.
pub async fn load(ctx: &LoaderContext<'_>) -> Result<LoaderReport> {
    let mut report = LoaderReport::new("customers");

    let extraction =
        extract_all(ctx.source, &ctx.config.tenants, Endpoint::ThirdParties, None).await?;
    report.record_extraction(&extraction);

    let per_tenant: Vec<(&str, Vec<Record>)> = extraction
        .tenants
        .iter()
        .map(|extracted| {
            let name = extracted.tenant.name.as_str();
            (name, prepare(&extracted.items, name))
        })
        .collect();

    let compared = report.compared_tenants(&extraction, "customers");
    let existing: Vec<Record> = ctx
        .warehouse
        .snapshot(&CUSTOMERS)
        .await?
        .into_iter()
        .filter(|row| compared.contains(row.get("tenant").to_text().trim()))
        .collect();
    let incoming: Vec<Record> = per_tenant
        .iter()
        .flat_map(|(_, rows)| rows.iter().cloned())
        .collect();

    let changes = diff(
        &existing,
        &incoming,
        &DiffSpec {
            key: KEY,
            compare: COMPARED,
        },
    );
    ctx.report_changes(&mut report, "changes_customers", &changes)?;

    let mut failures = Vec::new();
    for (tenant, rows) in per_tenant {
        if rows.is_empty() {
            continue;
        }
        let batch = UpsertBatch::new(
            &CUSTOMERS,
            format!("customers:{tenant}"),
            rows,
            ctx.chunk_size(),
        );
        match ctx.warehouse.merge_upsert(&batch).await {
            Ok(outcome) => report.sink.absorb(outcome),
            Err(failure) => {
                report.tenant_failed(tenant, &failure);
                failures.push(failure);
            }
        }
    }

    info!(
        new = report.new,
        modified = report.modified,
        written = report.sink.written(),
        "Customers synchronized"
    );
    report.finish(failures)
}
