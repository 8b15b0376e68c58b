use chrono::Utc;
use erpsync_parser::formats::schema::{INVENTORY_RECORD_PATH, PRICE_LIST_CODE, PRICE_LIST_PATH};
use erpsync_parser::{flatten_nested, offers_price_list, ApiEntity, RawItem};
use tracing::info;

use super::{LoaderContext, LoaderReport};
use crate::config::TenantConfig;
use crate::enrich::{Enricher, Enrichment, FactDraft, Slot};
use crate::error::Result;
use crate::resolver::KeyResolver;
use crate::schema::{INVENTORY_CURRENT, INVENTORY_SNAPSHOTS, PRODUCTS, WAREHOUSES};
use crate::sink::UpsertBatch;
use crate::source::{extract_all, Endpoint};
use crate::types::{NaturalKey, Record, Value};

const PRODUCT_KEY: &[&str] = &["product_code", "reference", "tenant"];
const SNAPSHOT_COLUMNS: &[&str] = &["id_product", "id_warehouse", "tenant", "quantity_available"];

/// One row per product and warehouse, restricted to the tenant's allowed
/// warehouses and, when configured, to products offered in its price list.
pub fn prepare(items: &[RawItem], tenant: &TenantConfig) -> Vec<Record> {
    let stock = flatten_nested(
        items,
        INVENTORY_RECORD_PATH,
        &["OCODIGO", "OREFERENCIA", PRICE_LIST_PATH],
    );

    stock
        .iter()
        .filter(|row| {
            let warehouse = row
                .get("OCODBODEGA")
                .map(Value::from_json)
                .unwrap_or_default()
                .to_text();
            tenant.allows_warehouse(&warehouse)
        })
        .filter(|row| match &tenant.required_price_list {
            Some(price_list) => {
                offers_price_list(row, PRICE_LIST_PATH, PRICE_LIST_CODE, price_list.trim())
            }
            None => true,
        })
        .map(|row| ApiEntity::Inventory.map_item(row).with("tenant", tenant.name.as_str()))
        .collect()
}

fn draft(record: Record) -> FactDraft {
    let product = NaturalKey::from_record(&record, PRODUCT_KEY);
    let warehouse = NaturalKey::from_record(&record, &["warehouse_code"]);
    FactDraft::new(None, record)
        .with_key("product", product)
        .with_key("warehouse", warehouse)
}

/// Current stock into `inventory_current`.
pub async fn load(ctx: &LoaderContext<'_>) -> Result<LoaderReport> {
    let mut report = LoaderReport::new("inventory");

    let extraction = extract_all(ctx.source, &ctx.config.tenants, Endpoint::Products, None).await?;
    report.record_extraction(&extraction);

    let products = ctx.warehouse.snapshot(&PRODUCTS).await?;
    let warehouses = ctx.warehouse.snapshot(&WAREHOUSES).await?;
    let enricher = Enricher::new(vec![
        Slot::new(
            "product",
            "id_product",
            KeyResolver::from_records(&products, PRODUCT_KEY, "id_product"),
        ),
        Slot::new(
            "warehouse",
            "id_warehouse",
            KeyResolver::from_records(&warehouses, &["warehouse_code"], "id_warehouse"),
        ),
    ]);

    let updated_at = Utc::now();
    let mut quarantine = Enrichment::default();
    let mut failures = Vec::new();

    for extracted in &extraction.tenants {
        let tenant = extracted.tenant;
        if tenant.allowed_warehouses.is_empty() {
            report.note(format!("{}: no allowed warehouses configured", tenant.name));
        }

        let drafts: Vec<FactDraft> = prepare(&extracted.items, tenant)
            .into_iter()
            .map(draft)
            .collect();
        let enrichment = enricher.enrich(&drafts);
        info!(
            tenant = %tenant.name,
            stock_rows = drafts.len(),
            enriched = enrichment.enriched.len(),
            quarantined = enrichment.quarantined.len(),
            "Inventory enriched"
        );

        let rows: Vec<Record> = enrichment
            .enriched_records()
            .into_iter()
            .map(|record| record.with("updated_at", updated_at))
            .collect();
        quarantine.quarantined.extend(enrichment.quarantined);
        for (slot, count) in enrichment.tally {
            *quarantine.tally.entry(slot).or_default() += count;
        }

        if rows.is_empty() {
            continue;
        }
        let batch = UpsertBatch::new(
            &INVENTORY_CURRENT,
            format!("inventory:{}", tenant.name),
            rows,
            ctx.chunk_size(),
        );
        if batch.collapsed() > 0 {
            report.note(format!(
                "{}: {} stock rows repeated a product and warehouse",
                tenant.name,
                batch.collapsed()
            ));
        }
        match ctx.warehouse.merge_upsert(&batch).await {
            Ok(outcome) => report.sink.absorb(outcome),
            Err(failure) => {
                report.tenant_failed(&tenant.name, &failure);
                failures.push(failure);
            }
        }
    }

    ctx.report_quarantine(&mut report, "quarantine_inventory", &quarantine)?;
    report.finish(failures)
}

/// Copy `inventory_current` into `fact_inventory` dated today. Rows already
/// captured today are left as they are.
pub async fn snapshot(ctx: &LoaderContext<'_>) -> Result<LoaderReport> {
    let mut report = LoaderReport::new("inventory_snapshot");

    let current = ctx.warehouse.snapshot(&INVENTORY_CURRENT).await?;
    report.extracted = current.len();

    let rows: Vec<Record> = current
        .iter()
        .map(|row| row.project(SNAPSHOT_COLUMNS).with("snapshot_date", ctx.today))
        .collect();
    let batch = UpsertBatch::new(
        &INVENTORY_SNAPSHOTS,
        format!("inventory_snapshot:{}", ctx.today),
        rows,
        ctx.chunk_size(),
    );
    report.sink.absorb(ctx.warehouse.merge_upsert(&batch).await?);

    info!(
        date = %ctx.today,
        inserted = report.sink.inserted,
        skipped = report.sink.skipped,
        "Inventory snapshot taken"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn tenant(price_list: Option<&str>) -> TenantConfig {
        TenantConfig {
            name: "CAMDUN".to_string(),
            company: "0001".to_string(),
            user: "etl".to_string(),
            password: None,
            api_token: None,
            branch_code: "00".to_string(),
            allowed_warehouses: vec!["00".to_string(), "01".to_string()],
            required_price_list: price_list.map(str::to_string),
        }
    }

    fn items() -> Vec<RawItem> {
        let products = json!([
            {
                "OCODIGO": "P1", "OREFERENCIA": "R1",
                "Items": [{"OCODLISTA": "1"}],
                "Bodegas": [
                    {"OCODBODEGA": "00", "OEXISTENCIA": 5},
                    {"OCODBODEGA": "07", "OEXISTENCIA": 2}
                ]
            },
            {
                "OCODIGO": "P2", "OREFERENCIA": "R2",
                "Items": [{"OCODLISTA": "3"}],
                "Bodegas": [{"OCODBODEGA": "01", "OEXISTENCIA": 8}]
            }
        ]);
        products
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item.as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn stock_is_flattened_and_filtered_by_warehouse_and_price_list() {
        let all = prepare(&items(), &tenant(None));
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].text("warehouse_code").as_deref(), Some("00"));
        assert_eq!(all[0].text("product_code").as_deref(), Some("P1"));
        assert_eq!(all[1].text("product_code").as_deref(), Some("P2"));
        assert_eq!(all[1].text("tenant").as_deref(), Some("CAMDUN"));

        let listed = prepare(&items(), &tenant(Some("1")));
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].decimal("quantity_available"), Some(5.0));
    }
}
