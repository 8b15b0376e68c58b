use chrono::Days;
use erpsync_parser::{ApiEntity, RawItem};
use tracing::info;

use super::{LoaderContext, LoaderReport};
use crate::enrich::{Enricher, Enrichment, FactDraft, Slot};
use crate::error::{EtlError, Result};
use crate::resolver::{KeyResolver, TemporalResolver};
use crate::schema::{CUSTOMERS, PRODUCTS, SALES, SALES_ROLES, WAREHOUSES};
use crate::sink::{ReplaceBatch, ReplaceScope};
use crate::source::{extract_all, DateRange, Endpoint};
use crate::types::{NaturalKey, Record};

const PRODUCT_KEY: &[&str] = &["product_code", "reference", "tenant"];
const CUSTOMER_KEY: &[&str] = &["customer_code", "tenant"];
const ROLE_KEY: &[&str] = &["role_code", "tenant"];

/// Quarantine reason for sales without a usable date inside the window.
pub const EVENT_DATE: &str = "event_date";

/// `sales_lookback_days` before `today` through `today`.
pub fn default_window(ctx: &LoaderContext<'_>) -> Result<DateRange> {
    let start = ctx
        .today
        .checked_sub_days(Days::new(u64::from(ctx.config.sales_lookback_days)))
        .ok_or_else(|| EtlError::Validation("sales window start is out of range".to_string()))?;
    DateRange::new(start, ctx.today)
}

/// Sales lines of one tenant as fact drafts dated by their `FECHA`.
pub fn prepare(items: &[RawItem], tenant: &str) -> Vec<FactDraft> {
    ApiEntity::Sales
        .map_items(items)
        .into_iter()
        .map(|mut record| {
            let sale_date = record.date("sale_date_raw");
            if record.text("reference").is_none() {
                let code = record.get("product_code").clone();
                record.set("reference", code);
            }
            record.set("sale_date", sale_date);
            record.set("tenant", tenant);

            let product = NaturalKey::from_record(&record, PRODUCT_KEY);
            let customer = NaturalKey::from_record(&record, CUSTOMER_KEY);
            let warehouse = NaturalKey::from_record(&record, &["warehouse_code"]);
            let role = NaturalKey::from_record(&record, &["seller_code", "tenant"]);

            FactDraft::new(sale_date, record)
                .with_key("product", product)
                .with_key("customer", customer)
                .with_key("warehouse", warehouse)
                .with_key("sales_role", role)
        })
        .collect()
}

fn enricher(
    products: &[Record],
    customers: &[Record],
    warehouses: &[Record],
    roles: TemporalResolver,
) -> Enricher {
    Enricher::new(vec![
        Slot::new(
            "product",
            "id_product",
            KeyResolver::from_records(products, PRODUCT_KEY, "id_product"),
        ),
        Slot::new(
            "customer",
            "id_customer",
            KeyResolver::from_records(customers, CUSTOMER_KEY, "id_customer"),
        ),
        Slot::new(
            "warehouse",
            "id_warehouse",
            KeyResolver::from_records(warehouses, &["warehouse_code"], "id_warehouse"),
        ),
        Slot::new("sales_role", "id_role_version", roles),
    ])
}

/// Replace each extracted tenant's sales inside `window` (default: the
/// configured lookback ending today). A rolled-back tenant does not stop the
/// others; the load then ends with [`EtlError::PartialLoad`].
pub async fn load(ctx: &LoaderContext<'_>, window: Option<DateRange>) -> Result<LoaderReport> {
    let mut report = LoaderReport::new("sales");
    let window = match window {
        Some(window) => window,
        None => default_window(ctx)?,
    };
    info!(%window, "Loading sales");

    let extraction =
        extract_all(ctx.source, &ctx.config.tenants, Endpoint::Sales, Some(window)).await?;
    report.record_extraction(&extraction);

    let roles = TemporalResolver::from_records(
        &ctx.warehouse.snapshot(&SALES_ROLES).await?,
        ROLE_KEY,
        "valid_from",
        "valid_to",
        "id_role_version",
    );
    ctx.report_interval_issues(&mut report, "role_interval_issues", &roles)?;

    let enricher = enricher(
        &ctx.warehouse.snapshot(&PRODUCTS).await?,
        &ctx.warehouse.snapshot(&CUSTOMERS).await?,
        &ctx.warehouse.snapshot(&WAREHOUSES).await?,
        roles,
    );

    let mut quarantine = Enrichment::default();
    let mut failures = Vec::new();
    for extracted in &extraction.tenants {
        let tenant = extracted.tenant.name.as_str();
        if extracted.items.is_empty() {
            report.note(format!(
                "{tenant}: no sales returned for {window}; stored sales left unchanged"
            ));
            continue;
        }

        let mut outcome = Enrichment::default();
        let mut dated = Vec::new();
        for draft in prepare(&extracted.items, tenant) {
            match draft.event_date {
                Some(date) if window.contains(date) => dated.push(draft),
                _ => outcome.quarantine(draft, EVENT_DATE),
            }
        }
        enricher.enrich_into(&dated, &mut outcome);
        info!(
            tenant,
            lines = extracted.items.len(),
            enriched = outcome.enriched.len(),
            quarantined = outcome.quarantined.len(),
            "Sales enriched"
        );

        let batch = ReplaceBatch::new(
            &SALES,
            format!("sales:{tenant}:{window}"),
            ReplaceScope::window("sale_date", window.start, window.end).within("tenant", tenant),
            outcome.enriched_records(),
            ctx.chunk_size(),
        );
        match ctx.warehouse.replace(&batch).await {
            Ok(outcome) => report.sink.absorb(outcome),
            Err(failure) => {
                report.tenant_failed(tenant, &failure);
                failures.push(failure);
            }
        }

        quarantine.quarantined.extend(outcome.quarantined);
        for (slot, count) in outcome.tally {
            *quarantine.tally.entry(slot).or_default() += count;
        }
    }

    ctx.report_quarantine(&mut report, "quarantine_sales", &quarantine)?;
    report.finish(failures)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;

    #[test]
    fn sale_dates_are_day_first_and_blank_references_fall_back_to_the_code() {
        let items: Vec<RawItem> = json!([
            {"FECHA": "06/01/2024", "CODIGO": "P1", "REFERENCIA": "", "CODVENDEDOR": "V001", "CODCLIENTE": "C1", "CODBODEGA": "00", "CANT": 3},
            {"FECHA": "not a date", "CODIGO": "P2", "REFERENCIA": "R2"}
        ])
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item.as_object().cloned().unwrap())
        .collect();

        let drafts = prepare(&items, "CAMDUN");

        assert_eq!(drafts[0].event_date, NaiveDate::from_ymd_opt(2024, 1, 6));
        assert_eq!(drafts[0].keys["product"], NaturalKey::new(["P1", "P1", "CAMDUN"]));
        assert_eq!(drafts[0].keys["sales_role"], NaturalKey::new(["V001", "CAMDUN"]));
        assert_eq!(drafts[0].record.date("sale_date"), NaiveDate::from_ymd_opt(2024, 1, 6));
        assert_eq!(drafts[1].event_date, None);
        assert!(drafts[1].record.get("sale_date").is_null());
    }
}
