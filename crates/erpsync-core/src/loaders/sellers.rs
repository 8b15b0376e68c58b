use erpsync_parser::{ApiEntity, RawItem};
use tracing::info;

use super::{LoaderContext, LoaderReport};
use crate::error::Result;
use crate::schema::SELLERS_RAW;
use crate::sink::{ReplaceBatch, ReplaceScope};
use crate::source::{extract_all, Endpoint};
use crate::types::Record;

/// Seller codes start with `V`. The ERP inactive flag is kept as the ERP
/// reports it: a missing flag reads as `1` and rows flagged `0` are dropped.
pub fn is_seller(record: &Record) -> bool {
    let code = record.get("seller_code").to_text();
    let flag = record.get("inactive");
    let inactive = if flag.is_null() {
        "1".to_string()
    } else {
        flag.to_text().trim().to_string()
    };
    code.starts_with('V') && inactive != "0"
}

pub fn prepare(items: &[RawItem], tenant: &str) -> Vec<Record> {
    ApiEntity::Sellers
        .map_items(items)
        .into_iter()
        .filter(is_seller)
        .map(|mut record| {
            record.remove("inactive");
            record.with("tenant", tenant)
        })
        .collect()
}

/// Raw seller list per tenant, kept only for the sellers audit.
pub async fn load(ctx: &LoaderContext<'_>) -> Result<LoaderReport> {
    let mut report = LoaderReport::new("sellers");

    let extraction =
        extract_all(ctx.source, &ctx.config.tenants, Endpoint::ThirdParties, None).await?;
    report.record_extraction(&extraction);

    let mut failures = Vec::new();
    for extracted in &extraction.tenants {
        let tenant = extracted.tenant.name.as_str();
        if extracted.items.is_empty() {
            report.note(format!(
                "{tenant}: no third parties returned; stored sellers left unchanged"
            ));
            continue;
        }
        let rows = prepare(&extracted.items, tenant);
        info!(tenant, sellers = rows.len(), "Sellers selected");

        let batch = ReplaceBatch::new(
            &SELLERS_RAW,
            format!("sellers:{tenant}"),
            ReplaceScope::entire_table().within("tenant", tenant),
            rows,
            ctx.chunk_size(),
        );
        match ctx.warehouse.replace(&batch).await {
            Ok(outcome) => report.sink.absorb(outcome),
            Err(failure) => {
                report.tenant_failed(tenant, &failure);
                failures.push(failure);
            }
        }
    }

    report.finish(failures)
}
