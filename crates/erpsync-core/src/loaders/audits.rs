//! Read-only checks producing work lists for the people curating the
//! manual files.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{Months, NaiveDate};
use tracing::info;

use super::curated::PRODUCT_MANAGEMENT_COLUMNS;
use super::{LoaderContext, LoaderReport};
use crate::diff::{diff, DiffSpec};
use crate::error::{EtlError, Result};
use crate::schema::{
    CUSTOMERS, PEOPLE, PRODUCTS, PRODUCT_MANAGEMENT, SALES, SALES_ROLES, SELLERS_RAW,
};
use crate::types::Record;

pub const CUSTOMERS_PENDING_COLUMNS: &[&str] = &[
    "master_code",
    "tax_id",
    "unified_name",
    "channel",
    "subchannel",
    "source_customer_code",
    "source_tenant",
];

const SELLER_KEY: &[&str] = &["role_code", "tenant"];

fn product_pair(row: &Record) -> (String, String) {
    (
        row.get("product_code").to_text().trim().to_string(),
        row.get("reference").to_text().trim().to_string(),
    )
}

/// Distinct `(product_code, reference)` pairs without a management row, laid
/// out as the product management file so they can be pasted into it.
pub async fn products_pending(ctx: &LoaderContext<'_>) -> Result<LoaderReport> {
    let mut report = LoaderReport::new("products_pending");

    let products = ctx.warehouse.snapshot(&PRODUCTS).await?;
    let managed_ids: HashSet<i64> = ctx
        .warehouse
        .snapshot(&PRODUCT_MANAGEMENT)
        .await?
        .iter()
        .filter_map(|row| row.int("id_product"))
        .collect();
    report.extracted = products.len();

    let managed: HashSet<(String, String)> = products
        .iter()
        .filter(|row| row.int("id_product").is_some_and(|id| managed_ids.contains(&id)))
        .map(product_pair)
        .collect();

    let mut seen = BTreeSet::new();
    let pending: Vec<Record> = products
        .iter()
        .filter(|row| {
            let key = product_pair(row);
            !managed.contains(&key) && seen.insert(key)
        })
        .map(|row| {
            row.project(&["product_code", "reference"])
                .with("guide_description", row.get("description").clone())
        })
        .collect();

    report.pending = pending.len();
    ctx.report(&mut report, "products_pending", PRODUCT_MANAGEMENT_COLUMNS, &pending)?;
    info!(pending = report.pending, "Products pending classification");
    Ok(report)
}

/// First day of the audit lookback.
pub fn activity_since(today: NaiveDate, months: u32) -> Result<NaiveDate> {
    today
        .checked_sub_months(Months::new(months))
        .ok_or_else(|| {
            EtlError::Validation(format!("{months} months before {today} is out of range"))
        })
}

/// Customers with sales inside the lookback that are not yet linked to a
/// master customer.
pub async fn customers_pending(ctx: &LoaderContext<'_>) -> Result<LoaderReport> {
    let mut report = LoaderReport::new("customers_pending");
    let since = activity_since(ctx.today, ctx.config.audit_lookback_months)?;

    let active: HashSet<i64> = ctx
        .warehouse
        .snapshot(&SALES)
        .await?
        .iter()
        .filter(|sale| sale.date("sale_date").is_some_and(|date| date >= since))
        .filter_map(|sale| sale.int("id_customer"))
        .collect();

    let customers = ctx.warehouse.snapshot(&CUSTOMERS).await?;
    report.extracted = customers.len();

    let pending: Vec<Record> = customers
        .iter()
        .filter(|customer| customer.get("id_customer_master").is_null())
        .filter(|customer| {
            customer
                .int("id_customer")
                .is_some_and(|id| active.contains(&id))
        })
        .map(|customer| {
            Record::new()
                .with("master_code", customer.get("customer_code").clone())
                .with("tax_id", customer.get("tax_id").clone())
                .with("unified_name", customer.get("name").clone())
                .with("channel", "")
                .with("subchannel", "")
                .with("source_customer_code", customer.get("customer_code").clone())
                .with("source_tenant", customer.get("tenant").clone())
        })
        .collect();

    report.pending = pending.len();
    ctx.report(&mut report, "customers_pending", CUSTOMERS_PENDING_COLUMNS, &pending)?;
    info!(%since, pending = report.pending, "Customers pending a master link");
    Ok(report)
}

/// Roles still valid on `today`, keyed like the raw seller list.
pub fn active_roles(roles: &[Record], people: &[Record], today: NaiveDate) -> Vec<Record> {
    let documents: HashMap<i64, String> = people
        .iter()
        .filter_map(|person| {
            Some((
                person.int("id_person")?,
                person.get("document_number").to_text(),
            ))
        })
        .collect();

    roles
        .iter()
        .filter(|role| role.date("valid_to").map_or(true, |end| end >= today))
        .filter_map(|role| {
            let document = documents.get(&role.int("id_person")?)?;
            Some(
                role.project(SELLER_KEY)
                    .with("document_number", document.as_str()),
            )
        })
        .collect()
}

/// Managed roles against the raw ERP seller list. NEW: seller only in the
/// ERP; REMOVED: active role missing from the ERP; MODIFIED: the role is
/// held by a different document.
pub async fn sellers_audit(ctx: &LoaderContext<'_>) -> Result<LoaderReport> {
    let mut report = LoaderReport::new("sellers_audit");

    let managed = active_roles(
        &ctx.warehouse.snapshot(&SALES_ROLES).await?,
        &ctx.warehouse.snapshot(&PEOPLE).await?,
        ctx.today,
    );
    let api: Vec<Record> = ctx
        .warehouse
        .snapshot(&SELLERS_RAW)
        .await?
        .iter()
        .map(|seller| {
            Record::new()
                .with("role_code", seller.get("seller_code").clone())
                .with("tenant", seller.get("tenant").clone())
                .with("document_number", seller.get("document_number").clone())
        })
        .collect();
    report.extracted = api.len();

    let changes = diff(
        &managed,
        &api,
        &DiffSpec {
            key: SELLER_KEY,
            compare: &["document_number"],
        },
    );
    ctx.report_changes(&mut report, "changes_sellers", &changes)?;
    report.pending = changes.changes.len();

    info!(
        new_in_api = report.new,
        missing_in_api = report.removed,
        document_mismatch = report.modified,
        "Sellers audited"
    );
    Ok(report)
}
