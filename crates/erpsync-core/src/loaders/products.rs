use std::collections::HashMap;

use erpsync_parser::{ApiEntity, RawItem};
use tracing::info;

use super::{LoaderContext, LoaderReport};
use crate::diff::{diff, DiffSpec};
use crate::error::Result;
use crate::manual::ManualFiles;
use crate::schema::PRODUCTS;
use crate::sink::UpsertBatch;
use crate::source::{extract_all, Endpoint};
use crate::types::{Record, Value};

pub const LINE_CORRECTIONS: &str = "line_corrections.csv";
pub const GROUP_CORRECTIONS: &str = "group_corrections.csv";
pub const DEPARTMENT_CORRECTIONS: &str = "department_corrections.csv";
pub const BRAND_MAPPING: &str = "brand_mapping.csv";

pub const KEY: &[&str] = &["product_code", "reference", "tenant"];
pub const COMPARED: &[&str] = &[
    "description",
    "group_code",
    "line_code",
    "department_code",
    "brand_code",
];

/// Hand-maintained overrides for product classification codes.
#[derive(Debug, Clone, Default)]
pub struct Corrections {
    lines: HashMap<String, String>,
    groups: HashMap<String, String>,
    departments: HashMap<String, String>,
    /// (brand name, tenant) → unified brand code.
    brands: HashMap<(String, String), String>,
}

fn code_map(rows: &[Record], key: &str, value: &str) -> HashMap<String, String> {
    rows.iter()
        .filter_map(|row| Some((row.text(key)?, row.text(value)?)))
        .collect()
}

impl Corrections {
    pub fn load(manual: &ManualFiles) -> Result<Self> {
        let lines = manual.read(LINE_CORRECTIONS, &["product_code", "line_code"])?;
        let groups = manual.read(GROUP_CORRECTIONS, &["product_code", "group_code"])?;
        let departments =
            manual.read(DEPARTMENT_CORRECTIONS, &["product_code", "department_code"])?;
        let brands = manual.read(BRAND_MAPPING, &["brand_name", "tenant", "brand_code"])?;

        Ok(Self {
            lines: code_map(&lines, "product_code", "line_code"),
            groups: code_map(&groups, "product_code", "group_code"),
            departments: code_map(&departments, "product_code", "department_code"),
            brands: brands
                .iter()
                .filter_map(|row| {
                    let name = row.get("brand_name").to_text().trim().to_string();
                    let tenant = row.get("tenant").to_text().trim().to_string();
                    Some(((name, tenant), row.text("brand_code")?))
                })
                .collect(),
        })
    }

    /// Overwrite the classification codes of `record` where a correction
    /// exists for its product code; set the unified brand code.
    pub fn apply(&self, record: &mut Record) {
        let code = record.get("product_code").to_text().trim().to_string();
        for (field, map) in [
            ("line_code", &self.lines),
            ("group_code", &self.groups),
            ("department_code", &self.departments),
        ] {
            if let Some(corrected) = map.get(&code) {
                record.set(field, corrected.as_str());
            }
        }

        let brand = (
            record.get("brand_name").to_text().trim().to_string(),
            record.get("tenant").to_text().trim().to_string(),
        );
        let brand_code = self
            .brands
            .get(&brand)
            .map(|code| Value::text(code.as_str()))
            .unwrap_or_default();
        record.set("brand_code", brand_code);
    }
}

/// Map one tenant's API items into `dim_products` rows.
pub fn prepare(items: &[RawItem], tenant: &str, corrections: &Corrections) -> Vec<Record> {
    ApiEntity::Products
        .map_items(items)
        .into_iter()
        .map(|mut record| {
            for field in ["product_code", "reference", "brand_name"] {
                if record.get(field).is_null() {
                    record.set(field, "");
                }
            }
            record.set("tenant", tenant);
            corrections.apply(&mut record);
            record
        })
        .collect()
}

pub async fn load(ctx: &LoaderContext<'_>) -> Result<LoaderReport> {
    let mut report = LoaderReport::new("products");
    let corrections = Corrections::load(&ctx.manual)?;

    let extraction = extract_all(ctx.source, &ctx.config.tenants, Endpoint::Products, None).await?;
    report.record_extraction(&extraction);

    let per_tenant: Vec<(&str, Vec<Record>)> = extraction
        .tenants
        .iter()
        .map(|extracted| {
            let name = extracted.tenant.name.as_str();
            (name, prepare(&extracted.items, name, &corrections))
        })
        .collect();

    let compared = report.compared_tenants(&extraction, "products");
    let existing: Vec<Record> = ctx
        .warehouse
        .snapshot(&PRODUCTS)
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
    ctx.report_changes(&mut report, "changes_products", &changes)?;

    let mut failures = Vec::new();
    for (tenant, rows) in per_tenant {
        if rows.is_empty() {
            continue;
        }
        let batch = UpsertBatch::new(
            &PRODUCTS,
            format!("products:{tenant}"),
            rows,
            ctx.chunk_size(),
        );
        if batch.collapsed() > 0 {
            report.note(format!(
                "{tenant}: {} products repeated (code, reference)",
                batch.collapsed()
            ));
        }
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
        "Products synchronized"
    );
    report.finish(failures)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn item(value: serde_json::Value) -> RawItem {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn prepare_fills_blank_keys_and_applies_corrections() {
        let corrections = Corrections {
            lines: HashMap::from([("P1".to_string(), "L9".to_string())]),
            brands: HashMap::from([(
                ("ACME".to_string(), "CAMDUN".to_string()),
                "B01".to_string(),
            )]),
            ..Corrections::default()
        };
        let items = vec![
            item(json!({"OCODIGO": "P1", "OREFERENCIA": "R1", "OCODLINEA": "L1", "OCODGRUPO": "G1", "ONOMMARCA": "ACME"})),
            item(json!({"OCODIGO": "P2", "OCODLINEA": "L2"})),
        ];

        let rows = prepare(&items, "CAMDUN", &corrections);

        assert_eq!(rows[0].text("line_code").as_deref(), Some("L9"));
        assert_eq!(rows[0].text("group_code").as_deref(), Some("G1"));
        assert_eq!(rows[0].text("brand_code").as_deref(), Some("B01"));
        assert_eq!(rows[1].get("reference"), &Value::text(""));
        assert_eq!(rows[1].get("brand_name"), &Value::text(""));
        assert!(rows[1].get("brand_code").is_null());
        assert_eq!(rows[1].text("tenant").as_deref(), Some("CAMDUN"));
    }
}
