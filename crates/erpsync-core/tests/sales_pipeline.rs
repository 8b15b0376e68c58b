mod common;

use anyhow::Result;
use chrono::NaiveDate;
use erpsync_core::memory::MemoryWarehouse;
use erpsync_core::schema::{CUSTOMERS, PRODUCTS, SALES, SALES_ROLES, WAREHOUSES};
use erpsync_core::sink::{ReplaceBatch, ReplaceScope, UpsertBatch, Warehouse};
use erpsync_core::source::{DateRange, Endpoint};
use erpsync_core::types::{Record, Value};
use erpsync_core::{Loader, LoaderContext};
use serde_json::json;

use common::{config, items, ScriptedSource};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn product(code: &str, reference: &str, tenant: &str) -> Record {
    Record::new()
        .with("product_code", code)
        .with("reference", reference)
        .with("tenant", tenant)
}

fn role(person: i64, from: NaiveDate, to: Option<NaiveDate>) -> Record {
    Record::new()
        .with("role_code", "V001")
        .with("tenant", "CAMDUN")
        .with("id_person", person)
        .with("valid_from", from)
        .with("valid_to", to)
}

fn stored_sale(day: NaiveDate, tenant: &str, invoice: &str) -> Record {
    Record::new()
        .with("sale_date", day)
        .with("tenant", tenant)
        .with("id_product", 1_i64)
        .with("id_customer", 1_i64)
        .with("id_warehouse", 1_i64)
        .with("id_role_version", 1_i64)
        .with("invoice_number", invoice)
}

async fn seed(warehouse: &MemoryWarehouse) -> Result<()> {
    warehouse
        .merge_upsert(&UpsertBatch::new(
            &PRODUCTS,
            "seed",
            vec![
                product("P001", "P001", "CAMDUN"),
                product("P002", "R2", "CAMDUN"),
                product("P001", "P001", "NORTE"),
            ],
            100,
        ))
        .await?;
    warehouse
        .merge_upsert(&UpsertBatch::new(
            &CUSTOMERS,
            "seed",
            vec![Record::new().with("customer_code", "C1").with("tenant", "CAMDUN")],
            100,
        ))
        .await?;
    warehouse
        .merge_upsert(&UpsertBatch::new(
            &WAREHOUSES,
            "seed",
            vec![Record::new().with("warehouse_code", "00")],
            100,
        ))
        .await?;
    warehouse
        .replace(&ReplaceBatch::new(
            &SALES_ROLES,
            "seed",
            ReplaceScope::entire_table(),
            vec![
                role(1, date(2024, 1, 1), Some(date(2024, 5, 31))),
                role(2, date(2024, 6, 1), None),
            ],
            100,
        ))
        .await?;
    warehouse
        .merge_upsert(&UpsertBatch::new(
            &SALES,
            "seed",
            vec![
                stored_sale(date(2024, 5, 1), "CAMDUN", "OLD-1"),
                stored_sale(date(2024, 5, 31), "CAMDUN", "OLD-2"),
                stored_sale(date(2024, 5, 31), "NORTE", "OLD-3"),
            ],
            100,
        ))
        .await?;
    Ok(())
}

fn camdun_sales() -> ScriptedSource {
    ScriptedSource::default()
        .serve(
            Endpoint::Sales,
            "CAMDUN",
            items(json!([
                {"NUMFACTURA": "FV-1", "FECHA": "31/05/2024", "CODCLIENTE": "C1", "CODIGO": "P001", "REFERENCIA": "", "CODVENDEDOR": "V001", "CODBODEGA": "00", "CANT": 2},
                {"NUMFACTURA": "FV-2", "FECHA": "01/06/2024", "CODCLIENTE": "C1", "CODIGO": "P002", "REFERENCIA": "R2", "CODVENDEDOR": "V001", "CODBODEGA": "00", "CANT": 1},
                {"NUMFACTURA": "FV-3", "FECHA": "01/06/2024", "CODCLIENTE": "C9", "CODIGO": "P001", "REFERENCIA": "", "CODVENDEDOR": "V001", "CODBODEGA": "00", "CANT": 5},
                {"NUMFACTURA": "FV-4", "FECHA": "15/06/2024", "CODCLIENTE": "C1", "CODIGO": "P001", "REFERENCIA": "", "CODVENDEDOR": "V001", "CODBODEGA": "00", "CANT": 1}
            ])),
        )
        .failing("NORTE")
}

fn invoices(rows: &[Record]) -> Vec<String> {
    let mut invoices: Vec<String> = rows
        .iter()
        .map(|row| row.get("invoice_number").to_text())
        .collect();
    invoices.sort();
    invoices
}

#[tokio::test]
async fn sales_replace_the_window_of_each_extracted_tenant() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = config(dir.path());
    let warehouse = MemoryWarehouse::new();
    seed(&warehouse).await?;
    let source = camdun_sales();

    let window = DateRange::new(date(2024, 5, 31), date(2024, 6, 1))?;
    let ctx = LoaderContext::new(&config, &source, &warehouse).with_window(window);
    let report = Loader::Sales.run(&ctx).await?;

    assert_eq!(report.extracted, 4);
    assert_eq!(report.skipped_tenants, vec!["NORTE".to_string()]);
    assert_eq!(report.sink.deleted, 1);
    assert_eq!(report.sink.inserted, 2);
    assert_eq!(report.quarantined, 2);
    assert_eq!(report.quarantine_tally.get("customer"), Some(&1));
    assert_eq!(report.quarantine_tally.get("event_date"), Some(&1));
    assert!(report
        .reports
        .iter()
        .any(|path| path.to_string_lossy().contains("quarantine_sales")));

    let sales = warehouse.rows(&SALES);
    assert_eq!(invoices(&sales), vec!["FV-1", "FV-2", "OLD-1", "OLD-3"]);

    let by_invoice = |invoice: &str| {
        sales
            .iter()
            .find(|row| row.get("invoice_number").to_text() == invoice)
            .cloned()
            .unwrap()
    };
    // Role versions follow the sale date; the blank reference matched P001/P001.
    assert_eq!(by_invoice("FV-1").get("id_role_version"), &Value::Int(1));
    assert_eq!(by_invoice("FV-1").get("id_product"), &Value::Int(1));
    assert_eq!(by_invoice("FV-2").get("id_role_version"), &Value::Int(2));
    assert_eq!(by_invoice("FV-2").get("id_product"), &Value::Int(2));
    assert_eq!(by_invoice("OLD-3").text("tenant").as_deref(), Some("NORTE"));
    Ok(())
}

#[tokio::test]
async fn rerunning_the_same_window_leaves_the_same_rows() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = config(dir.path());
    let warehouse = MemoryWarehouse::new();
    seed(&warehouse).await?;
    let source = camdun_sales();

    let window = DateRange::new(date(2024, 5, 31), date(2024, 6, 1))?;
    let ctx = LoaderContext::new(&config, &source, &warehouse).with_window(window);
    Loader::Sales.run(&ctx).await?;
    let first = invoices(&warehouse.rows(&SALES));

    let again = Loader::Sales.run(&ctx).await?;
    assert_eq!(again.sink.deleted, 2);
    assert_eq!(again.sink.inserted, 2);
    assert_eq!(invoices(&warehouse.rows(&SALES)), first);
    Ok(())
}

#[tokio::test]
async fn a_tenant_without_sales_keeps_its_stored_window() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = config(dir.path());
    let warehouse = MemoryWarehouse::new();
    seed(&warehouse).await?;
    let source = ScriptedSource::default();

    let window = DateRange::new(date(2024, 5, 31), date(2024, 6, 1))?;
    let ctx = LoaderContext::new(&config, &source, &warehouse).with_window(window);
    let report = Loader::Sales.run(&ctx).await?;

    assert_eq!(report.sink.deleted, 0);
    assert_eq!(report.notes.len(), 2);
    assert_eq!(warehouse.rows(&SALES).len(), 3);
    Ok(())
}

#[tokio::test]
async fn every_tenant_failing_fails_the_loader() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let warehouse = MemoryWarehouse::new();
    let source = ScriptedSource::default().failing("CAMDUN").failing("NORTE");

    let ctx = LoaderContext::new(&config, &source, &warehouse);
    let err = Loader::Sales.run(&ctx).await.unwrap_err();
    assert!(err.to_string().contains("every tenant"));
}
