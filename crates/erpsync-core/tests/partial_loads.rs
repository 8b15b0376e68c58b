mod common;

use chrono::NaiveDate;
use erpsync_core::schema::{CUSTOMERS, INVENTORY_CURRENT, PRODUCTS, SALES, SALES_ROLES, WAREHOUSES};
use erpsync_core::sink::{UpsertBatch, Warehouse};
use erpsync_core::source::{DateRange, Endpoint};
use erpsync_core::types::Record;
use erpsync_core::{run_loaders, Loader, LoaderContext, LoaderStatus};
use serde_json::json;

use common::{config, items, RejectingWarehouse, ScriptedSource};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Product P001, customer C1, warehouse 00 and role V001 for both tenants.
async fn seed(warehouse: &RejectingWarehouse) {
    let tenants = ["CAMDUN", "NORTE"];
    let products = tenants
        .iter()
        .map(|tenant| {
            Record::new()
                .with("product_code", "P001")
                .with("reference", "P001")
                .with("tenant", *tenant)
        })
        .collect();
    let customers = tenants
        .iter()
        .map(|tenant| Record::new().with("customer_code", "C1").with("tenant", *tenant))
        .collect();
    let roles = tenants
        .iter()
        .zip(1_i64..)
        .map(|(tenant, person)| {
            Record::new()
                .with("role_code", "V001")
                .with("tenant", *tenant)
                .with("id_person", person)
                .with("valid_from", date(2024, 1, 1))
        })
        .collect();

    let inner = &warehouse.inner;
    inner
        .merge_upsert(&UpsertBatch::new(&PRODUCTS, "seed", products, 100))
        .await
        .unwrap();
    inner
        .merge_upsert(&UpsertBatch::new(&CUSTOMERS, "seed", customers, 100))
        .await
        .unwrap();
    inner
        .merge_upsert(&UpsertBatch::new(
            &WAREHOUSES,
            "seed",
            vec![Record::new().with("warehouse_code", "00")],
            100,
        ))
        .await
        .unwrap();
    inner
        .merge_upsert(&UpsertBatch::new(&SALES_ROLES, "seed", roles, 100))
        .await
        .unwrap();
}

fn sale(invoice: &str, customer: &str) -> serde_json::Value {
    json!({
        "NUMFACTURA": invoice, "FECHA": "01/06/2024", "CODCLIENTE": customer,
        "CODIGO": "P001", "REFERENCIA": "", "CODVENDEDOR": "V001", "CODBODEGA": "00", "CANT": 1
    })
}

#[tokio::test]
async fn a_rolled_back_tenant_does_not_stop_the_sales_load() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let warehouse = RejectingWarehouse::new("sales:CAMDUN");
    seed(&warehouse).await;

    let source = ScriptedSource::default()
        .serve(
            Endpoint::Sales,
            "CAMDUN",
            items(json!([sale("FV-1", "C1"), sale("FV-2", "C9")])),
        )
        .serve(Endpoint::Sales, "NORTE", items(json!([sale("NV-1", "C1")])));
    let window = DateRange::new(date(2024, 6, 1), date(2024, 6, 1)).unwrap();
    let ctx = LoaderContext::new(&config, &source, &warehouse).with_window(window);

    let summary = run_loaders(&ctx, &[Loader::Sales]).await;
    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.status, LoaderStatus::Failed);
    assert!(outcome.error.as_deref().unwrap().contains("sales:CAMDUN"));

    let report = outcome.report.as_ref().unwrap();
    assert_eq!(report.skipped_tenants, vec!["CAMDUN".to_string()]);
    assert_eq!(report.sink.inserted, 1);
    // The unknown customer of the rolled-back tenant is still reported.
    assert_eq!(report.quarantined, 1);
    assert_eq!(report.quarantine_tally.get("customer"), Some(&1));
    assert!(report
        .reports
        .iter()
        .any(|path| path.to_string_lossy().contains("quarantine_sales") && path.exists()));

    let sales = warehouse.inner.rows(&SALES);
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0].text("invoice_number").as_deref(), Some("NV-1"));
    assert_eq!(sales[0].text("tenant").as_deref(), Some("NORTE"));
}

#[tokio::test]
async fn a_rolled_back_tenant_does_not_stop_the_inventory_load() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let warehouse = RejectingWarehouse::new("inventory:CAMDUN");
    seed(&warehouse).await;

    let stock = |code: &str, quantity: i64| {
        json!({
            "OCODIGO": code, "OREFERENCIA": code,
            "Bodegas": [{"OCODBODEGA": "00", "OEXISTENCIA": quantity}]
        })
    };
    let source = ScriptedSource::default()
        .serve(
            Endpoint::Products,
            "CAMDUN",
            items(json!([stock("P001", 5), stock("P404", 1)])),
        )
        .serve(Endpoint::Products, "NORTE", items(json!([stock("P001", 8)])));
    let ctx = LoaderContext::new(&config, &source, &warehouse);

    let err = Loader::Inventory.run(&ctx).await.unwrap_err();
    assert!(err.to_string().starts_with("inventory loaded partially"), "{err}");

    let report = err.into_report().unwrap();
    assert_eq!(report.skipped_tenants, vec!["CAMDUN".to_string()]);
    assert_eq!(report.sink.inserted, 1);
    assert_eq!(report.quarantine_tally.get("product"), Some(&1));
    assert!(report
        .reports
        .iter()
        .any(|path| path.to_string_lossy().contains("quarantine_inventory")));

    let current = warehouse.inner.rows(&INVENTORY_CURRENT);
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].text("tenant").as_deref(), Some("NORTE"));
    assert_eq!(current[0].decimal("quantity_available"), Some(8.0));
}
