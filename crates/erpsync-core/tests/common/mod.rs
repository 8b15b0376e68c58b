#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use erpsync_core::config::TenantConfig;
use erpsync_core::memory::MemoryWarehouse;
use erpsync_core::schema::TableSpec;
use erpsync_core::sink::{ReplaceBatch, SinkFailure, SinkOutcome, UpsertBatch, Warehouse};
use erpsync_core::source::{DateRange, Endpoint, ExtractionError, RecordSource};
use erpsync_core::types::Record;
use erpsync_core::EtlConfig;
use erpsync_parser::RawItem;

const CONFIG: &str = r#"
    batch_size = 2

    [api]
    products_url = "http://erp.invalid/productos"
    third_parties_url = "http://erp.invalid/terceros"
    sales_url = "http://erp.invalid/ventas"

    [[tenants]]
    name = "CAMDUN"
    company = "0001"
    user = "etl"
    allowed_warehouses = ["00"]

    [[tenants]]
    name = "NORTE"
    company = "0002"
    user = "etl"
    allowed_warehouses = ["00"]
"#;

/// Two tenants with credentials from a fake environment; input and report
/// directories below `dir`.
pub fn config(dir: &Path) -> EtlConfig {
    let env = HashMap::from([
        ("ERPSYNC_CAMDUN_PASSWORD", "secret"),
        ("ERPSYNC_CAMDUN_API_TOKEN", "token"),
        ("ERPSYNC_NORTE_PASSWORD", "secret"),
        ("ERPSYNC_NORTE_API_TOKEN", "token"),
    ]);
    let mut config = EtlConfig::from_toml_str(CONFIG)
        .and_then(|config| config.resolve_with(|name| env.get(name).map(|value| value.to_string())))
        .expect("test config");
    config.input_dir = dir.join("input");
    config.reports_dir = dir.join("reports");
    fs::create_dir_all(&config.input_dir).expect("input dir");
    config
}

pub fn fixture(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../erpsync-parser/tests/data")
        .join(name);
    fs::read_to_string(path).expect("read fixture")
}

pub fn items(value: serde_json::Value) -> Vec<RawItem> {
    value
        .as_array()
        .expect("array of items")
        .iter()
        .map(|item| item.as_object().cloned().expect("object item"))
        .collect()
}

/// Fixed items per (endpoint, tenant); listed tenants fail with HTTP 503.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    items: HashMap<(Endpoint, String), Vec<RawItem>>,
    failing: Vec<String>,
}

impl ScriptedSource {
    pub fn serve(mut self, endpoint: Endpoint, tenant: &str, items: Vec<RawItem>) -> Self {
        self.items.insert((endpoint, tenant.to_string()), items);
        self
    }

    pub fn failing(mut self, tenant: &str) -> Self {
        self.failing.push(tenant.to_string());
        self
    }
}

#[async_trait]
impl RecordSource for ScriptedSource {
    async fn fetch(
        &self,
        endpoint: Endpoint,
        tenant: &TenantConfig,
        _range: Option<DateRange>,
    ) -> Result<Vec<RawItem>, ExtractionError> {
        if self.failing.contains(&tenant.name) {
            return Err(ExtractionError::Status {
                endpoint,
                tenant: tenant.name.clone(),
                status: 503,
            });
        }
        Ok(self
            .items
            .get(&(endpoint, tenant.name.clone()))
            .cloned()
            .unwrap_or_default())
    }
}

/// A [`MemoryWarehouse`] that rolls back every batch whose label starts
/// with `prefix`.
#[derive(Debug)]
pub struct RejectingWarehouse {
    pub inner: MemoryWarehouse,
    prefix: String,
}

impl RejectingWarehouse {
    pub fn new(prefix: &str) -> Self {
        Self {
            inner: MemoryWarehouse::new(),
            prefix: prefix.to_string(),
        }
    }
}

#[async_trait]
impl Warehouse for RejectingWarehouse {
    async fn snapshot(&self, table: &'static TableSpec) -> erpsync_core::Result<Vec<Record>> {
        self.inner.snapshot(table).await
    }

    async fn merge_upsert(&self, batch: &UpsertBatch) -> Result<SinkOutcome, SinkFailure> {
        if batch.label.starts_with(&self.prefix) {
            return Err(SinkFailure::invalid(batch.id(), "connection reset"));
        }
        self.inner.merge_upsert(batch).await
    }

    async fn replace(&self, batch: &ReplaceBatch) -> Result<SinkOutcome, SinkFailure> {
        if batch.label.starts_with(&self.prefix) {
            return Err(SinkFailure::invalid(batch.id(), "connection reset"));
        }
        self.inner.replace(batch).await
    }
}
