//! Fixtures shared by the unit tests of the loaders.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use erpsync_parser::RawItem;

use crate::config::{EtlConfig, TenantConfig};
use crate::source::{DateRange, Endpoint, ExtractionError, RecordSource};

pub const CONFIG: &str = r#"
    [api]
    products_url = "http://erp.invalid/productos"
    third_parties_url = "http://erp.invalid/terceros"
    sales_url = "http://erp.invalid/ventas"

    [[tenants]]
    name = "CAMDUN"
    company = "0001"
    user = "etl"
    password = "secret"
    api_token = "token"
    allowed_warehouses = ["00"]
"#;

/// Config with one tenant whose input and report directories live in `dir`.
pub fn config(dir: &Path) -> EtlConfig {
    let mut config = EtlConfig::from_toml_str(CONFIG)
        .and_then(|config| config.resolve_with(|_| None))
        .unwrap();
    config.input_dir = dir.join("input");
    config.reports_dir = dir.join("reports");
    fs::create_dir_all(&config.input_dir).unwrap();
    config
}

pub fn items(value: serde_json::Value) -> Vec<RawItem> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item.as_object().cloned().unwrap())
        .collect()
}

/// Serves fixed items per endpoint for every tenant.
#[derive(Debug, Default)]
pub struct StaticSource {
    items: HashMap<Endpoint, Vec<RawItem>>,
}

impl StaticSource {
    pub fn with(mut self, endpoint: Endpoint, items: Vec<RawItem>) -> Self {
        self.items.insert(endpoint, items);
        self
    }
}

#[async_trait]
impl RecordSource for StaticSource {
    async fn fetch(
        &self,
        endpoint: Endpoint,
        _tenant: &TenantConfig,
        _range: Option<DateRange>,
    ) -> Result<Vec<RawItem>, ExtractionError> {
        Ok(self.items.get(&endpoint).cloned().unwrap_or_default())
    }
}
