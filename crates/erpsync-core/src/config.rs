use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::error::{EtlError, Result};
use crate::sink::DEFAULT_CHUNK_SIZE;

fn default_input_dir() -> PathBuf {
    PathBuf::from("input")
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_timezone() -> String {
    "America/Bogota".to_string()
}

fn default_tz() -> Tz {
    chrono_tz::America::Bogota
}

fn default_batch_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_sales_lookback_days() -> u32 {
    1
}

fn default_audit_lookback_months() -> u32 {
    24
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_sales_timeout_secs() -> u64 {
    600
}

fn default_branch_code() -> String {
    "00".to_string()
}

/// Everything a run needs, loaded once and passed down explicitly.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EtlConfig {
    #[serde(default)]
    pub database_url: String,
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_sales_lookback_days")]
    pub sales_lookback_days: u32,
    #[serde(default = "default_audit_lookback_months")]
    pub audit_lookback_months: u32,
    pub api: ApiConfig,
    #[serde(default)]
    pub tenants: Vec<TenantConfig>,
    #[serde(skip, default = "default_tz")]
    tz: Tz,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    pub products_url: String,
    pub third_parties_url: String,
    pub sales_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_sales_timeout_secs")]
    pub sales_timeout_secs: u64,
}

#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TenantConfig {
    /// Short name stored in every row as the tenant.
    pub name: String,
    pub company: String,
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_branch_code")]
    pub branch_code: String,
    #[serde(default)]
    pub allowed_warehouses: Vec<String>,
    /// Inventory keeps only items offered in this price list.
    #[serde(default)]
    pub required_price_list: Option<String>,
}

impl fmt::Debug for TenantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantConfig")
            .field("name", &self.name)
            .field("company", &self.company)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("branch_code", &self.branch_code)
            .field("allowed_warehouses", &self.allowed_warehouses)
            .field("required_price_list", &self.required_price_list)
            .finish()
    }
}

impl TenantConfig {
    fn env_prefix(&self) -> String {
        let name: String = self
            .name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("ERPSYNC_{name}")
    }

    pub fn password_var(&self) -> String {
        format!("{}_PASSWORD", self.env_prefix())
    }

    pub fn api_token_var(&self) -> String {
        format!("{}_API_TOKEN", self.env_prefix())
    }

    pub fn password(&self) -> &str {
        self.password.as_deref().unwrap_or_default()
    }

    pub fn api_token(&self) -> &str {
        self.api_token.as_deref().unwrap_or_default()
    }

    pub fn allows_warehouse(&self, code: &str) -> bool {
        self.allowed_warehouses
            .iter()
            .any(|allowed| allowed.trim() == code.trim())
    }
}

impl EtlConfig {
    /// Parse without environment overrides or validation.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Read `path`, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|err| {
            EtlError::Configuration(format!(
                "cannot read config file {}: {err}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&contents)?.resolve_with(|name| std::env::var(name).ok())
    }

    /// Fill the database URL and missing tenant credentials from `lookup`
    /// (normally the process environment), then validate.
    pub fn resolve_with<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL").or_else(|| lookup("ERPSYNC_DATABASE_URL")) {
            self.database_url = url;
        }

        for tenant in &mut self.tenants {
            if tenant.password.as_deref().map_or(true, str::is_empty) {
                tenant.password = lookup(&tenant.password_var());
            }
            if tenant.api_token.as_deref().map_or(true, str::is_empty) {
                tenant.api_token = lookup(&tenant.api_token_var());
            }
        }

        self.tz = self.timezone.parse::<Tz>().map_err(|err| {
            EtlError::Configuration(format!("unknown timezone {:?}: {err}", self.timezone))
        })?;

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| Err(EtlError::Configuration(message));

        if self.batch_size == 0 {
            return fail("batch_size must be positive".to_string());
        }
        for (name, url) in [
            ("api.products_url", &self.api.products_url),
            ("api.third_parties_url", &self.api.third_parties_url),
            ("api.sales_url", &self.api.sales_url),
        ] {
            if url.trim().is_empty() {
                return fail(format!("{name} must be set"));
            }
        }
        if self.tenants.is_empty() {
            return fail("at least one [[tenants]] entry is required".to_string());
        }

        let mut seen = HashSet::new();
        for tenant in &self.tenants {
            if tenant.name.trim().is_empty() {
                return fail("tenant name must not be empty".to_string());
            }
            if !seen.insert(tenant.name.trim()) {
                return fail(format!("tenant {} is declared twice", tenant.name));
            }
            if tenant.password().is_empty() {
                return fail(format!(
                    "tenant {} has no password (set it in the config or {})",
                    tenant.name,
                    tenant.password_var()
                ));
            }
            if tenant.api_token().is_empty() {
                return fail(format!(
                    "tenant {} has no API token (set it in the config or {})",
                    tenant.name,
                    tenant.api_token_var()
                ));
            }
        }

        Ok(())
    }

    pub fn database_url(&self) -> Result<&str> {
        if self.database_url.trim().is_empty() {
            return Err(EtlError::Configuration(
                "DATABASE_URL (or ERPSYNC_DATABASE_URL) must be set".to_string(),
            ));
        }
        Ok(&self.database_url)
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Business date in the configured timezone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.tz).date_naive()
    }

    /// Timestamp suffix for report file names.
    pub fn report_stamp(&self) -> String {
        Utc::now()
            .with_timezone(&self.tz)
            .format("%Y%m%d_%H%M%S")
            .to_string()
    }

    pub fn tenant(&self, name: &str) -> Option<&TenantConfig> {
        self.tenants.iter().find(|tenant| tenant.name == name)
    }
}
