use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use erpsync_parser::{format_api_date, parse_envelope, ParserError, RawItem};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{ApiConfig, TenantConfig};
use crate::error::{EtlError, Result};

/// ERP endpoints read by the loaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Products,
    ThirdParties,
    Sales,
}

impl Endpoint {
    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::Products => "products",
            Endpoint::ThirdParties => "third_parties",
            Endpoint::Sales => "sales",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Inclusive date range sent with date-filtered requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(EtlError::Validation(format!(
                "date range starts ({start}) after it ends ({end})"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("{endpoint} request for tenant {tenant} failed: {source}")]
    Transport {
        endpoint: Endpoint,
        tenant: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} request for tenant {tenant} returned HTTP {status}")]
    Status {
        endpoint: Endpoint,
        tenant: String,
        status: u16,
    },

    #[error("{endpoint} response for tenant {tenant} could not be decoded: {source}")]
    Payload {
        endpoint: Endpoint,
        tenant: String,
        #[source]
        source: ParserError,
    },

    #[error("{endpoint} extraction failed for every tenant")]
    NoTenantSucceeded { endpoint: Endpoint },
}

impl ExtractionError {
    pub fn tenant(&self) -> Option<&str> {
        match self {
            ExtractionError::Transport { tenant, .. }
            | ExtractionError::Status { tenant, .. }
            | ExtractionError::Payload { tenant, .. } => Some(tenant),
            ExtractionError::NoTenantSucceeded { .. } => None,
        }
    }
}

/// Something that returns the raw items of an endpoint for one tenant.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// A response whose envelope says "no data" yields an empty list.
    async fn fetch(
        &self,
        endpoint: Endpoint,
        tenant: &TenantConfig,
        range: Option<DateRange>,
    ) -> std::result::Result<Vec<RawItem>, ExtractionError>;
}

/// HTTP client for the ERP REST API.
#[derive(Debug, Clone)]
pub struct ErpApiClient {
    http: reqwest::Client,
    api: ApiConfig,
}

impl ErpApiClient {
    pub fn new(api: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("erpsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| EtlError::Configuration(format!("cannot build HTTP client: {err}")))?;
        Ok(Self {
            http,
            api: api.clone(),
        })
    }

    fn url(&self, endpoint: Endpoint) -> &str {
        match endpoint {
            Endpoint::Products => &self.api.products_url,
            Endpoint::ThirdParties => &self.api.third_parties_url,
            Endpoint::Sales => &self.api.sales_url,
        }
    }

    fn timeout(&self, endpoint: Endpoint) -> Duration {
        match endpoint {
            Endpoint::Sales => Duration::from_secs(self.api.sales_timeout_secs),
            _ => Duration::from_secs(self.api.timeout_secs),
        }
    }
}

/// Query parameters of a request. The sales endpoint names the branch
/// parameter differently and takes the date range.
pub fn query_params(
    endpoint: Endpoint,
    tenant: &TenantConfig,
    range: Option<DateRange>,
) -> Vec<(&'static str, String)> {
    let branch_param = match endpoint {
        Endpoint::Sales => "CodSucursal",
        _ => "codsuc",
    };
    let mut params = vec![
        ("empresa", tenant.company.clone()),
        ("usuario", tenant.user.clone()),
        ("password", tenant.password().to_string()),
        ("tnsapitoken", tenant.api_token().to_string()),
        (branch_param, tenant.branch_code.clone()),
    ];
    if let Some(range) = range {
        params.push(("fechaInicial", format_api_date(range.start)));
        params.push(("fechaFin", format_api_date(range.end)));
    }
    params
}

#[async_trait]
impl RecordSource for ErpApiClient {
    async fn fetch(
        &self,
        endpoint: Endpoint,
        tenant: &TenantConfig,
        range: Option<DateRange>,
    ) -> std::result::Result<Vec<RawItem>, ExtractionError> {
        let transport = |source: reqwest::Error| ExtractionError::Transport {
            endpoint,
            tenant: tenant.name.clone(),
            source,
        };

        let response = self
            .http
            .get(self.url(endpoint))
            .query(&query_params(endpoint, tenant, range))
            .timeout(self.timeout(endpoint))
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractionError::Status {
                endpoint,
                tenant: tenant.name.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(transport)?;
        match parse_envelope(endpoint.name(), &body) {
            Ok(items) => Ok(items),
            Err(err) if err.is_envelope_rejection() => {
                warn!(
                    %endpoint,
                    tenant = %tenant.name,
                    error = %err,
                    "No data returned for tenant"
                );
                Ok(Vec::new())
            }
            Err(source) => Err(ExtractionError::Payload {
                endpoint,
                tenant: tenant.name.clone(),
                source,
            }),
        }
    }
}

/// Items extracted for one tenant.
#[derive(Debug, Clone)]
pub struct TenantItems<'a> {
    pub tenant: &'a TenantConfig,
    pub items: Vec<RawItem>,
}

/// Result of extracting one endpoint across every tenant.
#[derive(Debug, Default)]
pub struct Extraction<'a> {
    pub tenants: Vec<TenantItems<'a>>,
    pub failures: Vec<ExtractionError>,
}

impl Extraction<'_> {
    pub fn item_count(&self) -> usize {
        self.tenants.iter().map(|tenant| tenant.items.len()).sum()
    }

    pub fn skipped_tenants(&self) -> Vec<String> {
        self.failures
            .iter()
            .filter_map(|failure| failure.tenant().map(str::to_string))
            .collect()
    }
}

/// Fetch `endpoint` for each tenant in turn. A failing tenant is logged and
/// listed; the others continue. Fails only when no tenant succeeded.
pub async fn extract_all<'a>(
    source: &dyn RecordSource,
    tenants: &'a [TenantConfig],
    endpoint: Endpoint,
    range: Option<DateRange>,
) -> std::result::Result<Extraction<'a>, ExtractionError> {
    let mut extraction = Extraction::default();

    for tenant in tenants {
        match source.fetch(endpoint, tenant, range).await {
            Ok(items) => {
                info!(%endpoint, tenant = %tenant.name, rows = items.len(), "Extracted");
                extraction.tenants.push(TenantItems { tenant, items });
            }
            Err(err) => {
                error!(
                    %endpoint,
                    tenant = %tenant.name,
                    error = %err,
                    "Extraction failed; skipping tenant"
                );
                extraction.failures.push(err);
            }
        }
    }

    if extraction.tenants.is_empty() && !tenants.is_empty() {
        return Err(ExtractionError::NoTenantSucceeded { endpoint });
    }
    Ok(extraction)
}
