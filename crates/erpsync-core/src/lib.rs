pub mod config;
pub mod db;
pub mod diff;
pub mod enrich;
pub mod error;
pub mod loaders;
pub mod manual;
pub mod memory;
pub mod normalize;
pub mod orchestrator;
pub mod reports;
pub mod resolver;
pub mod schema;
pub mod sink;
pub mod source;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::{ApiConfig, EtlConfig, TenantConfig};
pub use error::{EtlError, Result};
pub use loaders::{Loader, LoaderContext, LoaderReport};
pub use orchestrator::{run_loaders, run_phase, LoaderOutcome, LoaderStatus, Phase, RunSummary};
pub use sink::{SinkFailure, Warehouse};
pub use source::{DateRange, ErpApiClient, RecordSource};
