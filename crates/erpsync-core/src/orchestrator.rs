use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::error::EtlError;
use crate::loaders::{Loader, LoaderContext, LoaderReport};

/// Named loader sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// API extraction followed by the audits.
    Daily,
    /// Curated-file syncs, in dependency order.
    Manual,
}

impl Phase {
    pub fn loaders(&self) -> &'static [Loader] {
        match self {
            Phase::Daily => &[
                Loader::Products,
                Loader::Customers,
                Loader::Sellers,
                Loader::Inventory,
                Loader::Sales,
                Loader::ProductsPending,
                Loader::CustomersPending,
                Loader::SellersAudit,
            ],
            Phase::Manual => &[
                Loader::ProductManagement,
                Loader::CustomerMaster,
                Loader::CustomerClassification,
                Loader::People,
                Loader::Roles,
            ],
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Daily => f.write_str("daily"),
            Phase::Manual => f.write_str("manual"),
        }
    }
}

impl FromStr for Phase {
    type Err = EtlError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Phase::Daily),
            "manual" => Ok(Phase::Manual),
            other => Err(EtlError::Configuration(format!(
                "unknown phase {other:?}; expected daily or manual"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoaderOutcome {
    pub loader: Loader,
    pub status: LoaderStatus,
    pub report: Option<LoaderReport>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<LoaderOutcome>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.count(LoaderStatus::Success)
    }

    pub fn failed(&self) -> usize {
        self.count(LoaderStatus::Failed)
    }

    fn count(&self, status: LoaderStatus) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == status)
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    fn reports(&self) -> impl Iterator<Item = &LoaderReport> {
        self.outcomes.iter().filter_map(|outcome| outcome.report.as_ref())
    }

    pub fn rows_written(&self) -> usize {
        self.reports().map(|report| report.sink.written()).sum()
    }

    pub fn rows_deleted(&self) -> usize {
        self.reports().map(|report| report.sink.deleted).sum()
    }

    pub fn rows_quarantined(&self) -> usize {
        self.reports().map(|report| report.quarantined).sum()
    }
}

/// Run `loaders` one after the other. A failing loader is logged and
/// recorded; the next one still runs.
pub async fn run_loaders(ctx: &LoaderContext<'_>, loaders: &[Loader]) -> RunSummary {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    info!(%run_id, loaders = loaders.len(), "Run started");

    let mut outcomes = Vec::with_capacity(loaders.len());
    for loader in loaders {
        let span = info_span!("loader", %run_id, loader = loader.name());
        let outcome = match loader.run(ctx).instrument(span).await {
            Ok(report) => {
                info!(
                    loader = loader.name(),
                    extracted = report.extracted,
                    written = report.sink.written(),
                    deleted = report.sink.deleted,
                    quarantined = report.quarantined,
                    "Loader finished"
                );
                LoaderOutcome {
                    loader: *loader,
                    status: LoaderStatus::Success,
                    report: Some(report),
                    error: None,
                }
            }
            Err(err) => {
                error!(
                    loader = loader.name(),
                    error = %err,
                    "Loader failed; continuing with the next one"
                );
                let message = err.to_string();
                LoaderOutcome {
                    loader: *loader,
                    status: LoaderStatus::Failed,
                    report: err.into_report(),
                    error: Some(message),
                }
            }
        };
        outcomes.push(outcome);
    }

    let summary = RunSummary {
        run_id,
        started_at,
        finished_at: Utc::now(),
        outcomes,
    };
    info!(
        %run_id,
        succeeded = summary.succeeded(),
        failed = summary.failed(),
        written = summary.rows_written(),
        "Run finished"
    );
    summary
}

pub async fn run_phase(ctx: &LoaderContext<'_>, phase: Phase) -> RunSummary {
    info!(%phase, "Running phase");
    run_loaders(ctx, phase.loaders()).await
}
