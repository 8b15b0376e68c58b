use std::path::PathBuf;

use thiserror::Error;

use crate::loaders::LoaderReport;
use crate::sink::SinkFailure;
use crate::source::ExtractionError;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Sink(#[from] SinkFailure),

    /// Some tenant batches were rolled back; the others committed.
    #[error("{} loaded partially: {}", .report.loader, describe_failures(.failures))]
    PartialLoad {
        failures: Vec<SinkFailure>,
        report: Box<LoaderReport>,
    },

    #[error(
        "{count} rows in {file} have no match in {dimension}; see {}",
        report.display()
    )]
    UnresolvedManualRows {
        file: String,
        dimension: &'static str,
        count: usize,
        report: PathBuf,
    },

    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Parser(#[from] erpsync_parser::ParserError),

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl EtlError {
    /// What the loader did before failing, when it got that far.
    pub fn into_report(self) -> Option<LoaderReport> {
        match self {
            EtlError::PartialLoad { report, .. } => Some(*report),
            _ => None,
        }
    }
}

fn describe_failures(failures: &[SinkFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, EtlError>;
