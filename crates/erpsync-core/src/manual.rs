use std::fs;
use std::path::{Path, PathBuf};

use erpsync_parser::{read_manual_csv, ParserError};
use tracing::debug;

use crate::error::{EtlError, Result};
use crate::types::Record;

/// Curated CSV files maintained by hand in the input directory.
#[derive(Debug, Clone)]
pub struct ManualFiles {
    dir: PathBuf,
}

impl ManualFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// Read `file`, which must exist and carry every `required` column.
    pub fn read(&self, file: &str, required: &[&str]) -> Result<Vec<Record>> {
        self.read_optional(file, required)?.ok_or_else(|| {
            EtlError::Configuration(format!(
                "required input file {} does not exist",
                self.path(file).display()
            ))
        })
    }

    /// Like [`ManualFiles::read`], but a missing file is `None`.
    pub fn read_optional(&self, file: &str, required: &[&str]) -> Result<Option<Vec<Record>>> {
        let path = self.path(file);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        let records = read_manual_csv(file, &content, required).map_err(|err| match err {
            ParserError::MissingColumns { .. } => EtlError::Configuration(err.to_string()),
            other => EtlError::Parser(other),
        })?;
        debug!(file, rows = records.len(), "Read input file");
        Ok(Some(records))
    }
}
