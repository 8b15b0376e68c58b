use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::types::Record;

/// Writes flat CSV reports named `<stem>_<stamp>.csv`.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
    stamp: String,
}

impl ReportWriter {
    /// `stamp` is shared by every report of a run, e.g. `20240615_063000`.
    pub fn new(dir: impl Into<PathBuf>, stamp: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            stamp: stamp.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{stem}_{}.csv", self.stamp))
    }

    /// Write `rows` under an explicit column order. Fields outside `header`
    /// are not written; missing ones are empty.
    pub fn write<S: AsRef<str>>(
        &self,
        stem: &str,
        header: &[S],
        rows: &[Record],
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(stem);

        let columns: Vec<&str> = header.iter().map(|column| column.as_ref()).collect();
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(&columns)?;
        for row in rows {
            writer.write_record(columns.iter().map(|column| row.get(column).to_text()))?;
        }
        writer.flush()?;

        info!(report = %path.display(), rows = rows.len(), "Report written");
        Ok(path)
    }

    /// Write `rows` with every field that appears in any of them, in order
    /// of first appearance.
    pub fn write_records(&self, stem: &str, rows: &[Record]) -> Result<PathBuf> {
        let mut header: Vec<String> = Vec::new();
        for row in rows {
            for field in row.field_names() {
                if !header.iter().any(|known| known == field) {
                    header.push(field.to_string());
                }
            }
        }
        self.write(stem, &header, rows)
    }
}
