use std::collections::HashSet;
use std::fs;
use std::path::Path;

use erpsync_parser::{read_manual_csv, ParserError};
use tracing::info;

use crate::diff::{diff, ChangeStatus, DiffSpec};
use crate::error::{EtlError, Result};
use crate::types::{NaturalKey, Record};

pub const DEFAULT_KEY: &[&str] = &["product_code", "reference", "tenant"];

fn read_extraction(path: &Path, key: &[&str]) -> Result<Vec<Record>> {
    let content = fs::read_to_string(path).map_err(|err| {
        EtlError::Configuration(format!("cannot read extraction {}: {err}", path.display()))
    })?;
    let name = path.display().to_string();
    read_manual_csv(&name, &content, key).map_err(|err| match err {
        ParserError::MissingColumns { .. } => EtlError::Configuration(err.to_string()),
        other => EtlError::Parser(other),
    })
}

/// Rows of `second` whose key does not occur in `first`.
pub fn only_in_second(first: &[Record], second: &[Record], key: &[&str]) -> Vec<Record> {
    let changes = diff(first, second, &DiffSpec { key, compare: &[] });
    let new_keys: HashSet<&NaturalKey> = changes
        .changes
        .iter()
        .filter(|change| change.status == ChangeStatus::New)
        .map(|change| &change.key)
        .collect();

    second
        .iter()
        .filter(|row| new_keys.contains(&NaturalKey::from_record(row, key)))
        .cloned()
        .collect()
}

/// Compare two extraction CSV files (for example two runs of the same
/// endpoint) and return the records only the second one holds.
pub fn compare_extractions(first: &Path, second: &Path, key: &[&str]) -> Result<Vec<Record>> {
    let before = read_extraction(first, key)?;
    let after = read_extraction(second, key)?;
    let added = only_in_second(&before, &after, key);
    info!(
        first = %first.display(),
        second = %second.display(),
        first_rows = before.len(),
        second_rows = after.len(),
        only_in_second = added.len(),
        "Extractions compared"
    );
    Ok(added)
}
