use csv::ReaderBuilder;

use crate::errors::ParserError;
use crate::model::{Record, Value};

/// Read a curated comma-separated file with a header row. Every column listed
/// in `required` must be present; empty cells become Null.
pub fn read_manual_csv(
    file: &str,
    content: &str,
    required: &[&str],
) -> Result<Vec<Record>, ParserError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|source| ParserError::Csv {
            file: file.to_string(),
            source,
        })?
        .iter()
        .map(|header| header.trim().to_string())
        .collect();

    let missing: Vec<String> = required
        .iter()
        .filter(|column| !headers.iter().any(|header| header == *column))
        .map(|column| column.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ParserError::MissingColumns {
            file: file.to_string(),
            missing,
        });
    }

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row.map_err(|source| ParserError::Csv {
            file: file.to_string(),
            source,
        })?;
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        if row.len() != headers.len() {
            return Err(ParserError::DataRow {
                file: file.to_string(),
                line_index: index + 2,
                message: format!("expected {} cells, found {}", headers.len(), row.len()),
            });
        }

        let record = headers
            .iter()
            .zip(row.iter())
            .map(|(header, cell)| {
                let cell = cell.trim();
                let value = if cell.is_empty() {
                    Value::Null
                } else {
                    Value::text(cell)
                };
                (header.clone(), value)
            })
            .collect();
        records.push(record);
    }

    Ok(records)
}
