use crate::errors::ParserError;
use crate::model::RawItem;

const RECORD_KEYS: [&str; 2] = ["results", "Data"];

/// Decode an ERP response body of the form `{"status": "OK", "results": [...]}`.
///
/// The sales endpoint returns its rows under `Data` and may omit `status`.
/// Any other shape is an [`ParserError::UnexpectedEnvelope`].
pub fn parse_envelope(source_name: &'static str, body: &str) -> Result<Vec<RawItem>, ParserError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|source| ParserError::Json {
            source_name,
            source,
        })?;

    let serde_json::Value::Object(envelope) = value else {
        return Err(ParserError::UnexpectedEnvelope {
            source_name,
            reason: "response body is not a JSON object".to_string(),
        });
    };

    if let Some(status) = envelope.get("status") {
        let status = status.as_str().map(str::trim).unwrap_or_default();
        if !status.eq_ignore_ascii_case("OK") {
            return Err(ParserError::UnexpectedEnvelope {
                source_name,
                reason: format!("status is {:?}", envelope.get("status")),
            });
        }
    }

    let records = RECORD_KEYS
        .iter()
        .find_map(|key| envelope.get(*key).and_then(serde_json::Value::as_array))
        .ok_or_else(|| ParserError::UnexpectedEnvelope {
            source_name,
            reason: "no results array".to_string(),
        })?;

    Ok(records
        .iter()
        .filter_map(|item| item.as_object().cloned())
        .collect())
}

/// Expand a nested array of objects into one item per element, copying the
/// listed parent fields onto each child. Items without the nested array are
/// dropped.
pub fn flatten_nested(items: &[RawItem], record_path: &str, meta: &[&str]) -> Vec<RawItem> {
    let mut flattened = Vec::new();

    for item in items {
        let Some(children) = item.get(record_path).and_then(serde_json::Value::as_array) else {
            continue;
        };

        for child in children {
            let Some(child) = child.as_object() else {
                continue;
            };
            let mut row = child.clone();
            for field in meta {
                if row.contains_key(*field) {
                    continue;
                }
                if let Some(value) = item.get(*field) {
                    row.insert((*field).to_string(), value.clone());
                }
            }
            flattened.push(row);
        }
    }

    flattened
}

/// Whether a product item lists `price_list` among its nested price lists.
pub fn offers_price_list(item: &RawItem, path: &str, code_field: &str, price_list: &str) -> bool {
    item.get(path)
        .and_then(serde_json::Value::as_array)
        .is_some_and(|lists| {
            lists.iter().any(|entry| {
                entry
                    .get(code_field)
                    .map(|code| match code {
                        serde_json::Value::String(text) => text.trim() == price_list,
                        other => other.to_string() == price_list,
                    })
                    .unwrap_or(false)
            })
        })
}
