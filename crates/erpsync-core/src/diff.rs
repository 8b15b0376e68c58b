use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::warn;

use crate::normalize::normalize_value;
use crate::types::{NaturalKey, Record, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeStatus {
    New,
    Modified,
    Removed,
    Unchanged,
}

impl ChangeStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ChangeStatus::New => "NEW",
            ChangeStatus::Modified => "MODIFIED",
            ChangeStatus::Removed => "REMOVED",
            ChangeStatus::Unchanged => "UNCHANGED",
        }
    }
}

/// Key and compared fields of one differ run.
#[derive(Debug, Clone, Copy)]
pub struct DiffSpec<'a> {
    pub key: &'a [&'a str],
    pub compare: &'a [&'a str],
}

#[derive(Debug, Clone, Serialize)]
pub struct Change {
    pub status: ChangeStatus,
    pub key: NaturalKey,
    /// Compared fields as stored, not normalized.
    pub before: Option<Record>,
    pub after: Option<Record>,
    pub changed_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeReport {
    pub key_fields: Vec<String>,
    pub compare_fields: Vec<String>,
    /// NEW, MODIFIED and REMOVED entries ordered by status then key.
    pub changes: Vec<Change>,
    pub unchanged: Vec<NaturalKey>,
    /// Rows that repeated a key already seen on the same side.
    pub duplicate_keys: usize,
}

impl ChangeReport {
    pub fn count(&self, status: ChangeStatus) -> usize {
        match status {
            ChangeStatus::Unchanged => self.unchanged.len(),
            other => self
                .changes
                .iter()
                .filter(|change| change.status == other)
                .count(),
        }
    }

    pub fn status_of(&self, key: &NaturalKey) -> Option<ChangeStatus> {
        if self.unchanged.contains(key) {
            return Some(ChangeStatus::Unchanged);
        }
        self.changes
            .iter()
            .find(|change| &change.key == key)
            .map(|change| change.status)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn header(&self) -> Vec<String> {
        let mut header = vec!["status".to_string()];
        header.extend(self.key_fields.iter().cloned());
        for field in &self.compare_fields {
            header.push(format!("{field}_before"));
            header.push(format!("{field}_after"));
        }
        header
    }

    /// Flat rows for the report collaborator, one per change.
    pub fn to_rows(&self) -> Vec<Record> {
        self.changes
            .iter()
            .map(|change| {
                let mut row = Record::new().with("status", change.status.label());
                for (field, part) in self.key_fields.iter().zip(change.key.parts()) {
                    row.set(field.as_str(), part.as_str());
                }
                for field in &self.compare_fields {
                    let before = side_value(change.before.as_ref(), field);
                    let after = side_value(change.after.as_ref(), field);
                    row.set(format!("{field}_before"), before);
                    row.set(format!("{field}_after"), after);
                }
                row
            })
            .collect()
    }
}

fn side_value(side: Option<&Record>, field: &str) -> Value {
    side.map(|record| record.get(field).clone())
        .unwrap_or_default()
}

fn index<'a>(
    records: &'a [Record],
    key: &[&str],
    duplicates: &mut usize,
) -> BTreeMap<NaturalKey, &'a Record> {
    let mut indexed = BTreeMap::new();
    for record in records {
        if indexed
            .insert(NaturalKey::from_record(record, key), record)
            .is_some()
        {
            *duplicates += 1;
        }
    }
    indexed
}

/// Classify every key of `existing ∪ incoming` as NEW, MODIFIED, REMOVED or
/// UNCHANGED. Compared fields are normalized on both sides first. When a key
/// repeats on one side the last row wins.
pub fn diff(existing: &[Record], incoming: &[Record], spec: &DiffSpec<'_>) -> ChangeReport {
    let mut duplicate_keys = 0;
    let existing_index = index(existing, spec.key, &mut duplicate_keys);
    let incoming_index = index(incoming, spec.key, &mut duplicate_keys);

    if duplicate_keys > 0 {
        warn!(
            duplicate_keys,
            key = ?spec.key,
            "differ inputs repeat natural keys; the last row of each key was used"
        );
    }

    let keys: BTreeSet<&NaturalKey> = existing_index
        .keys()
        .chain(incoming_index.keys())
        .collect();

    let mut changes = Vec::new();
    let mut unchanged = Vec::new();

    for key in keys {
        match (existing_index.get(key), incoming_index.get(key)) {
            (None, Some(after)) => changes.push(Change {
                status: ChangeStatus::New,
                key: key.clone(),
                before: None,
                after: Some(after.project(spec.compare)),
                changed_fields: Vec::new(),
            }),
            (Some(before), None) => changes.push(Change {
                status: ChangeStatus::Removed,
                key: key.clone(),
                before: Some(before.project(spec.compare)),
                after: None,
                changed_fields: Vec::new(),
            }),
            (Some(before), Some(after)) => {
                let changed_fields: Vec<String> = spec
                    .compare
                    .iter()
                    .filter(|field| {
                        normalize_value(before.get(field)) != normalize_value(after.get(field))
                    })
                    .map(|field| field.to_string())
                    .collect();

                if changed_fields.is_empty() {
                    unchanged.push(key.clone());
                } else {
                    changes.push(Change {
                        status: ChangeStatus::Modified,
                        key: key.clone(),
                        before: Some(before.project(spec.compare)),
                        after: Some(after.project(spec.compare)),
                        changed_fields,
                    });
                }
            }
            (None, None) => {}
        }
    }

    changes.sort_by(|a, b| a.status.cmp(&b.status).then_with(|| a.key.cmp(&b.key)));

    ChangeReport {
        key_fields: spec.key.iter().map(|field| field.to_string()).collect(),
        compare_fields: spec.compare.iter().map(|field| field.to_string()).collect(),
        changes,
        unchanged,
        duplicate_keys,
    }
}
