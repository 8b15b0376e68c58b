use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::warn;

use crate::types::{NaturalKey, Record, SurrogateKey};

/// Natural key → surrogate key index over a dimension snapshot.
#[derive(Debug, Clone, Default)]
pub struct KeyResolver {
    index: HashMap<NaturalKey, SurrogateKey>,
    duplicates: usize,
}

impl KeyResolver {
    /// Build the index. When a key repeats, its first surrogate is kept.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (NaturalKey, SurrogateKey)>,
    {
        let mut resolver = Self::default();
        for (key, surrogate) in pairs {
            if resolver.index.contains_key(&key) {
                resolver.duplicates += 1;
                continue;
            }
            resolver.index.insert(key, surrogate);
        }
        resolver
    }

    /// Rows without a surrogate value are ignored.
    pub fn from_records(records: &[Record], key_fields: &[&str], surrogate_field: &str) -> Self {
        let resolver = Self::from_pairs(records.iter().filter_map(|record| {
            record
                .int(surrogate_field)
                .map(|id| (NaturalKey::from_record(record, key_fields), SurrogateKey(id)))
        }));
        if resolver.duplicates > 0 {
            warn!(
                duplicates = resolver.duplicates,
                key = ?key_fields,
                "dimension snapshot repeats natural keys; first surrogate kept"
            );
        }
        resolver
    }

    pub fn resolve(&self, key: &NaturalKey) -> Option<SurrogateKey> {
        self.index.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }
}

/// Inclusive validity of one dimension version. An open `valid_to` is
/// unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValidityInterval {
    pub valid_from: NaiveDate,
    pub valid_to: Option<NaiveDate>,
    pub surrogate: SurrogateKey,
}

impl ValidityInterval {
    pub fn new(
        valid_from: NaiveDate,
        valid_to: Option<NaiveDate>,
        surrogate: SurrogateKey,
    ) -> Self {
        Self {
            valid_from,
            valid_to,
            surrogate,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.valid_from && self.valid_to.map_or(true, |end| date <= end)
    }

    fn end(&self) -> NaiveDate {
        self.valid_to.unwrap_or(NaiveDate::MAX)
    }

    pub fn overlaps(&self, other: &ValidityInterval) -> bool {
        self.valid_from <= other.end() && other.valid_from <= self.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum IntervalIssue {
    /// Two versions of one key are valid on a common date. Resolution picks
    /// the first in input order.
    Overlap {
        key: NaturalKey,
        first: SurrogateKey,
        second: SurrogateKey,
    },
    /// `valid_from` is after `valid_to`; the version is not indexed.
    Inverted {
        key: NaturalKey,
        surrogate: SurrogateKey,
        valid_from: NaiveDate,
        valid_to: NaiveDate,
    },
    /// The version has no usable `valid_from`; it is not indexed.
    MissingStart {
        key: NaturalKey,
        surrogate: SurrogateKey,
    },
}

impl IntervalIssue {
    pub fn key(&self) -> &NaturalKey {
        match self {
            IntervalIssue::Overlap { key, .. }
            | IntervalIssue::Inverted { key, .. }
            | IntervalIssue::MissingStart { key, .. } => key,
        }
    }

    pub fn to_row(&self) -> Record {
        let row = Record::new().with("key", self.key().to_string());
        match self {
            IntervalIssue::Overlap { first, second, .. } => row
                .with("issue", "overlap")
                .with("surrogate", *first)
                .with("other_surrogate", *second),
            IntervalIssue::Inverted {
                surrogate,
                valid_from,
                valid_to,
                ..
            } => row
                .with("issue", "inverted")
                .with("surrogate", *surrogate)
                .with("valid_from", *valid_from)
                .with("valid_to", *valid_to),
            IntervalIssue::MissingStart { surrogate, .. } => row
                .with("issue", "missing_start")
                .with("surrogate", *surrogate),
        }
    }

    pub const REPORT_HEADER: [&'static str; 6] = [
        "issue",
        "key",
        "surrogate",
        "other_surrogate",
        "valid_from",
        "valid_to",
    ];
}

impl fmt::Display for IntervalIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntervalIssue::Overlap { key, first, second } => {
                write!(f, "{key}: versions {first} and {second} overlap")
            }
            IntervalIssue::Inverted {
                key,
                surrogate,
                valid_from,
                valid_to,
            } => write!(
                f,
                "{key}: version {surrogate} ends ({valid_to}) before it starts ({valid_from})"
            ),
            IntervalIssue::MissingStart { key, surrogate } => {
                write!(f, "{key}: version {surrogate} has no start date")
            }
        }
    }
}

/// Natural key → validity intervals, resolved at an effective date.
#[derive(Debug, Clone, Default)]
pub struct TemporalResolver {
    index: HashMap<NaturalKey, Vec<ValidityInterval>>,
    issues: Vec<IntervalIssue>,
}

impl TemporalResolver {
    /// Build the index keeping input order per key. Overlapping and inverted
    /// intervals are recorded as issues rather than rejected.
    pub fn from_intervals<I>(intervals: I) -> Self
    where
        I: IntoIterator<Item = (NaturalKey, ValidityInterval)>,
    {
        let mut resolver = Self::default();

        for (key, interval) in intervals {
            if let Some(end) = interval.valid_to {
                if end < interval.valid_from {
                    resolver.issues.push(IntervalIssue::Inverted {
                        key,
                        surrogate: interval.surrogate,
                        valid_from: interval.valid_from,
                        valid_to: end,
                    });
                    continue;
                }
            }

            let versions = resolver.index.entry(key.clone()).or_default();
            for existing in versions.iter() {
                if existing.overlaps(&interval) {
                    resolver.issues.push(IntervalIssue::Overlap {
                        key: key.clone(),
                        first: existing.surrogate,
                        second: interval.surrogate,
                    });
                }
            }
            versions.push(interval);
        }

        for issue in &resolver.issues {
            warn!(%issue, "temporal dimension data-quality issue");
        }

        resolver
    }

    /// Rows lacking a surrogate are ignored; rows lacking `from_field` are
    /// reported as [`IntervalIssue::MissingStart`].
    pub fn from_records(
        records: &[Record],
        key_fields: &[&str],
        from_field: &str,
        to_field: &str,
        surrogate_field: &str,
    ) -> Self {
        let mut missing_start = Vec::new();
        let intervals: Vec<(NaturalKey, ValidityInterval)> = records
            .iter()
            .filter_map(|record| {
                let surrogate = SurrogateKey(record.int(surrogate_field)?);
                let key = NaturalKey::from_record(record, key_fields);
                match record.date(from_field) {
                    Some(valid_from) => Some((
                        key,
                        ValidityInterval::new(valid_from, record.date(to_field), surrogate),
                    )),
                    None => {
                        missing_start.push(IntervalIssue::MissingStart { key, surrogate });
                        None
                    }
                }
            })
            .collect();

        let mut resolver = Self::from_intervals(intervals);
        for issue in &missing_start {
            warn!(%issue, "temporal dimension data-quality issue");
        }
        resolver.issues.extend(missing_start);
        resolver
    }

    /// First interval of `key`, in input order, containing `date`.
    pub fn resolve(&self, key: &NaturalKey, date: NaiveDate) -> Option<SurrogateKey> {
        self.index
            .get(key)?
            .iter()
            .find(|interval| interval.contains(date))
            .map(|interval| interval.surrogate)
    }

    pub fn intervals(&self, key: &NaturalKey) -> &[ValidityInterval] {
        self.index.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn issues(&self) -> &[IntervalIssue] {
        &self.issues
    }

    pub fn issue_rows(&self) -> Vec<Record> {
        self.issues.iter().map(IntervalIssue::to_row).collect()
    }
}

/// Resolver attached to one foreign-key slot.
#[derive(Debug, Clone)]
pub enum SlotResolver {
    Simple(KeyResolver),
    Temporal(TemporalResolver),
}

impl SlotResolver {
    /// Temporal slots need an effective date; without one they do not resolve.
    pub fn resolve(&self, key: &NaturalKey, date: Option<NaiveDate>) -> Option<SurrogateKey> {
        match self {
            SlotResolver::Simple(resolver) => resolver.resolve(key),
            SlotResolver::Temporal(resolver) => resolver.resolve(key, date?),
        }
    }
}

impl From<KeyResolver> for SlotResolver {
    fn from(resolver: KeyResolver) -> Self {
        SlotResolver::Simple(resolver)
    }
}

impl From<TemporalResolver> for SlotResolver {
    fn from(resolver: TemporalResolver) -> Self {
        SlotResolver::Temporal(resolver)
    }
}
