use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::resolver::SlotResolver;
use crate::types::{NaturalKey, Record, SurrogateKey};

/// One foreign-key slot of a fact table.
#[derive(Debug, Clone)]
pub struct Slot {
    pub name: &'static str,
    /// Column that receives the resolved surrogate key.
    pub column: &'static str,
    pub resolver: SlotResolver,
}

impl Slot {
    pub fn new(
        name: &'static str,
        column: &'static str,
        resolver: impl Into<SlotResolver>,
    ) -> Self {
        Self {
            name,
            column,
            resolver: resolver.into(),
        }
    }
}

/// A source fact before key resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactDraft {
    pub event_date: Option<NaiveDate>,
    /// Natural key per slot name.
    pub keys: BTreeMap<&'static str, NaturalKey>,
    /// Measures and natural-key fields as extracted.
    pub record: Record,
}

impl FactDraft {
    pub fn new(event_date: Option<NaiveDate>, record: Record) -> Self {
        Self {
            event_date,
            keys: BTreeMap::new(),
            record,
        }
    }

    pub fn with_key(mut self, slot: &'static str, key: NaturalKey) -> Self {
        self.keys.insert(slot, key);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedFact {
    pub surrogate_keys: BTreeMap<&'static str, SurrogateKey>,
    /// Source record plus one column per resolved slot.
    pub record: Record,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuarantinedFact {
    pub draft: FactDraft,
    pub failed_slots: Vec<&'static str>,
}

impl QuarantinedFact {
    /// Source record, the natural key of every slot and the failed slot names.
    pub fn to_row(&self) -> Record {
        let mut row = self.draft.record.clone();
        for (slot, key) in &self.draft.keys {
            row.set(format!("{slot}_key"), key.to_string());
        }
        row.set("failed_slots", self.failed_slots.join(";"));
        row
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Enrichment {
    pub enriched: Vec<EnrichedFact>,
    pub quarantined: Vec<QuarantinedFact>,
    /// Failed-resolution count per slot name.
    pub tally: BTreeMap<&'static str, usize>,
}

impl Enrichment {
    /// Move `draft` to quarantine for a reason detected before resolution.
    pub fn quarantine(&mut self, draft: FactDraft, reason: &'static str) {
        *self.tally.entry(reason).or_default() += 1;
        self.quarantined.push(QuarantinedFact {
            draft,
            failed_slots: vec![reason],
        });
    }

    pub fn quarantine_rows(&self) -> Vec<Record> {
        self.quarantined.iter().map(QuarantinedFact::to_row).collect()
    }

    pub fn enriched_records(&self) -> Vec<Record> {
        self.enriched.iter().map(|fact| fact.record.clone()).collect()
    }
}

/// Resolves every foreign-key slot of a fact batch, quarantining facts with
/// any unresolved slot.
#[derive(Debug, Clone, Default)]
pub struct Enricher {
    slots: Vec<Slot>,
}

impl Enricher {
    pub fn new(slots: Vec<Slot>) -> Self {
        Self { slots }
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn enrich(&self, drafts: &[FactDraft]) -> Enrichment {
        let mut outcome = Enrichment::default();
        self.enrich_into(drafts, &mut outcome);
        outcome
    }

    /// Like [`Enricher::enrich`], appending to an existing outcome.
    pub fn enrich_into(&self, drafts: &[FactDraft], outcome: &mut Enrichment) {
        for draft in drafts {
            let mut surrogate_keys = BTreeMap::new();
            let mut failed_slots = Vec::new();

            for slot in &self.slots {
                let resolved = draft
                    .keys
                    .get(slot.name)
                    .and_then(|key| slot.resolver.resolve(key, draft.event_date));
                match resolved {
                    Some(surrogate) => {
                        surrogate_keys.insert(slot.name, surrogate);
                    }
                    None => failed_slots.push(slot.name),
                }
            }

            if failed_slots.is_empty() {
                let mut record = draft.record.clone();
                for slot in &self.slots {
                    if let Some(surrogate) = surrogate_keys.get(slot.name) {
                        record.set(slot.column, *surrogate);
                    }
                }
                outcome.enriched.push(EnrichedFact {
                    surrogate_keys,
                    record,
                });
            } else {
                for slot in &failed_slots {
                    *outcome.tally.entry(*slot).or_default() += 1;
                }
                outcome.quarantined.push(QuarantinedFact {
                    draft: draft.clone(),
                    failed_slots,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{KeyResolver, TemporalResolver, ValidityInterval};
    use crate::types::Value;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn enricher() -> Enricher {
        let products = KeyResolver::from_pairs([(
            NaturalKey::new(["P1", "P1", "CAMDUN"]),
            SurrogateKey(100),
        )]);
        let roles = TemporalResolver::from_intervals([
            (
                NaturalKey::new(["V001", "CAMDUN"]),
                ValidityInterval::new(date(2024, 1, 1), Some(date(2024, 5, 31)), SurrogateKey(1)),
            ),
            (
                NaturalKey::new(["V001", "CAMDUN"]),
                ValidityInterval::new(date(2024, 6, 1), Some(date(2024, 12, 31)), SurrogateKey(2)),
            ),
        ]);
        Enricher::new(vec![
            Slot::new("product", "id_product", products),
            Slot::new("sales_role", "id_role_version", roles),
        ])
    }

    fn sale(event_date: Option<NaiveDate>, product: &str, seller: &str) -> FactDraft {
        FactDraft::new(
            event_date,
            Record::new()
                .with("product_code", product)
                .with("seller_code", seller)
                .with("quantity", 2_i64),
        )
        .with_key("product", NaturalKey::new([product, product, "CAMDUN"]))
        .with_key("sales_role", NaturalKey::new([seller, "CAMDUN"]))
    }

    #[test]
    fn sale_resolves_to_the_role_version_valid_on_its_date() {
        let outcome = enricher().enrich(&[sale(Some(date(2024, 6, 15)), "P1", "V001")]);

        assert!(outcome.quarantined.is_empty());
        let fact = &outcome.enriched[0];
        assert_eq!(fact.surrogate_keys.get("sales_role"), Some(&SurrogateKey(2)));
        assert_eq!(fact.record.get("id_role_version"), &Value::Int(2));
        assert_eq!(fact.record.get("id_product"), &Value::Int(100));
        assert_eq!(fact.record.get("quantity"), &Value::Int(2));
    }

    #[test]
    fn every_output_is_fully_keyed_and_every_quarantine_has_a_reason() {
        let drafts = vec![
            sale(Some(date(2024, 6, 15)), "P1", "V001"),
            sale(Some(date(2024, 6, 15)), "P9", "V001"),
            sale(Some(date(2025, 2, 1)), "P1", "V001"),
            sale(None, "P9", "V002"),
            FactDraft::new(Some(date(2024, 3, 1)), Record::new()),
        ];
        let enricher = enricher();
        let outcome = enricher.enrich(&drafts);

        assert_eq!(outcome.enriched.len() + outcome.quarantined.len(), drafts.len());
        for fact in &outcome.enriched {
            for slot in enricher.slots() {
                assert!(!fact.record.get(slot.column).is_null());
            }
        }
        for quarantined in &outcome.quarantined {
            assert!(!quarantined.failed_slots.is_empty());
        }

        assert_eq!(outcome.enriched.len(), 1);
        assert_eq!(outcome.tally.get("product"), Some(&3));
        assert_eq!(outcome.tally.get("sales_role"), Some(&3));
        assert_eq!(outcome.quarantined[1].failed_slots, vec!["sales_role"]);
    }

    #[test]
    fn enrichment_does_not_mutate_drafts() {
        let drafts = vec![sale(Some(date(2024, 6, 15)), "P1", "V001")];
        let before = drafts.clone();
        let _ = enricher().enrich(&drafts);
        assert_eq!(drafts, before);
    }

    #[test]
    fn quarantine_rows_keep_natural_keys_and_reasons() {
        let outcome = enricher().enrich(&[sale(Some(date(2024, 6, 15)), "P9", "V001")]);
        let rows = outcome.quarantine_rows();
        assert_eq!(rows[0].text("failed_slots").as_deref(), Some("product"));
        assert_eq!(rows[0].text("product_key").as_deref(), Some("P9|P9|CAMDUN"));
        assert_eq!(rows[0].text("sales_role_key").as_deref(), Some("V001|CAMDUN"));
    }
}
