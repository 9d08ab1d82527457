//! Deduplicator & Merger
//!
//! Collapses records sharing a normalised number into one record per
//! patent. Field policy per pair:
//! - one side empty: take the non-empty value
//! - both populated: keep the value of the record with more completed
//!   fields; on a tie keep the first-seen record's value
//!
//! Provenance sets are unioned. Output is ordered by normalised number.

use crate::normalizer::normalize;
use crate::types::{Country, PatentRecord};
use std::collections::BTreeMap;
use tracing::debug;

/// One output record per distinct normalised number
pub fn merge(records: Vec<PatentRecord>, default_country: Country) -> Vec<PatentRecord> {
    let input = records.len();
    let mut merged: BTreeMap<String, PatentRecord> = BTreeMap::new();

    for mut record in records {
        let key = normalize(&record.number, default_country);
        if key.is_empty() {
            continue;
        }
        record.number = key.clone();
        let combined = match merged.remove(&key) {
            Some(existing) => merge_pair(existing, record),
            None => record,
        };
        merged.insert(key, combined);
    }

    debug!(input, output = merged.len(), "Records merged");
    merged.into_values().collect()
}

/// Merge two records describing the same patent; `first` is the earlier arrival
pub fn merge_pair(first: PatentRecord, second: PatentRecord) -> PatentRecord {
    let (mut primary, secondary) = if second.completed_fields() > first.completed_fields() {
        (second, first)
    } else {
        (first, second)
    };

    take_if_none(&mut primary.title, secondary.title);
    take_if_none(&mut primary.title_original, secondary.title_original);
    take_if_none(&mut primary.abstract_text, secondary.abstract_text);
    take_if_empty(&mut primary.applicants, secondary.applicants);
    take_if_empty(&mut primary.inventors, secondary.inventors);
    take_if_empty(&mut primary.ipc_codes, secondary.ipc_codes);
    take_if_none(&mut primary.filing_date, secondary.filing_date);
    take_if_none(&mut primary.publication_date, secondary.publication_date);
    take_if_none(&mut primary.priority_date, secondary.priority_date);
    take_if_none(&mut primary.family_root, secondary.family_root);
    primary.provenance.extend(secondary.provenance);

    primary
}

fn take_if_none<T>(target: &mut Option<T>, candidate: Option<T>) {
    if target.is_none() {
        *target = candidate;
    }
}

fn take_if_empty(target: &mut Vec<String>, candidate: Vec<String>) {
    if target.is_empty() {
        *target = candidate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PartialRecord;
    use chrono::NaiveDate;

    fn record(number: &str, source: &str) -> PatentRecord {
        let partial = PartialRecord {
            number: Some(number.to_string()),
            ..Default::default()
        };
        PatentRecord::from_partial(partial, Country::Br, source).unwrap()
    }

    #[test]
    fn test_collapses_spelling_variants() {
        let a = record("BR 11 2017 021636", "national_office");
        let b = record("br112017021636", "search_engine");
        let merged = merge(vec![a, b], Country::Br);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].number, "BR112017021636");
        assert_eq!(merged[0].provenance.len(), 2);
    }

    #[test]
    fn test_more_complete_record_wins_conflicts() {
        let mut sparse = record("BR112017021636", "a");
        sparse.title = Some("Short title".to_string());

        let mut rich = record("BR112017021636", "b");
        rich.title = Some("Full title".to_string());
        rich.abstract_text = Some("Abstract".to_string());
        rich.applicants = vec!["Orion Corporation".to_string()];

        let merged = merge_pair(sparse, rich);
        assert_eq!(merged.title.as_deref(), Some("Full title"));
    }

    #[test]
    fn test_tie_keeps_first_seen() {
        let mut first = record("BR112017021636", "a");
        first.title = Some("First".to_string());
        let mut second = record("BR112017021636", "b");
        second.title = Some("Second".to_string());

        assert_eq!(merge_pair(first, second).title.as_deref(), Some("First"));
    }

    #[test]
    fn test_merge_never_loses_fields() {
        let mut a = record("BR112017021636", "a");
        a.title = Some("Title".to_string());
        a.filing_date = NaiveDate::from_ymd_opt(2016, 6, 15);
        let mut b = record("BR112017021636", "b");
        b.inventors = vec!["Anna Schmidt".to_string()];
        b.ipc_codes = vec!["A61K 31/4166".to_string()];
        b.family_root = Some("WO2016203052".to_string());

        let merged = merge_pair(a, b);
        assert!(merged.title.is_some());
        assert!(merged.filing_date.is_some());
        assert!(!merged.inventors.is_empty());
        assert!(!merged.ipc_codes.is_empty());
        assert!(merged.family_root.is_some());
    }

    #[test]
    fn test_output_sorted_by_number() {
        let merged = merge(
            vec![record("BR112019014776", "a"), record("BR112017027822", "a")],
            Country::Br,
        );
        let numbers: Vec<&str> = merged.iter().map(|r| r.number.as_str()).collect();
        assert_eq!(numbers, vec!["BR112017027822", "BR112019014776"]);
    }

    fn mixed_batch() -> (Vec<PatentRecord>, Vec<PatentRecord>) {
        let mut office = record("BR 11 2017 027822", "national_office");
        office.title = Some("Crystalline form of darolutamide".to_string());
        office.filing_date = NaiveDate::from_ymd_opt(2016, 6, 15);
        let mut engine = record("BR112017027822A2", "search_engine");
        engine.applicants = vec!["Orion Corporation".to_string()];
        let other = record("BR112018076865", "registry");

        let a = vec![office, other];
        let b = vec![engine, record("br112018076865", "search_engine")];
        (a, b)
    }

    #[test]
    fn test_merging_merged_output_changes_nothing() {
        let (a, b) = mixed_batch();
        let merged = merge(a.into_iter().chain(b).collect(), Country::Br);

        let doubled: Vec<PatentRecord> = merged.iter().cloned().chain(merged.iter().cloned()).collect();
        assert_eq!(merge(doubled, Country::Br), merged);
        assert_eq!(merge(merged.clone(), Country::Br), merged);
    }

    #[test]
    fn test_arrival_order_does_not_change_numbers_or_provenance() {
        let (a, b) = mixed_batch();
        let forward = merge(a.iter().cloned().chain(b.iter().cloned()).collect(), Country::Br);
        let backward = merge(b.into_iter().chain(a).collect(), Country::Br);

        let summary = |records: &[PatentRecord]| {
            records
                .iter()
                .map(|r| (r.number.clone(), r.provenance.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(summary(&forward), summary(&backward));
        assert_eq!(forward.len(), 2);
        assert_eq!(forward[0].provenance.len(), 2);
        assert_eq!(forward[1].provenance.len(), 2);
        assert_eq!(forward[0].applicants, backward[0].applicants);
        assert_eq!(forward[0].title, backward[0].title);
    }
}
