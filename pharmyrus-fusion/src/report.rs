//! Search report assembly

use crate::audit::AuditReport;
use crate::enrichment::EnrichmentStats;
use crate::types::{Country, PatentRecord, SearchStrategy, StrategyStatus};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Counts over the whole run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_patents: usize,
    pub patents_by_country: BTreeMap<Country, usize>,
    pub patents_by_strategy: BTreeMap<String, usize>,
    pub strategies_succeeded: usize,
    pub strategies_failed: usize,
    pub strategies_skipped: usize,
    pub enrichment: EnrichmentStats,
}

/// Structured result of one search run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchReport {
    pub molecule: String,
    pub summary: ReportSummary,
    pub strategies: BTreeMap<String, SearchStrategy>,
    /// Records per country, newest publication first, undated last
    pub patents_by_country: BTreeMap<Country, Vec<PatentRecord>>,
    pub audit_report: AuditReport,
    pub elapsed_seconds: f64,
}

impl SearchReport {
    pub fn assemble(
        molecule: String,
        strategies: BTreeMap<String, SearchStrategy>,
        records: Vec<PatentRecord>,
        audit_report: AuditReport,
        enrichment: EnrichmentStats,
        elapsed_seconds: f64,
    ) -> Self {
        let total_patents = records.len();

        let mut patents_by_country: BTreeMap<Country, Vec<PatentRecord>> = BTreeMap::new();
        for record in records {
            patents_by_country.entry(record.country).or_default().push(record);
        }
        for list in patents_by_country.values_mut() {
            list.sort_by(publication_order);
        }

        let count_status = |status: StrategyStatus| strategies.values().filter(|s| s.status == status).count();
        let summary = ReportSummary {
            total_patents,
            patents_by_country: patents_by_country.iter().map(|(c, l)| (*c, l.len())).collect(),
            patents_by_strategy: strategies
                .iter()
                .map(|(id, s)| (id.clone(), s.patents_found))
                .collect(),
            strategies_succeeded: count_status(StrategyStatus::Success),
            strategies_failed: count_status(StrategyStatus::Failed),
            strategies_skipped: count_status(StrategyStatus::Skipped),
            enrichment,
        };

        Self {
            molecule,
            summary,
            strategies,
            patents_by_country,
            audit_report,
            elapsed_seconds: (elapsed_seconds * 10.0).round() / 10.0,
        }
    }
}

/// Publication date descending, undated last, then number ascending
fn publication_order(a: &PatentRecord, b: &PatentRecord) -> Ordering {
    match (a.publication_date, b.publication_date) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.number.cmp(&b.number))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{audit, ComparisonStatus};
    use crate::types::PartialRecord;
    use chrono::NaiveDate;

    fn record(number: &str, published: Option<(i32, u32, u32)>) -> PatentRecord {
        let partial = PartialRecord {
            number: Some(number.to_string()),
            publication_date: published.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
            ..Default::default()
        };
        PatentRecord::from_partial(partial, Country::Br, "test").unwrap()
    }

    #[test]
    fn test_records_sorted_newest_first_undated_last() {
        let records = vec![
            record("BR112017027822", Some((2018, 7, 3))),
            record("BR112018076865", None),
            record("BR112021001234", Some((2021, 5, 4))),
            record("US10010530", Some((2018, 7, 3))),
            record("BR112017000001", None),
        ];
        let audit_report = audit("d", None, &[], 0, &BTreeMap::new(), Country::Br);
        let report = SearchReport::assemble(
            "d".to_string(),
            BTreeMap::new(),
            records,
            audit_report,
            EnrichmentStats::default(),
            1.234,
        );

        let br: Vec<&str> = report.patents_by_country[&Country::Br]
            .iter()
            .map(|r| r.number.as_str())
            .collect();
        assert_eq!(
            br,
            vec!["BR112021001234", "BR112017027822", "BR112017000001", "BR112018076865"]
        );
        assert_eq!(report.summary.total_patents, 5);
        assert_eq!(report.summary.patents_by_country[&Country::Us], 1);
        assert_eq!(report.elapsed_seconds, 1.2);
        assert_eq!(report.audit_report.status, ComparisonStatus::NoBenchmark);
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let audit_report = audit("d", None, &[], 0, &BTreeMap::new(), Country::Br);
        let report = SearchReport::assemble(
            "d".to_string(),
            BTreeMap::new(),
            vec![record("BR112017027822", Some((2018, 7, 3)))],
            audit_report,
            EnrichmentStats::default(),
            0.0,
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["patentsByCountry"]["BR"][0]["publicationDate"], "2018-07-03");
        assert_eq!(json["auditReport"]["qualityRating"], "N/A");
        assert_eq!(json["auditReport"]["status"], "NO_BENCHMARK");
        assert!(json["patentsByCountry"]["BR"][0]["abstract"].is_null());
    }
}
