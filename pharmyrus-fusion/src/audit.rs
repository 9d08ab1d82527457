//! Audit Engine
//!
//! Scores a run's final record set against an external benchmark.
//!
//! # Benchmarks
//! Benchmarks are loaded once at startup from a TOML file and reached
//! only through the `BenchmarkLookup` trait:
//!
//! ```toml
//! [[benchmark]]
//! molecule = "darolutamide"
//! country = "BR"
//! expected = ["BR112017027822", "BR112018076865"]
//! expected_wo = 174
//! ```
//!
//! A molecule without a benchmark (or with an empty expected list) gets a
//! `NO_BENCHMARK` report carrying raw counts only.

use crate::normalizer::normalize;
use crate::types::{Country, PatentRecord, SearchStrategy, StrategyStatus};
use pharmyrus_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tracing::{info, warn};

/// Expected result set for one molecule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Benchmark {
    pub molecule: String,
    /// Office the expected identifiers belong to
    #[serde(default = "default_benchmark_country")]
    pub country: Country,
    #[serde(default)]
    pub expected: Vec<String>,
    /// Expected number of international (WO) family roots
    #[serde(default)]
    pub expected_wo: Option<usize>,
}

fn default_benchmark_country() -> Country {
    Country::Br
}

/// Read-only benchmark source injected into the engine
pub trait BenchmarkLookup: Send + Sync {
    fn lookup(&self, molecule: &str) -> Option<Benchmark>;
}

/// Benchmarks keyed by lower-cased molecule name
#[derive(Debug, Clone, Default)]
pub struct BenchmarkTable {
    entries: HashMap<String, Benchmark>,
}

#[derive(Debug, Deserialize)]
struct BenchmarkFile {
    #[serde(default)]
    benchmark: Vec<Benchmark>,
}

impl BenchmarkTable {
    pub fn from_entries(entries: impl IntoIterator<Item = Benchmark>) -> Self {
        let entries = entries
            .into_iter()
            .map(|b| (molecule_key(&b.molecule), b))
            .collect();
        Self { entries }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: BenchmarkFile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse benchmark TOML failed: {}", e)))?;
        Ok(Self::from_entries(file.benchmark))
    }

    /// Load the benchmark file named in configuration
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let table = Self::from_toml_str(&content)?;
        info!(
            path = %path.display(),
            molecules = table.len(),
            "Benchmarks loaded"
        );
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl BenchmarkLookup for BenchmarkTable {
    fn lookup(&self, molecule: &str) -> Option<Benchmark> {
        self.entries
            .get(&molecule_key(molecule))
            .filter(|b| !b.expected.is_empty())
            .cloned()
    }
}

fn molecule_key(molecule: &str) -> String {
    molecule.trim().to_lowercase()
}

/// Found vs expected size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComparisonStatus {
    Better,
    Equal,
    Worse,
    NoBenchmark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityRating {
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl QualityRating {
    /// HIGH: recall >= 90 and precision >= 80; MEDIUM: either >= 70; else LOW
    pub fn from_metrics(recall: f64, precision: f64) -> Self {
        if recall >= 90.0 && precision >= 80.0 {
            QualityRating::High
        } else if recall >= 70.0 || precision >= 70.0 {
            QualityRating::Medium
        } else {
            QualityRating::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCounts {
    pub expected: usize,
    pub found: usize,
    pub matched: usize,
    pub missing: usize,
    pub extra: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditMetrics {
    pub recall_percent: f64,
    pub precision_percent: f64,
    pub f1_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WoComparison {
    pub expected: usize,
    pub found: usize,
    pub difference: i64,
}

/// Strategy outcome as reported by the executor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyAttribution {
    pub name: String,
    pub status: StrategyStatus,
    pub patents_found: usize,
    pub contribution_to_recall: String,
}

/// Quality snapshot of one run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub molecule: String,
    pub has_benchmark: bool,
    pub status: ComparisonStatus,
    pub difference_percent: f64,
    pub quality_rating: QualityRating,
    /// Distinct identifiers found in the benchmark's office
    pub found_count: usize,
    pub found_wo_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<MatchCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<AuditMetrics>,
    pub matched: Vec<String>,
    pub missing: Vec<String>,
    pub extra: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wo_comparison: Option<WoComparison>,
    pub strategy_performance: BTreeMap<String, StrategyAttribution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Compare found identifiers with a benchmark
///
/// `found` holds identifiers from the benchmark's office; both sides go
/// through the same `normalize` used for deduplication.
pub fn audit(
    molecule: &str,
    benchmark: Option<&Benchmark>,
    found: &[String],
    found_wo: usize,
    strategies: &BTreeMap<String, SearchStrategy>,
    default_country: Country,
) -> AuditReport {
    let strategy_performance = attribution(strategies);

    let Some(benchmark) = benchmark.filter(|b| !b.expected.is_empty()) else {
        let found_count = normalized_set(found, default_country).len();
        return AuditReport {
            molecule: molecule.to_string(),
            has_benchmark: false,
            status: ComparisonStatus::NoBenchmark,
            difference_percent: 0.0,
            quality_rating: QualityRating::NotApplicable,
            found_count,
            found_wo_count: found_wo,
            counts: None,
            metrics: None,
            matched: Vec::new(),
            missing: Vec::new(),
            extra: Vec::new(),
            wo_comparison: None,
            strategy_performance,
            warning: Some(format!("No benchmark available for {}", molecule)),
        };
    };

    let expected = normalized_set(&benchmark.expected, benchmark.country);
    let found_set = normalized_set(found, benchmark.country);

    let matched: Vec<String> = expected.intersection(&found_set).cloned().collect();
    let missing: Vec<String> = expected.difference(&found_set).cloned().collect();
    let extra: Vec<String> = found_set.difference(&expected).cloned().collect();

    let total_expected = expected.len();
    let total_found = found_set.len();
    let recall = ratio_percent(matched.len(), total_expected);
    let precision = ratio_percent(matched.len(), total_found);
    let f1 = if recall + precision > 0.0 {
        2.0 * recall * precision / (recall + precision)
    } else {
        0.0
    };

    let (status, difference) = match total_found.cmp(&total_expected) {
        std::cmp::Ordering::Greater => (
            ComparisonStatus::Better,
            ratio_percent(total_found - total_expected, total_expected),
        ),
        std::cmp::Ordering::Equal => (ComparisonStatus::Equal, 0.0),
        std::cmp::Ordering::Less => (
            ComparisonStatus::Worse,
            -ratio_percent(total_expected - total_found, total_expected),
        ),
    };
    let quality_rating = QualityRating::from_metrics(recall, precision);

    info!(
        molecule = %molecule,
        recall = round2(recall),
        precision = round2(precision),
        rating = ?quality_rating,
        status = ?status,
        "Audit complete"
    );

    AuditReport {
        molecule: molecule.to_string(),
        has_benchmark: true,
        status,
        difference_percent: round2(difference),
        quality_rating,
        found_count: total_found,
        found_wo_count: found_wo,
        counts: Some(MatchCounts {
            expected: total_expected,
            found: total_found,
            matched: matched.len(),
            missing: missing.len(),
            extra: extra.len(),
        }),
        metrics: Some(AuditMetrics {
            recall_percent: round2(recall),
            precision_percent: round2(precision),
            f1_score: round2(f1),
        }),
        matched,
        missing,
        extra,
        wo_comparison: benchmark.expected_wo.map(|expected| WoComparison {
            expected,
            found: found_wo,
            difference: found_wo as i64 - expected as i64,
        }),
        strategy_performance,
        warning: None,
    }
}

/// Audit a final record set, looking up the molecule's benchmark
pub fn audit_records(
    molecule: &str,
    lookup: &dyn BenchmarkLookup,
    records: &[PatentRecord],
    strategies: &BTreeMap<String, SearchStrategy>,
    default_country: Country,
) -> AuditReport {
    let benchmark = lookup.lookup(molecule);
    if benchmark.is_none() {
        warn!(molecule = %molecule, "No benchmark available");
    }
    let office = benchmark.as_ref().map_or(default_country, |b| b.country);
    let found: Vec<String> = records
        .iter()
        .filter(|r| r.country == office)
        .map(|r| r.number.clone())
        .collect();
    let found_wo = records.iter().filter(|r| r.country == Country::Wo).count();

    audit(molecule, benchmark.as_ref(), &found, found_wo, strategies, default_country)
}

fn attribution(strategies: &BTreeMap<String, SearchStrategy>) -> BTreeMap<String, StrategyAttribution> {
    strategies
        .iter()
        .map(|(id, s)| {
            (
                id.clone(),
                StrategyAttribution {
                    name: s.name.clone(),
                    status: s.status,
                    patents_found: s.patents_found,
                    contribution_to_recall: "N/A".to_string(),
                },
            )
        })
        .collect()
}

fn normalized_set(ids: &[String], default_country: Country) -> BTreeSet<String> {
    ids.iter()
        .map(|id| normalize(id, default_country))
        .filter(|id| !id.is_empty())
        .collect()
}

fn ratio_percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn benchmark(expected: &[&str]) -> Benchmark {
        Benchmark {
            molecule: "darolutamide".to_string(),
            country: Country::Br,
            expected: ids(expected),
            expected_wo: None,
        }
    }

    #[test]
    fn test_partial_overlap_metrics() {
        let bench = benchmark(&["BR112017027822", "BR112018076865", "BR112019014776"]);
        let found = ids(&["BR-112017027822", "br 112018076865", "BR112020008364"]);

        let report = audit("darolutamide", Some(&bench), &found, 0, &BTreeMap::new(), Country::Br);

        let metrics = report.metrics.unwrap();
        assert_eq!(metrics.recall_percent, 66.67);
        assert_eq!(metrics.precision_percent, 66.67);
        assert_eq!(metrics.f1_score, 66.67);
        assert_eq!(report.matched, vec!["BR112017027822", "BR112018076865"]);
        assert_eq!(report.missing, vec!["BR112019014776"]);
        assert_eq!(report.extra, vec!["BR112020008364"]);
        assert_eq!(report.status, ComparisonStatus::Equal);
        assert_eq!(report.quality_rating, QualityRating::Medium);
    }

    #[test]
    fn test_no_benchmark_report() {
        let table = BenchmarkTable::default();
        let report = audit_records("unknownol", &table, &[], &BTreeMap::new(), Country::Br);

        assert!(!report.has_benchmark);
        assert_eq!(report.status, ComparisonStatus::NoBenchmark);
        assert_eq!(report.quality_rating, QualityRating::NotApplicable);
        assert!(report.metrics.is_none());
        assert!(report.counts.is_none());
    }

    #[test]
    fn test_empty_expected_counts_as_no_benchmark() {
        let table = BenchmarkTable::from_entries(vec![benchmark(&[])]);
        assert!(table.lookup("darolutamide").is_none());
    }

    #[test]
    fn test_better_and_worse_difference() {
        let bench = benchmark(&["BR112017027822", "BR112018076865"]);

        let more = ids(&["BR112017027822", "BR112018076865", "BR112019014776"]);
        let report = audit("d", Some(&bench), &more, 0, &BTreeMap::new(), Country::Br);
        assert_eq!(report.status, ComparisonStatus::Better);
        assert_eq!(report.difference_percent, 50.0);

        let fewer = ids(&["BR112017027822"]);
        let report = audit("d", Some(&bench), &fewer, 0, &BTreeMap::new(), Country::Br);
        assert_eq!(report.status, ComparisonStatus::Worse);
        assert_eq!(report.difference_percent, -50.0);
    }

    #[test]
    fn test_quality_rating_thresholds() {
        assert_eq!(QualityRating::from_metrics(95.0, 85.0), QualityRating::High);
        assert_eq!(QualityRating::from_metrics(95.0, 50.0), QualityRating::Medium);
        assert_eq!(QualityRating::from_metrics(10.0, 70.0), QualityRating::Medium);
        assert_eq!(QualityRating::from_metrics(69.9, 69.9), QualityRating::Low);
    }

    #[test]
    fn test_zero_found_has_zero_metrics() {
        let bench = benchmark(&["BR112017027822"]);
        let report = audit("d", Some(&bench), &[], 0, &BTreeMap::new(), Country::Br);
        let metrics = report.metrics.unwrap();
        assert_eq!(metrics.precision_percent, 0.0);
        assert_eq!(metrics.f1_score, 0.0);
        assert_eq!(report.quality_rating, QualityRating::Low);
    }

    #[test]
    fn test_wo_comparison_and_attribution() {
        let mut bench = benchmark(&["BR112017027822"]);
        bench.expected_wo = Some(174);
        let mut strategies = BTreeMap::new();
        let mut s = SearchStrategy::new("formulations", "Formulations", Vec::new());
        s.succeed(4, 8, 0).unwrap();
        strategies.insert(s.id.clone(), s);

        let report = audit("d", Some(&bench), &ids(&["BR112017027822"]), 170, &strategies, Country::Br);

        assert_eq!(report.wo_comparison.unwrap().difference, -4);
        let attribution = &report.strategy_performance["formulations"];
        assert_eq!(attribution.patents_found, 4);
        assert_eq!(attribution.contribution_to_recall, "N/A");
    }

    #[test]
    fn test_table_from_toml() {
        let table = BenchmarkTable::from_toml_str(
            r#"
            [[benchmark]]
            molecule = "Darolutamide"
            expected = ["BR112017027822", "BR112018076865"]
            expected_wo = 174
            "#,
        )
        .unwrap();
        let found = table.lookup("  DAROLUTAMIDE ").unwrap();
        assert_eq!(found.country, Country::Br);
        assert_eq!(found.expected.len(), 2);
        assert!(BenchmarkTable::from_toml_str("[[benchmark]]\nmolecule = 3").is_err());
    }

    #[test]
    fn test_table_loads_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            b"[[benchmark]]\nmolecule = \"darolutamide\"\ncountry = \"BR\"\nexpected = [\"BR112017027822\"]\n",
        )
        .unwrap();

        let table = BenchmarkTable::load(file.path()).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup("darolutamide").unwrap().expected, ids(&["BR112017027822"]));

        let missing = file.path().with_extension("absent");
        assert!(matches!(BenchmarkTable::load(&missing), Err(Error::Io(_))));
    }
}
