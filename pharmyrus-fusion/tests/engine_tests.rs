//! End-to-end engine runs against in-memory sources
//!
//! Covers the full pipeline: strategy execution, merge across sources,
//! country filtering, enrichment, audit and report ordering.

use async_trait::async_trait;
use pharmyrus_common::Error;
use pharmyrus_fusion::audit::{Benchmark, BenchmarkTable, ComparisonStatus};
use pharmyrus_fusion::engine::{EngineSettings, FusionEngine, NoProgress};
use pharmyrus_fusion::enrichment::EnrichmentCascade;
use pharmyrus_fusion::sources::{PatentSource, SecondarySource, SourceSet, SynonymSource};
use pharmyrus_fusion::types::{
    Country, PartialRecord, QueryDescriptor, RawRecord, SearchRequest, SourceError, SourceKind, StrategyStatus,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Returns the same hits for every query, or the same error
struct MockSource {
    kind: SourceKind,
    hits: Vec<Value>,
    error: Option<SourceError>,
    calls: AtomicUsize,
}

impl MockSource {
    fn hits(kind: SourceKind, hits: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            hits,
            error: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(kind: SourceKind, error: SourceError) -> Arc<Self> {
        Arc::new(Self {
            kind,
            hits: Vec::new(),
            error: Some(error),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl PatentSource for MockSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_secs(1)
    }

    async fn search(&self, query: &QueryDescriptor) -> Result<Vec<RawRecord>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        Ok(self
            .hits
            .iter()
            .map(|hit| RawRecord::json(self.kind, query.label.clone(), hit.clone()))
            .collect())
    }
}

/// Supplies inventors and classification for any number
struct MockRegistryBiblio {
    calls: AtomicUsize,
}

#[async_trait]
impl SecondarySource for MockRegistryBiblio {
    fn label(&self) -> &str {
        "registry"
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_secs(1)
    }

    async fn fetch_supplemental_fields(&self, _number: &str) -> Result<PartialRecord, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PartialRecord {
            inventors: vec!["Anna Schmidt".to_string()],
            ipc_codes: vec!["A61K 31/4166".to_string()],
            ..Default::default()
        })
    }
}

struct MockSynonyms;

#[async_trait]
impl SynonymSource for MockSynonyms {
    fn call_timeout(&self) -> Duration {
        Duration::from_secs(1)
    }

    async fn resolve(&self, _molecule: &str) -> Result<Vec<String>, SourceError> {
        Ok(vec![
            "Darolutamide".to_string(),
            "ODM-201".to_string(),
            "BAY-1841788".to_string(),
            "1297538-32-9".to_string(),
        ])
    }
}

fn national_office_hits() -> Vec<Value> {
    vec![
        json!({
            "publication_number": "BR112017027822",
            "title": "Crystalline form of darolutamide",
            "filing_date": "2016-06-15",
            "publication_date": "2018-07-03"
        }),
        json!({
            "publication_number": "BR 11 2018 076865",
            "title": "Pharmaceutical composition comprising darolutamide",
            "publication_date": "2019-05-14"
        }),
    ]
}

fn search_engine_hits() -> Vec<Value> {
    vec![
        json!({
            "publication_number": "BR112017027822A2",
            "abstract": "The invention relates to a crystalline form of darolutamide and processes for its preparation.",
            "assignee": "Orion Corporation"
        }),
        json!({
            "publication_number": "US10010530B2",
            "title": "Androgen receptor modulating compounds",
            "publication_date": "2018-07-03"
        }),
        json!({
            "publication_number": "JP2018123456A",
            "title": "Carboxamide derivatives"
        }),
    ]
}

fn registry_hits() -> Vec<Value> {
    vec![json!({
        "publication_number": "WO2016203052",
        "title": "Process for the preparation of androgen receptor antagonists"
    })]
}

fn settings() -> EngineSettings {
    EngineSettings {
        inter_query_delay: Duration::ZERO,
        ..EngineSettings::default()
    }
}

fn benchmarks() -> Arc<BenchmarkTable> {
    Arc::new(BenchmarkTable::from_entries(vec![Benchmark {
        molecule: "darolutamide".to_string(),
        country: Country::Br,
        expected: vec![
            "BR112017027822".to_string(),
            "BR112018076865".to_string(),
            "BR112019014776".to_string(),
        ],
        expected_wo: Some(1),
    }]))
}

fn live_like_sources() -> SourceSet {
    SourceSet {
        national_office: Some(MockSource::hits(SourceKind::NationalOffice, national_office_hits())),
        registry: Some(MockSource::hits(SourceKind::Registry, registry_hits())),
        search_engine: Some(MockSource::hits(SourceKind::SearchEngine, search_engine_hits())),
    }
}

fn request() -> SearchRequest {
    let mut request = SearchRequest::for_molecule("darolutamide");
    request.brand_name = Some("Nubeqa".to_string());
    request.target_countries = vec!["BR".to_string(), "US".to_string()];
    request
}

#[tokio::test]
async fn test_full_run_merges_filters_and_audits() {
    let biblio = Arc::new(MockRegistryBiblio {
        calls: AtomicUsize::new(0),
    });
    let engine = FusionEngine::new(
        settings(),
        live_like_sources(),
        EnrichmentCascade::new(vec![biblio.clone() as Arc<dyn SecondarySource>]),
        benchmarks(),
    )
    .with_synonyms(Arc::new(MockSynonyms));

    let report = engine
        .run(request(), &NoProgress, CancellationToken::new())
        .await
        .unwrap();

    // JP is not targeted and WO was not requested
    assert_eq!(report.summary.total_patents, 3);
    assert!(!report.patents_by_country.contains_key(&Country::Jp));
    assert!(!report.patents_by_country.contains_key(&Country::Wo));

    let br = &report.patents_by_country[&Country::Br];
    let numbers: Vec<&str> = br.iter().map(|r| r.number.as_str()).collect();
    assert_eq!(numbers, vec!["BR112018076865", "BR112017027822"]);

    let merged = &br[1];
    assert!(merged.provenance.contains("national_office"));
    assert!(merged.provenance.contains("search_engine"));
    assert!(merged.provenance.contains("registry"));
    assert_eq!(merged.title.as_deref(), Some("Crystalline form of darolutamide"));
    assert_eq!(merged.applicants, vec!["Orion Corporation".to_string()]);
    assert!(merged.is_complete());

    assert_eq!(report.strategies["applicant"].status, StrategyStatus::Skipped);
    assert_eq!(report.strategies["international_registry"].status, StrategyStatus::Skipped);
    assert_eq!(report.strategies["textual_multi_term"].status, StrategyStatus::Success);
    assert_eq!(report.summary.enrichment.attempted, 3);
    assert_eq!(biblio.calls.load(Ordering::SeqCst), 3);

    let audit = &report.audit_report;
    assert!(audit.has_benchmark);
    assert_eq!(audit.status, ComparisonStatus::Worse);
    assert_eq!(audit.matched, vec!["BR112017027822".to_string(), "BR112018076865".to_string()]);
    assert_eq!(audit.missing, vec!["BR112019014776".to_string()]);
    assert_eq!(audit.wo_comparison.as_ref().map(|w| w.found), Some(0));
}

#[tokio::test]
async fn test_secondary_registry_keeps_wo_records() {
    let engine = FusionEngine::new(
        settings(),
        live_like_sources(),
        EnrichmentCascade::new(Vec::new()),
        benchmarks(),
    );
    let mut request = request();
    request.options.include_secondary_registry = true;

    let report = engine.run(request, &NoProgress, CancellationToken::new()).await.unwrap();

    assert_eq!(report.strategies["international_registry"].status, StrategyStatus::Success);
    let wo = &report.patents_by_country[&Country::Wo];
    assert_eq!(wo[0].number, "WO2016203052");
    assert_eq!(report.audit_report.found_wo_count, 1);
}

#[tokio::test]
async fn test_every_source_down_still_reports() {
    let down = SourceSet {
        national_office: Some(MockSource::failing(SourceKind::NationalOffice, SourceError::Status(503))),
        registry: None,
        search_engine: Some(MockSource::failing(
            SourceKind::SearchEngine,
            SourceError::Network("connection refused".to_string()),
        )),
    };
    let engine = FusionEngine::new(settings(), down, EnrichmentCascade::new(Vec::new()), benchmarks());

    let report = engine.run(request(), &NoProgress, CancellationToken::new()).await.unwrap();

    assert_eq!(report.summary.total_patents, 0);
    assert!(report.summary.strategies_failed >= 1);
    assert_eq!(report.summary.strategies_succeeded, 0);
    for strategy in report.strategies.values() {
        assert!(strategy.is_terminal());
        if strategy.status == StrategyStatus::Failed {
            assert!(strategy.error.is_some());
        }
    }
    assert_eq!(report.audit_report.status, ComparisonStatus::Worse);
}

#[tokio::test]
async fn test_empty_molecule_never_reaches_sources() {
    let national_office = MockSource::hits(SourceKind::NationalOffice, national_office_hits());
    let sources = SourceSet {
        national_office: Some(national_office.clone()),
        ..SourceSet::default()
    };
    let engine = FusionEngine::new(settings(), sources, EnrichmentCascade::new(Vec::new()), benchmarks());

    let result = engine
        .run(SearchRequest::for_molecule("   "), &NoProgress, CancellationToken::new())
        .await;

    assert!(matches!(result, Err(Error::InvalidInput(_))));
    assert_eq!(national_office.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_progress_reported_in_order() {
    let engine = FusionEngine::new(
        settings(),
        live_like_sources(),
        EnrichmentCascade::new(Vec::new()),
        benchmarks(),
    );
    let seen = Mutex::new(Vec::new());
    let sink = |percent: u8, _step: &str| seen.lock().unwrap().push(percent);

    engine.run(request(), &sink, CancellationToken::new()).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![0, 10, 20, 60, 70, 90, 100]);
}

#[tokio::test]
async fn test_no_benchmark_molecule() {
    let engine = FusionEngine::new(
        settings(),
        live_like_sources(),
        EnrichmentCascade::new(Vec::new()),
        benchmarks(),
    );
    let mut request = request();
    request.molecule = "enzalutamide".to_string();

    let report = engine.run(request, &NoProgress, CancellationToken::new()).await.unwrap();

    assert!(!report.audit_report.has_benchmark);
    assert_eq!(report.audit_report.status, ComparisonStatus::NoBenchmark);
    assert!(report.audit_report.warning.is_some());
}
