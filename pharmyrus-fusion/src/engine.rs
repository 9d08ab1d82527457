//! Fusion engine orchestration
//!
//! One `run` takes a request through the whole pipeline:
//!
//! validate -> expand synonyms -> plan -> execute -> merge -> country
//! filter -> enrich -> audit -> report
//!
//! Only request validation can fail a run. Every per-strategy,
//! per-record and per-call failure ends up as status in the report.

use crate::audit::{audit_records, BenchmarkLookup, BenchmarkTable};
use crate::enrichment::EnrichmentCascade;
use crate::executor::{ExecutorSettings, StrategyExecutor};
use crate::merger::merge;
use crate::report::SearchReport;
use crate::sources::{LiveSources, SourceSet, SynonymSource};
use crate::strategies::plan_strategies;
use crate::synonyms::expand_request;
use crate::types::{Country, SearchRequest};
use chrono::NaiveDate;
use pharmyrus_common::config::{SearchConfig, TomlConfig};
use pharmyrus_common::{Error, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Receives coarse progress updates during a run
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: u8, step: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(u8, &str) + Send + Sync,
{
    fn report(&self, percent: u8, step: &str) {
        self(percent, step)
    }
}

/// Progress sink that discards updates
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _percent: u8, _step: &str) {}
}

/// Engine tuning derived from the `[search]` config section
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub default_country: Country,
    pub inter_query_delay: Duration,
    pub max_results: usize,
    pub recent_filing_cutoff: NaiveDate,
}

impl EngineSettings {
    pub fn from_config(search: &SearchConfig) -> Result<Self> {
        let default_country = search
            .default_country
            .parse::<Country>()
            .map_err(|e| Error::Config(format!("search.default_country: {}", e)))?;
        Ok(Self {
            default_country,
            inter_query_delay: Duration::from_millis(search.inter_query_delay_ms),
            max_results: search.max_results,
            recent_filing_cutoff: search.recent_filing_cutoff,
        })
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_country: Country::Br,
            inter_query_delay: Duration::from_millis(500),
            max_results: 100,
            recent_filing_cutoff: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or_default(),
        }
    }
}

pub struct FusionEngine {
    settings: EngineSettings,
    sources: SourceSet,
    synonyms: Option<Arc<dyn SynonymSource>>,
    cascade: EnrichmentCascade,
    benchmarks: Arc<dyn BenchmarkLookup>,
}

impl FusionEngine {
    pub fn new(
        settings: EngineSettings,
        sources: SourceSet,
        cascade: EnrichmentCascade,
        benchmarks: Arc<dyn BenchmarkLookup>,
    ) -> Self {
        Self {
            settings,
            sources,
            synonyms: None,
            cascade,
            benchmarks,
        }
    }

    pub fn with_synonyms(mut self, synonyms: Arc<dyn SynonymSource>) -> Self {
        self.synonyms = Some(synonyms);
        self
    }

    /// Engine wired to the live upstream clients
    pub fn from_config(config: &TomlConfig) -> Result<Self> {
        let settings = EngineSettings::from_config(&config.search)?;
        let live = LiveSources::from_config(config)?;

        let benchmarks: Arc<dyn BenchmarkLookup> = match &config.audit.benchmark_file {
            Some(path) => Arc::new(BenchmarkTable::load(path)?),
            None => {
                warn!("No benchmark file configured, every audit will report NO_BENCHMARK");
                Arc::new(BenchmarkTable::default())
            }
        };

        Ok(Self::new(
            settings,
            live.primary,
            EnrichmentCascade::new(live.secondary),
            benchmarks,
        )
        .with_synonyms(live.synonyms))
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn enrichment_order(&self) -> Vec<&str> {
        self.cascade.order()
    }

    /// Run one search to completion
    ///
    /// # Errors
    /// `Error::InvalidInput` for a request that fails validation; nothing
    /// is sent upstream in that case.
    pub async fn run(
        &self,
        request: SearchRequest,
        progress: &dyn ProgressSink,
        cancel: CancellationToken,
    ) -> Result<SearchReport> {
        let started = Instant::now();
        request.validate()?;
        progress.report(0, "Validating request");

        let default_country = self.settings.default_country;
        let targets = request.resolved_targets(default_country);
        let include_wo = request.options.include_secondary_registry;
        info!(molecule = %request.molecule, ?targets, include_wo, "Search started");

        progress.report(10, "Expanding synonyms");
        let request = match &self.synonyms {
            Some(resolver) => expand_request(request, resolver.as_ref(), &cancel).await,
            None => request,
        };

        progress.report(20, "Running search strategies");
        let plans = plan_strategies(
            &request,
            &targets,
            &self.sources,
            self.settings.recent_filing_cutoff,
        );
        let executor = StrategyExecutor::new(ExecutorSettings {
            inter_query_delay: self.settings.inter_query_delay,
            max_results: request.options.max_results.unwrap_or(self.settings.max_results),
            default_country,
        });
        let outcome = executor.execute_all(plans, &cancel).await;

        progress.report(60, "Merging records");
        let mut records: Vec<_> = merge(outcome.records, default_country)
            .into_iter()
            .filter(|r| targets.contains(&r.country) || (include_wo && r.country == Country::Wo))
            .collect();

        progress.report(70, "Enriching records");
        let enrichment = self.cascade.enrich_all(&mut records, &cancel).await;

        progress.report(90, "Auditing results");
        let audit_report = audit_records(
            &request.molecule,
            self.benchmarks.as_ref(),
            &records,
            &outcome.strategies,
            default_country,
        );

        let report = SearchReport::assemble(
            request.molecule,
            outcome.strategies,
            records,
            audit_report,
            enrichment,
            started.elapsed().as_secs_f64(),
        );
        progress.report(100, "Complete");

        info!(
            molecule = %report.molecule,
            total = report.summary.total_patents,
            failed_strategies = report.summary.strategies_failed,
            elapsed_seconds = report.elapsed_seconds,
            "Search finished"
        );
        Ok(report)
    }
}
