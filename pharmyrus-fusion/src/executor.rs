//! Strategy Executor
//!
//! Runs every planned strategy concurrently with per-strategy failure
//! isolation. Each strategy is its own task, so a panicking source only
//! fails that strategy.
//!
//! Within a strategy, queries run sequentially with a fixed delay between
//! them. A call-local failure (timeout, transport, HTTP status, decode)
//! costs only that query; the strategy fails when every query failed, or
//! immediately on any other error, and its partial output is discarded.

use crate::extractors::extract_record;
use crate::strategies::{StrategyPlan, SKIP_SOURCE_NOT_CONFIGURED, SKIP_NO_QUERIES};
use crate::types::{Country, PatentRecord, SearchStrategy, SourceError};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Executor tuning shared by every strategy of a run
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub inter_query_delay: Duration,
    /// Per-strategy record cap
    pub max_results: usize,
    pub default_country: Country,
}

/// Everything the strategies produced
#[derive(Debug, Default)]
pub struct ExecutionOutcome {
    /// Extracted records of successful strategies, in plan order
    pub records: Vec<PatentRecord>,
    /// Terminal snapshot of every strategy
    pub strategies: BTreeMap<String, SearchStrategy>,
}

struct StrategyRun {
    strategy: SearchStrategy,
    records: Vec<PatentRecord>,
}

impl StrategyRun {
    fn empty(strategy: SearchStrategy) -> Self {
        Self {
            strategy,
            records: Vec::new(),
        }
    }
}

pub struct StrategyExecutor {
    settings: ExecutorSettings,
}

impl StrategyExecutor {
    pub fn new(settings: ExecutorSettings) -> Self {
        Self { settings }
    }

    /// Run all strategies; never fails as a whole
    ///
    /// Dropping the returned future cancels every strategy task it spawned.
    pub async fn execute_all(&self, plans: Vec<StrategyPlan>, cancel: &CancellationToken) -> ExecutionOutcome {
        let run_token = cancel.child_token();
        let _cancel_on_drop = run_token.clone().drop_guard();

        let (snapshots, handles): (Vec<SearchStrategy>, Vec<_>) = plans
            .into_iter()
            .map(|plan| {
                let snapshot = plan.strategy.clone();
                let handle = tokio::spawn(run_strategy(plan, self.settings.clone(), run_token.clone()));
                (snapshot, handle)
            })
            .unzip();

        let mut outcome = ExecutionOutcome::default();
        for (snapshot, joined) in snapshots.into_iter().zip(join_all(handles).await) {
            let run = match joined {
                Ok(run) => run,
                Err(e) => {
                    let mut strategy = snapshot;
                    warn!(strategy = %strategy.id, error = %e, "Strategy task aborted");
                    if let Err(transition) = strategy.fail(format!("strategy aborted: {}", e), 0, 0) {
                        warn!(error = %transition, "Aborted strategy was already finished");
                    }
                    StrategyRun::empty(strategy)
                }
            };
            outcome.records.extend(run.records);
            outcome.strategies.insert(run.strategy.id.clone(), run.strategy);
        }

        info!(
            strategies = outcome.strategies.len(),
            records = outcome.records.len(),
            "All strategies finished"
        );
        outcome
    }
}

async fn run_strategy(plan: StrategyPlan, settings: ExecutorSettings, cancel: CancellationToken) -> StrategyRun {
    let StrategyPlan {
        mut strategy,
        source,
        filter,
    } = plan;

    if strategy.is_terminal() {
        debug!(strategy = %strategy.id, status = %strategy.status, "Strategy settled at planning");
        return StrategyRun::empty(strategy);
    }
    let Some(source) = source else {
        finish(strategy.skip(SKIP_SOURCE_NOT_CONFIGURED), &strategy.id);
        return StrategyRun::empty(strategy);
    };
    if strategy.queries.is_empty() {
        finish(strategy.skip(SKIP_NO_QUERIES), &strategy.id);
        return StrategyRun::empty(strategy);
    }

    info!(strategy = %strategy.id, queries = strategy.queries.len(), source = %source.label(), "Strategy started");

    let queries = strategy.queries.clone();
    let timeout = source.call_timeout();
    let mut records = Vec::new();
    let mut executed = 0;
    let mut failed = 0;
    let mut last_error: Option<String> = None;

    for (idx, query) in queries.iter().enumerate() {
        if idx > 0 && !settings.inter_query_delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return abandon(strategy, SourceError::Cancelled, executed, failed);
                }
                _ = tokio::time::sleep(settings.inter_query_delay) => {}
            }
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SourceError::Cancelled),
            result = tokio::time::timeout(timeout, source.search(query)) => {
                result.unwrap_or_else(|_| Err(SourceError::Timeout(timeout)))
            }
        };
        executed += 1;

        match outcome {
            Ok(raws) => {
                let hits = raws.len();
                for raw in raws {
                    match extract_record(&raw, settings.default_country) {
                        Ok(record) if filter.accepts(&record) => records.push(record),
                        Ok(record) => {
                            debug!(strategy = %strategy.id, number = %record.number, "Record filtered out")
                        }
                        Err(e) => warn!(
                            strategy = %strategy.id,
                            query = %raw.query_label,
                            error = %e,
                            "Dropping unextractable record"
                        ),
                    }
                }
                debug!(strategy = %strategy.id, query = %query.label, hits, "Query complete");
            }
            Err(e) if e.is_call_local() => {
                failed += 1;
                warn!(strategy = %strategy.id, query = %query.label, error = %e, "Query failed");
                last_error = Some(e.to_string());
            }
            Err(e) => return abandon(strategy, e, executed, failed),
        }
    }

    if failed == executed {
        let error = last_error.unwrap_or_else(|| "all queries failed".to_string());
        warn!(strategy = %strategy.id, error = %error, "Strategy failed");
        finish(strategy.fail(error, executed, failed), &strategy.id);
        return StrategyRun::empty(strategy);
    }

    records.truncate(settings.max_results);
    finish(strategy.succeed(records.len(), executed, failed), &strategy.id);
    info!(
        strategy = %strategy.id,
        patents_found = records.len(),
        queries_failed = failed,
        "Strategy succeeded"
    );
    StrategyRun { strategy, records }
}

/// Fail the strategy on a non-local error, discarding its output
fn abandon(mut strategy: SearchStrategy, error: SourceError, executed: usize, failed: usize) -> StrategyRun {
    warn!(strategy = %strategy.id, error = %error, "Strategy abandoned");
    finish(strategy.fail(error.to_string(), executed, failed), &strategy.id);
    StrategyRun::empty(strategy)
}

fn finish(transition: Result<(), crate::types::StrategyError>, id: &str) {
    if let Err(e) = transition {
        warn!(strategy = %id, error = %e, "Illegal strategy transition");
    }
}
