//! Enrichment Cascade
//!
//! Backfills missing fields of incomplete records from secondary sources,
//! consulted in configured order. The cascade:
//! - never overwrites a populated field (`PatentRecord::fill_missing`)
//! - stops per record as soon as it is complete
//! - short-circuits complete records before any network access
//! - treats every failed call as "no data" for that source and record

use crate::normalizer;
use crate::sources::SecondarySource;
use crate::types::{PartialRecord, PatentRecord, SourceError};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Counters reported after a cascade pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentStats {
    /// Records that were incomplete on entry
    pub attempted: usize,
    /// Of those, records complete on exit
    pub completed: usize,
    /// Secondary-source calls that failed
    pub failures: usize,
}

pub struct EnrichmentCascade {
    sources: Vec<Arc<dyn SecondarySource>>,
}

impl EnrichmentCascade {
    pub fn new(sources: Vec<Arc<dyn SecondarySource>>) -> Self {
        Self { sources }
    }

    /// Source labels in the order they are consulted
    pub fn order(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.label()).collect()
    }

    /// Enrich one record; complete records come back untouched
    pub async fn enrich(&self, mut record: PatentRecord) -> PatentRecord {
        self.enrich_in_place(&mut record, &CancellationToken::new()).await;
        record
    }

    /// Enrich every record in identifier order
    ///
    /// Cancellation is honoured between calls; fields already filled stay filled.
    pub async fn enrich_all(&self, records: &mut [PatentRecord], cancel: &CancellationToken) -> EnrichmentStats {
        records.sort_by(|a, b| a.number.cmp(&b.number));

        let mut stats = EnrichmentStats::default();
        for record in records.iter_mut() {
            if cancel.is_cancelled() {
                info!("Enrichment cancelled, remaining records left as merged");
                break;
            }
            if record.is_complete() {
                continue;
            }
            stats.attempted += 1;
            stats.failures += self.enrich_in_place(record, cancel).await;
            if record.is_complete() {
                stats.completed += 1;
            }
        }

        info!(
            attempted = stats.attempted,
            completed = stats.completed,
            failures = stats.failures,
            "Enrichment finished"
        );
        stats
    }

    /// Returns the number of failed source calls
    async fn enrich_in_place(&self, record: &mut PatentRecord, cancel: &CancellationToken) -> usize {
        let mut failures = 0;
        for source in &self.sources {
            if record.is_complete() || cancel.is_cancelled() {
                break;
            }

            let timeout = source.call_timeout();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(SourceError::Cancelled),
                result = tokio::time::timeout(timeout, source.fetch_supplemental_fields(&record.number)) => {
                    result.unwrap_or_else(|_| Err(SourceError::Timeout(timeout)))
                }
            };

            match result {
                Ok(partial) => {
                    if !describes(&partial, record) {
                        warn!(
                            number = %record.number,
                            source = %source.label(),
                            "Secondary source answered for another document, ignoring"
                        );
                        continue;
                    }
                    let filled = record.fill_missing(&partial, source.label());
                    debug!(number = %record.number, source = %source.label(), ?filled, "Enrichment step");
                }
                Err(SourceError::Cancelled) => break,
                Err(e) => {
                    failures += 1;
                    warn!(number = %record.number, source = %source.label(), error = %e, "Enrichment call failed");
                }
            }
        }
        failures
    }
}

/// A partial without an identifier is trusted; one with an identifier must match
fn describes(partial: &PartialRecord, record: &PatentRecord) -> bool {
    match partial.number.as_deref() {
        None => true,
        Some(raw) => normalizer::canonical_number(raw, record.country) == record.number,
    }
}
