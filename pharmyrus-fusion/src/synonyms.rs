//! Query expansion from chemical synonyms
//!
//! A molecule is filed under its INN, its development codes ("ODM-201",
//! "BAY 1841788") and its chemical registry number. When the request does
//! not already carry those, the synonym resolver fills them in.

use crate::sources::SynonymSource;
use crate::types::{SearchRequest, SourceError};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Upper bound on development codes searched per run
pub const MAX_DEV_CODES: usize = 10;

static DEV_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{2,5}[- ]?\d{3,7}[A-Z]?$").expect("dev code pattern is valid"));

static REGISTRY_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2,7}-\d{2}-\d$").expect("registry number pattern is valid"));

/// Development codes and registry number found among synonyms
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynonymSummary {
    pub dev_codes: Vec<String>,
    pub cas_number: Option<String>,
}

/// Pick development codes (first `MAX_DEV_CODES`, deduplicated) and the first registry number
pub fn classify_synonyms(synonyms: &[String]) -> SynonymSummary {
    let mut summary = SynonymSummary::default();
    for synonym in synonyms.iter().map(|s| s.trim()) {
        if DEV_CODE.is_match(synonym) {
            if summary.dev_codes.len() < MAX_DEV_CODES
                && !summary.dev_codes.iter().any(|c| c.eq_ignore_ascii_case(synonym))
            {
                summary.dev_codes.push(synonym.to_string());
            }
        } else if summary.cas_number.is_none() && REGISTRY_NUMBER.is_match(synonym) {
            summary.cas_number = Some(synonym.to_string());
        }
    }
    summary
}

/// Fill development codes and registry number from the resolver
///
/// Fields the caller provided are kept as-is. Any lookup error, cancellation
/// included, is logged and leaves the request unchanged.
pub async fn expand_request(
    request: SearchRequest,
    resolver: &dyn SynonymSource,
    cancel: &CancellationToken,
) -> SearchRequest {
    if !request.dev_codes.is_empty() && request.cas_number.is_some() {
        return request;
    }

    let timeout = resolver.call_timeout();
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SourceError::Cancelled),
        result = tokio::time::timeout(timeout, resolver.resolve(&request.molecule)) => {
            result.unwrap_or_else(|_| Err(SourceError::Timeout(timeout)))
        }
    };
    let synonyms = match result {
        Ok(synonyms) => synonyms,
        Err(e) => {
            warn!(molecule = %request.molecule, error = %e, "Synonym lookup failed, continuing without");
            return request;
        }
    };

    let summary = classify_synonyms(&synonyms);
    debug!(
        molecule = %request.molecule,
        dev_codes = summary.dev_codes.len(),
        cas = ?summary.cas_number,
        "Synonyms resolved"
    );

    let mut expanded = request;
    if expanded.dev_codes.is_empty() {
        expanded.dev_codes = summary.dev_codes;
    }
    if expanded.cas_number.is_none() {
        expanded.cas_number = summary.cas_number;
    }
    expanded
}
