//! Core Types for the Patent Fusion Engine
//!
//! Defines the record schema every upstream payload is reduced to, the
//! search strategy lifecycle, the inbound request, and the per-layer error
//! taxonomy:
//! - **SourceError:** one upstream call failed (call-local or fatal)
//! - **ExtractionError:** one raw record could not be turned into a record
//! - **StrategyError:** illegal strategy lifecycle transition
//!
//! Configuration errors (e.g. an empty molecule name) use
//! `pharmyrus_common::Error` and are the only errors that abort a run.

use crate::normalizer;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Abstracts scraped from web pages can be arbitrarily long
pub const MAX_ABSTRACT_CHARS: usize = 3000;

/// Cap for applicants, inventors and classification codes
pub const MAX_LIST_ENTRIES: usize = 10;

// ============================================================================
// Countries
// ============================================================================

/// Supported patent office / country codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Country {
    Br,
    Us,
    Ep,
    Wo,
    Jp,
    Cn,
    Kr,
    In,
    Mx,
    Ar,
    Ca,
    Au,
    Cl,
    Co,
    Pe,
    Za,
    Ru,
    Il,
}

impl Country {
    pub const ALL: [Country; 18] = [
        Country::Br,
        Country::Us,
        Country::Ep,
        Country::Wo,
        Country::Jp,
        Country::Cn,
        Country::Kr,
        Country::In,
        Country::Mx,
        Country::Ar,
        Country::Ca,
        Country::Au,
        Country::Cl,
        Country::Co,
        Country::Pe,
        Country::Za,
        Country::Ru,
        Country::Il,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Country::Br => "BR",
            Country::Us => "US",
            Country::Ep => "EP",
            Country::Wo => "WO",
            Country::Jp => "JP",
            Country::Cn => "CN",
            Country::Kr => "KR",
            Country::In => "IN",
            Country::Mx => "MX",
            Country::Ar => "AR",
            Country::Ca => "CA",
            Country::Au => "AU",
            Country::Cl => "CL",
            Country::Co => "CO",
            Country::Pe => "PE",
            Country::Za => "ZA",
            Country::Ru => "RU",
            Country::Il => "IL",
        }
    }

    /// Country whose code prefixes `number`, if any
    pub fn from_prefix(number: &str) -> Option<Country> {
        number.get(..2).and_then(|prefix| prefix.parse().ok())
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Country {
    type Err = ExtractionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        Country::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(code))
            .ok_or_else(|| ExtractionError::UnsupportedCountry(code.to_string()))
    }
}

// ============================================================================
// Patent records
// ============================================================================

/// One patent document after extraction, merge and enrichment
///
/// Invariants (enforced by `from_partial` and `fill_missing`):
/// - `number` is non-empty and normalised
/// - `country` matches the number prefix
/// - no list exceeds `MAX_LIST_ENTRIES`, abstract never exceeds `MAX_ABSTRACT_CHARS`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatentRecord {
    pub number: String,
    pub country: Country,
    pub title: Option<String>,
    pub title_original: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub applicants: Vec<String>,
    pub inventors: Vec<String>,
    pub ipc_codes: Vec<String>,
    pub filing_date: Option<NaiveDate>,
    pub publication_date: Option<NaiveDate>,
    pub priority_date: Option<NaiveDate>,
    pub family_root: Option<String>,
    pub provenance: BTreeSet<String>,
}

/// Bibliographic fields as pulled out of one payload, all optional
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialRecord {
    /// Raw identifier as found in the payload (not yet canonical)
    pub number: Option<String>,
    pub title: Option<String>,
    pub title_original: Option<String>,
    pub abstract_text: Option<String>,
    pub applicants: Vec<String>,
    pub inventors: Vec<String>,
    pub ipc_codes: Vec<String>,
    pub filing_date: Option<NaiveDate>,
    pub publication_date: Option<NaiveDate>,
    pub priority_date: Option<NaiveDate>,
    pub family_root: Option<String>,
}

impl PatentRecord {
    /// Build a record from extracted fields
    ///
    /// # Errors
    /// - `MissingNumber` when no identifier survives canonicalisation
    /// - `UnsupportedCountry` when the identifier prefix is outside the supported set
    pub fn from_partial(
        partial: PartialRecord,
        default_country: Country,
        provenance: &str,
    ) -> Result<Self, ExtractionError> {
        let raw_number = partial.number.as_deref().unwrap_or_default();
        if let Some(prefix) = normalizer::unsupported_prefix(raw_number) {
            return Err(ExtractionError::UnsupportedCountry(prefix));
        }
        let number = normalizer::canonical_number(raw_number, default_country);
        if number.is_empty() {
            return Err(ExtractionError::MissingNumber);
        }
        let country = Country::from_prefix(&number)
            .ok_or_else(|| ExtractionError::UnsupportedCountry(number.clone()))?;

        let family_root = partial
            .family_root
            .as_deref()
            .map(|root| normalizer::canonical_number(root, Country::Wo))
            .filter(|root| !root.is_empty());

        let mut record = Self {
            number,
            country,
            title: partial.title,
            title_original: partial.title_original,
            abstract_text: partial.abstract_text,
            applicants: partial.applicants,
            inventors: partial.inventors,
            ipc_codes: partial.ipc_codes,
            filing_date: partial.filing_date,
            publication_date: partial.publication_date,
            priority_date: partial.priority_date,
            family_root,
            provenance: BTreeSet::from([provenance.to_string()]),
        };
        record.enforce_caps();
        Ok(record)
    }

    /// Complete iff title, abstract, applicants, inventors and IPC codes are all present
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Names of the completeness fields that are still empty
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.title.is_none() {
            missing.push("title");
        }
        if self.abstract_text.is_none() {
            missing.push("abstract");
        }
        if self.applicants.is_empty() {
            missing.push("applicants");
        }
        if self.inventors.is_empty() {
            missing.push("inventors");
        }
        if self.ipc_codes.is_empty() {
            missing.push("ipcCodes");
        }
        missing
    }

    /// Number of populated optional fields (0-10), used to rank merge candidates
    pub fn completed_fields(&self) -> usize {
        [
            self.title.is_some(),
            self.title_original.is_some(),
            self.abstract_text.is_some(),
            !self.applicants.is_empty(),
            !self.inventors.is_empty(),
            !self.ipc_codes.is_empty(),
            self.filing_date.is_some(),
            self.publication_date.is_some(),
            self.priority_date.is_some(),
            self.family_root.is_some(),
        ]
        .iter()
        .filter(|filled| **filled)
        .count()
    }

    /// Copy fields from `partial` into fields that are still empty
    ///
    /// Populated fields are never touched. Each field is assigned whole, so
    /// an interrupted enrichment never leaves a half-written value. When at
    /// least one field is filled, `source` joins the provenance set.
    ///
    /// Returns the names of the fields that were filled.
    pub fn fill_missing(&mut self, partial: &PartialRecord, source: &str) -> Vec<&'static str> {
        let mut filled = Vec::new();

        fill_option(&mut self.title, &partial.title, "title", &mut filled);
        fill_option(
            &mut self.title_original,
            &partial.title_original,
            "titleOriginal",
            &mut filled,
        );
        fill_option(
            &mut self.abstract_text,
            &partial.abstract_text,
            "abstract",
            &mut filled,
        );
        fill_list(&mut self.applicants, &partial.applicants, "applicants", &mut filled);
        fill_list(&mut self.inventors, &partial.inventors, "inventors", &mut filled);
        fill_list(&mut self.ipc_codes, &partial.ipc_codes, "ipcCodes", &mut filled);
        fill_option(
            &mut self.filing_date,
            &partial.filing_date,
            "filingDate",
            &mut filled,
        );
        fill_option(
            &mut self.publication_date,
            &partial.publication_date,
            "publicationDate",
            &mut filled,
        );
        fill_option(
            &mut self.priority_date,
            &partial.priority_date,
            "priorityDate",
            &mut filled,
        );
        if self.family_root.is_none() {
            if let Some(root) = partial
                .family_root
                .as_deref()
                .map(|root| normalizer::canonical_number(root, Country::Wo))
                .filter(|root| !root.is_empty())
            {
                self.family_root = Some(root);
                filled.push("familyRoot");
            }
        }

        if !filled.is_empty() {
            self.provenance.insert(source.to_string());
            self.enforce_caps();
        }
        filled
    }

    /// Truncate the abstract and dedupe/cap every list
    pub fn enforce_caps(&mut self) {
        if let Some(text) = self.abstract_text.as_mut() {
            if text.chars().count() > MAX_ABSTRACT_CHARS {
                *text = text.chars().take(MAX_ABSTRACT_CHARS).collect();
            }
        }
        self.applicants = capped_unique(std::mem::take(&mut self.applicants));
        self.inventors = capped_unique(std::mem::take(&mut self.inventors));
        self.ipc_codes = capped_unique(std::mem::take(&mut self.ipc_codes));
    }
}

fn fill_option<T: Clone>(
    target: &mut Option<T>,
    candidate: &Option<T>,
    name: &'static str,
    filled: &mut Vec<&'static str>,
) {
    if target.is_none() {
        if let Some(value) = candidate {
            *target = Some(value.clone());
            filled.push(name);
        }
    }
}

fn fill_list(
    target: &mut Vec<String>,
    candidate: &[String],
    name: &'static str,
    filled: &mut Vec<&'static str>,
) {
    if target.is_empty() && !candidate.is_empty() {
        *target = candidate.to_vec();
        filled.push(name);
    }
}

/// Trim, drop blanks, dedupe case-insensitively (first spelling wins), cap
pub fn capped_unique(values: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .filter(|v| seen.insert(v.to_lowercase()))
        .take(MAX_LIST_ENTRIES)
        .collect()
}

// ============================================================================
// Raw upstream data
// ============================================================================

/// Upstream source families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    NationalOffice,
    Registry,
    SearchEngine,
    FullText,
    Synonyms,
}

impl SourceKind {
    /// Provenance label recorded on records this source contributes to
    pub fn label(self) -> &'static str {
        match self {
            SourceKind::NationalOffice => "national_office",
            SourceKind::Registry => "registry",
            SourceKind::SearchEngine => "search_engine",
            SourceKind::FullText => "full_text",
            SourceKind::Synonyms => "synonyms",
        }
    }
}

/// Payload exactly as an upstream delivered it
#[derive(Debug, Clone)]
pub enum RawPayload {
    Json(serde_json::Value),
    Html(String),
}

/// One unprocessed upstream hit
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub source: SourceKind,
    /// Label of the query that produced this hit
    pub query_label: String,
    pub payload: RawPayload,
}

impl RawRecord {
    pub fn json(source: SourceKind, query_label: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            source,
            query_label: query_label.into(),
            payload: RawPayload::Json(payload),
        }
    }
}

// ============================================================================
// Search strategies
// ============================================================================

/// Which part of a document a query term targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryField {
    TitleAndAbstract,
    Applicant,
    Classification,
    Number,
}

/// One query of a strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDescriptor {
    pub term: String,
    pub label: String,
    pub field: QueryField,
    /// Restrict results to one office (search engine only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<Country>,
}

impl QueryDescriptor {
    pub fn new(term: impl Into<String>, label: impl Into<String>, field: QueryField) -> Self {
        Self {
            term: term.into(),
            label: label.into(),
            field,
            country: None,
        }
    }

    pub fn in_country(mut self, country: Country) -> Self {
        self.country = Some(country);
        self
    }
}

/// Strategy lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyStatus {
    Pending,
    Success,
    Failed,
    Skipped,
}

impl fmt::Display for StrategyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StrategyStatus::Pending => "pending",
            StrategyStatus::Success => "success",
            StrategyStatus::Failed => "failed",
            StrategyStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// One independent query plan and its outcome
///
/// Created `Pending`; transitions exactly once to a terminal state.
/// `error` is present iff the status is `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStrategy {
    pub id: String,
    pub name: String,
    pub status: StrategyStatus,
    pub queries: Vec<QueryDescriptor>,
    pub patents_found: usize,
    pub queries_executed: usize,
    pub queries_failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl SearchStrategy {
    pub fn new(id: impl Into<String>, name: impl Into<String>, queries: Vec<QueryDescriptor>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: StrategyStatus::Pending,
            queries,
            patents_found: 0,
            queries_executed: 0,
            queries_failed: 0,
            error: None,
            skip_reason: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != StrategyStatus::Pending
    }

    pub fn succeed(
        &mut self,
        patents_found: usize,
        queries_executed: usize,
        queries_failed: usize,
    ) -> Result<(), StrategyError> {
        self.ensure_pending(StrategyStatus::Success)?;
        self.status = StrategyStatus::Success;
        self.patents_found = patents_found;
        self.queries_executed = queries_executed;
        self.queries_failed = queries_failed;
        Ok(())
    }

    /// Mark failed; any records the strategy collected are discarded by the caller
    pub fn fail(
        &mut self,
        error: impl Into<String>,
        queries_executed: usize,
        queries_failed: usize,
    ) -> Result<(), StrategyError> {
        self.ensure_pending(StrategyStatus::Failed)?;
        self.status = StrategyStatus::Failed;
        self.error = Some(error.into());
        self.patents_found = 0;
        self.queries_executed = queries_executed;
        self.queries_failed = queries_failed;
        Ok(())
    }

    pub fn skip(&mut self, reason: impl Into<String>) -> Result<(), StrategyError> {
        self.ensure_pending(StrategyStatus::Skipped)?;
        self.status = StrategyStatus::Skipped;
        self.skip_reason = Some(reason.into());
        self.patents_found = 0;
        Ok(())
    }

    fn ensure_pending(&self, to: StrategyStatus) -> Result<(), StrategyError> {
        if self.is_terminal() {
            return Err(StrategyError::AlreadyFinished {
                id: self.id.clone(),
                from: self.status,
                to,
            });
        }
        Ok(())
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Recognised request options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchOptions {
    /// Also query the international registry and keep WO family roots
    pub include_secondary_registry: bool,
    /// Per-strategy record cap (engine default when absent)
    pub max_results: Option<usize>,
    /// Return a task handle instead of waiting for the report
    pub async_mode: bool,
}

/// Inbound search request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchRequest {
    pub molecule: String,
    pub brand_name: Option<String>,
    pub dev_codes: Vec<String>,
    pub cas_number: Option<String>,
    /// Known assignees; drives the applicant strategy
    pub applicants: Vec<String>,
    pub target_countries: Vec<String>,
    pub options: SearchOptions,
}

impl SearchRequest {
    pub fn for_molecule(molecule: impl Into<String>) -> Self {
        Self {
            molecule: molecule.into(),
            ..Default::default()
        }
    }

    /// Reject requests that must never reach the network
    pub fn validate(&self) -> pharmyrus_common::Result<()> {
        if self.molecule.trim().is_empty() {
            return Err(pharmyrus_common::Error::InvalidInput(
                "molecule name is required".to_string(),
            ));
        }
        if self.options.max_results == Some(0) {
            return Err(pharmyrus_common::Error::InvalidInput(
                "maxResults must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Recognised target countries in request order, deduplicated
    ///
    /// Falls back to `default_country` when the list is empty or nothing in it is recognised.
    pub fn resolved_targets(&self, default_country: Country) -> Vec<Country> {
        let mut targets: Vec<Country> = Vec::new();
        for code in &self.target_countries {
            match code.parse::<Country>() {
                Ok(country) if !targets.contains(&country) => targets.push(country),
                Ok(_) => {}
                Err(_) => tracing::warn!(country = %code, "Ignoring unrecognised target country"),
            }
        }
        if targets.is_empty() {
            targets.push(default_country);
        }
        targets
    }
}

// ============================================================================
// Errors
// ============================================================================

/// One upstream call failed
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    /// Call exceeded its timeout
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// Transport-level failure (DNS, connection reset, TLS)
    #[error("network error: {0}")]
    Network(String),

    /// Upstream answered with a non-success HTTP status
    #[error("upstream returned HTTP {0}")]
    Status(u16),

    /// Response body could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// Source cannot serve this run at all
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// Run was cancelled while the call was in flight
    #[error("cancelled")]
    Cancelled,
}

impl SourceError {
    /// True when the failure concerns only this call; the strategy continues
    pub fn is_call_local(&self) -> bool {
        matches!(
            self,
            SourceError::Timeout(_)
                | SourceError::Network(_)
                | SourceError::Status(_)
                | SourceError::Decode(_)
        )
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SourceError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            SourceError::Status(status.as_u16())
        } else {
            SourceError::Network(e.to_string())
        }
    }
}

/// One raw record could not be turned into a `PatentRecord`
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExtractionError {
    /// Top-level payload has the wrong structure
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// No usable patent identifier in the payload
    #[error("payload carries no patent number")]
    MissingNumber,

    /// Identifier or code outside the supported country set
    #[error("unsupported country: {0}")]
    UnsupportedCountry(String),
}

/// Illegal strategy lifecycle transition
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StrategyError {
    #[error("strategy {id} already finished as {from}, cannot become {to}")]
    AlreadyFinished {
        id: String,
        from: StrategyStatus,
        to: StrategyStatus,
    },
}
