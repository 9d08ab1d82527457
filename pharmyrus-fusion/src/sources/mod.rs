//! Upstream Sources
//!
//! Capability traits the engine is written against, plus the concrete
//! HTTP clients. Strategies and the enrichment cascade only see the
//! traits, so tests substitute in-memory sources.
//!
//! # Sources
//! 1. **national_office** - national-office crawler (BR filings)
//! 2. **registry** - international filing registry (search + per-number biblio)
//! 3. **search_engine** - public patent search engine (country-restricted queries)
//! 4. **full_text** - document pages (HTML)
//! 5. **synonyms** - chemical-synonym resolver
//!
//! # Rate limiting
//! Every client owns one `governor` limiter. A client used both as a
//! primary and a secondary source is shared through `Arc`, so strategies
//! and enrichment draw from the same budget.

pub mod full_text;
pub mod national_office;
pub mod registry;
pub mod search_engine;
pub mod synonyms;

pub use full_text::FullTextClient;
pub use national_office::NationalOfficeClient;
pub use registry::RegistryClient;
pub use search_engine::SearchEngineClient;
pub use synonyms::SynonymClient;

use crate::types::{PartialRecord, QueryDescriptor, RawRecord, SourceError, SourceKind};
use async_trait::async_trait;
use pharmyrus_common::config::{get_user_agent, SourceConfig, TomlConfig};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Direct (un-keyed) limiter, one per upstream
pub type SourceRateLimiter = governor::RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Search side of an upstream: query in, raw hits out
#[async_trait]
pub trait PatentSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    fn label(&self) -> &str {
        self.kind().label()
    }

    /// Upper bound the executor applies to one `search` call
    fn call_timeout(&self) -> Duration;

    async fn search(&self, query: &QueryDescriptor) -> Result<Vec<RawRecord>, SourceError>;
}

/// Enrichment side of an upstream: patent number in, missing fields out
#[async_trait]
pub trait SecondarySource: Send + Sync {
    fn label(&self) -> &str;

    fn call_timeout(&self) -> Duration;

    /// Fields this source knows about one patent; empty when it has nothing
    async fn fetch_supplemental_fields(&self, number: &str) -> Result<PartialRecord, SourceError>;
}

/// Chemical-synonym resolver
#[async_trait]
pub trait SynonymSource: Send + Sync {
    fn call_timeout(&self) -> Duration;

    async fn resolve(&self, molecule: &str) -> Result<Vec<String>, SourceError>;
}

/// Primary sources the strategy planner draws from
///
/// A missing source makes its strategies skip instead of fail.
#[derive(Clone, Default)]
pub struct SourceSet {
    pub national_office: Option<Arc<dyn PatentSource>>,
    pub registry: Option<Arc<dyn PatentSource>>,
    pub search_engine: Option<Arc<dyn PatentSource>>,
}

/// Every live client built from configuration
pub struct LiveSources {
    pub primary: SourceSet,
    /// Secondary sources in configured cascade order
    pub secondary: Vec<Arc<dyn SecondarySource>>,
    pub synonyms: Arc<dyn SynonymSource>,
}

impl LiveSources {
    /// Build HTTP clients for every configured upstream
    pub fn from_config(config: &TomlConfig) -> pharmyrus_common::Result<Self> {
        let national_office = Arc::new(NationalOfficeClient::new(&config.sources.national_office)?);
        let registry = Arc::new(RegistryClient::new(&config.sources.registry)?);
        let search_engine = Arc::new(SearchEngineClient::new(&config.sources.search_engine)?);
        let full_text = Arc::new(FullTextClient::new(&config.sources.full_text)?);
        let synonyms = Arc::new(SynonymClient::new(&config.sources.synonyms)?);

        let mut secondary: Vec<Arc<dyn SecondarySource>> = Vec::new();
        for label in &config.enrichment.order {
            match label.as_str() {
                "registry" => secondary.push(registry.clone()),
                "search_engine" => secondary.push(search_engine.clone()),
                "full_text" => secondary.push(full_text.clone()),
                other => warn!(source = %other, "Unknown enrichment source in cascade order"),
            }
        }

        info!(
            cascade = ?config.enrichment.order,
            "Upstream clients initialised"
        );

        Ok(Self {
            primary: SourceSet {
                national_office: Some(national_office),
                registry: Some(registry),
                search_engine: Some(search_engine),
            },
            secondary,
            synonyms,
        })
    }
}

/// Shared HTTP client and limiter construction for one upstream
pub(crate) fn build_http(config: &SourceConfig) -> pharmyrus_common::Result<(reqwest::Client, SourceRateLimiter)> {
    let client = reqwest::Client::builder()
        .user_agent(get_user_agent())
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| pharmyrus_common::Error::Config(format!("HTTP client build failed: {}", e)))?;

    let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
    let limiter = governor::RateLimiter::direct(governor::Quota::per_second(per_second));
    Ok((client, limiter))
}

/// Send a request and decode a JSON body, mapping failures to `SourceError`
pub(crate) async fn fetch_json(request: reqwest::RequestBuilder) -> Result<serde_json::Value, SourceError> {
    let response = request
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status(status.as_u16()));
    }
    response
        .json::<serde_json::Value>()
        .await
        .map_err(|e| SourceError::Decode(e.to_string()))
}

/// Send a request and return the body text
pub(crate) async fn fetch_text(request: reqwest::RequestBuilder) -> Result<String, SourceError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status(status.as_u16()));
    }
    response
        .text()
        .await
        .map_err(|e| SourceError::Decode(e.to_string()))
}

/// Base URL with `segments` appended as percent-encoded path segments
pub(crate) fn url_with_segments(base: &str, segments: &[&str]) -> Result<url::Url, SourceError> {
    let mut url = url::Url::parse(base)
        .map_err(|e| SourceError::Unavailable(format!("invalid base URL {}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| SourceError::Unavailable(format!("base URL {} cannot take a path", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_with_segments_encodes() {
        let url = url_with_segments("https://example.org/rest/", &["compound", "name", "abc 123/x"]).unwrap();
        assert_eq!(url.as_str(), "https://example.org/rest/compound/name/abc%20123%2Fx");
    }

    #[test]
    fn test_url_with_segments_rejects_invalid_base() {
        assert!(matches!(
            url_with_segments("not a url", &["x"]),
            Err(SourceError::Unavailable(_))
        ));
    }

    #[test]
    fn test_live_sources_follow_cascade_order() {
        let mut config = TomlConfig::default();
        config.enrichment.order = vec!["full_text".to_string(), "registry".to_string()];
        let live = LiveSources::from_config(&config).unwrap();
        let labels: Vec<&str> = live.secondary.iter().map(|s| s.label()).collect();
        assert_eq!(labels, vec!["full_text", "registry"]);
    }
}
