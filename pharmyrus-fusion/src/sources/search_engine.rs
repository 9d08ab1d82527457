//! Public patent search engine client
//!
//! The JSON query endpoint takes a URL-encoded inner query
//! (`q=<term>&country=<CC>&num=<n>`) and groups hits in clusters:
//! `{"results": {"cluster": [{"result": [{"patent": {...}}]}]}}`.

use super::{build_http, fetch_json, url_with_segments, PatentSource, SecondarySource, SourceRateLimiter};
use crate::extractors;
use crate::normalizer;
use crate::types::{Country, PartialRecord, QueryDescriptor, RawRecord, SourceError, SourceKind};
use async_trait::async_trait;
use pharmyrus_common::config::SourceConfig;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Hits requested per query
const RESULTS_PER_QUERY: &str = "100";

pub struct SearchEngineClient {
    client: reqwest::Client,
    rate_limiter: SourceRateLimiter,
    base_url: String,
    timeout: Duration,
}

impl SearchEngineClient {
    pub fn new(config: &SourceConfig) -> pharmyrus_common::Result<Self> {
        let (client, rate_limiter) = build_http(config)?;
        Ok(Self {
            client,
            rate_limiter,
            base_url: config.base_url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    async fn query(&self, term: &str, country: Option<Country>) -> Result<Vec<Value>, SourceError> {
        self.rate_limiter.until_ready().await;

        let url = url_with_segments(&self.base_url, &["xhr", "query"])?;
        let request = self
            .client
            .get(url)
            .query(&[("url", inner_query(term, country).as_str()), ("exp", "")]);
        Ok(collect_results(&fetch_json(request).await?))
    }
}

/// URL-encoded inner query passed in the `url` parameter
pub(crate) fn inner_query(term: &str, country: Option<Country>) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    serializer.append_pair("q", term);
    if let Some(country) = country {
        serializer.append_pair("country", country.as_str());
    }
    serializer.append_pair("num", RESULTS_PER_QUERY);
    serializer.finish()
}

/// Flatten clustered hits into one list
pub(crate) fn collect_results(body: &Value) -> Vec<Value> {
    body.pointer("/results/cluster")
        .and_then(Value::as_array)
        .map(|clusters| {
            clusters
                .iter()
                .filter_map(|cluster| cluster.get("result").and_then(Value::as_array))
                .flatten()
                .filter(|hit| hit.is_object())
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl PatentSource for SearchEngineClient {
    fn kind(&self) -> SourceKind {
        SourceKind::SearchEngine
    }

    fn call_timeout(&self) -> Duration {
        self.timeout
    }

    async fn search(&self, query: &QueryDescriptor) -> Result<Vec<RawRecord>, SourceError> {
        let hits = self.query(&query.term, query.country).await?;
        debug!(query = %query.label, hits = hits.len(), "Search engine query complete");

        Ok(hits
            .into_iter()
            .map(|hit| RawRecord::json(SourceKind::SearchEngine, query.label.clone(), hit))
            .collect())
    }
}

#[async_trait]
impl SecondarySource for SearchEngineClient {
    fn label(&self) -> &str {
        SourceKind::SearchEngine.label()
    }

    fn call_timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch_supplemental_fields(&self, number: &str) -> Result<PartialRecord, SourceError> {
        let country = Country::from_prefix(number);
        let hits = self.query(number, country).await?;

        // Only a hit for this exact document may contribute fields
        let default_country = country.unwrap_or(Country::Br);
        for hit in &hits {
            let Ok(partial) = extractors::extract_from_value(hit) else {
                continue;
            };
            let matches = partial
                .number
                .as_deref()
                .map(|n| normalizer::canonical_number(n, default_country) == number)
                .unwrap_or(false);
            if matches {
                return Ok(partial);
            }
        }
        Ok(PartialRecord::default())
    }
}
