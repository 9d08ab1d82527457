//! National-office crawler client
//!
//! The crawler takes one free-text term and answers with
//! `{"data": [ {...}, ... ]}`. It only knows BR filings and identifies
//! each filing in its `title` field ("BR 11 2017 021636-0").

use super::{build_http, fetch_json, PatentSource, SourceRateLimiter};
use crate::types::{QueryDescriptor, RawRecord, SourceError, SourceKind};
use async_trait::async_trait;
use pharmyrus_common::config::SourceConfig;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub struct NationalOfficeClient {
    client: reqwest::Client,
    rate_limiter: SourceRateLimiter,
    base_url: String,
    timeout: Duration,
}

impl NationalOfficeClient {
    pub fn new(config: &SourceConfig) -> pharmyrus_common::Result<Self> {
        let (client, rate_limiter) = build_http(config)?;
        Ok(Self {
            client,
            rate_limiter,
            base_url: config.base_url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

/// Hits listed under `data`; a body without `data` means no hits
pub(crate) fn parse_hits(body: Value) -> Result<Vec<Value>, SourceError> {
    match body {
        Value::Object(mut map) => match map.remove("data") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(SourceError::Decode("`data` is not a list".to_string())),
        },
        _ => Err(SourceError::Decode("response is not an object".to_string())),
    }
}

#[async_trait]
impl PatentSource for NationalOfficeClient {
    fn kind(&self) -> SourceKind {
        SourceKind::NationalOffice
    }

    fn call_timeout(&self) -> Duration {
        self.timeout
    }

    async fn search(&self, query: &QueryDescriptor) -> Result<Vec<RawRecord>, SourceError> {
        self.rate_limiter.until_ready().await;

        let request = self
            .client
            .get(&self.base_url)
            .query(&[("medicine", query.term.as_str())]);
        let hits = parse_hits(fetch_json(request).await?)?;

        debug!(query = %query.label, hits = hits.len(), "National office query complete");

        Ok(hits
            .into_iter()
            .map(|hit| RawRecord::json(SourceKind::NationalOffice, query.label.clone(), hit))
            .collect())
    }
}
