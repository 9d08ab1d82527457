//! Document page client (enrichment only)

use super::{build_http, fetch_text, url_with_segments, SecondarySource, SourceRateLimiter};
use crate::extractors;
use crate::types::{PartialRecord, RawPayload, RawRecord, SourceError, SourceKind};
use async_trait::async_trait;
use pharmyrus_common::config::SourceConfig;
use std::time::Duration;
use tracing::debug;

pub struct FullTextClient {
    client: reqwest::Client,
    rate_limiter: SourceRateLimiter,
    base_url: String,
    timeout: Duration,
}

impl FullTextClient {
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

#[async_trait]
impl SecondarySource for FullTextClient {
    fn label(&self) -> &str {
        SourceKind::FullText.label()
    }

    fn call_timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch_supplemental_fields(&self, number: &str) -> Result<PartialRecord, SourceError> {
        self.rate_limiter.until_ready().await;

        let url = url_with_segments(&self.base_url, &[number, "en"])?;
        let page = fetch_text(self.client.get(url)).await?;
        debug!(number = %number, bytes = page.len(), "Document page fetched");

        let raw = RawRecord {
            source: SourceKind::FullText,
            query_label: number.to_string(),
            payload: RawPayload::Html(page),
        };
        match extractors::extract_fields(&raw) {
            Ok(partial) => Ok(partial),
            // Page without metadata: nothing to contribute
            Err(_) => Ok(PartialRecord::default()),
        }
    }
}
