//! Chemical-synonym resolver client
//!
//! Answers `compound/name/{molecule}/synonyms/JSON` with
//! `{"InformationList": {"Information": [{"Synonym": [...]}]}}`.

use super::{build_http, fetch_json, url_with_segments, SourceRateLimiter, SynonymSource};
use crate::types::SourceError;
use async_trait::async_trait;
use pharmyrus_common::config::SourceConfig;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct SynonymResponse {
    #[serde(rename = "InformationList")]
    information_list: InformationList,
}

#[derive(Debug, Deserialize)]
struct InformationList {
    #[serde(rename = "Information", default)]
    information: Vec<Information>,
}

#[derive(Debug, Deserialize)]
struct Information {
    #[serde(rename = "Synonym", default)]
    synonym: Vec<String>,
}

pub struct SynonymClient {
    client: reqwest::Client,
    rate_limiter: SourceRateLimiter,
    base_url: String,
    timeout: Duration,
}

impl SynonymClient {
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

pub(crate) fn parse_synonyms(body: serde_json::Value) -> Result<Vec<String>, SourceError> {
    let response: SynonymResponse =
        serde_json::from_value(body).map_err(|e| SourceError::Decode(e.to_string()))?;
    Ok(response
        .information_list
        .information
        .into_iter()
        .next()
        .map(|info| info.synonym)
        .unwrap_or_default())
}

#[async_trait]
impl SynonymSource for SynonymClient {
    fn call_timeout(&self) -> Duration {
        self.timeout
    }

    async fn resolve(&self, molecule: &str) -> Result<Vec<String>, SourceError> {
        self.rate_limiter.until_ready().await;

        let url = url_with_segments(
            &self.base_url,
            &["compound", "name", molecule.trim(), "synonyms", "JSON"],
        )?;
        parse_synonyms(fetch_json(self.client.get(url)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_synonyms_takes_first_compound() {
        let body = json!({
            "InformationList": {"Information": [
                {"CID": 67171867, "Synonym": ["darolutamide", "ODM-201", "BAY-1841788", "1297538-32-9"]},
                {"CID": 1, "Synonym": ["other"]}
            ]}
        });
        let synonyms = parse_synonyms(body).unwrap();
        assert_eq!(synonyms.len(), 4);
        assert_eq!(synonyms[1], "ODM-201");
    }

    #[test]
    fn test_unexpected_body_is_decode_error() {
        assert!(matches!(
            parse_synonyms(json!({"Fault": {"Code": "PUGREST.NotFound"}})),
            Err(SourceError::Decode(_))
        ));
    }
}
