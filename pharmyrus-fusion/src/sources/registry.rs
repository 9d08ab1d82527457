//! International filing registry client
//!
//! Serves two roles:
//! - **search:** bibliographic search (`published-data/search/biblio`)
//! - **enrichment:** per-number bibliographic lookup (`published-data/publication/epodoc/{n}/biblio`)
//!
//! Both answer with exchange documents in the registry's JSON rendering
//! (`{"@lang": .., "$": ..}` wrappers, tagged titles and abstracts).

use super::{build_http, fetch_json, url_with_segments, PatentSource, SecondarySource, SourceRateLimiter};
use crate::extractors;
use crate::types::{PartialRecord, QueryDescriptor, QueryField, RawRecord, SourceError, SourceKind};
use async_trait::async_trait;
use pharmyrus_common::config::SourceConfig;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Result window requested per search call
const SEARCH_RANGE: &str = "1-100";

pub struct RegistryClient {
    client: reqwest::Client,
    rate_limiter: SourceRateLimiter,
    base_url: String,
    timeout: Duration,
}

impl RegistryClient {
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

/// Registry query expression for one descriptor
pub(crate) fn query_expression(query: &QueryDescriptor) -> String {
    let term = query.term.replace('"', "");
    let base = match query.field {
        QueryField::TitleAndAbstract => format!("ta=\"{}\"", term),
        QueryField::Applicant => format!("pa=\"{}\"", term),
        QueryField::Classification => format!("ic={}", term.replace(' ', "")),
        QueryField::Number => format!("pn={}", term.replace(' ', "")),
    };
    match query.country {
        Some(country) => format!("{} and pn={}", base, country),
        None => base,
    }
}

/// Every exchange document in a registry response, in document order
pub(crate) fn collect_documents(value: &Value) -> Vec<Value> {
    let mut documents = Vec::new();
    collect_into(value, &mut documents);
    documents
}

fn collect_into(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                if key == "exchange-document" {
                    match inner {
                        Value::Array(items) => out.extend(items.iter().filter(|i| i.is_object()).cloned()),
                        Value::Object(_) => out.push(inner.clone()),
                        _ => {}
                    }
                } else {
                    collect_into(inner, out);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_into(item, out)),
        _ => {}
    }
}

#[async_trait]
impl PatentSource for RegistryClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Registry
    }

    fn call_timeout(&self) -> Duration {
        self.timeout
    }

    async fn search(&self, query: &QueryDescriptor) -> Result<Vec<RawRecord>, SourceError> {
        self.rate_limiter.until_ready().await;

        let url = url_with_segments(&self.base_url, &["published-data", "search", "biblio"])?;
        let request = self
            .client
            .get(url)
            .query(&[("q", query_expression(query).as_str()), ("Range", SEARCH_RANGE)]);
        let documents = collect_documents(&fetch_json(request).await?);

        debug!(query = %query.label, hits = documents.len(), "Registry search complete");

        Ok(documents
            .into_iter()
            .map(|doc| RawRecord::json(SourceKind::Registry, query.label.clone(), doc))
            .collect())
    }
}

#[async_trait]
impl SecondarySource for RegistryClient {
    fn label(&self) -> &str {
        SourceKind::Registry.label()
    }

    fn call_timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch_supplemental_fields(&self, number: &str) -> Result<PartialRecord, SourceError> {
        self.rate_limiter.until_ready().await;

        let url = url_with_segments(
            &self.base_url,
            &["published-data", "publication", "epodoc", number, "biblio"],
        )?;
        let body = fetch_json(self.client.get(url)).await?;

        match collect_documents(&body).first() {
            Some(doc) => {
                extractors::extract_from_value(doc).map_err(|e| SourceError::Decode(e.to_string()))
            }
            None => Ok(PartialRecord::default()),
        }
    }
}
