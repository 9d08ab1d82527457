//! Configuration loading and config file resolution
//!
//! Config file priority order:
//! 1. Command-line argument (highest priority)
//! 2. `PHARMYRUS_CONFIG` environment variable
//! 3. Platform config directory (`<config_dir>/pharmyrus/config.toml`)
//! 4. Compiled defaults (fallback)
//!
//! A missing config file is never fatal: the service logs a warning and
//! starts with compiled defaults. A file that exists but does not parse is
//! a configuration error.

use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PHARMYRUS_CONFIG";

/// Environment variable overriding `server.bind`
pub const BIND_ENV_VAR: &str = "PHARMYRUS_BIND";

/// Environment variable overriding `logging.level`
pub const LOG_LEVEL_ENV_VAR: &str = "PHARMYRUS_LOG";

/// Enrichment source labels accepted in `enrichment.order`
pub const KNOWN_ENRICHMENT_SOURCES: [&str; 3] = ["registry", "search_engine", "full_text"];

/// Complete service configuration as stored in TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub search: SearchConfig,
    pub sources: SourcesConfig,
    pub enrichment: EnrichmentConfig,
    pub audit: AuditConfig,
    pub tasks: TaskConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address for the HTTP API
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5780".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Search run tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    /// Country code used when a request names no recognised target country
    pub default_country: String,
    /// Pause between consecutive queries of one strategy
    pub inter_query_delay_ms: u64,
    /// Per-strategy record cap when the request does not set one
    pub max_results: usize,
    /// Filing date cutoff for the recent-filings strategy
    pub recent_filing_cutoff: NaiveDate,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_country: "BR".to_string(),
            inter_query_delay_ms: 500,
            max_results: 100,
            recent_filing_cutoff: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or_default(),
        }
    }
}

/// Connection settings for one upstream source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub requests_per_second: u32,
}

impl SourceConfig {
    fn new(base_url: &str, timeout_secs: u64, requests_per_second: u32) -> Self {
        Self {
            base_url: base_url.to_string(),
            timeout_secs,
            requests_per_second,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourcesConfig {
    /// National-office crawler (BR filings)
    pub national_office: SourceConfig,
    /// International filing registry
    pub registry: SourceConfig,
    /// Public patent search engine
    pub search_engine: SourceConfig,
    /// Full-text document pages
    pub full_text: SourceConfig,
    /// Chemical-synonym resolver
    pub synonyms: SourceConfig,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            national_office: SourceConfig::new(
                "https://crawler3-production.up.railway.app/api/data/inpi/patents",
                60,
                2,
            ),
            registry: SourceConfig::new("https://ops.epo.org/3.2/rest-services", 30, 1),
            search_engine: SourceConfig::new("https://patents.google.com", 20, 1),
            full_text: SourceConfig::new("https://patents.google.com/patent", 20, 1),
            synonyms: SourceConfig::new("https://pubchem.ncbi.nlm.nih.gov/rest/pug", 15, 5),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Secondary sources in the order the cascade consults them
    pub order: Vec<String>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            order: KNOWN_ENRICHMENT_SOURCES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuditConfig {
    /// TOML file holding benchmark result sets, loaded once at startup
    pub benchmark_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TaskConfig {
    /// How long finished task results stay pollable
    pub retention_secs: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            retention_secs: 86_400,
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional file path
    ///
    /// `None` or a missing file yields compiled defaults with a warning.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            warn!("No config file found, using compiled defaults");
            return Ok(Self::default());
        };

        if !path.exists() {
            warn!(
                "Config file {} does not exist, using compiled defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Apply environment variable overrides on top of file values
    pub fn apply_env_overrides(&mut self) {
        if let Ok(bind) = std::env::var(BIND_ENV_VAR) {
            if !bind.trim().is_empty() {
                info!("Bind address overridden by {}", BIND_ENV_VAR);
                self.server.bind = bind;
            }
        }
        if let Ok(level) = std::env::var(LOG_LEVEL_ENV_VAR) {
            if !level.trim().is_empty() {
                self.logging.level = level;
            }
        }
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<()> {
        let country = self.search.default_country.trim();
        if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(Error::Config(format!(
                "search.default_country must be a 2-letter code, got '{}'",
                self.search.default_country
            )));
        }

        for (name, source) in self.source_entries() {
            if source.base_url.trim().is_empty() {
                return Err(Error::Config(format!("sources.{}.base_url is empty", name)));
            }
            if source.timeout_secs == 0 {
                return Err(Error::Config(format!(
                    "sources.{}.timeout_secs must be positive",
                    name
                )));
            }
            if source.requests_per_second == 0 {
                return Err(Error::Config(format!(
                    "sources.{}.requests_per_second must be positive",
                    name
                )));
            }
        }

        for label in &self.enrichment.order {
            if !KNOWN_ENRICHMENT_SOURCES.contains(&label.as_str()) {
                return Err(Error::Config(format!(
                    "Unknown enrichment source '{}' (expected one of: {})",
                    label,
                    KNOWN_ENRICHMENT_SOURCES.join(", ")
                )));
            }
        }

        Ok(())
    }

    fn source_entries(&self) -> [(&'static str, &SourceConfig); 5] {
        [
            ("national_office", &self.sources.national_office),
            ("registry", &self.sources.registry),
            ("search_engine", &self.sources.search_engine),
            ("full_text", &self.sources.full_text),
            ("synonyms", &self.sources.synonyms),
        ]
    }
}

/// Resolve which config file to load
///
/// Returns `None` when no candidate exists; callers fall back to defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    dirs::config_dir()
        .map(|d| d.join("pharmyrus").join("config.toml"))
        .filter(|p| p.exists())
}

/// User-Agent header sent to every upstream source
pub fn get_user_agent() -> String {
    format!(
        "Pharmyrus/{} (patent family fusion)",
        env!("CARGO_PKG_VERSION")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = TomlConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.search.default_country, "BR");
        assert_eq!(config.enrichment.order.len(), 3);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            [search]
            inter_query_delay_ms = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.search.inter_query_delay_ms, 0);
        assert_eq!(config.search.max_results, 100);
        assert_eq!(config.server, ServerConfig::default());
    }

    #[test]
    fn test_unknown_enrichment_source_rejected() {
        let result = TomlConfig::from_toml_str(
            r#"
            [enrichment]
            order = ["registry", "carrier_pigeon"]
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_user_agent_names_service() {
        assert!(get_user_agent().starts_with("Pharmyrus/"));
    }
}
