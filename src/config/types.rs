//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/marketlens/) and project (.marketlens/) level configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{cache, extract, network, sources, validate};
use crate::types::{LensError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Persistent cache settings
    pub cache: CacheConfig,

    /// External fetch behavior
    pub fetch: FetchConfig,

    /// External data source settings
    pub sources: SourcesConfig,

    /// Extract stage tuning
    pub extract: ExtractConfig,

    /// Validate stage tuning
    pub validate: ValidateConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            cache: CacheConfig::default(),
            fetch: FetchConfig::default(),
            sources: SourcesConfig::default(),
            extract: ExtractConfig::default(),
            validate: ValidateConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `LensError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.timeout_secs == 0 {
            return Err(LensError::Config(
                "fetch.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.extract.sentiment_workers == 0 {
            return Err(LensError::Config(
                "extract.sentiment_workers must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.validate.confidence_threshold) {
            return Err(LensError::Config(format!(
                "validate.confidence_threshold must be between 0.0 and 1.0, got {}",
                self.validate.confidence_threshold
            )));
        }

        let ttl = &self.cache.ttl_hours;
        if [
            ttl.web_search,
            ttl.google_trends,
            ttl.reddit_discussions,
            ttl.analysis_results,
            ttl.strategy_results,
            ttl.quality_results,
        ]
        .contains(&0)
        {
            return Err(LensError::Config(
                "cache.ttl_hours values must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Cache Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// SQLite database path
    pub path: PathBuf,

    /// Remove expired rows when the store is opened
    pub auto_cleanup: bool,

    /// Default TTL per cache type
    pub ttl_hours: TtlHours,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(cache::DEFAULT_DB_PATH),
            auto_cleanup: true,
            ttl_hours: TtlHours::default(),
        }
    }
}

/// Default TTL (hours) for each cache type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TtlHours {
    pub web_search: u64,
    pub google_trends: u64,
    pub reddit_discussions: u64,
    pub analysis_results: u64,
    pub strategy_results: u64,
    pub quality_results: u64,
}

impl Default for TtlHours {
    fn default() -> Self {
        Self {
            web_search: cache::WEB_SEARCH_TTL_HOURS,
            google_trends: cache::TRENDS_TTL_HOURS,
            reddit_discussions: cache::DISCUSSIONS_TTL_HOURS,
            analysis_results: cache::DERIVED_TTL_HOURS,
            strategy_results: cache::DERIVED_TTL_HOURS,
            quality_results: cache::DERIVED_TTL_HOURS,
        }
    }
}

// =============================================================================
// Fetch Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Timeout for a single external call, retries included
    pub timeout_secs: u64,

    /// Retries after the first attempt (recoverable errors only)
    pub max_retries: usize,

    /// Base backoff delay in milliseconds
    pub retry_base_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: network::FETCH_TIMEOUT_SECS,
            max_retries: network::MAX_FETCH_RETRIES,
            retry_base_delay_ms: network::RETRY_BASE_DELAY_MS,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// =============================================================================
// Source Configuration
// =============================================================================
//
// Credentials are never serialized (config show / init) and are redacted
// in Debug output. Sources convert them to SecretString internally.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub web: WebSearchConfig,
    pub trends: TrendsConfig,
    pub discussions: DiscussionsConfig,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub endpoint: String,
    pub num_results: u32,
    /// Country code (`gl`)
    pub country: String,
    /// Interface language (`hl`)
    pub language: String,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: sources::SERPER_ENDPOINT.to_string(),
            num_results: sources::WEB_NUM_RESULTS,
            country: "us".to_string(),
            language: "en".to_string(),
        }
    }
}

impl std::fmt::Debug for WebSearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSearchConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("endpoint", &self.endpoint)
            .field("num_results", &self.num_results)
            .field("country", &self.country)
            .field("language", &self.language)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendsConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub endpoint: String,
    pub timeframe: String,
}

impl Default for TrendsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: sources::SERPAPI_ENDPOINT.to_string(),
            timeframe: sources::TRENDS_TIMEFRAME.to_string(),
        }
    }
}

impl std::fmt::Debug for TrendsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrendsConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("endpoint", &self.endpoint)
            .field("timeframe", &self.timeframe)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscussionsConfig {
    pub client_id: Option<String>,
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,
    pub user_agent: String,
    pub limit: u32,
    /// Reddit search window (hour, day, week, month, year, all)
    pub time_filter: String,
}

impl Default for DiscussionsConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            user_agent: sources::REDDIT_USER_AGENT.to_string(),
            limit: sources::DISCUSSION_LIMIT,
            time_filter: "month".to_string(),
        }
    }
}

impl std::fmt::Debug for DiscussionsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscussionsConfig")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("user_agent", &self.user_agent)
            .field("limit", &self.limit)
            .field("time_filter", &self.time_filter)
            .finish()
    }
}

// =============================================================================
// Stage Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Concurrent per-competitor scoring workers
    pub sentiment_workers: usize,
    pub max_competitors: usize,
    pub max_themes: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            sentiment_workers: extract::SENTIMENT_WORKERS,
            max_competitors: extract::MAX_COMPETITORS,
            max_themes: extract::MAX_THEMES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidateConfig {
    /// Reports below this confidence get a warning flag
    pub confidence_threshold: f64,
    /// Minimum web sources for valid research
    pub min_sources: usize,
}

impl Default for ValidateConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: validate::CONFIDENCE_THRESHOLD,
            min_sources: validate::MIN_SOURCES,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.cache.ttl_hours.web_search, 168);
        assert_eq!(config.cache.ttl_hours.google_trends, 24);
        assert_eq!(config.cache.ttl_hours.reddit_discussions, 336);
        assert_eq!(config.fetch.timeout_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.fetch.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(LensError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let mut config = Config::default();
        config.cache.ttl_hours.google_trends = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secrets_not_serialized_or_debugged() {
        let mut config = Config::default();
        config.sources.web.api_key = Some("serper-secret".to_string());
        config.sources.discussions.client_secret = Some("reddit-secret".to_string());

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("serper-secret"));
        assert!(!json.contains("reddit-secret"));

        let debug = format!("{:?}", config);
        assert!(!debug.contains("serper-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
