//! Cache Types
//!
//! Cache categories, TTL policy, stored entries and statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::config::TtlHours;
use crate::types::LensError;

// =============================================================================
// Cache Type
// =============================================================================

/// Category of a cached value; selects the default TTL and scopes bulk deletes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    WebSearch,
    GoogleTrends,
    RedditDiscussions,
    AnalysisResults,
    StrategyResults,
    QualityResults,
}

impl CacheType {
    pub const ALL: [CacheType; 6] = [
        Self::WebSearch,
        Self::GoogleTrends,
        Self::RedditDiscussions,
        Self::AnalysisResults,
        Self::StrategyResults,
        Self::QualityResults,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebSearch => "web_search",
            Self::GoogleTrends => "google_trends",
            Self::RedditDiscussions => "reddit_discussions",
            Self::AnalysisResults => "analysis_results",
            Self::StrategyResults => "strategy_results",
            Self::QualityResults => "quality_results",
        }
    }
}

impl fmt::Display for CacheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheType {
    type Err = LensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = Self::ALL.iter().map(|t| t.as_str()).collect();
                LensError::Config(format!(
                    "Unknown cache type '{}'. Valid types: {}",
                    s,
                    valid.join(", ")
                ))
            })
    }
}

// =============================================================================
// TTL Policy
// =============================================================================

/// Default time-to-live per cache type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlPolicy {
    hours: TtlHours,
}

impl TtlPolicy {
    pub fn new(hours: TtlHours) -> Self {
        Self { hours }
    }

    pub fn ttl_for(&self, cache_type: CacheType) -> Duration {
        let hours = match cache_type {
            CacheType::WebSearch => self.hours.web_search,
            CacheType::GoogleTrends => self.hours.google_trends,
            CacheType::RedditDiscussions => self.hours.reddit_discussions,
            CacheType::AnalysisResults => self.hours.analysis_results,
            CacheType::StrategyResults => self.hours.strategy_results,
            CacheType::QualityResults => self.hours.quality_results,
        };
        Duration::from_secs(hours.saturating_mul(3600))
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::new(TtlHours::default())
    }
}

// =============================================================================
// Entries
// =============================================================================

/// Optional parameters for a cache write
#[derive(Debug, Clone, Default)]
pub struct CacheWrite {
    /// Overrides the type's default TTL
    pub ttl: Option<Duration>,
    /// Originating query, used by `delete_by_query`
    pub query: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl CacheWrite {
    pub fn for_query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::default()
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Stored row as seen by admin tooling
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry {
    pub key: String,
    pub cache_type: CacheType,
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub hits: u64,
    pub query: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

// =============================================================================
// Statistics
// =============================================================================

/// Counters accumulated since the store was opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub deletes: u64,
    pub errors: u64,
}

/// Per-type breakdown of non-expired entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeStats {
    pub count: u64,
    pub hits: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub session: SessionStats,
    /// hits / (hits + misses) for this session, 0.0 before any lookup
    pub hit_rate: f64,
    pub total_entries_valid: u64,
    pub total_entries_all: u64,
    pub total_size_bytes: u64,
    pub by_type: BTreeMap<CacheType, TypeStats>,
}

impl CacheStats {
    pub fn expired_entries(&self) -> u64 {
        self.total_entries_all
            .saturating_sub(self.total_entries_valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_type_parse() {
        for cache_type in CacheType::ALL {
            assert_eq!(cache_type.as_str().parse::<CacheType>().unwrap(), cache_type);
        }
        let err = "bogus".parse::<CacheType>().unwrap_err();
        assert!(err.to_string().contains("web_search"));
    }

    #[test]
    fn test_cache_type_serde_matches_as_str() {
        let json = serde_json::to_string(&CacheType::RedditDiscussions).unwrap();
        assert_eq!(json, "\"reddit_discussions\"");
    }

    #[test]
    fn test_huge_ttl_hours_saturate() {
        let policy = TtlPolicy::new(TtlHours {
            web_search: u64::MAX / 1000,
            ..TtlHours::default()
        });
        assert_eq!(
            policy.ttl_for(CacheType::WebSearch),
            Duration::from_secs(u64::MAX)
        );
        assert_eq!(
            policy.ttl_for(CacheType::GoogleTrends),
            Duration::from_secs(24 * 3600)
        );
    }

    #[test]
    fn test_default_ttls() {
        let policy = TtlPolicy::default();
        assert_eq!(
            policy.ttl_for(CacheType::WebSearch),
            Duration::from_secs(7 * 24 * 3600)
        );
        assert_eq!(
            policy.ttl_for(CacheType::GoogleTrends),
            Duration::from_secs(24 * 3600)
        );
        assert_eq!(
            policy.ttl_for(CacheType::RedditDiscussions),
            Duration::from_secs(14 * 24 * 3600)
        );
        assert_eq!(
            policy.ttl_for(CacheType::QualityResults),
            Duration::from_secs(7 * 24 * 3600)
        );
    }
}
