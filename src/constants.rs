//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Cache TTL defaults
///
/// Volatile data expires fast; expensive or slow-changing data is kept longer.
pub mod cache {
    /// Web search results (hours)
    pub const WEB_SEARCH_TTL_HOURS: u64 = 7 * 24;

    /// Trend snapshots (hours)
    pub const TRENDS_TTL_HOURS: u64 = 24;

    /// Community discussion data (hours)
    pub const DISCUSSIONS_TTL_HOURS: u64 = 14 * 24;

    /// Derived analysis/strategy/quality results (hours)
    pub const DERIVED_TTL_HOURS: u64 = 7 * 24;

    /// Default on-disk location of the cache database
    pub const DEFAULT_DB_PATH: &str = ".marketlens/cache.db";

    /// Length of the hex cache key (128-bit digest)
    pub const KEY_HEX_LEN: usize = 32;
}

/// HTTP/Network constants
pub mod network {
    /// Per external fetch timeout (seconds)
    pub const FETCH_TIMEOUT_SECS: u64 = 30;

    /// Connection timeout (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 10;

    /// Retries after the first attempt for recoverable failures
    pub const MAX_FETCH_RETRIES: usize = 2;

    /// Base delay for exponential backoff (milliseconds)
    pub const RETRY_BASE_DELAY_MS: u64 = 500;

    /// Maximum delay between retries (seconds)
    pub const RETRY_MAX_DELAY_SECS: u64 = 10;
}

/// Query validation limits
pub mod query {
    /// Minimum query length after trimming
    pub const MIN_LEN: usize = 3;

    /// Maximum query length after trimming
    pub const MAX_LEN: usize = 5000;
}

/// Data source defaults
pub mod sources {
    /// Serper search endpoint
    pub const SERPER_ENDPOINT: &str = "https://google.serper.dev/search";

    /// Web results requested per query
    pub const WEB_NUM_RESULTS: u32 = 20;

    /// SerpApi search endpoint (Google Trends engine)
    pub const SERPAPI_ENDPOINT: &str = "https://serpapi.com/search.json";

    /// Trends window
    pub const TRENDS_TIMEFRAME: &str = "today 3-m";

    /// Reddit OAuth token endpoint
    pub const REDDIT_TOKEN_ENDPOINT: &str = "https://www.reddit.com/api/v1/access_token";

    /// Reddit authenticated API base
    pub const REDDIT_API_BASE: &str = "https://oauth.reddit.com";

    /// Discussions fetched per query
    pub const DISCUSSION_LIMIT: u32 = 10;

    /// Default Reddit user agent
    pub const REDDIT_USER_AGENT: &str = "marketlens/0.1";
}

/// Extraction heuristics
pub mod extract {
    /// Concurrent per-competitor scoring workers
    pub const SENTIMENT_WORKERS: usize = 4;

    /// Maximum competitors kept after ranking
    pub const MAX_COMPETITORS: usize = 10;

    /// Maximum content themes kept after ranking
    pub const MAX_THEMES: usize = 5;

    /// Minimum competitor name length
    pub const MIN_NAME_LEN: usize = 4;
}

/// Recommendation heuristics
pub mod recommend {
    /// Positioning axis bounds
    pub const AXIS_MIN: f64 = 1.0;
    pub const AXIS_MAX: f64 = 10.0;

    /// Minimum distance from every competitor for a grid point to be a gap
    pub const GAP_DISTANCE: f64 = 2.5;

    /// Opportunity zones kept
    pub const MAX_ZONES: usize = 3;

    /// Strategic moves kept
    pub const MAX_MOVES: usize = 5;
}

/// Validation thresholds
pub mod validate {
    /// Minimum web sources for research to be considered valid
    pub const MIN_SOURCES: usize = 3;

    /// Minimum source mentions for a competitor to count as validated
    pub const MIN_COMPETITOR_MENTIONS: usize = 2;

    /// Minimum validated competitors for analysis to be valid
    pub const MIN_VALIDATED_COMPETITORS: usize = 2;

    /// Minimum positioning coverage for strategy to be valid
    pub const MIN_POSITIONING_COVERAGE: f64 = 0.4;

    /// Source count at which the source score saturates
    pub const SOURCE_SATURATION: f64 = 15.0;

    /// Confidence floor applied when data is plentiful
    pub const CONFIDENCE_FLOOR: f64 = 0.65;

    /// Sources required before the floor applies
    pub const FLOOR_MIN_SOURCES: usize = 8;

    /// Confidence below which a report gets a warning flag
    pub const CONFIDENCE_THRESHOLD: f64 = 0.75;
}
