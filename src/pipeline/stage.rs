//! Stage Contracts
//!
//! The engine drives four collaborators through these traits. Each receives
//! the [`StageContext`] (run id, query, parameters) plus the previous stage's
//! output, which is `None` when that stage failed.
//!
//! ## Outputs
//!
//! - [`GatherOutput`]: raw web sources, trend snapshot, discussions
//! - [`ExtractOutput`]: competitors, content themes, per-competitor attributes
//! - [`RecommendOutput`]: positioning map, opportunity zones, content and strategic recommendations
//! - [`Report`]: produced by the validate stage

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::report::Report;
use super::state::PipelineState;
use crate::fetch::{FetchOrigin, Fetched};
use crate::sources::{Discussion, SourceKind, TrendSnapshot, WebSource};
use crate::types::Result;

/// Free-form run parameters
pub type Parameters = BTreeMap<String, Value>;

// =============================================================================
// Stage Identity
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Gather,
    Extract,
    Recommend,
    Validate,
}

impl StageKind {
    /// Execution order
    pub const ALL: [StageKind; 4] = [Self::Gather, Self::Extract, Self::Recommend, Self::Validate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gather => "gather",
            Self::Extract => "extract",
            Self::Recommend => "recommend",
            Self::Validate => "validate",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trace context handed to every stage
#[derive(Debug, Clone)]
pub struct StageContext {
    pub run_id: Uuid,
    pub query: String,
    pub parameters: Parameters,
}

// =============================================================================
// Stage Traits
// =============================================================================

#[async_trait]
pub trait GatherStage: Send + Sync {
    /// Must tolerate partial source failure and report it in `source_failures`
    async fn gather(&self, ctx: &StageContext) -> Result<GatherOutput>;
}

#[async_trait]
pub trait ExtractStage: Send + Sync {
    async fn extract(&self, ctx: &StageContext, input: Option<&GatherOutput>)
    -> Result<ExtractOutput>;
}

#[async_trait]
pub trait RecommendStage: Send + Sync {
    async fn recommend(
        &self,
        ctx: &StageContext,
        input: Option<&ExtractOutput>,
    ) -> Result<RecommendOutput>;
}

#[async_trait]
pub trait ValidateStage: Send + Sync {
    /// Sees the whole run so far, including recorded errors
    async fn validate(&self, ctx: &StageContext, state: &PipelineState) -> Result<Report>;
}

// =============================================================================
// Gather Output
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatherOutput {
    pub sources: Vec<WebSource>,
    pub trends: TrendSnapshot,
    pub discussions: Vec<Discussion>,
    /// One entry per source that returned no data because it failed
    pub source_failures: Vec<SourceFailure>,
    pub fetch_stats: FetchStats,
}

impl GatherOutput {
    pub fn total_sources(&self) -> usize {
        self.sources.len()
    }

    pub fn has_trends(&self) -> bool {
        !self.trends.is_empty()
    }

    pub fn has_discussions(&self) -> bool {
        !self.discussions.is_empty()
    }

    /// Item counts per source kind
    pub fn source_types(&self) -> BTreeMap<SourceKind, usize> {
        BTreeMap::from([
            (SourceKind::Web, self.sources.len()),
            (SourceKind::Trends, usize::from(self.has_trends())),
            (SourceKind::Reddit, self.discussions.len()),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: String,
    pub message: String,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.message)
    }
}

/// Cache and network accounting for one gather pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchStats {
    pub external_calls: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl FetchStats {
    pub fn record<T>(&mut self, fetched: &Fetched<T>) {
        self.external_calls += u64::from(fetched.attempts);
        match fetched.origin {
            FetchOrigin::Cache => self.cache_hits += 1,
            FetchOrigin::Fresh | FetchOrigin::Failed(_) => self.cache_misses += 1,
        }
    }
}

// =============================================================================
// Extract Output
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractOutput {
    /// Ranked by mention frequency
    pub competitors: Vec<String>,
    pub content_themes: Vec<ContentTheme>,
    pub competitor_attributes: BTreeMap<String, CompetitorAttributes>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentTheme {
    pub theme: String,
    pub frequency: usize,
    /// Mean sentiment of snippets mentioning the theme, -1.0..=1.0
    pub sentiment: f64,
    pub key_phrases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorAttributes {
    pub price_positioning: f64,
    pub target_market_size: f64,
    pub sentiment: f64,
    pub mention_count: usize,
}

// =============================================================================
// Recommend Output
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecommendOutput {
    pub positioning_map: PositioningMap,
    pub opportunity_zones: Vec<OpportunityZone>,
    pub content_recommendations: Vec<ContentRecommendation>,
    pub strategic_moves: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositioningMap {
    pub dimensions: Dimensions,
    pub companies: BTreeMap<String, Position>,
}

impl Default for PositioningMap {
    fn default() -> Self {
        Self {
            dimensions: Dimensions {
                x_axis: "Price Positioning (1-10)".to_string(),
                y_axis: "Target Company Size (1-10)".to_string(),
            },
            companies: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub x_axis: String,
    pub y_axis: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityZone {
    pub coordinates: Point,
    pub description: String,
    pub rationale: String,
    pub opportunity_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecommendation {
    pub topic: String,
    pub priority: Priority,
    pub opportunity_score: f64,
    pub search_volume_monthly: u64,
    pub competitor_coverage: String,
    pub recommended_format: String,
    pub estimated_effort: String,
}
