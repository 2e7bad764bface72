//! Final report schema
//!
//! Every run yields a [`Report`] with the same shape, whether the validate
//! stage produced it or the engine had to fall back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::stage::{ContentRecommendation, ContentTheme, GatherOutput, PositioningMap};
use super::state::{PipelineState, StageErrorRecord};
use crate::sources::SourceKind;

/// Flag source used for failures the engine itself reports
pub const ORCHESTRATOR: &str = "orchestrator";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub report_metadata: ReportMetadata,
    pub validated_insights: ValidatedInsights,
    pub quality_flags: Vec<QualityFlag>,
    pub source_attribution: SourceAttribution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub query: String,
    pub timestamp: DateTime<Utc>,
    pub total_sources: usize,
    pub processing_time_seconds: f64,
    pub confidence_score: f64,
    pub api_calls: u64,
    pub total_tokens: u64,
    pub run_id: Uuid,
    pub status: RunStatus,
    #[serde(default)]
    pub errors: Vec<StageErrorRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every stage succeeded and nothing was absorbed
    Completed,
    /// Validation ran, but at least one failure was recorded
    Degraded,
    /// Validation did not produce a report
    Incomplete,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Completed => "completed",
            Self::Degraded => "degraded",
            Self::Incomplete => "incomplete",
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidatedInsights {
    pub competitors: Vec<String>,
    pub content_themes: Vec<ContentTheme>,
    pub positioning_map: PositioningMap,
    pub content_recommendations: Vec<ContentRecommendation>,
    pub strategic_recommendations: Vec<String>,
}

// =============================================================================
// Quality Flags
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagKind {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityFlag {
    #[serde(rename = "type")]
    pub kind: FlagKind,
    pub message: String,
    /// Area the flag refers to (research, analysis, strategy, orchestrator)
    pub stage: String,
}

impl QualityFlag {
    pub fn new(kind: FlagKind, message: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stage: stage.into(),
        }
    }

    pub fn error(message: impl Into<String>, stage: impl Into<String>) -> Self {
        Self::new(FlagKind::Error, message, stage)
    }

    pub fn warning(message: impl Into<String>, stage: impl Into<String>) -> Self {
        Self::new(FlagKind::Warning, message, stage)
    }

    pub fn info(message: impl Into<String>, stage: impl Into<String>) -> Self {
        Self::new(FlagKind::Info, message, stage)
    }
}

// =============================================================================
// Source Attribution
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAttribution {
    pub total_sources: usize,
    pub source_breakdown: BTreeMap<SourceKind, usize>,
    /// "<earliest> to <latest>" over sources with a known date, else "Unknown"
    pub date_range: String,
    pub trends_data_available: bool,
    pub discussions_available: bool,
}

impl SourceAttribution {
    pub fn from_gather(gather: Option<&GatherOutput>) -> Self {
        let Some(gather) = gather else {
            return Self {
                date_range: "Unknown".to_string(),
                ..Self::default()
            };
        };

        let mut source_breakdown = BTreeMap::new();
        for source in &gather.sources {
            *source_breakdown.entry(source.source_type).or_insert(0) += 1;
        }

        let dates: Vec<&str> = gather
            .sources
            .iter()
            .filter_map(|s| s.date.as_deref())
            .filter(|d| !d.is_empty() && *d != "Unknown")
            .collect();
        let date_range = match (dates.iter().min(), dates.iter().max()) {
            (Some(min), Some(max)) => format!("{} to {}", min, max),
            _ => "Unknown".to_string(),
        };

        Self {
            total_sources: gather.total_sources(),
            source_breakdown,
            date_range,
            trends_data_available: gather.has_trends(),
            discussions_available: gather.has_discussions(),
        }
    }
}

// =============================================================================
// Construction
// =============================================================================

impl Report {
    /// Report for a run whose validate stage produced nothing
    ///
    /// Insights are empty and confidence is zero; only the attribution of
    /// whatever was gathered survives.
    pub fn fallback(state: &PipelineState) -> Self {
        let gather = state.outputs().gather();
        Self {
            report_metadata: ReportMetadata {
                query: state.query().to_string(),
                timestamp: Utc::now(),
                total_sources: gather.map_or(0, GatherOutput::total_sources),
                processing_time_seconds: 0.0,
                confidence_score: 0.0,
                api_calls: 0,
                total_tokens: 0,
                run_id: state.run_id(),
                status: RunStatus::Incomplete,
                errors: Vec::new(),
            },
            validated_insights: ValidatedInsights::default(),
            quality_flags: vec![QualityFlag::error(
                "Pipeline did not complete: no validated report was produced",
                ORCHESTRATOR,
            )],
            source_attribution: SourceAttribution::from_gather(gather),
        }
    }

    /// Overwrite run-level metadata from the final state
    pub(crate) fn stamp(&mut self, state: &PipelineState, validated: bool) {
        let meta = &mut self.report_metadata;
        meta.run_id = state.run_id();
        meta.query = state.query().to_string();
        meta.errors = state.errors().to_vec();
        meta.processing_time_seconds =
            (state.elapsed().as_secs_f64() * 100.0).round() / 100.0;
        meta.api_calls = state.counters().external_calls;
        meta.total_tokens = state.counters().total_tokens;
        meta.status = match (validated, state.has_errors()) {
            (false, _) => RunStatus::Incomplete,
            (true, true) => RunStatus::Degraded,
            (true, false) => RunStatus::Completed,
        };
    }

    pub fn confidence(&self) -> f64 {
        self.report_metadata.confidence_score
    }

    pub fn status(&self) -> RunStatus {
        self.report_metadata.status
    }

    pub fn flags_of(&self, kind: FlagKind) -> impl Iterator<Item = &QualityFlag> {
        self.quality_flags.iter().filter(move |f| f.kind == kind)
    }
}
