//! Pipeline State
//!
//! Typed record of one run. The query and parameters are fixed at creation;
//! stage outputs are written at most once; errors are append-only; counters
//! only grow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::report::Report;
use super::stage::{
    ExtractOutput, FetchStats, GatherOutput, Parameters, RecommendOutput, StageContext, StageKind,
};
use crate::types::{LensError, Result};

// =============================================================================
// Workflow Position
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Pending,
    Gather,
    Extract,
    Recommend,
    Validate,
    Done,
}

impl From<StageKind> for WorkflowState {
    fn from(stage: StageKind) -> Self {
        match stage {
            StageKind::Gather => Self::Gather,
            StageKind::Extract => Self::Extract,
            StageKind::Recommend => Self::Recommend,
            StageKind::Validate => Self::Validate,
        }
    }
}

// =============================================================================
// Stage Outputs
// =============================================================================

/// Output of a single stage, tagged by kind
#[derive(Debug, Clone)]
pub enum StageOutput {
    Gather(GatherOutput),
    Extract(ExtractOutput),
    Recommend(RecommendOutput),
    Validate(Box<Report>),
}

impl StageOutput {
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Gather(_) => StageKind::Gather,
            Self::Extract(_) => StageKind::Extract,
            Self::Recommend(_) => StageKind::Recommend,
            Self::Validate(_) => StageKind::Validate,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StageOutputs {
    gather: Option<GatherOutput>,
    extract: Option<ExtractOutput>,
    recommend: Option<RecommendOutput>,
    validate: Option<Report>,
}

impl StageOutputs {
    /// Record a stage output; a populated slot is never overwritten
    pub fn store(&mut self, output: StageOutput) -> Result<()> {
        let kind = output.kind();
        if self.is_set(kind) {
            return Err(LensError::stage(kind, "output already recorded"));
        }
        match output {
            StageOutput::Gather(o) => self.gather = Some(o),
            StageOutput::Extract(o) => self.extract = Some(o),
            StageOutput::Recommend(o) => self.recommend = Some(o),
            StageOutput::Validate(o) => self.validate = Some(*o),
        }
        Ok(())
    }

    pub fn is_set(&self, stage: StageKind) -> bool {
        match stage {
            StageKind::Gather => self.gather.is_some(),
            StageKind::Extract => self.extract.is_some(),
            StageKind::Recommend => self.recommend.is_some(),
            StageKind::Validate => self.validate.is_some(),
        }
    }

    pub fn gather(&self) -> Option<&GatherOutput> {
        self.gather.as_ref()
    }

    pub fn extract(&self) -> Option<&ExtractOutput> {
        self.extract.as_ref()
    }

    pub fn recommend(&self) -> Option<&RecommendOutput> {
        self.recommend.as_ref()
    }

    pub fn validate(&self) -> Option<&Report> {
        self.validate.as_ref()
    }
}

// =============================================================================
// Errors, Counters, Timings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageErrorRecord {
    pub stage: StageKind,
    pub error: String,
    pub timestamp: DateTime<Utc>,
    /// True when the stage itself succeeded and absorbed this failure
    pub recovered: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineCounters {
    pub stage_calls: u64,
    pub external_calls: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_tokens: u64,
}

impl PipelineCounters {
    pub fn add_fetch_stats(&mut self, stats: &FetchStats) {
        self.external_calls += stats.external_calls;
        self.cache_hits += stats.cache_hits;
        self.cache_misses += stats.cache_misses;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: StageKind,
    pub duration_ms: u64,
    pub succeeded: bool,
}

// =============================================================================
// Pipeline State
// =============================================================================

#[derive(Debug, Clone)]
pub struct PipelineState {
    run_id: Uuid,
    query: String,
    parameters: Parameters,
    outputs: StageOutputs,
    errors: Vec<StageErrorRecord>,
    started_at: DateTime<Utc>,
    started: Instant,
    current: WorkflowState,
    counters: PipelineCounters,
    timings: Vec<StageTiming>,
}

impl PipelineState {
    pub fn new(query: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            query: query.into(),
            parameters,
            outputs: StageOutputs::default(),
            errors: Vec::new(),
            started_at: Utc::now(),
            started: Instant::now(),
            current: WorkflowState::Pending,
            counters: PipelineCounters::default(),
            timings: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn outputs(&self) -> &StageOutputs {
        &self.outputs
    }

    pub fn errors(&self) -> &[StageErrorRecord] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn current(&self) -> WorkflowState {
        self.current
    }

    pub fn counters(&self) -> &PipelineCounters {
        &self.counters
    }

    pub fn timings(&self) -> &[StageTiming] {
        &self.timings
    }

    pub fn context(&self) -> StageContext {
        StageContext {
            run_id: self.run_id,
            query: self.query.clone(),
            parameters: self.parameters.clone(),
        }
    }

    // -------------------------------------------------------------------------
    // Engine-only mutation
    // -------------------------------------------------------------------------

    pub(crate) fn enter(&mut self, state: WorkflowState) {
        self.current = state;
    }

    pub(crate) fn store(&mut self, output: StageOutput) -> Result<()> {
        self.outputs.store(output)?;
        self.counters.stage_calls += 1;
        Ok(())
    }

    pub(crate) fn record_error(
        &mut self,
        stage: StageKind,
        error: impl Into<String>,
        recovered: bool,
    ) {
        self.errors.push(StageErrorRecord {
            stage,
            error: error.into(),
            timestamp: Utc::now(),
            recovered,
        });
    }

    pub(crate) fn record_timing(&mut self, stage: StageKind, duration: Duration, succeeded: bool) {
        self.timings.push(StageTiming {
            stage,
            duration_ms: duration.as_millis() as u64,
            succeeded,
        });
    }

    pub(crate) fn counters_mut(&mut self) -> &mut PipelineCounters {
        &mut self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state() {
        let state = PipelineState::new("crm tools", Parameters::new());
        assert_eq!(state.query(), "crm tools");
        assert_eq!(state.current(), WorkflowState::Pending);
        assert!(!state.has_errors());
        assert!(!state.outputs().is_set(StageKind::Gather));
        assert_ne!(
            state.run_id(),
            PipelineState::new("crm tools", Parameters::new()).run_id()
        );
    }

    #[test]
    fn test_store_refuses_overwrite() {
        let mut state = PipelineState::new("q", Parameters::new());
        state
            .store(StageOutput::Extract(ExtractOutput {
                competitors: vec!["HubSpot".to_string()],
                ..ExtractOutput::default()
            }))
            .unwrap();

        let err = state
            .store(StageOutput::Extract(ExtractOutput::default()))
            .unwrap_err();
        assert!(matches!(
            err,
            LensError::Stage {
                stage: StageKind::Extract,
                ..
            }
        ));
        assert_eq!(state.outputs().extract().unwrap().competitors, ["HubSpot"]);
        assert_eq!(state.counters().stage_calls, 1);
    }

    #[test]
    fn test_errors_append_in_order() {
        let mut state = PipelineState::new("q", Parameters::new());
        state.record_error(StageKind::Gather, "web_search: timeout", true);
        state.record_error(StageKind::Extract, "boom", false);

        let stages: Vec<StageKind> = state.errors().iter().map(|e| e.stage).collect();
        assert_eq!(stages, [StageKind::Gather, StageKind::Extract]);
        assert!(state.errors()[0].recovered);
    }

    #[test]
    fn test_context_carries_identity() {
        let mut params = Parameters::new();
        params.insert("region".to_string(), serde_json::json!("us"));
        let state = PipelineState::new("q", params);

        let ctx = state.context();
        assert_eq!(ctx.run_id, state.run_id());
        assert_eq!(ctx.parameters["region"], "us");
    }
}
