//! Research Pipeline
//!
//! ```text
//! query → Gather → Extract → Recommend → Validate → Report
//! ```
//!
//! - `stage`: collaborator traits and their typed outputs
//! - `state`: per-run record (outputs, errors, counters, timings)
//! - `report`: final report schema and fallback
//! - `engine`: the state machine that ties them together

pub mod engine;
pub mod report;
pub mod stage;
pub mod state;

pub use engine::{ClearScope, PipelineRun, WorkflowEngine};
pub use report::{
    FlagKind, QualityFlag, Report, ReportMetadata, RunStatus, SourceAttribution, ValidatedInsights,
};
pub use stage::{
    CompetitorAttributes, ContentRecommendation, ContentTheme, Dimensions, ExtractOutput,
    ExtractStage, FetchStats, GatherOutput, GatherStage, OpportunityZone, Parameters, Point,
    Position, PositioningMap, Priority, RecommendOutput, RecommendStage, SourceFailure,
    StageContext, StageKind, ValidateStage,
};
pub use state::{
    PipelineCounters, PipelineState, StageErrorRecord, StageOutput, StageOutputs, StageTiming,
    WorkflowState,
};
