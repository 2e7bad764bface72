//! marketlens - Competitive Market Research Pipeline
//!
//! Turns a free-text market query into a structured report through four
//! linear stages, with a persistent TTL cache in front of every external
//! call.
//!
//! ## Core Features
//!
//! - **Failure Isolation**: a failing or panicking stage is recorded, never fatal
//! - **Persistent Cache**: SQLite-backed, TTL per cache type, fail-open
//! - **Cache-Aware Fetching**: timeouts and retries around every data source
//! - **Concurrent Runs**: each run owns its state; only the cache is shared
//!
//! ## Quick Start
//!
//! ```ignore
//! use marketlens::{ConfigLoader, Parameters, WorkflowEngine};
//!
//! let config = ConfigLoader::load()?;
//! let engine = WorkflowEngine::with_defaults(&config)?;
//! let report = engine
//!     .run("CRM tools for real estate agents", Parameters::new())
//!     .await?;
//! println!("confidence: {}", report.confidence());
//! ```
//!
//! ## Modules
//!
//! - [`pipeline`]: workflow engine, stage contracts, run state, report schema
//! - [`stages`]: built-in gather, extract, recommend and validate stages
//! - [`cache`]: persistent TTL cache store
//! - [`fetch`]: cache-aware fetch wrapper with timeout and retry
//! - [`sources`]: web search, trends and discussion data sources
//! - [`storage`]: SQLite persistence with connection pooling
//! - [`config`]: layered configuration

pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod fetch;
pub mod pipeline;
pub mod sources;
pub mod stages;
pub mod storage;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::error::{ErrorCategory, LensError, Result, ResultExt};

// Storage
pub use storage::Database;

// Cache
pub use cache::{CacheStats, CacheStore, CacheType, TtlPolicy};
pub use fetch::{CachedFetcher, Fetched};

// =============================================================================
// Pipeline Re-exports
// =============================================================================

pub use pipeline::{
    ClearScope, Parameters, PipelineRun, PipelineState, Report, RunStatus, StageKind,
    WorkflowEngine,
};
pub use stages::{HeuristicExtractor, HeuristicRecommender, QualityValidator, SourceGatherer};
