//! Unified Error Type System
//!
//! Centralized error types for the entire application.
//! Provides error classification for retry decisions at the fetch boundary.
//!
//! ## Error Categories
//!
//! - **Transient**: Temporary upstream issues (retry)
//! - **RateLimit**: API rate limiting (wait and retry)
//! - **Network**: Connectivity issues and timeouts (retry with backoff)
//! - **Auth**: Missing or rejected credentials (fail fast)
//! - **Unavailable**: Source not configured or endpoint gone (fail fast)
//!
//! ## Propagation
//!
//! Only `InvalidQuery` is meant to reach the caller of a pipeline run.
//! Every other variant is absorbed at the fetch, cache, or stage boundary.

use std::any::Any;
use std::time::Duration;
use thiserror::Error;

use crate::pipeline::StageKind;

// =============================================================================
// Error Categories
// =============================================================================

/// Error categories for retry routing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rate limited - wait then retry
    RateLimit,
    /// Authentication failed - don't retry
    Auth,
    /// Network/connectivity issues - retry with backoff
    Network,
    /// Source unavailable or not configured - don't retry
    Unavailable,
    /// Invalid request - don't retry, fix request
    BadRequest,
    /// Response body could not be parsed
    ParseError,
    /// Temporary server issues - retry
    Transient,
    /// Unknown error - no retry
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::Auth => write!(f, "AUTH"),
            Self::Network => write!(f, "NETWORK"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
            Self::BadRequest => write!(f, "BAD_REQUEST"),
            Self::ParseError => write!(f, "PARSE_ERROR"),
            Self::Transient => write!(f, "TRANSIENT"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl ErrorCategory {
    /// Check if this category is worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimit | Self::Network | Self::Transient)
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Maps upstream failures onto categories
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify an HTTP status code returned by an external source
    pub fn classify_http_status(status: u16) -> ErrorCategory {
        match status {
            429 => ErrorCategory::RateLimit,
            401 | 403 => ErrorCategory::Auth,
            400 | 422 => ErrorCategory::BadRequest,
            500 | 502 | 503 | 504 => ErrorCategory::Transient,
            404 => ErrorCategory::Unavailable,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Classify a transport-level reqwest error
    pub fn classify_reqwest(err: &reqwest::Error) -> ErrorCategory {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            ErrorCategory::Network
        } else if err.is_decode() || err.is_body() {
            ErrorCategory::ParseError
        } else if let Some(status) = err.status() {
            Self::classify_http_status(status.as_u16())
        } else {
            ErrorCategory::Unknown
        }
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum LensError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // -------------------------------------------------------------------------
    // Input & Configuration
    // -------------------------------------------------------------------------
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // External Sources
    // -------------------------------------------------------------------------
    #[error("[{source_name}:{category}] {message}")]
    Source {
        source_name: String,
        category: ErrorCategory,
        message: String,
    },

    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    // -------------------------------------------------------------------------
    // Pipeline
    // -------------------------------------------------------------------------
    #[error("Stage {stage} failed: {message}")]
    Stage { stage: StageKind, message: String },
}

pub type Result<T> = std::result::Result<T, LensError>;

// =============================================================================
// Helper Functions
// =============================================================================

impl LensError {
    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create an external source error
    pub fn source(
        source_name: impl Into<String>,
        category: ErrorCategory,
        message: impl Into<String>,
    ) -> Self {
        Self::Source {
            source_name: source_name.into(),
            category,
            message: message.into(),
        }
    }

    /// Source has no credentials or endpoint configured
    pub fn source_unavailable(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::source(source_name, ErrorCategory::Unavailable, message)
    }

    /// Create a stage error
    pub fn stage(stage: StageKind, message: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            message: message.into(),
        }
    }

    /// Category used for retry routing
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Source { category, .. } => *category,
            Self::Http(e) => ErrorClassifier::classify_reqwest(e),
            Self::Timeout { .. } | Self::Io(_) => ErrorCategory::Network,
            Self::Json(_) => ErrorCategory::ParseError,
            Self::Config(_) => ErrorCategory::Unavailable,
            Self::InvalidQuery(_) => ErrorCategory::BadRequest,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        self.category().is_retryable()
    }
}

/// Text carried by a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;

    /// Add context using a closure (lazy evaluation)
    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| LensError::Storage(format!("{}: {}", context.into(), e)))
    }

    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| LensError::Storage(format!("{}: {}", f().into(), e)))
    }
}

// =============================================================================
// Tests
// =============================================================================
