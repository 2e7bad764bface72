//! CLI Common Utilities
//!
//! Shared context and argument parsing for command handlers.

use serde_json::Value;
use std::sync::Arc;

use crate::cache::CacheStore;
use crate::config::{Config, ConfigLoader};
use crate::pipeline::{Parameters, WorkflowEngine};
use crate::types::{LensError, Result};

/// Command execution context
///
/// Resolved configuration plus the cache store it points at.
#[derive(Clone)]
pub struct CommandContext {
    pub config: Config,
    pub cache: Arc<CacheStore>,
}

impl CommandContext {
    /// Load configuration and open the cache database
    pub fn load() -> Result<Self> {
        let config = ConfigLoader::load()?;
        let cache = Arc::new(CacheStore::open(&config.cache)?);
        Ok(Self { config, cache })
    }

    /// Engine wired with the built-in stages and this context's cache
    pub fn engine(&self) -> Result<WorkflowEngine> {
        WorkflowEngine::with_cache(&self.config, self.cache.clone())
    }
}

/// Parse repeated `key=value` arguments into run parameters
///
/// Values that parse as JSON keep their type (`limit=5` is a number);
/// anything else is stored as a string.
pub fn parse_params(raw: &[String]) -> Result<Parameters> {
    let mut parameters = Parameters::new();
    for item in raw {
        let (key, value) = item.split_once('=').ok_or_else(|| {
            LensError::Config(format!("Invalid parameter '{}': expected key=value", item))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(LensError::Config(format!(
                "Invalid parameter '{}': empty key",
                item
            )));
        }
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        parameters.insert(key.to_string(), value);
    }
    Ok(parameters)
}
