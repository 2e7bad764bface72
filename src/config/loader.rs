//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (~/.config/marketlens/config.toml)
//! 3. Project config (.marketlens/config.toml)
//! 4. Environment variables (MARKETLENS_* prefix, `__` separates sections)
//! 5. Provider credentials (SERPER_API_KEY, SERPAPI_API_KEY, REDDIT_*)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::Config;
use crate::types::{LensError, Result};

/// Well-known credential variables and the config paths they populate
const CREDENTIAL_VARS: &[(&str, &str)] = &[
    ("SERPER_API_KEY", "sources.web.api_key"),
    ("SERPAPI_API_KEY", "sources.trends.api_key"),
    ("REDDIT_CLIENT_ID", "sources.discussions.client_id"),
    ("REDDIT_CLIENT_SECRET", "sources.discussions.client_secret"),
    ("REDDIT_USER_AGENT", "sources.discussions.user_agent"),
];

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain:
    /// defaults → global → project → env vars → credential vars
    pub fn load() -> Result<Config> {
        let figment = Self::figment(Self::global_config_path(), Self::project_config_path());

        let config: Config = figment
            .extract()
            .map_err(|e| LensError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file only
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| LensError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    fn figment(global: Option<PathBuf>, project: PathBuf) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = global
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        if project.exists() {
            debug!("Loading project config from: {}", project.display());
            figment = figment.merge(Toml::file(&project));
        }

        // MARKETLENS_FETCH__TIMEOUT_SECS -> fetch.timeout_secs
        figment = figment.merge(Env::prefixed("MARKETLENS_").split("__").lowercase(true));

        let names: Vec<&str> = CREDENTIAL_VARS.iter().map(|(var, _)| *var).collect();
        figment.merge(Env::raw().only(&names).map(|key| {
            CREDENTIAL_VARS
                .iter()
                .find(|(var, _)| key.as_str().eq_ignore_ascii_case(var))
                .map(|(_, path)| (*path).into())
                .unwrap_or_else(|| key.as_str().to_owned().into())
        }))
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Get path to global config directory (~/.config/marketlens/)
    pub fn global_dir() -> Option<PathBuf> {
        env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                env::var("HOME")
                    .ok()
                    .map(|home| PathBuf::from(home).join(".config"))
            })
            .map(|p| p.join("marketlens"))
    }

    /// Get path to global config file
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get path to project config file
    pub fn project_config_path() -> PathBuf {
        Self::project_dir().join("config.toml")
    }

    /// Get project data directory
    pub fn project_dir() -> PathBuf {
        PathBuf::from(".marketlens")
    }

    // =========================================================================
    // Config Commands
    // =========================================================================

    /// Show config file paths
    pub fn show_path() -> Result<()> {
        println!("Configuration paths:");
        println!();

        if let Some(global) = Self::global_config_path() {
            let exists = if global.exists() { "✓" } else { "✗" };
            println!("  Global:  {} {}", exists, global.display());
        } else {
            println!("  Global:  (not available)");
        }

        let project = Self::project_config_path();
        let exists = if project.exists() { "✓" } else { "✗" };
        println!("  Project: {} {}", exists, project.display());

        let config = Self::load()?;
        let exists = if config.cache.path.exists() {
            "✓"
        } else {
            "✗"
        };
        println!("  Cache:   {} {}", exists, config.cache.path.display());

        Ok(())
    }

    /// Show current effective configuration (credentials omitted)
    pub fn show_config(as_json: bool) -> Result<()> {
        let config = Self::load()?;

        if as_json {
            println!("{}", serde_json::to_string_pretty(&config)?);
        } else {
            println!(
                "{}",
                toml::to_string_pretty(&config).map_err(|e| LensError::Config(e.to_string()))?
            );
        }

        Ok(())
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Initialize global configuration
    pub fn init_global(force: bool) -> Result<PathBuf> {
        let global_dir = Self::global_dir().ok_or_else(|| {
            LensError::Config("Cannot determine global config directory".to_string())
        })?;

        fs::create_dir_all(&global_dir)?;

        let config_path = global_dir.join("config.toml");
        Self::write_template(&config_path, Self::default_global_config(), force)?;

        Ok(config_path)
    }

    /// Initialize project configuration
    pub fn init_project(force: bool) -> Result<PathBuf> {
        let project_dir = Self::project_dir();
        fs::create_dir_all(&project_dir)?;

        let config_path = project_dir.join("config.toml");
        Self::write_template(&config_path, Self::default_project_config(), force)?;

        Ok(config_path)
    }

    // =========================================================================
    // Internal
    // =========================================================================

    fn write_template(path: &Path, content: &str, force: bool) -> Result<()> {
        if !path.exists() || force {
            fs::write(path, content)?;
            info!("Created config: {}", path.display());
        } else {
            info!("Config exists: {}", path.display());
        }
        Ok(())
    }

    /// Default global config content (TOML)
    fn default_global_config() -> &'static str {
        r#"# marketlens Global Configuration
# User-wide defaults. Project settings in .marketlens/config.toml override these.
# Credentials are read from SERPER_API_KEY, SERPAPI_API_KEY,
# REDDIT_CLIENT_ID and REDDIT_CLIENT_SECRET.

version = "1.0"

[fetch]
timeout_secs = 30
max_retries = 2
retry_base_delay_ms = 500

[cache.ttl_hours]
web_search = 168
google_trends = 24
reddit_discussions = 336
analysis_results = 168
strategy_results = 168
quality_results = 168
"#
    }

    /// Default project config content (TOML)
    fn default_project_config() -> &'static str {
        r#"# marketlens Project Configuration
# Project-specific settings that override global defaults.

version = "1.0"

[cache]
path = ".marketlens/cache.db"
auto_cleanup = true

[extract]
sentiment_workers = 4
max_competitors = 10
max_themes = 5

[validate]
confidence_threshold = 0.75
min_sources = 3
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_without_files() {
        let temp_dir = TempDir::new().unwrap();
        let config: Config = ConfigLoader::figment(None, temp_dir.path().join("missing.toml"))
            .extract()
            .unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.extract.max_themes, 5);
    }

    #[test]
    fn test_project_overrides_global() {
        let temp_dir = TempDir::new().unwrap();
        let global = temp_dir.path().join("global.toml");
        let project = temp_dir.path().join("project.toml");
        fs::write(&global, "[fetch]\ntimeout_secs = 10\nmax_retries = 5\n").unwrap();
        fs::write(&project, "[fetch]\ntimeout_secs = 20\n").unwrap();

        let config: Config = ConfigLoader::figment(Some(global), project)
            .extract()
            .unwrap();
        assert_eq!(config.fetch.timeout_secs, 20);
        assert_eq!(config.fetch.max_retries, 5);
    }

    #[test]
    fn test_templates_parse() {
        let temp_dir = TempDir::new().unwrap();
        let global = temp_dir.path().join("global.toml");
        let project = temp_dir.path().join("project.toml");
        fs::write(&global, ConfigLoader::default_global_config()).unwrap();
        fs::write(&project, ConfigLoader::default_project_config()).unwrap();

        assert!(ConfigLoader::load_from_file(&global).is_ok());
        let config = ConfigLoader::load_from_file(&project).unwrap();
        assert_eq!(config.cache.path, PathBuf::from(".marketlens/cache.db"));
    }

    #[test]
    fn test_load_from_file_rejects_invalid_values() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[validate]\nconfidence_threshold = 1.5\n").unwrap();

        assert!(matches!(
            ConfigLoader::load_from_file(&path),
            Err(LensError::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let temp_dir = TempDir::new().unwrap();
        // SAFETY: variables are unique to this test
        unsafe {
            env::set_var("MARKETLENS_EXTRACT__SENTIMENT_WORKERS", "7");
            env::set_var("SERPAPI_API_KEY", "trends-test-key");
        }
        let config: Config = ConfigLoader::figment(None, temp_dir.path().join("none.toml"))
            .extract()
            .unwrap();
        unsafe {
            env::remove_var("MARKETLENS_EXTRACT__SENTIMENT_WORKERS");
            env::remove_var("SERPAPI_API_KEY");
        }

        assert_eq!(config.extract.sentiment_workers, 7);
        assert_eq!(
            config.sources.trends.api_key.as_deref(),
            Some("trends-test-key")
        );
    }
}
