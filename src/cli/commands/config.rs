//! Config Command
//!
//! Manage marketlens configuration.
//!
//! Usage:
//!   marketlens config show [-f json]
//!   marketlens config path
//!   marketlens config init [-g] [--force]

use crate::cli::ui::Output;
use crate::config::ConfigLoader;
use crate::types::{LensError, Result};

/// Show the merged effective configuration
pub fn show(format: &str) -> Result<()> {
    match format {
        "json" => ConfigLoader::show_config(true),
        "toml" => ConfigLoader::show_config(false),
        other => Err(LensError::Config(format!(
            "Invalid format '{}'. Valid values: toml, json",
            other
        ))),
    }
}

/// Show configuration paths
pub fn path() -> Result<()> {
    ConfigLoader::show_path()
}

/// Write a config template, globally or for the current project
pub fn init(global: bool, force: bool) -> Result<()> {
    let (scope, config_path) = if global {
        ("global", ConfigLoader::init_global(force)?)
    } else {
        ("project", ConfigLoader::init_project(force)?)
    };

    let out = Output::new();
    out.success(&format!("Initialized {} configuration", scope));
    println!("  Config:    {}", config_path.display());
    if !force {
        out.info("Existing files are left untouched; pass --force to overwrite");
    }
    Ok(())
}
