//! Cache Command
//!
//! Inspect and prune the response cache.
//!
//! Usage:
//!   marketlens cache stats [-f json]
//!   marketlens cache clear [--force]
//!   marketlens cache clear-type [TYPE]
//!   marketlens cache clear-query <QUERY>
//!   marketlens cache cleanup

use console::Term;

use crate::cache::CacheType;
use crate::cli::ui::{Output, render_cache_stats};
use crate::cli::util::CommandContext;
use crate::pipeline::ClearScope;
use crate::types::{LensError, Result};

/// Show cache statistics
pub fn stats(format: &str) -> Result<()> {
    let engine = CommandContext::load()?.engine()?;
    let stats = engine.cache_stats()?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&stats)?),
        "text" => print!("{}", render_cache_stats(&stats)),
        other => {
            return Err(LensError::Config(format!(
                "Invalid format '{}'. Valid values: text, json",
                other
            )));
        }
    }
    Ok(())
}

/// Remove every entry, asking first unless `force`
pub fn clear(force: bool) -> Result<()> {
    let out = Output::new();
    if !force && !confirm("Clear ALL cache entries? [y/N] ")? {
        out.info("Aborted");
        return Ok(());
    }

    let engine = CommandContext::load()?.engine()?;
    let removed = engine.clear_cache(ClearScope::All);
    out.success(&format!("Cleared {} cache entries", removed));
    Ok(())
}

/// Remove entries of one type; lists the valid types when none is given
pub fn clear_type(cache_type: Option<&str>) -> Result<()> {
    let out = Output::new();
    let Some(raw) = cache_type else {
        out.section("Cache types");
        for cache_type in CacheType::ALL {
            println!("  {}", cache_type);
        }
        return Ok(());
    };

    let cache_type: CacheType = raw.parse()?;
    let engine = CommandContext::load()?.engine()?;
    let removed = engine.clear_cache(ClearScope::Type(cache_type));
    out.success(&format!("Cleared {} {} entries", removed, cache_type));
    Ok(())
}

/// Remove entries recorded for one query
pub fn clear_query(query: &str) -> Result<()> {
    let engine = CommandContext::load()?.engine()?;
    let removed = engine.clear_cache(ClearScope::Query(query.to_string()));
    Output::new().success(&format!("Cleared {} entries for '{}'", removed, query));
    Ok(())
}

/// Physically remove expired entries
pub fn cleanup() -> Result<()> {
    let engine = CommandContext::load()?.engine()?;
    let removed = engine.cleanup_expired_cache();
    Output::new().success(&format!("Removed {} expired entries", removed));
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    let term = Term::stderr();
    term.write_str(prompt)?;
    let answer = term.read_line()?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
