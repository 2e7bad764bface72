//! Run Command
//!
//! Execute the research pipeline for one query and print or save the report.
//!
//! Usage:
//!   marketlens run "<query>" [--param key=value]... [--format text|json|yaml] [--output FILE]

use std::fs;
use std::path::PathBuf;

use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::cli::ui::{Output, ReportFormat};
use crate::cli::util::{CommandContext, parse_params};
use crate::pipeline::RunStatus;
use crate::types::Result;

/// Run options (consolidated parameters)
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub query: String,
    /// Raw `key=value` pairs
    pub params: Vec<String>,
    pub format: String,
    pub output: Option<PathBuf>,
}

pub fn run(options: RunOptions) -> Result<()> {
    let RunOptions {
        query,
        params,
        format,
        output,
    } = options;

    let format: ReportFormat = format.parse()?;
    let parameters = parse_params(&params)?;

    let ctx = CommandContext::load()?;
    let engine = ctx.engine()?;

    let rt = Runtime::new()?;
    let report = rt.block_on(engine.run(&query, parameters))?;

    let rendered = format.render(&report)?;
    let out = Output::new();

    match output {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &rendered)?;
            info!("Report written to {}", path.display());
            out.success(&format!("Report saved to {}", path.display()));
        }
        None => println!("{}", rendered),
    }

    match report.status() {
        RunStatus::Completed => debug!("Run completed without errors"),
        RunStatus::Degraded => warn!(
            errors = report.report_metadata.errors.len(),
            "Run completed with recorded errors"
        ),
        RunStatus::Incomplete => out.error("Pipeline did not produce a validated report"),
    }

    Ok(())
}
