pub mod output;

pub use output::{Output, ReportFormat, render_cache_stats, render_report};
