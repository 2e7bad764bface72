pub mod commands;
pub mod ui;
pub mod util;

pub use ui::{Output, ReportFormat};
pub use util::{CommandContext, parse_params};
