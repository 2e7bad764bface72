pub mod error;

pub use error::{ErrorCategory, ErrorClassifier, LensError, Result, ResultExt};
