//! Built-in Stages
//!
//! Deterministic, heuristic implementations of the four stage traits. The
//! engine only sees the traits; these are what the CLI wires in.
//!
//! | Stage | Type |
//! |---|---|
//! | Gather | [`SourceGatherer`] |
//! | Extract | [`HeuristicExtractor`] |
//! | Recommend | [`HeuristicRecommender`] |
//! | Validate | [`QualityValidator`] |

mod extract;
mod gather;
mod recommend;
pub mod text;
mod validate;

pub use extract::HeuristicExtractor;
pub use gather::{DiscussionSource, SourceGatherer, TrendsSource, WebSearchSource};
pub use recommend::HeuristicRecommender;
pub use validate::{QualityValidator, Validation};
