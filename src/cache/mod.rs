//! Persistent response cache
//!
//! Every external fetch and derived result goes through [`CacheStore`],
//! keyed by [`make_key`] and expired per [`TtlPolicy`].

mod key;
mod store;
mod types;

pub use key::{canonicalize, make_key};
pub use store::{CacheStore, Clock, ManualClock, SystemClock};
pub use types::{
    CacheEntry, CacheStats, CacheType, CacheWrite, SessionStats, TtlPolicy, TypeStats,
};
