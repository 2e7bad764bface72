pub mod database;

pub use database::{Database, PoolConfig};
