//! Persistent TTL Cache Store
//!
//! SQLite-backed key/value store for external responses and derived results.
//!
//! ## Guarantees
//!
//! - A read returns a value only while `now < expires_at`
//! - Every read-modify-write is a single SQL statement
//! - Storage failures never reach the caller: reads miss, writes report
//!   `false`, deletes report 0, and the failure is logged and counted
//!
//! ## Time
//!
//! The store reads time through [`Clock`] so expiry can be tested with
//! [`ManualClock`] instead of sleeping.

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, info, warn};

use super::types::{
    CacheEntry, CacheStats, CacheType, CacheWrite, SessionStats, TtlPolicy, TypeStats,
};
use crate::config::CacheConfig;
use crate::storage::Database;
use crate::types::{LensError, Result};

// =============================================================================
// Clock
// =============================================================================

/// Source of wall-clock time in epoch milliseconds
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }

    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now().timestamp_millis())
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Session Counters
// =============================================================================

#[derive(Debug, Default)]
struct SessionCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
}

impl SessionCounters {
    fn snapshot(&self) -> SessionStats {
        SessionStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Cache Store
// =============================================================================

pub struct CacheStore {
    db: Database,
    ttl: TtlPolicy,
    clock: Arc<dyn Clock>,
    counters: SessionCounters,
}

impl CacheStore {
    /// Wrap an opened database, creating the schema if needed
    pub fn new(db: Database, ttl: TtlPolicy) -> Result<Self> {
        db.initialize()?;
        Ok(Self {
            db,
            ttl,
            clock: Arc::new(SystemClock),
            counters: SessionCounters::default(),
        })
    }

    /// Open the on-disk store described by `config`
    pub fn open(config: &CacheConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let store = Self::new(
            Database::open(&config.path)?,
            TtlPolicy::new(config.ttl_hours.clone()),
        )?;

        if config.auto_cleanup {
            let removed = store.cleanup_expired();
            if removed > 0 {
                info!(removed, "Removed expired cache entries on open");
            }
        }

        Ok(store)
    }

    /// In-memory store with default TTLs
    pub fn in_memory() -> Result<Self> {
        Self::new(Database::open_in_memory()?, TtlPolicy::default())
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttl
    }

    /// Derive the key for `operation` with `params`
    pub fn make_key(operation: &str, params: &serde_json::Value) -> String {
        super::key::make_key(operation, params)
    }

    fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    fn absorb<T>(&self, operation: &str, result: Result<T>, fallback: T) -> T {
        match result {
            Ok(value) => value,
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                warn!(operation, error = %e, "Cache operation failed");
                fallback
            }
        }
    }

    // =========================================================================
    // Read / Write
    // =========================================================================

    /// Fetch a live value and count the hit
    ///
    /// With `cache_type` set, an entry stored under a different type misses.
    pub fn get<T: DeserializeOwned>(&self, key: &str, cache_type: Option<CacheType>) -> Option<T> {
        let raw = self.absorb("get", self.read_and_touch(key, cache_type), None);

        let Some(raw) = raw else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key, "Cache miss");
            return None;
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                self.absorb::<()>("decode", Err(e.into()), ());
                None
            }
        }
    }

    fn read_and_touch(&self, key: &str, cache_type: Option<CacheType>) -> Result<Option<String>> {
        let conn = self.db.connection()?;
        let value = conn
            .query_row(
                "UPDATE cache_entries SET hits = hits + 1
                 WHERE key = ?1 AND expires_at > ?2 AND (?3 IS NULL OR cache_type = ?3)
                 RETURNING value",
                params![key, self.now(), cache_type.map(|t| t.as_str())],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Insert or fully replace the entry under `key`
    pub fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        cache_type: CacheType,
        write: CacheWrite,
    ) -> bool {
        let stored = self.absorb("set", self.write(key, value, cache_type, write), false);
        if stored {
            self.counters.writes.fetch_add(1, Ordering::Relaxed);
            debug!(key, cache_type = %cache_type, "Cache write");
        }
        stored
    }

    fn write<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        cache_type: CacheType,
        write: CacheWrite,
    ) -> Result<bool> {
        let payload = serde_json::to_string(value)?;
        let metadata = write
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let ttl = write.ttl.unwrap_or_else(|| self.ttl.ttl_for(cache_type));

        let created_at = self.now();
        let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = created_at
            .saturating_add(ttl_millis)
            .min(LATEST_EXPIRY_MILLIS);

        let affected = self.db.execute(
            "INSERT OR REPLACE INTO cache_entries
             (key, cache_type, value, created_at, expires_at, hits, query, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
            &[
                &key,
                &cache_type.as_str(),
                &payload,
                &created_at,
                &expires_at,
                &write.query,
                &metadata,
            ],
        )?;
        Ok(affected > 0)
    }

    /// Entry metadata without counting a hit; expired rows are returned too
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.absorb("entry", self.load_entry(key), None)
    }

    fn load_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let conn = self.db.connection()?;
        let row = conn
            .query_row(
                "SELECT cache_type, value, created_at, expires_at, hits, query, metadata
                 FROM cache_entries WHERE key = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((cache_type, value, created_at, expires_at, hits, query, metadata)) = row else {
            return Ok(None);
        };

        Ok(Some(CacheEntry {
            key: key.to_string(),
            cache_type: cache_type.parse()?,
            value: serde_json::from_str(&value)?,
            created_at: millis_to_datetime(created_at)?,
            expires_at: millis_to_datetime(expires_at)?,
            hits: hits.max(0) as u64,
            query,
            metadata: metadata.as_deref().map(serde_json::from_str).transpose()?,
        }))
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    fn delete_where(&self, operation: &str, sql: &str, param: &dyn rusqlite::ToSql) -> usize {
        let removed = self.absorb(operation, self.db.execute(sql, &[param]), 0);
        self.counters
            .deletes
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn delete(&self, key: &str) -> bool {
        self.delete_where("delete", "DELETE FROM cache_entries WHERE key = ?1", &key) > 0
    }

    pub fn delete_by_type(&self, cache_type: CacheType) -> usize {
        let removed = self.delete_where(
            "delete_by_type",
            "DELETE FROM cache_entries WHERE cache_type = ?1",
            &cache_type.as_str(),
        );
        info!(cache_type = %cache_type, removed, "Cleared cache entries by type");
        removed
    }

    pub fn delete_by_query(&self, query: &str) -> usize {
        let removed = self.delete_where(
            "delete_by_query",
            "DELETE FROM cache_entries WHERE query = ?1",
            &query,
        );
        info!(query, removed, "Cleared cache entries by query");
        removed
    }

    pub fn clear_all(&self) -> usize {
        let removed = self.absorb(
            "clear_all",
            self.db.execute("DELETE FROM cache_entries", &[]),
            0,
        );
        self.counters
            .deletes
            .fetch_add(removed as u64, Ordering::Relaxed);
        info!(removed, "Cleared all cache entries");
        removed
    }

    /// Physically remove rows whose TTL has elapsed
    pub fn cleanup_expired(&self) -> usize {
        let now = self.now();
        let removed = self.delete_where(
            "cleanup_expired",
            "DELETE FROM cache_entries WHERE expires_at <= ?1",
            &now,
        );
        debug!(removed, "Expired cache entries cleaned up");
        removed
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    pub fn get_stats(&self) -> Result<CacheStats> {
        let now = self.now();
        let (total_entries_valid, total_entries_all, total_size_bytes, by_type) =
            self.db.transaction(move |conn| {
                let (valid, all, size): (i64, i64, i64) = conn.query_row(
                    "SELECT
                        COALESCE(SUM(CASE WHEN expires_at > ?1 THEN 1 ELSE 0 END), 0),
                        COUNT(*),
                        COALESCE(SUM(LENGTH(value)), 0)
                     FROM cache_entries",
                    params![now],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )?;

                let mut stmt = conn.prepare(
                    "SELECT cache_type, COUNT(*), COALESCE(SUM(hits), 0)
                     FROM cache_entries WHERE expires_at > ?1
                     GROUP BY cache_type",
                )?;
                let rows = stmt
                    .query_map(params![now], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, i64>(2)?,
                        ))
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                let mut by_type = std::collections::BTreeMap::new();
                for (cache_type, count, hits) in rows {
                    let cache_type: CacheType = cache_type.parse()?;
                    by_type.insert(
                        cache_type,
                        TypeStats {
                            count: count.max(0) as u64,
                            hits: hits.max(0) as u64,
                        },
                    );
                }

                Ok((valid, all, size, by_type))
            })?;

        let session = self.counters.snapshot();
        let lookups = session.hits + session.misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            session.hits as f64 / lookups as f64
        };

        Ok(CacheStats {
            session,
            hit_rate,
            total_entries_valid: total_entries_valid.max(0) as u64,
            total_entries_all: total_entries_all.max(0) as u64,
            total_size_bytes: total_size_bytes.max(0) as u64,
            by_type,
        })
    }

    /// Session counters only, without touching storage
    pub fn session_stats(&self) -> SessionStats {
        self.counters.snapshot()
    }

    #[cfg(test)]
    pub(crate) fn database(&self) -> &Database {
        &self.db
    }
}

/// 9999-12-31T23:59:59.999Z; later expiries are clamped so they stay representable
const LATEST_EXPIRY_MILLIS: i64 = 253_402_300_799_999;

fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| LensError::Storage(format!("Invalid timestamp: {}", millis)))
}

// =============================================================================
// Tests
// =============================================================================
