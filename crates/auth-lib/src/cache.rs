// ============================
// crates/auth-lib/src/cache.rs
// ============================
//! Key-value cache abstraction with an in-memory implementation.
//!
//! The session store only relies on three single-key operations that every
//! production cache offers atomically: `GET`, `SET NX EX` and `DEL`.
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::Mutex;
use thiserror::Error;

use crate::clock::{Clock, SystemClock};

/// Writes between two sweeps of expired keys
const SWEEP_EVERY_WRITES: usize = 64;

/// Errors reported by a cache client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache connection failed: {0}")]
    Connection(String),

    #[error("cache operation timed out")]
    Timeout,

    #[error("cache rejected the command: {0}")]
    Rejected(String),
}

/// Trait for key-value cache backends
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// Read a key; `None` when absent or evicted
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Write `value` under `key` with a time-to-live, only if the key does not
    /// exist yet. Returns `false` when the key was already taken.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError>;

    /// Remove a key. Returns `true` if this call removed a live entry.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// In-process cache with per-key TTL.
///
/// Stands in for the external cache in tests and single-node development.
/// Per-key operations are atomic through the shard locks of the map. Faults
/// and latency can be injected to exercise the fail-closed paths.
pub struct MemoryCache {
    entries: DashMap<String, MemoryEntry>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
    fail_deletes: AtomicBool,
    latency: Mutex<Option<Duration>>,
    writes: AtomicUsize,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    /// Create a cache that expires keys by the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a cache that expires keys by the given clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            available: AtomicBool::new(true),
            fail_deletes: AtomicBool::new(false),
            latency: Mutex::new(None),
            writes: AtomicUsize::new(0),
        }
    }

    /// Simulate the cache going away (`false`) or coming back (`true`)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make every `DEL` fail while other commands keep working
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Delay every command by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Number of live (unexpired) keys
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries.iter().filter(|e| e.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining time-to-live of a live key
    pub fn ttl(&self, key: &str) -> Option<chrono::Duration> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .map(|e| e.expires_at - now)
            .filter(|remaining| *remaining > chrono::Duration::zero())
    }

    /// Drop every expired key, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    async fn round_trip(&self) -> Result<(), CacheError> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(CacheError::Connection("cache offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.round_trip().await?;
        let now = self.clock.now();

        // Copy out before touching the map again; a held ref would deadlock
        // the shard on remove.
        let hit = self
            .entries
            .get(key)
            .map(|e| (e.value.clone(), e.expires_at));

        match hit {
            Some((value, expires_at)) if now < expires_at => Ok(Some(value)),
            Some(_) => {
                self.entries.remove_if(key, |_, e| e.expires_at <= now);
                Ok(None)
            },
            None => Ok(None),
        }
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        self.round_trip().await?;
        if ttl.is_zero() {
            return Err(CacheError::Rejected("ttl must be positive".to_string()));
        }
        let now = self.clock.now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| CacheError::Rejected("ttl out of range".to_string()))?;
        let entry = MemoryEntry {
            value: value.to_string(),
            expires_at,
        };

        // keys nobody reads again are reclaimed here
        if (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY_WRITES == 0 {
            self.purge_expired();
        }

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at > now {
                    return Ok(false);
                }
                occupied.insert(entry);
                Ok(true)
            },
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                Ok(true)
            },
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.round_trip().await?;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(CacheError::Connection("connection reset during DEL".to_string()));
        }
        let now = self.clock.now();
        Ok(self
            .entries
            .remove(key)
            .map(|(_, e)| e.expires_at > now)
            .unwrap_or(false))
    }
}
