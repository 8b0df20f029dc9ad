// ============================
// crates/auth-lib/src/auth/rate_limit.rs
// ============================
//! Rate limiting for login attempts.
//!
//! Counts failed logins per subject and locks the subject out for a while
//! once the limit is hit. This is per-process throttling only; sessions
//! themselves never live here.
//!
//! Failures only accumulate while they are less than one lockout period
//! apart. Idle counters and finished lockouts are swept, both every
//! [`SWEEP_EVERY`] recorded failures and by [`AuthRateLimiter::spawn_cleanup`].

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::RateLimitSettings;

/// Default number of failed attempts before rate limiting
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default lockout duration (5 minutes)
const DEFAULT_LOCKOUT_DURATION: Duration = Duration::from_secs(5 * 60);

/// Recorded failures between two inline sweeps
const SWEEP_EVERY: usize = 64;

/// Entry in the rate limit map
#[derive(Debug, Clone)]
struct RateLimitEntry {
    /// Number of failed attempts
    failed_attempts: u32,
    /// Time of the last failed attempt
    last_failure: Instant,
    /// When the lockout expires, if locked out
    lockout_expiry: Option<Instant>,
}

/// Rate limiter for login attempts
#[derive(Debug, Clone)]
pub struct AuthRateLimiter {
    /// Map of subjects to rate limit entries
    attempts: Arc<DashMap<String, RateLimitEntry>>,
    /// Maximum number of failed attempts before lockout
    max_attempts: u32,
    /// Duration of lockout period, also the window failures accumulate in
    lockout_duration: Duration,
    /// Failures recorded since start, drives the inline sweep
    recorded: Arc<AtomicUsize>,
}

impl Default for AuthRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_LOCKOUT_DURATION)
    }
}

impl From<&RateLimitSettings> for AuthRateLimiter {
    fn from(settings: &RateLimitSettings) -> Self {
        Self::new(settings.max_attempts, settings.lockout())
    }
}

impl AuthRateLimiter {
    /// Create a new auth rate limiter
    pub fn new(max_attempts: u32, lockout_duration: Duration) -> Self {
        Self {
            attempts: Arc::new(DashMap::new()),
            max_attempts,
            lockout_duration,
            recorded: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Record a failed login for `subject`
    pub fn record_failed_attempt(&self, subject: &str) {
        let now = Instant::now();
        self.note_failure(subject, now);

        if (self.recorded.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY == 0 {
            self.cleanup();
        }
    }

    fn note_failure(&self, subject: &str, now: Instant) {
        let mut entry = self
            .attempts
            .entry(subject.to_string())
            .or_insert_with(|| RateLimitEntry {
                failed_attempts: 0,
                last_failure: now,
                lockout_expiry: None,
            });

        // a finished lockout or an idle counter starts a fresh count
        let stale = match entry.lockout_expiry {
            Some(expiry) => now >= expiry,
            None => now.duration_since(entry.last_failure) >= self.lockout_duration,
        };
        if stale {
            entry.failed_attempts = 0;
            entry.lockout_expiry = None;
        }

        entry.failed_attempts += 1;
        entry.last_failure = now;

        if entry.failed_attempts >= self.max_attempts && entry.lockout_expiry.is_none() {
            entry.lockout_expiry = Some(now + self.lockout_duration);
            warn!(
                subject,
                lockout_secs = self.lockout_duration.as_secs(),
                "subject locked out after repeated failed logins"
            );
        }
    }

    /// Record a successful login
    pub fn record_success(&self, subject: &str) {
        self.attempts.remove(subject);
    }

    /// Check if `subject` may attempt a login
    pub fn check_rate_limit(&self, subject: &str) -> bool {
        match self.attempts.get(subject) {
            Some(entry) => !matches!(entry.lockout_expiry, Some(expiry) if Instant::now() < expiry),
            None => true,
        }
    }

    /// Clean up expired lockouts and stale counters
    pub fn cleanup(&self) {
        let now = Instant::now();

        let before = self.attempts.len();

        self.attempts.retain(|_, entry| match entry.lockout_expiry {
            Some(expiry) => now < expiry,
            None => now.duration_since(entry.last_failure) < self.lockout_duration,
        });

        let removed = before.saturating_sub(self.attempts.len());
        if removed > 0 {
            debug!(removed, "pruned login throttle entries");
        }
    }

    /// Run [`cleanup`](Self::cleanup) every `period` on the current tokio
    /// runtime until the handle is aborted
    pub fn spawn_cleanup(&self, period: Duration) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                limiter.cleanup();
            }
        })
    }

    /// Number of subjects currently tracked
    pub fn tracked(&self) -> usize {
        self.attempts.len()
    }
}
