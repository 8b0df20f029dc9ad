// ============================
// crates/auth-lib/src/auth/session.rs
// ============================
//! Session token handling and management.
//!
//! Sessions live in the external cache under `session:<token>` with a
//! cache-native TTL, so nothing in this process is the source of truth.
//! The cache key is the authorization evidence: a successful lookup under the
//! token-derived key proves the token, and the stored subject is only output.
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use techblog_auth_common::{session_key, SessionRecord};
use tracing::{debug, error, info, warn};

use super::token_generator::{generate_secure_token_with_size, is_well_formed_token};
use crate::cache::{CacheClient, CacheError};
use crate::clock::{Clock, SystemClock};
use crate::config::SessionSettings;
use crate::error::AuthError;
use crate::metrics as keys;

/// An issued session
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Opaque token; also the cache key suffix
    pub token: String,
    pub subject: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &redact(&self.token))
            .field("subject", &self.subject)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Cache-backed session ledger
#[derive(Clone)]
pub struct SessionStore {
    cache: Arc<dyn CacheClient>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
}

impl SessionStore {
    /// Create a session store on top of a cache client
    pub fn new(cache: Arc<dyn CacheClient>, settings: SessionSettings) -> Self {
        Self::with_clock(cache, Arc::new(SystemClock), settings)
    }

    /// Create a session store with an explicit time source
    pub fn with_clock(
        cache: Arc<dyn CacheClient>,
        clock: Arc<dyn Clock>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            cache,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Issue a new session for `subject`.
    ///
    /// The record is written with set-if-absent, so a token collision is
    /// detected by the cache and retried with a fresh token.
    pub async fn create(&self, subject: &str) -> Result<Session, AuthError> {
        let ttl = self.settings.ttl();
        let issued_at = self.clock.now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .ok_or_else(|| AuthError::InvalidInput("session ttl out of range".to_string()))?;

        let record = SessionRecord {
            subject: subject.to_string(),
            expires_at,
        };
        let payload = serde_json::to_string(&record)
            .map_err(|e| AuthError::StoreUnavailable(format!("encode session record: {e}")))?;

        for attempt in 1..=self.settings.max_create_attempts.max(1) {
            let token = generate_secure_token_with_size(self.settings.token_bytes)?;
            let claimed = self
                .cache_call(self.cache.set_if_absent(&session_key(&token), &payload, ttl))
                .await?;

            if claimed {
                counter!(keys::SESSION_CREATED).increment(1);
                info!(subject, token = %redact(&token), %expires_at, "session created");
                return Ok(Session {
                    token,
                    subject: record.subject,
                    issued_at,
                    expires_at,
                });
            }

            counter!(keys::SESSION_TOKEN_COLLISION).increment(1);
            warn!(attempt, "session token collision, retrying");
        }

        Err(AuthError::StoreUnavailable(
            "could not allocate a unique session token".to_string(),
        ))
    }

    /// Resolve a token to its subject
    pub async fn validate(&self, token: &str) -> Result<String, AuthError> {
        let record = self.lookup(token).await?;
        counter!(keys::SESSION_VALIDATED).increment(1);
        debug!(token = %redact(token), subject = %record.subject, "session validated");
        Ok(record.subject)
    }

    /// Replace `old_token` with a new token for the same subject.
    ///
    /// Order: validate old, create new, delete old. The delete must report
    /// that it removed the old record; otherwise a concurrent rotate or revoke
    /// got there first and the new token is withdrawn.
    ///
    /// The steps run on their own task, so a caller that goes away midway
    /// does not leave both tokens live.
    pub async fn rotate(&self, old_token: &str) -> Result<Session, AuthError> {
        let store = self.clone();
        let old_token = old_token.to_string();
        tokio::spawn(async move { store.rotate_detached(&old_token).await })
            .await
            .map_err(|e| AuthError::StoreUnavailable(format!("rotation task failed: {e}")))?
    }

    async fn rotate_detached(&self, old_token: &str) -> Result<Session, AuthError> {
        let record = self.lookup(old_token).await?;
        let session = self.create(&record.subject).await?;

        match self
            .cache_call(self.cache.delete(&session_key(old_token)))
            .await
        {
            Ok(true) => {
                counter!(keys::SESSION_ROTATED).increment(1);
                info!(
                    subject = %session.subject,
                    old = %redact(old_token),
                    new = %redact(&session.token),
                    "session rotated"
                );
                Ok(session)
            },
            Ok(false) => {
                counter!(keys::SESSION_ROTATE_CONFLICT).increment(1);
                warn!(
                    subject = %session.subject,
                    old = %redact(old_token),
                    "session rotated or revoked concurrently, withdrawing new token"
                );
                self.withdraw(&session.token).await;
                Err(AuthError::NotFound)
            },
            Err(err) => {
                // old record may still be live; it stays revocable and lapses
                // with its own TTL
                warn!(old = %redact(old_token), error = %err, "rotation could not retire old token");
                self.withdraw(&session.token).await;
                Err(err)
            },
        }
    }

    /// Delete a session. Revoking an absent token succeeds.
    pub async fn revoke(&self, token: &str) -> Result<(), AuthError> {
        if !is_well_formed_token(token) {
            return Ok(());
        }
        let removed = self
            .cache_call(self.cache.delete(&session_key(token)))
            .await?;
        if removed {
            counter!(keys::SESSION_REVOKED).increment(1);
            info!(token = %redact(token), "session revoked");
        }
        Ok(())
    }

    async fn lookup(&self, token: &str) -> Result<SessionRecord, AuthError> {
        if !is_well_formed_token(token) {
            return Err(AuthError::NotFound);
        }
        let key = session_key(token);

        let raw = self
            .cache_call(self.cache.get(&key))
            .await?
            .ok_or(AuthError::NotFound)?;
        let record: SessionRecord = serde_json::from_str(&raw).map_err(|e| {
            error!(token = %redact(token), error = %e, "corrupt session record");
            AuthError::StoreUnavailable(format!("corrupt session record: {e}"))
        })?;

        if record.is_expired_at(self.clock.now()) {
            counter!(keys::SESSION_EXPIRED).increment(1);
            debug!(token = %redact(token), expired_at = %record.expires_at, "session expired");
            if let Err(err) = self.cache_call(self.cache.delete(&key)).await {
                warn!(error = %err, "could not evict expired session, cache TTL will reclaim it");
            }
            return Err(AuthError::Expired);
        }

        Ok(record)
    }

    async fn withdraw(&self, token: &str) {
        if let Err(err) = self.revoke(token).await {
            error!(token = %redact(token), error = %err, "orphaned session token left to expire");
        }
    }

    /// Run one cache command under the configured timeout
    async fn cache_call<T, F>(&self, op: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        let outcome = match tokio::time::timeout(self.settings.cache_timeout(), op).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout),
        };
        outcome.map_err(|err| {
            counter!(keys::STORE_UNAVAILABLE).increment(1);
            error!(error = %err, "session cache call failed");
            AuthError::from(err)
        })
    }
}

/// Loggable token prefix
pub(crate) fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(6).collect();
    format!("{prefix}...")
}
