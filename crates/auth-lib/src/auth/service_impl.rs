use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use tracing::{error, info, warn};
use zeroize::Zeroizing;

use super::password::{
    hash_password, needs_rehash, validate_password_strength, verify_password, HashParameters,
    PasswordRequirements,
};
use super::rate_limit::AuthRateLimiter;
use super::token_generator::generate_secure_token;
use super::{AuthService, Session, SessionStore};
use crate::config::Settings;
use crate::error::AuthError;
use crate::metrics as keys;
use crate::user_store::{CredentialRecord, UserStore, UserStoreError};

const MAX_SUBJECT_LENGTH: usize = 64;

/// Orchestrates credentials and sessions; holds no state of its own beyond
/// configuration and the login throttle.
pub struct AuthenticationService {
    sessions: Arc<SessionStore>,
    users: Arc<dyn UserStore>,
    params: HashParameters,
    requirements: PasswordRequirements,
    rate_limiter: AuthRateLimiter,
    user_store_timeout: Duration,
    /// Verified against when the subject is unknown, so both paths pay for
    /// one Argon2 run with the deployment's parameters
    dummy_hash: String,
}

impl AuthenticationService {
    pub fn new(
        sessions: Arc<SessionStore>,
        users: Arc<dyn UserStore>,
        settings: &Settings,
    ) -> Result<Self, AuthError> {
        let unguessable = Zeroizing::new(generate_secure_token()?);
        let dummy_hash = hash_password(&unguessable, &settings.hashing)?;

        Ok(Self {
            sessions,
            users,
            params: settings.hashing,
            requirements: settings.password_requirements.clone(),
            rate_limiter: AuthRateLimiter::from(&settings.rate_limit),
            user_store_timeout: settings.user_store.timeout(),
            dummy_hash,
        })
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn rate_limiter(&self) -> &AuthRateLimiter {
        &self.rate_limiter
    }

    /// Run one user store call under the configured timeout
    async fn user_store_call<T, F>(&self, op: F) -> Result<T, UserStoreError>
    where
        F: Future<Output = Result<T, UserStoreError>>,
    {
        tokio::time::timeout(self.user_store_timeout, op)
            .await
            .unwrap_or_else(|_| Err(UserStoreError::Unavailable("user store timed out".to_string())))
    }

    /// Re-hash with the current parameters if the stored hash is outdated
    async fn upgrade_hash(&self, subject: &str, password: Zeroizing<String>, stored: &str) {
        if !matches!(needs_rehash(stored, &self.params), Ok(true)) {
            return;
        }

        let fresh = match hash_blocking(password, self.params).await {
            Ok(hash) => hash,
            Err(err) => {
                warn!(subject, error = %err, "could not re-hash password");
                return;
            },
        };

        match self
            .user_store_call(self.users.update_password_hash(subject, fresh))
            .await
        {
            Ok(()) => {
                counter!(keys::PASSWORD_REHASHED).increment(1);
                info!(subject, "password hash upgraded to current parameters");
            },
            Err(err) => warn!(subject, error = %err, "could not store upgraded password hash"),
        }
    }
}

#[async_trait]
impl AuthService for AuthenticationService {
    async fn login(&self, subject: &str, password: &str) -> Result<Session, AuthError> {
        if !self.rate_limiter.check_rate_limit(subject) {
            counter!(keys::LOGIN_LOCKED_OUT).increment(1);
            warn!(subject, "login refused, subject locked out");
            return Err(AuthError::RateLimited);
        }

        let (stored_hash, known) = match self
            .user_store_call(self.users.get_credential_record(subject))
            .await
        {
            Ok(record) => (record.password_hash, true),
            Err(UserStoreError::NotFound) => (self.dummy_hash.clone(), false),
            Err(err) => {
                error!(subject, error = %err, "credential lookup failed");
                return Err(AuthError::UpstreamError(err.to_string()));
            },
        };

        let password = Zeroizing::new(password.to_string());
        let matches = match verify_blocking(password.clone(), stored_hash.clone()).await {
            Ok(matches) => matches,
            Err(AuthError::MalformedHash(reason)) => {
                error!(subject, %reason, "stored password hash is malformed");
                false
            },
            Err(err) => return Err(err),
        };

        if !(known && matches) {
            self.rate_limiter.record_failed_attempt(subject);
            counter!(keys::LOGIN_FAILED).increment(1);
            info!(subject, "login failed");
            return Err(AuthError::InvalidCredentials);
        }

        self.rate_limiter.record_success(subject);
        self.upgrade_hash(subject, password, &stored_hash).await;

        let session = self
            .sessions
            .create(subject)
            .await
            .map_err(AuthError::into_upstream)?;
        counter!(keys::LOGIN_SUCCEEDED).increment(1);
        info!(subject, "login succeeded");
        Ok(session)
    }

    async fn logout(&self, token: &str) {
        if let Err(err) = self.sessions.revoke(token).await {
            warn!(error = %err, "logout could not revoke session, it will lapse with its TTL");
        }
    }

    async fn refresh(&self, token: &str) -> Result<Session, AuthError> {
        self.sessions.rotate(token).await
    }

    async fn register(&self, subject: &str, password: &str) -> Result<(), AuthError> {
        validate_subject(subject)?;
        if !validate_password_strength(password, &self.requirements) {
            return Err(AuthError::InvalidInput(
                "password does not meet the strength requirements".to_string(),
            ));
        }

        let password_hash = hash_blocking(Zeroizing::new(password.to_string()), self.params).await?;
        let record = CredentialRecord {
            subject: subject.to_string(),
            password_hash,
        };

        match self
            .user_store_call(self.users.insert_credential_record(record))
            .await
        {
            Ok(()) => {
                info!(subject, "subject registered");
                Ok(())
            },
            Err(UserStoreError::AlreadyExists) => Err(AuthError::SubjectTaken),
            Err(err) => {
                error!(subject, error = %err, "could not store new subject");
                Err(AuthError::UpstreamError(err.to_string()))
            },
        }
    }
}

fn validate_subject(subject: &str) -> Result<(), AuthError> {
    let length = subject.chars().count();
    if length == 0 || length > MAX_SUBJECT_LENGTH {
        return Err(AuthError::InvalidInput(format!(
            "username must be 1 to {MAX_SUBJECT_LENGTH} characters"
        )));
    }
    if subject.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(AuthError::InvalidInput(
            "username must not contain whitespace".to_string(),
        ));
    }
    Ok(())
}

/// Argon2 is CPU and memory bound; keep it off the async workers
async fn verify_blocking(password: Zeroizing<String>, hash: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AuthError::HashingError(format!("verification task failed: {e}")))?
}

async fn hash_blocking(password: Zeroizing<String>, params: HashParameters) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password, &params))
        .await
        .map_err(|e| AuthError::HashingError(format!("hashing task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::user_store::MemoryUserStore;

    fn fast_settings() -> Settings {
        let mut settings = Settings::default();
        settings.hashing = HashParameters {
            memory_cost: 1024,
            iterations: 1,
            parallelism: 1,
            salt_length: 16,
            key_length: 32,
        };
        settings
    }

    struct Harness {
        service: AuthenticationService,
        cache: Arc<MemoryCache>,
        users: Arc<MemoryUserStore>,
    }

    async fn harness() -> Harness {
        let settings = fast_settings();
        let cache = Arc::new(MemoryCache::new());
        let users = Arc::new(MemoryUserStore::new());
        users
            .insert_credential_record(CredentialRecord {
                subject: "alice".to_string(),
                password_hash: hash_password("correct-pw", &settings.hashing).unwrap(),
            })
            .await
            .unwrap();

        let sessions = Arc::new(SessionStore::new(cache.clone(), settings.session.clone()));
        let service = AuthenticationService::new(sessions, users.clone(), &settings).unwrap();
        Harness {
            service,
            cache,
            users,
        }
    }

    #[tokio::test]
    async fn test_login_scenario() {
        let h = harness().await;

        let session = h.service.login("alice", "correct-pw").await.unwrap();
        assert_eq!(session.subject, "alice");
        assert_eq!(h.service.sessions().validate(&session.token).await.unwrap(), "alice");

        assert!(matches!(
            h.service.login("alice", "wrong-pw").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            h.service.login("nobody", "x").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_each_login_gets_a_fresh_token() {
        let h = harness().await;
        let first = h.service.login("alice", "correct-pw").await.unwrap();
        let second = h.service.login("alice", "correct-pw").await.unwrap();
        assert_ne!(first.token, second.token);
        assert_eq!(h.cache.len(), 2);
    }

    #[tokio::test]
    async fn test_logout_and_refresh() {
        let h = harness().await;
        let session = h.service.login("alice", "correct-pw").await.unwrap();

        let refreshed = h.service.refresh(&session.token).await.unwrap();
        assert!(matches!(
            h.service.refresh(&session.token).await,
            Err(AuthError::NotFound)
        ));

        h.service.logout(&refreshed.token).await;
        h.service.logout(&refreshed.token).await;
        assert!(matches!(
            h.service.sessions().validate(&refreshed.token).await,
            Err(AuthError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_logout_swallows_store_outage() {
        let h = harness().await;
        let session = h.service.login("alice", "correct-pw").await.unwrap();
        h.cache.set_available(false);
        h.service.logout(&session.token).await;
    }

    #[tokio::test]
    async fn test_cache_outage_on_login_is_upstream_error() {
        let h = harness().await;
        h.cache.set_available(false);
        assert!(matches!(
            h.service.login("alice", "correct-pw").await,
            Err(AuthError::UpstreamError(_))
        ));
    }

    #[tokio::test]
    async fn test_lockout_after_repeated_failures() {
        let h = harness().await;
        for _ in 0..5 {
            assert!(h.service.login("alice", "wrong-pw").await.is_err());
        }
        assert!(matches!(
            h.service.login("alice", "correct-pw").await,
            Err(AuthError::RateLimited)
        ));
        // other subjects are unaffected
        assert!(matches!(
            h.service.login("bob", "x").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_unknown_subject_failures_do_not_accumulate() {
        let mut settings = fast_settings();
        settings.rate_limit.lockout_secs = 0;
        let sessions = Arc::new(SessionStore::new(
            Arc::new(MemoryCache::new()),
            settings.session.clone(),
        ));
        let service =
            AuthenticationService::new(sessions, Arc::new(MemoryUserStore::new()), &settings)
                .unwrap();

        for i in 0..130 {
            assert!(service.login(&format!("ghost-{i}"), "x").await.is_err());
        }
        assert!(service.rate_limiter().tracked() < 130);

        service.rate_limiter().cleanup();
        assert_eq!(service.rate_limiter().tracked(), 0);
    }

    #[tokio::test]
    async fn test_malformed_stored_hash_is_invalid_credentials() {
        let h = harness().await;
        h.users
            .insert_credential_record(CredentialRecord {
                subject: "mallory".to_string(),
                password_hash: "plaintext-password".to_string(),
            })
            .await
            .unwrap();

        assert!(matches!(
            h.service.login("mallory", "plaintext-password").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_hash_with_unusable_parameters_is_invalid_credentials() {
        let h = harness().await;
        h.users
            .insert_credential_record(CredentialRecord {
                subject: "eve".to_string(),
                password_hash: "$argon2id$v=19$m=1024,t=1,p=1$c2FsdA$a2V5a2V5a2V5a2V5a2V5a2V5a2V5a2V5"
                    .to_string(),
            })
            .await
            .unwrap();

        let err = h.service.login("eve", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let h = harness().await;
        h.service.register("bob", "Str0ng!Passw0rd").await.unwrap();

        let session = h.service.login("bob", "Str0ng!Passw0rd").await.unwrap();
        assert_eq!(session.subject, "bob");

        let stored = h.users.get_credential_record("bob").await.unwrap();
        assert!(stored.password_hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_register_rejections() {
        let h = harness().await;

        assert!(matches!(
            h.service.register("bob", "weak").await,
            Err(AuthError::InvalidInput(_))
        ));
        assert!(matches!(
            h.service.register("", "Str0ng!Passw0rd").await,
            Err(AuthError::InvalidInput(_))
        ));
        assert!(matches!(
            h.service.register("bob smith", "Str0ng!Passw0rd").await,
            Err(AuthError::InvalidInput(_))
        ));
        assert!(matches!(
            h.service.register("alice", "Str0ng!Passw0rd").await,
            Err(AuthError::SubjectTaken)
        ));
    }

    #[tokio::test]
    async fn test_login_upgrades_outdated_hash() {
        let h = harness().await;
        let old = HashParameters {
            memory_cost: 512,
            iterations: 1,
            parallelism: 1,
            salt_length: 8,
            key_length: 16,
        };
        h.users
            .insert_credential_record(CredentialRecord {
                subject: "carol".to_string(),
                password_hash: hash_password("carols-pw", &old).unwrap(),
            })
            .await
            .unwrap();

        h.service.login("carol", "carols-pw").await.unwrap();

        let stored = h.users.get_credential_record("carol").await.unwrap();
        assert!(stored.password_hash.starts_with("$argon2id$v=19$m=1024,t=1,p=1$"));
        assert!(verify_password("carols-pw", &stored.password_hash).unwrap());
    }

    struct OfflineUserStore;

    #[async_trait]
    impl UserStore for OfflineUserStore {
        async fn get_credential_record(
            &self,
            _subject: &str,
        ) -> Result<CredentialRecord, UserStoreError> {
            Err(UserStoreError::Unavailable("connection refused".to_string()))
        }

        async fn insert_credential_record(
            &self,
            _record: CredentialRecord,
        ) -> Result<(), UserStoreError> {
            Err(UserStoreError::Unavailable("connection refused".to_string()))
        }

        async fn update_password_hash(
            &self,
            _subject: &str,
            _password_hash: String,
        ) -> Result<(), UserStoreError> {
            Err(UserStoreError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_user_store_outage_is_upstream_error() {
        let settings = fast_settings();
        let sessions = Arc::new(SessionStore::new(
            Arc::new(MemoryCache::new()),
            settings.session.clone(),
        ));
        let service =
            AuthenticationService::new(sessions, Arc::new(OfflineUserStore), &settings).unwrap();

        assert!(matches!(
            service.login("alice", "correct-pw").await,
            Err(AuthError::UpstreamError(_))
        ));
        assert!(matches!(
            service.register("bob", "Str0ng!Passw0rd").await,
            Err(AuthError::UpstreamError(_))
        ));
    }

    struct HangingUserStore;

    #[async_trait]
    impl UserStore for HangingUserStore {
        async fn get_credential_record(
            &self,
            _subject: &str,
        ) -> Result<CredentialRecord, UserStoreError> {
            std::future::pending().await
        }

        async fn insert_credential_record(
            &self,
            _record: CredentialRecord,
        ) -> Result<(), UserStoreError> {
            std::future::pending().await
        }

        async fn update_password_hash(
            &self,
            _subject: &str,
            _password_hash: String,
        ) -> Result<(), UserStoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_user_store_times_out() {
        let settings = fast_settings();
        let sessions = Arc::new(SessionStore::new(
            Arc::new(MemoryCache::new()),
            settings.session.clone(),
        ));
        let service =
            AuthenticationService::new(sessions, Arc::new(HangingUserStore), &settings).unwrap();

        assert!(matches!(
            service.login("alice", "correct-pw").await,
            Err(AuthError::UpstreamError(_))
        ));
    }
}
