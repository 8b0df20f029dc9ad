// ============================
// crates/auth-lib/src/lib.rs
// ============================
//! Session and credential authentication for the tech blog API.
//!
//! Passwords are stored as Argon2id PHC strings; sessions are opaque random
//! tokens held in an external key-value cache with a TTL. The HTTP layer
//! talks to [`AuthService`] for login/logout/refresh and guards routes with
//! [`middleware::require_session`].

pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod cookie;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod telemetry;
pub mod user_store;

use std::sync::Arc;
use std::time::Duration;

pub use auth::{AuthService, AuthenticationService, Session, SessionStore};
pub use error::AuthError;
pub use techblog_auth_common::{AuthStatus, SessionRecord, SESSION_COOKIE_NAME};

use crate::cache::CacheClient;
use crate::config::Settings;
use crate::user_store::UserStore;

/// How often stale login throttle entries are pruned in the background
const THROTTLE_CLEANUP_PERIOD: Duration = Duration::from_secs(60 * 60);

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Login, logout, refresh and registration
    pub auth: Arc<dyn AuthService>,
    /// Session store, also the state of [`middleware::require_session`]
    pub sessions: Arc<SessionStore>,
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Wire the auth core to its collaborators.
    ///
    /// Inside a tokio runtime this also starts the hourly login throttle
    /// cleanup.
    pub fn new(
        cache: Arc<dyn CacheClient>,
        users: Arc<dyn UserStore>,
        settings: Settings,
    ) -> Result<Self, AuthError> {
        let sessions = Arc::new(SessionStore::new(cache, settings.session.clone()));
        let auth = Arc::new(AuthenticationService::new(
            sessions.clone(),
            users,
            &settings,
        )?);

        if tokio::runtime::Handle::try_current().is_ok() {
            let _ = auth.rate_limiter().spawn_cleanup(THROTTLE_CLEANUP_PERIOD);
        }

        Ok(Self {
            auth,
            sessions,
            settings: Arc::new(settings),
        })
    }
}
