use async_trait::async_trait;

use super::Session;
use crate::error::AuthError;

/// Login, logout, refresh and registration as seen by request handlers
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Check credentials and open a session.
    ///
    /// Unknown subjects and wrong passwords both yield `InvalidCredentials`.
    async fn login(&self, subject: &str, password: &str) -> Result<Session, AuthError>;

    /// Close a session. Never fails from the caller's point of view.
    async fn logout(&self, token: &str);

    /// Swap a valid token for a fresh one
    async fn refresh(&self, token: &str) -> Result<Session, AuthError>;

    /// Create a new subject with a hashed password
    async fn register(&self, subject: &str, password: &str) -> Result<(), AuthError>;
}
