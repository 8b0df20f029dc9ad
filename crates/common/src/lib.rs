// ================
// common/src/lib.rs
// ================
//! Types shared between the authentication core and the HTTP layer
//! of the tech blog API: the cache record layout and the authorization
//! verdict handed back to request handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the cookie carrying the opaque session token
pub const SESSION_COOKIE_NAME: &str = "session_token";

/// Prefix of every session key in the cache (`session:<token>`)
pub const SESSION_KEY_PREFIX: &str = "session:";

/// Build the cache key for a session token
pub fn session_key(token: &str) -> String {
    format!("{SESSION_KEY_PREFIX}{token}")
}

/// Value stored under `session:<token>`
///
/// `expires_at` serializes as an RFC 3339 timestamp.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Identity the token was issued to
    pub subject: String,
    /// Absolute expiry of the session
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Whether the record is past its expiry at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Verdict for an inbound request carrying (or lacking) a session cookie
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status", content = "subject")]
pub enum AuthStatus {
    /// Token valid; carries the authenticated subject
    Authorized(String),
    /// No cookie, unknown token, or expired token
    Unauthorized,
    /// Cookie present but its value is not a token
    BadRequest,
    /// The session store could not be consulted
    ServiceUnavailable,
}

impl AuthStatus {
    pub fn is_authorized(&self) -> bool {
        matches!(self, AuthStatus::Authorized(_))
    }

    /// The subject, if authorized
    pub fn subject(&self) -> Option<&str> {
        match self {
            AuthStatus::Authorized(subject) => Some(subject),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_session_key_layout() {
        assert_eq!(session_key("abc"), "session:abc");
        assert_ne!(session_key("abc"), session_key("abd"));
    }

    #[test]
    fn test_record_uses_rfc3339() {
        let record = SessionRecord {
            subject: "alice".to_string(),
            expires_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"subject":"alice","expires_at":"2024-05-01T12:00:00Z"}"#
        );

        let back: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_expiry_boundary() {
        let expires_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let record = SessionRecord {
            subject: "alice".to_string(),
            expires_at,
        };
        assert!(!record.is_expired_at(expires_at - chrono::Duration::seconds(1)));
        assert!(record.is_expired_at(expires_at));
    }

    #[test]
    fn test_auth_status_helpers() {
        let ok = AuthStatus::Authorized("alice".to_string());
        assert!(ok.is_authorized());
        assert_eq!(ok.subject(), Some("alice"));
        assert!(!AuthStatus::ServiceUnavailable.is_authorized());
        assert_eq!(AuthStatus::Unauthorized.subject(), None);
    }
}
