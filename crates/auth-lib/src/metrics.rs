// ==============
// crates/auth-lib/src/metrics.rs

//! Central place for metric keys
pub const SESSION_CREATED: &str = "session.created";
pub const SESSION_VALIDATED: &str = "session.validated";
pub const SESSION_EXPIRED: &str = "session.expired";
pub const SESSION_ROTATED: &str = "session.rotated";
pub const SESSION_ROTATE_CONFLICT: &str = "session.rotate_conflict";
pub const SESSION_REVOKED: &str = "session.revoked";
pub const SESSION_TOKEN_COLLISION: &str = "session.token_collision";
pub const STORE_UNAVAILABLE: &str = "session.store_unavailable";
pub const LOGIN_SUCCEEDED: &str = "login.succeeded";
pub const LOGIN_FAILED: &str = "login.failed";
pub const LOGIN_LOCKED_OUT: &str = "login.locked_out";
pub const PASSWORD_REHASHED: &str = "password.rehashed";
