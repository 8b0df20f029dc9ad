// ============================
// crates/auth-lib/src/middleware/mod.rs
// ============================
//! Middleware guarding routes that need a session.

pub mod session;

pub use session::{authorize, require_session, AuthenticatedSubject};
