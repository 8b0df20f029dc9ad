// ============================
// crates/auth-lib/src/auth/mod.rs
// ============================
//! Authentication module.

pub mod password;
pub mod rate_limit;
pub mod session;
pub mod token_generator;
mod service;
mod service_impl;

pub use password::{
    hash_password, needs_rehash, validate_password_strength, verify_password, HashParameters,
    PasswordRequirements, MIN_PASSWORD_LENGTH,
};
pub use rate_limit::AuthRateLimiter;
pub use service::AuthService;
pub use service_impl::AuthenticationService;
pub use session::{Session, SessionStore};
pub use token_generator::{generate_secure_token, generate_secure_token_with_size};
