// ============================
// crates/auth-lib/src/auth/token_generator.rs
// ============================
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
/** Secure token generation for session identifiers
Tokens are raw OS entropy encoded as URL-safe base64 without padding,
so they are cookie-safe and carry no decodable structure. */
use rand::{rngs::OsRng, TryRngCore};

use crate::error::AuthError;

/// Default token size in bytes (32 bytes = 256 bits of entropy)
pub const DEFAULT_TOKEN_BYTES: usize = 32;

/// Smallest token size accepted from configuration (128 bits)
pub const MIN_TOKEN_BYTES: usize = 16;

/// Largest token size accepted from configuration
pub const MAX_TOKEN_BYTES: usize = 64;

/** Generate a cryptographically secure random token
# Returns
A base64 URL-safe encoded string without padding */
pub fn generate_secure_token() -> Result<String, AuthError> {
    generate_secure_token_with_size(DEFAULT_TOKEN_BYTES)
}

/** Generate a cryptographically secure random token with specified size
# Arguments
* `bytes` - The size of the random token in bytes
# Errors
`HashingError` if the OS entropy source fails */
pub fn generate_secure_token_with_size(bytes: usize) -> Result<String, AuthError> {
    let mut buffer = vec![0u8; bytes];
    OsRng
        .try_fill_bytes(&mut buffer)
        .map_err(|e| AuthError::HashingError(format!("entropy source failed: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(buffer))
}

/// Whether `token` could have been produced by this generator.
///
/// Used to reject garbage cookie values before they reach the cache.
pub fn is_well_formed_token(token: &str) -> bool {
    let min_len = encoded_len(MIN_TOKEN_BYTES);
    let max_len = encoded_len(MAX_TOKEN_BYTES);
    (min_len..=max_len).contains(&token.len())
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn encoded_len(bytes: usize) -> usize {
    (bytes * 4).div_ceil(3)
}
