// ============================
// crates/auth-lib/src/auth/password.rs
// ============================
//! Password hashing and verification.
//!
//! Hashes are Argon2id PHC strings
//! (`$argon2id$v=19$m=<kib>,t=<iterations>,p=<lanes>$<salt>$<key>`), so every
//! stored hash carries the cost parameters it was made with and can still be
//! verified after the deployment's parameters change.
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::{rngs::OsRng, TryRngCore};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::error::AuthError;

/// Minimum password length
pub const MIN_PASSWORD_LENGTH: usize = 10;

/// Maximum accepted password length
pub const MAX_PASSWORD_LENGTH: usize = 128;

const MIN_SALT_LENGTH: usize = 8;
const MAX_SALT_LENGTH: usize = 48;
const MIN_KEY_LENGTH: usize = 10;
const MAX_KEY_LENGTH: usize = 64;

/// Upper bounds on the cost accepted from a stored hash or configuration
const MAX_VERIFY_MEMORY_KIB: u32 = 1024 * 1024;
const MAX_VERIFY_ITERATIONS: u32 = 64;
const MAX_VERIFY_PARALLELISM: u32 = 16;

/// Argon2id cost parameters, embedded in every hash produced with them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashParameters {
    /// Memory cost in KiB
    pub memory_cost: u32,
    /// Number of passes
    pub iterations: u32,
    /// Degree of parallelism (lanes)
    pub parallelism: u32,
    /// Salt length in bytes
    pub salt_length: usize,
    /// Derived key length in bytes
    pub key_length: usize,
}

impl Default for HashParameters {
    // OWASP baseline for Argon2id: 19 MiB, 2 passes, 1 lane
    fn default() -> Self {
        Self {
            memory_cost: 19 * 1024,
            iterations: 2,
            parallelism: 1,
            salt_length: 16,
            key_length: 32,
        }
    }
}

impl HashParameters {
    /// Check the parameters against the bounds of Argon2 and the PHC format
    pub fn validate(&self) -> Result<(), AuthError> {
        let invalid = |reason: String| Err(AuthError::HashingError(reason));

        if self.iterations == 0 || self.parallelism == 0 {
            return invalid("iterations and parallelism must be positive".to_string());
        }
        if self.iterations > MAX_VERIFY_ITERATIONS
            || self.parallelism > MAX_VERIFY_PARALLELISM
            || self.memory_cost > MAX_VERIFY_MEMORY_KIB
        {
            return invalid(format!(
                "cost above the accepted maximum (m={MAX_VERIFY_MEMORY_KIB}, \
                 t={MAX_VERIFY_ITERATIONS}, p={MAX_VERIFY_PARALLELISM})"
            ));
        }
        if self.memory_cost < 8 * self.parallelism {
            return invalid(format!(
                "memory_cost must be at least {} KiB for parallelism {}",
                8 * self.parallelism,
                self.parallelism
            ));
        }
        if !(MIN_SALT_LENGTH..=MAX_SALT_LENGTH).contains(&self.salt_length) {
            return invalid(format!(
                "salt_length must be between {MIN_SALT_LENGTH} and {MAX_SALT_LENGTH} bytes"
            ));
        }
        if !(MIN_KEY_LENGTH..=MAX_KEY_LENGTH).contains(&self.key_length) {
            return invalid(format!(
                "key_length must be between {MIN_KEY_LENGTH} and {MAX_KEY_LENGTH} bytes"
            ));
        }
        Ok(())
    }

    fn hasher(&self) -> Result<Argon2<'static>, AuthError> {
        self.validate()?;
        let params = Params::new(
            self.memory_cost,
            self.iterations,
            self.parallelism,
            Some(self.key_length),
        )
        .map_err(|e| AuthError::HashingError(e.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Hash a password with Argon2id and a fresh random salt
pub fn hash_password(plain: &str, params: &HashParameters) -> Result<String, AuthError> {
    let hasher = params.hasher()?;

    let mut salt = vec![0u8; params.salt_length];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| AuthError::HashingError(format!("entropy source failed: {e}")))?;
    let salt_string =
        SaltString::encode_b64(&salt).map_err(|e| AuthError::HashingError(e.to_string()))?;
    salt.zeroize();

    let hash = hasher
        .hash_password(plain.as_bytes(), &salt_string)
        .map_err(|e| AuthError::HashingError(e.to_string()))?
        .to_string();
    Ok(hash)
}

/// Verify a password against an encoded hash.
///
/// Returns `Ok(false)` for a well-formed hash that does not match and
/// `MalformedHash` when the string cannot be interpreted.
pub fn verify_password(plain: &str, encoded: &str) -> Result<bool, AuthError> {
    let parsed = parse_hash(encoded)?;
    let expected = parsed.key.as_bytes();

    // every input but the password comes from the stored string, so Argon2
    // refusing them means the hash is corrupt
    let mut derived = vec![0u8; expected.len()];
    Argon2::new(Algorithm::Argon2id, parsed.version, parsed.params)
        .hash_password_into(plain.as_bytes(), &parsed.salt, &mut derived)
        .map_err(|e| AuthError::MalformedHash(e.to_string()))?;

    let matches = keys_match(&derived, expected);
    derived.zeroize();
    Ok(matches)
}

/// Whether a stored hash was produced with parameters other than `params`
pub fn needs_rehash(encoded: &str, params: &HashParameters) -> Result<bool, AuthError> {
    let parsed = parse_hash(encoded)?;
    let salt_len = parsed.salt.len();

    Ok(parsed.version != Version::V0x13
        || parsed.params.m_cost() != params.memory_cost
        || parsed.params.t_cost() != params.iterations
        || parsed.params.p_cost() != params.parallelism
        || parsed.key.len() != params.key_length
        || salt_len != params.salt_length)
}

/// Equal-length, no-early-exit comparison of derived keys
fn keys_match(derived: &[u8], expected: &[u8]) -> bool {
    derived.len() == expected.len() && bool::from(derived.ct_eq(expected))
}

struct ParsedHash {
    version: Version,
    params: Params,
    salt: Vec<u8>,
    key: argon2::password_hash::Output,
}

fn parse_hash(encoded: &str) -> Result<ParsedHash, AuthError> {
    let malformed = |what: &str| AuthError::MalformedHash(what.to_string());

    let hash = PasswordHash::new(encoded).map_err(|e| AuthError::MalformedHash(e.to_string()))?;
    if hash.algorithm != argon2::ARGON2ID_IDENT {
        return Err(malformed("unsupported algorithm tag"));
    }

    let version = match hash.version {
        Some(v) => Version::try_from(v).map_err(|_| malformed("unsupported version"))?,
        None => Version::V0x13,
    };
    let params = Params::try_from(&hash).map_err(|e| AuthError::MalformedHash(e.to_string()))?;
    if params.m_cost() > MAX_VERIFY_MEMORY_KIB {
        return Err(malformed("memory cost out of range"));
    }
    if params.t_cost() > MAX_VERIFY_ITERATIONS || params.p_cost() > MAX_VERIFY_PARALLELISM {
        return Err(malformed("time or lane cost out of range"));
    }

    let mut salt_buf = [0u8; 64];
    let salt = hash
        .salt
        .ok_or_else(|| malformed("missing salt"))?
        .decode_b64(&mut salt_buf)
        .map_err(|e| AuthError::MalformedHash(format!("salt: {e}")))?
        .to_vec();
    if !(MIN_SALT_LENGTH..=MAX_SALT_LENGTH).contains(&salt.len()) {
        return Err(malformed("salt length out of range"));
    }
    let key = hash.hash.ok_or_else(|| malformed("missing derived key"))?;

    Ok(ParsedHash {
        version,
        params,
        salt,
        key,
    })
}

/// Password complexity requirements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordRequirements {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
}

impl Default for PasswordRequirements {
    fn default() -> Self {
        Self {
            min_length: MIN_PASSWORD_LENGTH,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: true,
        }
    }
}

/// Check if a password meets the complexity requirements
pub fn validate_password_strength(password: &str, requirements: &PasswordRequirements) -> bool {
    let length = password.chars().count();
    if length < requirements.min_length || length > MAX_PASSWORD_LENGTH {
        return false;
    }

    if requirements.require_uppercase && !password.chars().any(|c| c.is_uppercase()) {
        return false;
    }

    if requirements.require_lowercase && !password.chars().any(|c| c.is_lowercase()) {
        return false;
    }

    if requirements.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }

    if requirements.require_special && !password.chars().any(|c| !c.is_alphanumeric()) {
        return false;
    }

    true
}
