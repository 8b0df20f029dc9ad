// ============================
// crates/auth-lib/src/config.rs
// ============================
//! Configuration management.
//!
//! Layers, lowest to highest precedence: built-in defaults, an optional TOML
//! file, then `TECHBLOG_AUTH_*` environment variables (`__` separates nested
//! keys, e.g. `TECHBLOG_AUTH_SESSION__TTL_SECS=120`).
use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::password::{HashParameters, PasswordRequirements};
use crate::auth::token_generator::{DEFAULT_TOKEN_BYTES, MAX_TOKEN_BYTES, MIN_TOKEN_BYTES};
use crate::cookie::CookieSettings;

/// Config file read by [`Settings::load`]
pub const DEFAULT_CONFIG_FILE: &str = "techblog-auth.toml";

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "TECHBLOG_AUTH_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Log level
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub log_json: bool,
    pub session: SessionSettings,
    pub user_store: UserStoreSettings,
    /// Argon2id parameters for newly produced hashes
    pub hashing: HashParameters,
    pub cookie: CookieSettings,
    pub rate_limit: RateLimitSettings,
    pub password_requirements: PasswordRequirements,
}

/// Session lifetime and cache access
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Session TTL in seconds
    pub ttl_secs: u64,
    /// Random bytes per token
    pub token_bytes: usize,
    /// Attempts to find an unused token before giving up
    pub max_create_attempts: u32,
    /// Bound on every cache round trip, in milliseconds
    pub cache_timeout_ms: u64,
}

/// User store access
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserStoreSettings {
    /// Bound on every user store call, in milliseconds
    pub timeout_ms: u64,
}

/// Failed-login throttling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Failed logins before a subject is locked out
    pub max_attempts: u32,
    /// Lockout duration in seconds
    pub lockout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: false,
            session: SessionSettings::default(),
            user_store: UserStoreSettings::default(),
            hashing: HashParameters::default(),
            cookie: CookieSettings::default(),
            rate_limit: RateLimitSettings::default(),
            password_requirements: PasswordRequirements::default(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 60 * 60, // 1 hour
            token_bytes: DEFAULT_TOKEN_BYTES,
            max_create_attempts: 3,
            cache_timeout_ms: 500,
        }
    }
}

impl Default for UserStoreSettings {
    fn default() -> Self {
        Self { timeout_ms: 2_000 }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_secs: 5 * 60,
        }
    }
}

impl SessionSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }
}

impl UserStoreSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl RateLimitSettings {
    pub fn lockout(&self) -> Duration {
        Duration::from_secs(self.lockout_secs)
    }
}

impl Settings {
    /// Load from `techblog-auth.toml` (if present) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::extract(Self::figment().merge(Toml::file(DEFAULT_CONFIG_FILE)))
    }

    /// Load from an explicit TOML file and the environment
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::extract(Self::figment().merge(Toml::file(path.as_ref())))
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let settings: Settings = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the auth core cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "unknown log level {:?}",
                self.log_level
            )));
        }
        if self.session.ttl_secs == 0 {
            return invalid("session.ttl_secs must be positive");
        }
        if !(MIN_TOKEN_BYTES..=MAX_TOKEN_BYTES).contains(&self.session.token_bytes) {
            return Err(ConfigError::Invalid(format!(
                "session.token_bytes must be between {MIN_TOKEN_BYTES} and {MAX_TOKEN_BYTES}"
            )));
        }
        if self.session.max_create_attempts == 0 {
            return invalid("session.max_create_attempts must be at least 1");
        }
        if self.session.cache_timeout_ms == 0 || self.user_store.timeout_ms == 0 {
            return invalid("timeouts must be positive");
        }
        if self.rate_limit.max_attempts == 0 {
            return invalid("rate_limit.max_attempts must be at least 1");
        }
        if self.password_requirements.min_length < 8 {
            return invalid("password_requirements.min_length must be at least 8");
        }
        self.hashing
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookie::SameSite;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.session.ttl(), Duration::from_secs(3600));
        assert_eq!(settings.session.token_bytes, 32);
        assert!(settings.cookie.secure);
    }

    #[test]
    fn test_settings_validation() {
        let settings = Settings::default();

        let mut invalid = settings.clone();
        invalid.log_level = "loud".to_string();
        assert!(invalid.validate().is_err());

        let mut invalid = settings.clone();
        invalid.session.ttl_secs = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = settings.clone();
        invalid.session.token_bytes = 8;
        assert!(invalid.validate().is_err());

        let mut invalid = settings.clone();
        invalid.password_requirements.min_length = 4;
        assert!(invalid.validate().is_err());

        let mut invalid = settings.clone();
        invalid.hashing.salt_length = 2;
        assert!(matches!(invalid.validate(), Err(ConfigError::Invalid(_))));

        let mut invalid = settings;
        invalid.rate_limit.max_attempts = 0;
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_load_settings() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
                log_level = "debug"

                [session]
                ttl_secs = 600

                [cookie]
                same_site = "strict"

                [hashing]
                memory_cost = 4096
                "#,
            )?;
            jail.set_env("TECHBLOG_AUTH_LOG_LEVEL", "warn");
            jail.set_env("TECHBLOG_AUTH_SESSION__TTL_SECS", "120");

            let settings = Settings::load().map_err(|e| e.to_string())?;
            // environment wins over the file
            assert_eq!(settings.log_level, "warn");
            assert_eq!(settings.session.ttl_secs, 120);
            assert_eq!(settings.cookie.same_site, SameSite::Strict);
            assert_eq!(settings.hashing.memory_cost, 4096);
            // untouched keys keep their defaults
            assert_eq!(settings.hashing.iterations, 2);
            assert_eq!(settings.session.cache_timeout_ms, 500);
            Ok(())
        });
    }

    #[test]
    fn test_load_from_rejects_invalid_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("bad.toml", "[session]\nttl_secs = 0\n")?;
            let result = Settings::load_from("bad.toml");
            assert!(matches!(result, Err(ConfigError::Invalid(_))));
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        figment::Jail::expect_with(|_jail| {
            let settings = Settings::load().map_err(|e| e.to_string())?;
            assert_eq!(settings, Settings::default());
            Ok(())
        });
    }
}
