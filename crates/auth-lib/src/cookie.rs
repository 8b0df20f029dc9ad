//! `session_token` cookie helpers.
//!
//! Builds `Set-Cookie` header values for issued and cleared sessions and
//! pulls the token back out of an inbound `Cookie` header.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use techblog_auth_common::SESSION_COOKIE_NAME;

use crate::auth::token_generator::is_well_formed_token;

const EPOCH_EXPIRES: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// `SameSite` cookie policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Attributes applied to every session cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieSettings {
    /// Emit the `Secure` attribute (turn off only for plain-HTTP development)
    pub secure: bool,
    pub same_site: SameSite,
    pub path: String,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            secure: true,
            same_site: SameSite::Lax,
            path: "/".to_string(),
        }
    }
}

/// `Set-Cookie` value carrying a freshly issued token
pub fn session_cookie(token: &str, expires_at: DateTime<Utc>, settings: &CookieSettings) -> String {
    format!(
        "{SESSION_COOKIE_NAME}={token}; Expires={}{}",
        expires_at.format("%a, %d %b %Y %H:%M:%S GMT"),
        attributes(settings)
    )
}

/// `Set-Cookie` value that makes the browser drop the session cookie
pub fn clear_session_cookie(settings: &CookieSettings) -> String {
    format!(
        "{SESSION_COOKIE_NAME}=; Expires={EPOCH_EXPIRES}; Max-Age=0{}",
        attributes(settings)
    )
}

fn attributes(settings: &CookieSettings) -> String {
    let mut attrs = format!("; Path={}; HttpOnly", settings.path);
    // browsers drop SameSite=None cookies that are not Secure
    if settings.secure || settings.same_site == SameSite::None {
        attrs.push_str("; Secure");
    }
    attrs.push_str("; SameSite=");
    attrs.push_str(settings.same_site.as_str());
    attrs
}

/// What an inbound `Cookie` header says about the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieToken<'a> {
    /// No header, or no `session_token` pair in it
    Missing,
    /// A `session_token` pair whose value cannot be a token
    Malformed,
    Present(&'a str),
}

/// Extract the session token from a raw `Cookie` header
pub fn session_token_from_header(header: Option<&str>) -> CookieToken<'_> {
    let Some(header) = header else {
        return CookieToken::Missing;
    };

    let value = header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| name.trim() == SESSION_COOKIE_NAME)
        .map(|(_, value)| value.trim().trim_matches('"'));

    match value {
        None => CookieToken::Missing,
        Some(token) if is_well_formed_token(token) => CookieToken::Present(token),
        Some(_) => CookieToken::Malformed,
    }
}
