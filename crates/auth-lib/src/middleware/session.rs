use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::COOKIE,
    middleware::Next,
    response::{IntoResponse, Response},
};
use techblog_auth_common::AuthStatus;
use tracing::{debug, warn};

use crate::auth::SessionStore;
use crate::cookie::{session_token_from_header, CookieToken};
use crate::error::AuthError;

/// Request extension set by [`require_session`] for downstream handlers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedSubject(pub String);

/// Decide what a raw `Cookie` header is worth.
///
/// A missing cookie, an unknown token and an expired token all come back as
/// `Unauthorized`. A store outage is `ServiceUnavailable`, never authorized.
pub async fn authorize(store: &SessionStore, cookie_header: Option<&str>) -> AuthStatus {
    let token = match session_token_from_header(cookie_header) {
        CookieToken::Missing => return AuthStatus::Unauthorized,
        CookieToken::Malformed => return AuthStatus::BadRequest,
        CookieToken::Present(token) => token,
    };

    match store.validate(token).await {
        Ok(subject) => AuthStatus::Authorized(subject),
        Err(err) if err.is_unavailable() => {
            warn!(error = %err, "session store unavailable during authorization");
            AuthStatus::ServiceUnavailable
        },
        Err(err) => {
            debug!(error = %err, "session rejected");
            AuthStatus::Unauthorized
        },
    }
}

/// Axum middleware: pass authorized requests through with an
/// [`AuthenticatedSubject`] extension, answer everything else directly.
pub async fn require_session(
    State(store): State<Arc<SessionStore>>,
    mut request: Request,
    next: Next,
) -> Response {
    let cookie_header = request
        .headers()
        .get(COOKIE)
        .and_then(|value| value.to_str().ok());

    match authorize(&store, cookie_header).await {
        AuthStatus::Authorized(subject) => {
            request.extensions_mut().insert(AuthenticatedSubject(subject));
            next.run(request).await
        },
        AuthStatus::Unauthorized => AuthError::NotFound.into_response(),
        AuthStatus::BadRequest => {
            AuthError::InvalidInput("malformed session cookie".to_string()).into_response()
        },
        AuthStatus::ServiceUnavailable => {
            AuthError::StoreUnavailable("session store unavailable".to_string()).into_response()
        },
    }
}
