//! Auth handlers: registration, login, refresh-token rotation, logout and
//! bearer session lookup.
//!
//! Every refresh failure (missing cookie, unknown, revoked or expired token)
//! answers with the same 401 so callers cannot probe the ledger. The
//! specific kind only shows up in the logs.

pub(crate) mod login;
pub(crate) mod register;
pub(crate) mod session;
mod state;
pub(crate) mod types;
mod utils;

pub use state::AuthState;

use axum::{
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use tracing::{error, warn};

use crate::auth::{AuthError, TokenPair};

use self::{types::TokenResponse, utils::refresh_cookie};

/// Map an engine failure to a response without revealing more than the
/// status class.
pub(super) fn error_response(err: &AuthError) -> Response {
    match err {
        AuthError::Conflict => {
            warn!(kind = err.kind(), "registration rejected");
            (StatusCode::CONFLICT, "Username already exists".to_string()).into_response()
        }
        AuthError::InvalidCredentials => {
            warn!(kind = err.kind(), "login rejected");
            (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string()).into_response()
        }
        AuthError::InvalidToken | AuthError::RevokedToken | AuthError::ExpiredToken => {
            warn!(kind = err.kind(), "refresh rejected");
            (StatusCode::UNAUTHORIZED, "Invalid refresh token".to_string()).into_response()
        }
        AuthError::Store(source) => {
            error!(kind = err.kind(), "Storage failure: {source:?}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
                .into_response()
        }
        AuthError::Crypto(source) => {
            error!(kind = err.kind(), "Crypto failure: {source:?}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
                .into_response()
        }
    }
}

/// Deliver a fresh token pair: the access token in the body, the refresh
/// token as a cookie.
pub(super) fn token_response(state: &AuthState, pair: TokenPair) -> Response {
    let config = state.engine().config();
    let expires_at = Utc::now() + config.refresh_token_ttl();
    let cookie = match refresh_cookie(
        &pair.refresh_token,
        expires_at,
        config.refresh_token_ttl_seconds(),
        state.secure_cookies(),
    ) {
        Ok(cookie) => cookie,
        Err(err) => {
            error!("Failed to build refresh cookie: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
                .into_response();
        }
    };

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);

    (
        StatusCode::OK,
        headers,
        Json(TokenResponse {
            token_access: pair.access_token,
        }),
    )
        .into_response()
}
