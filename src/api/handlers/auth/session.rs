//! Bearer session lookup and logout.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{debug, error, instrument};

use super::{
    state::AuthState,
    types::{SessionResponse, StatusResponse},
    utils::{clear_refresh_cookie, extract_bearer_token, extract_refresh_token},
};

#[utoipa::path(
    get,
    path = "/auth/session",
    responses(
        (status = 200, description = "Access token is valid", body = SessionResponse),
        (status = 401, description = "Missing or invalid bearer token", body = StatusResponse)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip(state, headers))]
pub async fn session(state: Extension<Arc<AuthState>>, headers: HeaderMap) -> Response {
    let unauthorized = || {
        (
            StatusCode::UNAUTHORIZED,
            Json(StatusResponse::unauthorized()),
        )
            .into_response()
    };

    let Some(token) = extract_bearer_token(&headers) else {
        return unauthorized();
    };

    match state.engine().verify_access_token(&token) {
        Ok(claims) => (
            StatusCode::OK,
            Json(SessionResponse {
                user_id: claims.sub,
                jti: claims.jti,
                expires_at: claims.exp,
            }),
        )
            .into_response(),
        Err(err) => {
            debug!(kind = err.kind(), "bearer token rejected");
            unauthorized()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/auth/refresh",
    params(
        ("refresh_token" = Option<String>, Cookie, description = "Refresh token to revoke")
    ),
    responses(
        (status = 204, description = "Refresh token revoked and cookie cleared")
    ),
    tag = "auth"
)]
#[instrument(skip(state, headers))]
pub async fn logout(state: Extension<Arc<AuthState>>, headers: HeaderMap) -> Response {
    if let Some(token) = extract_refresh_token(&headers) {
        match state.engine().revoke(&token).await {
            Ok(revoked) => debug!(revoked, "logout"),
            Err(err) => error!(kind = err.kind(), "Failed to revoke refresh token: {err}"),
        }
    }

    // Always clear the cookie, even if the token was unknown.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_refresh_cookie(state.secure_cookies()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}
