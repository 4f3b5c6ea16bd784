//! Login and refresh-token rotation endpoints.

use axum::{
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::{net::SocketAddr, sync::Arc};
use tracing::{instrument, warn};

use crate::auth::ClientContext;

use super::{
    error_response,
    state::AuthState,
    token_response,
    types::{Credentials, TokenResponse},
    utils::{device_info, extract_client_ip, extract_refresh_token},
};

fn client_context(headers: &HeaderMap, peer: Option<ConnectInfo<SocketAddr>>) -> ClientContext {
    ClientContext::new(
        device_info(headers),
        extract_client_ip(headers, peer.map(|ConnectInfo(addr)| addr)),
    )
}

#[utoipa::path(
    post,
    path = "/login",
    request_body = Credentials,
    responses(
        (status = 200, description = "Access token in the body, refresh token in the `refresh_token` cookie", body = TokenResponse),
        (status = 400, description = "Missing or malformed username/password"),
        (status = 401, description = "Invalid credentials"),
    ),
    tag = "auth"
)]
#[instrument(skip(state, peer, headers, payload))]
pub async fn login(
    state: Extension<Arc<AuthState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Option<Json<Credentials>>,
) -> Response {
    let Some(Json(credentials)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    if credentials.username.is_empty() || credentials.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "Username and password are required".to_string(),
        )
            .into_response();
    }

    let client = client_context(&headers, peer);

    match state
        .engine()
        .login(&credentials.username, &credentials.password, &client)
        .await
    {
        Ok(pair) => token_response(&state, pair),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    params(
        ("refresh_token" = String, Cookie, description = "Refresh token issued by login or a previous refresh")
    ),
    responses(
        (status = 200, description = "Token rotated; the presented refresh token is now spent", body = TokenResponse),
        (status = 401, description = "Missing, unknown, revoked or expired refresh token"),
    ),
    tag = "auth"
)]
#[instrument(skip(state, peer, headers))]
pub async fn refresh(
    state: Extension<Arc<AuthState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let Some(token) = extract_refresh_token(&headers) else {
        warn!("refresh without cookie");
        return (StatusCode::UNAUTHORIZED, "Invalid refresh token".to_string()).into_response();
    };

    let client = client_context(&headers, peer);

    match state.engine().refresh(&token, &client).await {
        Ok(pair) => token_response(&state, pair),
        Err(err) => error_response(&err),
    }
}
