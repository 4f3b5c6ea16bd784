use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{
    error_response,
    state::AuthState,
    types::{Credentials, RegisterResponse},
    utils::valid_username,
};

#[utoipa::path(
    post,
    path = "/register",
    request_body = Credentials,
    responses(
        (status = 201, description = "User created", body = RegisterResponse),
        (status = 400, description = "Missing or malformed username/password"),
        (status = 409, description = "Username already exists"),
    ),
    tag = "auth"
)]
#[instrument(skip(state, payload))]
pub async fn register(
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<Credentials>>,
) -> Response {
    let Some(Json(credentials)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    if !valid_username(&credentials.username) {
        return (StatusCode::BAD_REQUEST, "Invalid username".to_string()).into_response();
    }

    if credentials.password.is_empty() {
        return (StatusCode::BAD_REQUEST, "Invalid password".to_string()).into_response();
    }

    debug!("registering {:?}", credentials);

    match state
        .engine()
        .register(&credentials.username, &credentials.password)
        .await
    {
        Ok(user) => (
            StatusCode::CREATED,
            Json(RegisterResponse {
                id: user.id.to_string(),
                username: user.username,
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}
