use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use tracing::{debug, error, instrument};

use super::credentials::verify_password;
use super::error::AccountError;
use super::session::{clear_session_cookie, extract_session_token, session_cookie};
use super::state::AccountConfig;
use super::storage::{delete_session, insert_session, lookup_user_by_username};
use super::types::{valid_username, LoginRequest};

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful; session cookie set"),
        (status = 401, description = "Incorrect username or password", body = String),
    ),
    tag = "account"
)]
#[instrument(skip_all)]
pub async fn login(
    pool: Extension<PgPool>,
    config: Extension<AccountConfig>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    // One generic failure for malformed, unknown, inactive, and wrong-password
    // cases alike; nothing distinguishes which check failed.
    if !valid_username(&request.username) {
        return AccountError::AuthenticationFailure.into_response();
    }

    let user = match lookup_user_by_username(&pool, &request.username).await {
        Ok(Some(user)) => user,
        Ok(None) => return AccountError::AuthenticationFailure.into_response(),
        Err(err) => return AccountError::Storage(err).into_response(),
    };

    if !user.active || !verify_password(&user.password_hash, &request.password) {
        return AccountError::AuthenticationFailure.into_response();
    }

    let token = match insert_session(&pool, user.id, config.session_ttl_seconds()).await {
        Ok(token) => token,
        Err(err) => return AccountError::Storage(err).into_response(),
    };

    debug!("login successful: {}", user.username);

    let mut headers = HeaderMap::new();
    match session_cookie(&config, &token) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error".to_string(),
            )
                .into_response();
        }
    }

    (StatusCode::OK, headers, "Login successful".to_string()).into_response()
}

#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 204, description = "Session cleared"),
    ),
    tag = "account"
)]
#[instrument(skip_all)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    config: Extension<AccountConfig>,
) -> impl IntoResponse {
    if let Some(token) = extract_session_token(&headers) {
        let token_hash = super::keys::hash_session_token(&token);
        if let Err(err) = delete_session(&pool, &token_hash).await {
            error!("Failed to delete session: {err}");
        }
    }

    // Always clear the cookie, even if the session record was missing.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(&config) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}
