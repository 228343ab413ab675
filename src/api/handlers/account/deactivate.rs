use axum::{
    extract::{Extension, Path},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, instrument};

use crate::api::email::{key_email, EmailSender};

use super::credentials::verify_password;
use super::error::AccountError;
use super::keys::{valid_token_format, KeyPurpose};
use super::session::{clear_session_cookie, require_auth};
use super::state::AccountConfig;
use super::storage::{issue_key, lookup_user_by_id, redeem_deactivation};
use super::types::{valid_username, DeactivationRequest};

#[utoipa::path(
    post,
    path = "/manage/deactivate",
    request_body = DeactivationRequest,
    responses(
        (status = 202, description = "Deactivation key issued and emailed"),
        (status = 401, description = "Missing session or incorrect credentials"),
        (status = 403, description = "Username does not match the authenticated user"),
    ),
    tag = "account"
)]
#[instrument(skip_all)]
pub async fn request_deactivation(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    config: Extension<AccountConfig>,
    sender: Extension<Arc<dyn EmailSender>>,
    payload: Option<Json<DeactivationRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let request: DeactivationRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    // Cross-user deactivation is forbidden: no key is issued, nothing mutates.
    if request.username != principal.username {
        return (
            StatusCode::FORBIDDEN,
            "Cannot deactivate another user's account".to_string(),
        )
            .into_response();
    }

    let user = match lookup_user_by_id(&pool, principal.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return AccountError::AuthenticationFailure.into_response(),
        Err(err) => return AccountError::Storage(err).into_response(),
    };

    if !verify_password(&user.password_hash, &request.password) {
        return AccountError::AuthenticationFailure.into_response();
    }

    let token = match issue_key(
        &pool,
        &config,
        user.id,
        &user.username,
        KeyPurpose::Deactivation,
    )
    .await
    {
        Ok(token) => token,
        Err(err) => return AccountError::Storage(err).into_response(),
    };

    let message = key_email(
        config.base_url(),
        KeyPurpose::Deactivation,
        &user.username,
        &user.email,
        &token,
    );
    if let Err(err) = sender.send(&message) {
        error!("Failed to send deactivation email: {err}");
    }

    (StatusCode::ACCEPTED, "Deactivation email sent".to_string()).into_response()
}

#[utoipa::path(
    get,
    path = "/manage/deactivate/{username}/{token}",
    params(
        ("username" = String, Path, description = "Account username"),
        ("token" = String, Path, description = "64 lowercase hex characters"),
    ),
    responses(
        (status = 200, description = "Account deactivated; key consumed, sessions destroyed"),
        (status = 303, description = "Unknown user or invalid key; neutral redirect"),
    ),
    tag = "account"
)]
#[instrument(skip_all)]
pub async fn deactivate(
    Path((username, token)): Path<(String, String)>,
    pool: Extension<PgPool>,
    config: Extension<AccountConfig>,
) -> impl IntoResponse {
    if !valid_username(&username) || !valid_token_format(&token) {
        return Redirect::to(config.base_url()).into_response();
    }

    match redeem_deactivation(&pool, &username, &token).await {
        Ok(()) => {
            // Sessions are already gone server-side; drop the cookie too.
            let mut headers = HeaderMap::new();
            if let Ok(cookie) = clear_session_cookie(&config) {
                headers.insert(SET_COOKIE, cookie);
            }
            (
                StatusCode::OK,
                headers,
                "Account deactivated".to_string(),
            )
                .into_response()
        }
        Err(AccountError::NotFound | AccountError::KeyInvalidOrExpired) => {
            Redirect::to(config.base_url()).into_response()
        }
        Err(err) => err.into_response(),
    }
}
