use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use tracing::instrument;

use super::credentials::{hash_password, verify_password};
use super::error::AccountError;
use super::session::require_auth;
use super::storage::{lookup_user_by_id, update_password};
use super::types::ChangePasswordRequest;

#[utoipa::path(
    post,
    path = "/manage/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Validation failed", body = String),
        (status = 401, description = "Missing session or incorrect current password"),
    ),
    tag = "account"
)]
#[instrument(skip_all)]
pub async fn change_password(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let request: ChangePasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let errors = request.validate();
    if !errors.is_empty() {
        return AccountError::Validation(errors).into_response();
    }

    // Re-check the current credential; holding a session is not enough.
    let user = match lookup_user_by_id(&pool, principal.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return AccountError::AuthenticationFailure.into_response(),
        Err(err) => return AccountError::Storage(err).into_response(),
    };

    if !verify_password(&user.password_hash, &request.password) {
        return AccountError::AuthenticationFailure.into_response();
    }

    let password_hash = match hash_password(&request.password1) {
        Ok(hash) => hash,
        Err(err) => return AccountError::Storage(err).into_response(),
    };

    match update_password(&pool, user.id, &password_hash).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => AccountError::Storage(err).into_response(),
    }
}
