//! Password recovery: key request, reset-form gate, and redemption.
//!
//! Recovery is the two-step flow: `GET` validates the key and gates the
//! reset form without consuming anything; the follow-up `POST` carrying the
//! same `(username, token)` pair plus the new password pair consumes the key
//! and sets the credential together.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, instrument};

use crate::api::email::{key_email, EmailSender};

use super::credentials::hash_password;
use super::error::{AccountError, FieldError};
use super::keys::{valid_token_format, KeyPurpose};
use super::state::AccountConfig;
use super::storage::{
    issue_key, lookup_user_by_email, lookup_user_by_username, peek_key, redeem_recovery,
};
use super::types::{valid_username, RecoveryRequest, ResetPasswordRequest};

#[utoipa::path(
    post,
    path = "/recover",
    request_body = RecoveryRequest,
    responses(
        (status = 202, description = "Recovery key issued and emailed"),
        (status = 400, description = "Invalid or unknown email address", body = String),
    ),
    tag = "account"
)]
#[instrument(skip_all)]
pub async fn request_recovery(
    pool: Extension<PgPool>,
    config: Extension<AccountConfig>,
    sender: Extension<Arc<dyn EmailSender>>,
    payload: Option<Json<RecoveryRequest>>,
) -> impl IntoResponse {
    let request: RecoveryRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let errors = request.validate();
    if !errors.is_empty() {
        return AccountError::Validation(errors).into_response();
    }

    let user = match lookup_user_by_email(&pool, &request.email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return AccountError::Validation(vec![FieldError::new(
                "email",
                "There is no account associated with that email address",
            )])
            .into_response();
        }
        Err(err) => return AccountError::Storage(err).into_response(),
    };

    let token = match issue_key(&pool, &config, user.id, &user.username, KeyPurpose::Recovery).await
    {
        Ok(token) => token,
        Err(err) => return AccountError::Storage(err).into_response(),
    };

    let message = key_email(
        config.base_url(),
        KeyPurpose::Recovery,
        &user.username,
        &user.email,
        &token,
    );
    if let Err(err) = sender.send(&message) {
        error!("Failed to send recovery email: {err}");
    }

    (StatusCode::ACCEPTED, "Recovery email sent".to_string()).into_response()
}

#[utoipa::path(
    get,
    path = "/recover/{username}/{token}",
    params(
        ("username" = String, Path, description = "Account username"),
        ("token" = String, Path, description = "64 lowercase hex characters"),
    ),
    responses(
        (status = 204, description = "Key is redeemable; show the reset form"),
        (status = 303, description = "Unknown user or invalid key; neutral redirect"),
    ),
    tag = "account"
)]
#[instrument(skip_all)]
pub async fn recovery_form(
    Path((username, token)): Path<(String, String)>,
    pool: Extension<PgPool>,
    config: Extension<AccountConfig>,
) -> impl IntoResponse {
    if !valid_username(&username) || !valid_token_format(&token) {
        return Redirect::to(config.base_url()).into_response();
    }

    let user = match lookup_user_by_username(&pool, &username).await {
        Ok(Some(user)) => user,
        Ok(None) => return Redirect::to(config.base_url()).into_response(),
        Err(err) => return AccountError::Storage(err).into_response(),
    };

    // Peek only: the key is consumed on the follow-up POST, not here.
    match peek_key(&pool, user.id, &token, KeyPurpose::Recovery).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => Redirect::to(config.base_url()).into_response(),
        Err(err) => AccountError::Storage(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/recover/{username}/{token}",
    request_body = ResetPasswordRequest,
    params(
        ("username" = String, Path, description = "Account username"),
        ("token" = String, Path, description = "64 lowercase hex characters"),
    ),
    responses(
        (status = 200, description = "Password reset; key consumed"),
        (status = 400, description = "Password pair invalid; key left unconsumed", body = String),
        (status = 303, description = "Unknown user or invalid key; neutral redirect"),
    ),
    tag = "account"
)]
#[instrument(skip_all)]
pub async fn recover(
    Path((username, token)): Path<(String, String)>,
    pool: Extension<PgPool>,
    config: Extension<AccountConfig>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    if !valid_username(&username) || !valid_token_format(&token) {
        return Redirect::to(config.base_url()).into_response();
    }

    let request: ResetPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    // A bad password pair must not burn the key.
    let errors = request.validate();
    if !errors.is_empty() {
        return AccountError::Validation(errors).into_response();
    }

    let password_hash = match hash_password(&request.password1) {
        Ok(hash) => hash,
        Err(err) => return AccountError::Storage(err).into_response(),
    };

    match redeem_recovery(&pool, &username, &token, &password_hash).await {
        Ok(()) => (StatusCode::OK, "Password reset".to_string()).into_response(),
        Err(AccountError::NotFound | AccountError::KeyInvalidOrExpired) => {
            Redirect::to(config.base_url()).into_response()
        }
        Err(err) => err.into_response(),
    }
}
