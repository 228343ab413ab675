use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, error, instrument};

use crate::api::email::{key_email, EmailSender};

use super::credentials::hash_password;
use super::error::AccountError;
use super::keys::KeyPurpose;
use super::state::AccountConfig;
use super::storage::{create_user, SignupOutcome};
use super::types::RegisterRequest;

#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created inactive; activation key issued and emailed"),
        (status = 400, description = "Validation failed", body = String),
        (status = 409, description = "User with the specified username or email already exists"),
    ),
    tag = "account"
)]
#[instrument(skip_all)]
pub async fn register(
    pool: Extension<PgPool>,
    config: Extension<AccountConfig>,
    sender: Extension<Arc<dyn EmailSender>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request: RegisterRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    debug!("register: {}", request.username);

    let errors = request.validate();
    if !errors.is_empty() {
        return AccountError::Validation(errors).into_response();
    }

    let password_hash = match hash_password(&request.password1) {
        Ok(hash) => hash,
        Err(err) => return AccountError::Storage(err).into_response(),
    };

    match create_user(
        &pool,
        &config,
        &request.username,
        &request.email,
        &password_hash,
    )
    .await
    {
        Ok(SignupOutcome::Created { token }) => {
            let message = key_email(
                config.base_url(),
                KeyPurpose::Activation,
                &request.username,
                &request.email,
                &token,
            );
            // Delivery is the transport's problem; the key is already issued.
            if let Err(err) = sender.send(&message) {
                error!("Failed to send activation email: {err}");
            }
            (StatusCode::CREATED, "User created".to_string()).into_response()
        }
        Ok(SignupOutcome::Conflict) => {
            error!("User already exists");
            (StatusCode::CONFLICT, "User already exists".to_string()).into_response()
        }
        Err(err) => AccountError::Storage(err).into_response(),
    }
}
