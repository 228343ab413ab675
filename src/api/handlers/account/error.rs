//! Error taxonomy for the account subsystem.
//!
//! Redemption failures collapse into [`AccountError::KeyInvalidOrExpired`]
//! without distinguishing expired, consumed, or never-existed keys; the
//! caller learns nothing about which predicate failed. Login failures are
//! equally generic.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

/// A single field-level validation failure, surfaced inline to the submitter.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub(crate) fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("incorrect username or password")]
    AuthenticationFailure,

    #[error("key is invalid or expired")]
    KeyInvalidOrExpired,

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl IntoResponse for AccountError {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::Validation(errors) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "errors": errors }))).into_response()
            }
            Self::AuthenticationFailure => (
                StatusCode::UNAUTHORIZED,
                "Incorrect username or password".to_string(),
            )
                .into_response(),
            Self::KeyInvalidOrExpired => (
                StatusCode::BAD_REQUEST,
                "Invalid or expired key".to_string(),
            )
                .into_response(),
            Self::NotFound => StatusCode::NOT_FOUND.into_response(),
            Self::Storage(err) => {
                error!("Storage failure: {err:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn validation_maps_to_bad_request() {
        let response =
            AccountError::Validation(vec![FieldError::new("email", "Invalid email address")])
                .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn authentication_failure_is_generic_401() {
        let response = AccountError::AuthenticationFailure.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn key_invalid_maps_to_bad_request() {
        let response = AccountError::KeyInvalidOrExpired.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn storage_maps_to_internal_error() {
        let response = AccountError::Storage(anyhow!("boom")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
