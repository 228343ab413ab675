//! Request payloads and their validation.
//!
//! Each payload is a typed struct with an explicit `validate` returning the
//! full list of field errors, so a form with several problems reports them
//! all at once.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use utoipa::ToSchema;

use super::error::FieldError;

const MIN_PASSWORD_LENGTH: usize = 8;

static USERNAME_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]{4,30}$").expect("username format regex"));

static EMAIL_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email format regex"));

pub(crate) fn valid_username(username: &str) -> bool {
    USERNAME_FORMAT.is_match(username)
}

pub(crate) fn valid_email(email: &str) -> bool {
    EMAIL_FORMAT.is_match(email)
}

fn check_password_pair(password1: &str, password2: &str, errors: &mut Vec<FieldError>) {
    if password1.len() < MIN_PASSWORD_LENGTH {
        errors.push(FieldError::new(
            "password1",
            "Password must be at least 8 characters",
        ));
    }
    if password1 != password2 {
        errors.push(FieldError::new("password2", "Passwords do not match"));
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password1: String,
    pub password2: String,
}

impl RegisterRequest {
    pub(crate) fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if !valid_username(&self.username) {
            errors.push(FieldError::new(
                "username",
                "Username must be 4-30 letters, digits or underscores",
            ));
        }
        if !valid_email(&self.email) {
            errors.push(FieldError::new("email", "Invalid email address"));
        }
        check_password_pair(&self.password1, &self.password2, &mut errors);
        errors
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RecoveryRequest {
    pub email: String,
}

impl RecoveryRequest {
    pub(crate) fn validate(&self) -> Vec<FieldError> {
        if valid_email(&self.email) {
            Vec::new()
        } else {
            vec![FieldError::new("email", "Invalid email address")]
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub password1: String,
    pub password2: String,
}

impl ResetPasswordRequest {
    pub(crate) fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        check_password_pair(&self.password1, &self.password2, &mut errors);
        errors
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChangePasswordRequest {
    pub password: String,
    pub password1: String,
    pub password2: String,
}

impl ChangePasswordRequest {
    pub(crate) fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        check_password_pair(&self.password1, &self.password2, &mut errors);
        errors
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DeactivationRequest {
    pub username: String,
    pub password: String,
}
