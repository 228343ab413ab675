use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Redirect},
};
use sqlx::PgPool;
use tracing::instrument;

use super::error::AccountError;
use super::keys::valid_token_format;
use super::state::AccountConfig;
use super::storage::redeem_activation;
use super::types::valid_username;

#[utoipa::path(
    get,
    path = "/activate/{username}/{token}",
    params(
        ("username" = String, Path, description = "Account username"),
        ("token" = String, Path, description = "64 lowercase hex characters"),
    ),
    responses(
        (status = 200, description = "Account activated; key consumed"),
        (status = 303, description = "Unknown user or invalid key; neutral redirect"),
    ),
    tag = "account"
)]
#[instrument(skip_all)]
pub async fn activate(
    Path((username, token)): Path<(String, String)>,
    pool: Extension<PgPool>,
    config: Extension<AccountConfig>,
) -> impl IntoResponse {
    if !valid_username(&username) || !valid_token_format(&token) {
        return Redirect::to(config.base_url()).into_response();
    }

    match redeem_activation(&pool, &username, &token).await {
        Ok(()) => (StatusCode::OK, "Account activated".to_string()).into_response(),
        Err(AccountError::NotFound | AccountError::KeyInvalidOrExpired) => {
            Redirect::to(config.base_url()).into_response()
        }
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;

    fn config() -> AccountConfig {
        AccountConfig::new(
            "https://accounts.tld".to_string(),
            SecretString::from("sea-salt"),
        )
    }

    #[tokio::test]
    async fn activate_malformed_token_redirects() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = activate(
            Path(("alice".to_string(), "A".repeat(64))),
            Extension(pool),
            Extension(config()),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        Ok(())
    }

    #[tokio::test]
    async fn activate_malformed_username_redirects() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = activate(
            Path(("a!".to_string(), "a".repeat(64))),
            Extension(pool),
            Extension(config()),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        Ok(())
    }
}
