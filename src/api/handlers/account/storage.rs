//! Database helpers for users, authentication keys, and sessions.
//!
//! Key redemption is an atomic conditional update: the `used` flip and the
//! user mutation commit in one transaction, and the `UPDATE ... WHERE used =
//! FALSE AND expires_at >= NOW()` guard guarantees at most one successful
//! redemption per key under concurrent attempts. Consumed keys stay in
//! storage as an audit trail.

use anyhow::{anyhow, Context, Result};
use sqlx::{PgPool, Row};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::error::AccountError;
use super::keys::{generate_key_token, generate_session_token, KeyPurpose};
use super::state::AccountConfig;

/// One row of `users`, as the handlers need it.
pub(crate) struct UserRecord {
    pub(crate) id: Uuid,
    pub(crate) username: String,
    pub(crate) email: String,
    pub(crate) active: bool,
    pub(crate) password_hash: String,
}

/// Minimal data returned for a valid session token.
pub(crate) struct SessionRecord {
    pub(crate) user_id: Uuid,
    pub(crate) username: String,
    pub(crate) email: String,
}

/// Outcome when attempting to create a new user + activation key.
#[derive(Debug)]
pub(crate) enum SignupOutcome {
    Created { token: String },
    Conflict,
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        active: row.get("active"),
        password_hash: row.get("password_hash"),
    }
}

pub(crate) async fn lookup_user_by_username(
    pool: &PgPool,
    username: &str,
) -> Result<Option<UserRecord>> {
    let query = "SELECT id, username, email, active, password_hash FROM users WHERE username = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by username")?;

    Ok(row.as_ref().map(user_from_row))
}

pub(crate) async fn lookup_user_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRecord>> {
    let query = "SELECT id, username, email, active, password_hash FROM users WHERE email = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by email")?;

    Ok(row.as_ref().map(user_from_row))
}

pub(crate) async fn lookup_user_by_id(pool: &PgPool, id: Uuid) -> Result<Option<UserRecord>> {
    let query = "SELECT id, username, email, active, password_hash FROM users WHERE id = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by id")?;

    Ok(row.as_ref().map(user_from_row))
}

/// Create an inactive user and issue its activation key in one transaction.
pub(crate) async fn create_user(
    pool: &PgPool,
    config: &AccountConfig,
    username: &str,
    email: &str,
    password_hash: &str,
) -> Result<SignupOutcome> {
    let mut tx = pool.begin().await.context("begin signup transaction")?;

    let query = r"
        INSERT INTO users (username, email, password_hash, active)
        VALUES ($1, $2, $3, FALSE)
        RETURNING id
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await;

    let user_id: Uuid = match row {
        Ok(row) => row.get("id"),
        Err(err) => {
            if is_unique_violation(&err) {
                let _ = tx.rollback().await;
                return Ok(SignupOutcome::Conflict);
            }
            return Err(err).context("failed to insert user");
        }
    };

    let token = issue_key_in_tx(&mut tx, config, user_id, username, KeyPurpose::Activation).await?;

    tx.commit().await.context("commit signup transaction")?;

    Ok(SignupOutcome::Created { token })
}

/// Issue a fresh key: compute the expiry from the purpose's validity window,
/// generate a token, persist it unused. Outstanding keys for the same user
/// and purpose are left alone.
pub(crate) async fn issue_key(
    pool: &PgPool,
    config: &AccountConfig,
    user_id: Uuid,
    username: &str,
    purpose: KeyPurpose,
) -> Result<String> {
    let mut tx = pool.begin().await.context("begin key issuance transaction")?;
    let token = issue_key_in_tx(&mut tx, config, user_id, username, purpose).await?;
    tx.commit().await.context("commit key issuance transaction")?;
    Ok(token)
}

async fn issue_key_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    config: &AccountConfig,
    user_id: Uuid,
    username: &str,
    purpose: KeyPurpose,
) -> Result<String> {
    let query = r"
        INSERT INTO authentication_keys (user_id, token, purpose, used, expires_at)
        VALUES ($1, $2, $3, FALSE, NOW() + ($4 * INTERVAL '1 second'))
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    // A partial unique index on (user_id, token) among live keys backs up the
    // token entropy; retry with a new token on the astronomically unlikely hit.
    for _ in 0..3 {
        let token = generate_key_token(username, config.key_salt())?;
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(&token)
            .bind(purpose.as_str())
            .bind(config.key_ttl_seconds(purpose))
            .execute(&mut **tx)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert authentication key"),
        }
    }

    Err(anyhow!("failed to generate unique authentication key"))
}

/// Check redeemability without consuming (the recovery form gate).
pub(crate) async fn peek_key(
    pool: &PgPool,
    user_id: Uuid,
    token: &str,
    purpose: KeyPurpose,
) -> Result<bool> {
    let query = r"
        SELECT EXISTS(
            SELECT 1 FROM authentication_keys
            WHERE user_id = $1
              AND token = $2
              AND purpose = $3
              AND used = FALSE
              AND expires_at >= NOW()
        ) AS redeemable
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(token)
        .bind(purpose.as_str())
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to check key redeemability")?;

    Ok(row.get("redeemable"))
}

/// Flip `used` iff the key is still redeemable. Returns false when no live
/// key matched, without saying why.
async fn consume_key(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    token: &str,
    purpose: KeyPurpose,
) -> Result<bool> {
    let query = r"
        UPDATE authentication_keys
        SET used = TRUE
        WHERE user_id = $1
          AND token = $2
          AND purpose = $3
          AND used = FALSE
          AND expires_at >= NOW()
        RETURNING id
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(token)
        .bind(purpose.as_str())
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to consume authentication key")?;

    Ok(row.is_some())
}

/// Redeem an activation key: consume it and mark the user active.
pub(crate) async fn redeem_activation(
    pool: &PgPool,
    username: &str,
    token: &str,
) -> Result<(), AccountError> {
    let user = lookup_user_by_username(pool, username)
        .await?
        .ok_or(AccountError::NotFound)?;

    let mut tx = pool.begin().await.context("begin activation transaction")?;

    if !consume_key(&mut tx, user.id, token, KeyPurpose::Activation).await? {
        let _ = tx.rollback().await;
        return Err(AccountError::KeyInvalidOrExpired);
    }

    let query = r"
        UPDATE users
        SET active = TRUE,
            activated_at = NOW(),
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user.id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to activate user")?;

    tx.commit().await.context("commit activation transaction")?;

    Ok(())
}

/// Redeem a recovery key: consume it and set the new credential.
pub(crate) async fn redeem_recovery(
    pool: &PgPool,
    username: &str,
    token: &str,
    new_password_hash: &str,
) -> Result<(), AccountError> {
    let user = lookup_user_by_username(pool, username)
        .await?
        .ok_or(AccountError::NotFound)?;

    let mut tx = pool.begin().await.context("begin recovery transaction")?;

    if !consume_key(&mut tx, user.id, token, KeyPurpose::Recovery).await? {
        let _ = tx.rollback().await;
        return Err(AccountError::KeyInvalidOrExpired);
    }

    let query = r"
        UPDATE users
        SET password_hash = $2,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user.id)
        .bind(new_password_hash)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to set new credential")?;

    tx.commit().await.context("commit recovery transaction")?;

    Ok(())
}

/// Redeem a deactivation key: consume it, clear the active flag, and destroy
/// every session the user holds, all in one transaction.
pub(crate) async fn redeem_deactivation(
    pool: &PgPool,
    username: &str,
    token: &str,
) -> Result<(), AccountError> {
    let user = lookup_user_by_username(pool, username)
        .await?
        .ok_or(AccountError::NotFound)?;

    let mut tx = pool
        .begin()
        .await
        .context("begin deactivation transaction")?;

    if !consume_key(&mut tx, user.id, token, KeyPurpose::Deactivation).await? {
        let _ = tx.rollback().await;
        return Err(AccountError::KeyInvalidOrExpired);
    }

    let query = r"
        UPDATE users
        SET active = FALSE,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user.id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to deactivate user")?;

    let query = "DELETE FROM user_sessions WHERE user_id = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user.id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to destroy user sessions")?;

    tx.commit().await.context("commit deactivation transaction")?;

    Ok(())
}

/// Direct credential change for an authenticated user.
pub(crate) async fn update_password(
    pool: &PgPool,
    user_id: Uuid,
    password_hash: &str,
) -> Result<()> {
    let query = r"
        UPDATE users
        SET password_hash = $2,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(password_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update password")?;

    Ok(())
}

/// Create a session row and return the raw token for the cookie.
/// Only the hash is stored.
pub(crate) async fn insert_session(
    pool: &PgPool,
    user_id: Uuid,
    ttl_seconds: i64,
) -> Result<String> {
    let query = r"
        INSERT INTO user_sessions (user_id, session_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..3 {
        let token = generate_session_token()?;
        let token_hash = super::keys::hash_session_token(&token);
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(token_hash)
            .bind(ttl_seconds)
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    Err(anyhow!("failed to generate unique session token"))
}

/// Resolve a session hash to its user. Only active users and unexpired
/// sessions match.
pub(crate) async fn lookup_session(
    pool: &PgPool,
    token_hash: &[u8],
) -> Result<Option<SessionRecord>> {
    let query = r"
        SELECT users.id, users.username, users.email
        FROM user_sessions
        JOIN users ON users.id = user_sessions.user_id
        WHERE user_sessions.session_hash = $1
          AND user_sessions.expires_at > NOW()
          AND users.active = TRUE
        LIMIT 1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;

    Ok(row.map(|row| SessionRecord {
        user_id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
    }))
}

pub(crate) async fn delete_session(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    // Logout is idempotent; it's fine if no rows are deleted.
    let query = "DELETE FROM user_sessions WHERE session_hash = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(())
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[test]
    fn signup_outcome_debug_names() {
        assert!(format!("{:?}", SignupOutcome::Conflict).contains("Conflict"));
        let created = SignupOutcome::Created {
            token: "t".to_string(),
        };
        assert!(format!("{created:?}").contains("Created"));
    }

    #[test]
    fn user_record_holds_values() {
        let record = UserRecord {
            id: Uuid::nil(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            active: false,
            password_hash: "hash".to_string(),
        };
        assert_eq!(record.id, Uuid::nil());
        assert_eq!(record.username, "alice");
        assert!(!record.active);
    }

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn is_unique_violation_matches_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("99999"),
        }));
        assert!(!is_unique_violation(&err));

        let err = sqlx::Error::RowNotFound;
        assert!(!is_unique_violation(&err));
    }
}
