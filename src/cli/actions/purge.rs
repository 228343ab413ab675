use crate::cli::actions::Action;
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, info_span, Instrument};

/// Handle the purge action: delete accounts that never activated within the
/// activation window. Consumed and expired authentication keys are kept as an
/// audit trail; only the abandoned users (and their keys, via cascade) go.
pub async fn handle(action: Action) -> Result<()> {
    let Action::Purge {
        dsn,
        activation_key_ttl_seconds,
    } = action
    else {
        return Ok(());
    };

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(2)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let query = r"
        DELETE FROM users
        WHERE active = FALSE
          AND activated_at IS NULL
          AND created_at < NOW() - ($1 * INTERVAL '1 second')
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(activation_key_ttl_seconds)
        .execute(&pool)
        .instrument(span)
        .await
        .context("failed to purge inactive users")?;

    info!("Deleted {} inactive users", result.rows_affected());

    Ok(())
}
