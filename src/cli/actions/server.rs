use crate::{
    api,
    api::{email::LogEmailSender, handlers::account::AccountConfig},
    cli::actions::Action,
};
use anyhow::Result;
use std::sync::Arc;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    let Action::Server {
        port,
        dsn,
        base_url,
        key_salt,
        activation_key_ttl_seconds,
        recovery_key_ttl_seconds,
        deactivation_key_ttl_seconds,
        session_ttl_seconds,
    } = action
    else {
        return Ok(());
    };

    let config = AccountConfig::new(base_url, key_salt)
        .with_activation_key_ttl_seconds(activation_key_ttl_seconds)
        .with_recovery_key_ttl_seconds(recovery_key_ttl_seconds)
        .with_deactivation_key_ttl_seconds(deactivation_key_ttl_seconds)
        .with_session_ttl_seconds(session_ttl_seconds);

    api::new(port, dsn, config, Arc::new(LogEmailSender)).await?;

    Ok(())
}
