use crate::cli::actions::Action;
use anyhow::{Context, Result};
use secrecy::SecretString;
use url::Url;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let activation_key_ttl_seconds = matches
        .get_one::<i64>("activation-key-ttl")
        .copied()
        .unwrap_or(604_800);

    if matches.subcommand_matches("purge").is_some() {
        return Ok(Action::Purge {
            dsn,
            activation_key_ttl_seconds,
        });
    }

    let base_url = matches
        .get_one::<String>("base-url")
        .cloned()
        .unwrap_or_else(|| "http://localhost:8080".to_string());
    Url::parse(&base_url).context("invalid base URL")?;

    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn,
        base_url,
        key_salt: matches
            .get_one::<String>("key-salt")
            .map(|s| SecretString::from(s.clone()))
            .context("missing required argument: --key-salt")?,
        activation_key_ttl_seconds,
        recovery_key_ttl_seconds: matches
            .get_one::<i64>("recovery-key-ttl")
            .copied()
            .unwrap_or(86_400),
        deactivation_key_ttl_seconds: matches
            .get_one::<i64>("deactivation-key-ttl")
            .copied()
            .unwrap_or(86_400),
        session_ttl_seconds: matches
            .get_one::<i64>("session-ttl")
            .copied()
            .unwrap_or(43_200),
    })
}
