//! Authentication-key purposes and token generation.
//!
//! Tokens are 64 lowercase hex characters: a SHA-256 digest over the owner's
//! username, the issuance timestamp, a random nonce, and a server-side secret
//! salt. The salt keeps an attacker who knows the scheme from forging tokens;
//! the nonce keeps two keys issued in the same instant from colliding.

use anyhow::{Context, Result};
use chrono::Utc;
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::fmt::Write;
use std::sync::LazyLock;

static TOKEN_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-f]{64}$").expect("token format regex"));

/// Exactly one purpose per key; a key issued for one purpose never redeems
/// for another.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyPurpose {
    Activation,
    Recovery,
    Deactivation,
}

impl KeyPurpose {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Activation => "activation",
            Self::Recovery => "recovery",
            Self::Deactivation => "deactivation",
        }
    }
}

/// Generate a fresh key token for a user.
///
/// # Errors
/// Returns an error if the random nonce cannot be generated.
pub(crate) fn generate_key_token(username: &str, salt: &SecretString) -> Result<String> {
    let mut nonce = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut nonce)
        .context("failed to generate key token nonce")?;

    let mut hasher = Sha256::new();
    hasher.update(username.as_bytes());
    hasher.update(Utc::now().to_rfc3339().as_bytes());
    hasher.update(salt.expose_secret().as_bytes());
    hasher.update(nonce);

    Ok(to_lower_hex(&hasher.finalize()))
}

/// Check the wire format of a token before any storage access.
pub(crate) fn valid_token_format(token: &str) -> bool {
    TOKEN_FORMAT.is_match(token)
}

/// Hash a session token so raw values never touch the database.
pub(crate) fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Generate a random session token for the auth cookie.
///
/// # Errors
/// Returns an error if random bytes cannot be generated.
pub(crate) fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(to_lower_hex(&bytes))
}

fn to_lower_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(64), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}
