//! Account subsystem configuration.

use secrecy::SecretString;

use super::keys::KeyPurpose;

const DEFAULT_ACTIVATION_KEY_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_RECOVERY_KEY_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_DEACTIVATION_KEY_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_SESSION_TTL_SECONDS: i64 = 12 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AccountConfig {
    base_url: String,
    key_salt: SecretString,
    activation_key_ttl_seconds: i64,
    recovery_key_ttl_seconds: i64,
    deactivation_key_ttl_seconds: i64,
    session_ttl_seconds: i64,
}

impl AccountConfig {
    #[must_use]
    pub fn new(base_url: String, key_salt: SecretString) -> Self {
        Self {
            base_url,
            key_salt,
            activation_key_ttl_seconds: DEFAULT_ACTIVATION_KEY_TTL_SECONDS,
            recovery_key_ttl_seconds: DEFAULT_RECOVERY_KEY_TTL_SECONDS,
            deactivation_key_ttl_seconds: DEFAULT_DEACTIVATION_KEY_TTL_SECONDS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_activation_key_ttl_seconds(mut self, seconds: i64) -> Self {
        self.activation_key_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_recovery_key_ttl_seconds(mut self, seconds: i64) -> Self {
        self.recovery_key_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_deactivation_key_ttl_seconds(mut self, seconds: i64) -> Self {
        self.deactivation_key_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    /// Public site URL used in email links and neutral redirects.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn key_salt(&self) -> &SecretString {
        &self.key_salt
    }

    /// Validity window applied at issuance; each purpose has its own.
    #[must_use]
    pub fn key_ttl_seconds(&self, purpose: KeyPurpose) -> i64 {
        match purpose {
            KeyPurpose::Activation => self.activation_key_ttl_seconds,
            KeyPurpose::Recovery => self.recovery_key_ttl_seconds,
            KeyPurpose::Deactivation => self.deactivation_key_ttl_seconds,
        }
    }

    pub(crate) fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    pub(crate) fn session_cookie_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}
