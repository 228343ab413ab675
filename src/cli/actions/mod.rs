use secrecy::SecretString;

pub mod purge;
pub mod server;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        base_url: String,
        key_salt: SecretString,
        activation_key_ttl_seconds: i64,
        recovery_key_ttl_seconds: i64,
        deactivation_key_ttl_seconds: i64,
        session_ttl_seconds: i64,
    },
    Purge {
        dsn: String,
        activation_key_ttl_seconds: i64,
    },
}
