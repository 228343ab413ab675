//! # Chiavi (Account Lifecycle & Authentication Keys)
//!
//! `chiavi` is a user-account service built around single-use, expiring
//! authentication keys. It handles registration, login/logout, password
//! change, and the three key-driven account transitions: activation,
//! password recovery, and deactivation.
//!
//! ## Authentication keys
//!
//! Every key is bound to one user and one purpose (`activation`, `recovery`,
//! or `deactivation`), carries an expiry computed at issuance, and can be
//! redeemed at most once. Redemption is an atomic conditional update: the
//! `used` flip and the resulting user mutation commit in a single database
//! transaction, so concurrent redemptions of the same key cannot both win.
//!
//! - **Single purpose:** a key issued for one purpose never redeems for
//!   another.
//! - **Audit trail:** consumed keys stay in storage; they are never deleted
//!   or revalidated.
//! - **Independent keys:** issuing a new key does not invalidate prior
//!   outstanding keys for the same user and purpose.
//!
//! ## Information hiding
//!
//! Redemption failures do not reveal whether a key expired, was already
//! used, or never existed; URL-driven flows redirect to a neutral landing
//! page instead of rendering an error. Login failures are equally generic.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
