//! Outbound account emails: message composition and the transport seam.
//!
//! Delivery is an external collaborator's job. Handlers compose the message
//! for the key they just issued and hand it to an [`EmailSender`]; the default
//! implementation only logs, which keeps the service self-contained in
//! development and in tests.

use crate::api::handlers::account::keys::KeyPurpose;
use anyhow::Result;
use tracing::info;

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub subject: String,
    pub body: String,
}

pub trait EmailSender: Send + Sync {
    /// # Errors
    /// Returns an error if the message could not be handed to the transport.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            subject = %message.subject,
            "email send stub"
        );
        Ok(())
    }
}

/// Compose the email carrying a freshly issued key.
///
/// The link embeds the username and the raw token; the caller sends it out of
/// band, and the recipient proves ownership by following it.
#[must_use]
pub fn key_email(
    base_url: &str,
    purpose: KeyPurpose,
    username: &str,
    to_email: &str,
    token: &str,
) -> EmailMessage {
    let base = base_url.trim_end_matches('/');
    let (subject, path, action) = match purpose {
        KeyPurpose::Activation => ("Activate your account.", "activate", "activate your account"),
        KeyPurpose::Recovery => ("Reset your password.", "recover", "reset your password"),
        KeyPurpose::Deactivation => (
            "Deactivate your account.",
            "manage/deactivate",
            "deactivate your account",
        ),
    };
    let link = format!("{base}/{path}/{username}/{token}");
    let body = format!("Hello {username},\n\nFollow this link to {action}:\n\n{link}\n");

    EmailMessage {
        to_email: to_email.to_string(),
        subject: subject.to_string(),
        body,
    }
}
