//! SMTP transport built on lettre.

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};

use super::{MessageTransport, OutgoingMessage};
use crate::error::{DispatchError, Result};
use crate::request::Recipient;

/// Connection settings for an SMTP relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// Relay hostname
    pub host: String,

    /// Relay port
    pub port: u16,

    /// Use implicit TLS when true, STARTTLS otherwise
    pub secure: bool,

    /// Username for authentication (no authentication when absent)
    pub user: Option<String>,

    /// Password for authentication
    #[serde(skip_serializing)]
    pub password: Option<String>,

    /// Address messages are sent from
    pub from_address: String,

    /// Display name messages are sent from
    pub from_name: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 587,
            secure: false,
            user: None,
            password: None,
            from_address: String::new(),
            from_name: "Tryout Coordinator".to_string(),
        }
    }
}

/// Production transport relaying through an SMTP server.
#[derive(Clone)]
pub struct SmtpTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpTransport {
    /// Build a transport from configuration.
    ///
    /// This does not open a connection; credentials are only checked by
    /// [`MessageTransport::verify`].
    ///
    /// # Errors
    /// Returns [`DispatchError::TransportUnavailable`] if the host is missing or the
    /// relay cannot be configured, and [`DispatchError::Config`] if the from address does
    /// not parse.
    pub fn from_config(config: &SmtpConfig) -> Result<Self> {
        if config.host.trim().is_empty() {
            return Err(DispatchError::TransportUnavailable(
                "SMTP host is not configured".to_string(),
            ));
        }

        let from_address: Address = config.from_address.parse().map_err(|e| {
            DispatchError::Config(format!(
                "Invalid from address '{}': {}",
                config.from_address, e
            ))
        })?;
        let from = Mailbox::new(Some(config.from_name.clone()), from_address);

        let builder = if config.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .map_err(|e| {
            DispatchError::TransportUnavailable(format!(
                "Failed to configure SMTP relay '{}': {}",
                config.host, e
            ))
        })?;

        let mut builder = builder.port(config.port);
        if let Some(user) = &config.user {
            builder = builder.credentials(Credentials::new(
                user.clone(),
                config.password.clone().unwrap_or_default(),
            ));
        }

        tracing::info!(
            host = %config.host,
            port = config.port,
            secure = config.secure,
            authenticated = config.user.is_some(),
            "Configured SMTP transport"
        );

        Ok(Self {
            mailer: builder.build(),
            from,
        })
    }

    /// Render the lettre message for one recipient.
    fn build_message(&self, message: &OutgoingMessage, to: &Recipient) -> Result<Message> {
        let address: Address = to.address.parse().map_err(|e| DispatchError::Send {
            address: to.address.clone(),
            reason: format!("Invalid recipient address: {}", e),
        })?;

        Message::builder()
            .from(self.from.clone())
            .to(Mailbox::new(to.name.clone(), address))
            .subject(message.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                message.text.clone(),
                message.html.clone(),
            ))
            .map_err(|e| DispatchError::Send {
                address: to.address.clone(),
                reason: format!("Failed to build message: {}", e),
            })
    }
}

#[async_trait]
impl MessageTransport for SmtpTransport {
    async fn verify(&self) -> Result<()> {
        match self.mailer.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(DispatchError::TransportUnavailable(
                "SMTP server did not accept the connection".to_string(),
            )),
            Err(e) => {
                tracing::error!(error = %e, "SMTP connection check failed");
                Err(DispatchError::TransportUnavailable(e.to_string()))
            }
        }
    }

    #[tracing::instrument(skip(self, message, to), fields(address = %to.address))]
    async fn send(&self, message: &OutgoingMessage, to: &Recipient) -> Result<()> {
        let email = self.build_message(message, to)?;

        let response = self
            .mailer
            .send(email)
            .await
            .map_err(|e| DispatchError::Send {
                address: to.address.clone(),
                reason: e.to_string(),
            })?;

        tracing::debug!(code = %response.code(), "SMTP relay accepted message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".to_string(),
            from_address: "tryouts@example.com".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_host_is_unavailable() {
        let result = SmtpTransport::from_config(&SmtpConfig {
            host: "  ".to_string(),
            ..config()
        });
        assert!(matches!(result, Err(DispatchError::TransportUnavailable(_))));
    }

    #[test]
    fn test_invalid_from_address_is_config_error() {
        let result = SmtpTransport::from_config(&SmtpConfig {
            from_address: "not an address".to_string(),
            ..config()
        });
        assert!(matches!(result, Err(DispatchError::Config(_))));
    }

    #[test]
    fn test_invalid_recipient_is_send_error() {
        let transport = SmtpTransport::from_config(&config()).unwrap();
        let message = OutgoingMessage::from_body("Tryouts", "Saturday 9am");

        let err = transport
            .build_message(&message, &Recipient::new("no-at-sign"))
            .unwrap_err();
        assert!(matches!(err, DispatchError::Send { ref address, .. } if address == "no-at-sign"));

        let err = transport
            .build_message(&message, &Recipient::new(""))
            .unwrap_err();
        assert!(matches!(err, DispatchError::Send { .. }));
    }

    #[test]
    fn test_builds_message_with_display_name() {
        let transport = SmtpTransport::from_config(&config()).unwrap();
        let message = OutgoingMessage::from_body("Tryouts", "Saturday 9am");

        let email = transport
            .build_message(
                &message,
                &Recipient::new("parent@example.com").with_name("Alex Kim"),
            )
            .unwrap();
        let rendered = String::from_utf8(email.formatted()).unwrap();
        assert!(rendered.contains("Subject: Tryouts"));
        assert!(rendered.contains("Alex Kim"));
        assert!(rendered.contains("parent@example.com"));
    }
}
