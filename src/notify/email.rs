use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::NotificationDispatcher;
use crate::config::SmtpConfig;
use crate::utils::error::DispatchError;

/// SMTP delivery. Recipients are blind-copied so subscribers never see each other.
pub struct EmailDispatcher {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailDispatcher {
    pub fn new(config: &SmtpConfig) -> Result<Self, DispatchError> {
        let from_address = config
            .from_address
            .as_deref()
            .or(config.username.as_deref())
            .ok_or_else(|| DispatchError::Address {
                address: String::new(),
                message: "no from_address or username configured".to_string(),
            })?;
        let from = parse_mailbox(&format!("{} <{}>", config.from_name, from_address))?;

        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| DispatchError::Transport(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        }
        .port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    /// Unparsable recipients are skipped with a warning.
    pub fn build_message(
        &self,
        recipients: &[String],
        subject: &str,
        body: &str,
    ) -> Result<Message, DispatchError> {
        let mailboxes: Vec<Mailbox> = recipients
            .iter()
            .filter_map(|recipient| match parse_mailbox(recipient) {
                Ok(mailbox) => Some(mailbox),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping recipient");
                    None
                }
            })
            .collect();
        if mailboxes.is_empty() {
            return Err(DispatchError::NoRecipients);
        }

        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(self.from.clone())
            .subject(subject);
        for mailbox in mailboxes {
            builder = builder.bcc(mailbox);
        }

        builder
            .header(ContentType::TEXT_HTML)
            .body(body.to_string())
            .map_err(|e| DispatchError::Build(e.to_string()))
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, DispatchError> {
    address.parse().map_err(|e: lettre::address::AddressError| DispatchError::Address {
        address: address.to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
impl NotificationDispatcher for EmailDispatcher {
    #[tracing::instrument(level = "debug", skip(self, body), fields(recipients = recipients.len()))]
    async fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<(), DispatchError> {
        let message = self.build_message(recipients, subject, body)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        Ok(())
    }
}
