use async_trait::async_trait;
use std::sync::Arc;

use crate::utils::error::DispatchError;

pub mod content;
pub mod email;

pub use content::{NotificationContent, render};
pub use email::EmailDispatcher;

/// Delivers a rendered notification to a set of recipients.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<(), DispatchError>;
}

#[async_trait]
impl<D: NotificationDispatcher + ?Sized> NotificationDispatcher for Arc<D> {
    async fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<(), DispatchError> {
        (**self).send(recipients, subject, body).await
    }
}

/// Writes notifications to the log. Used when no SMTP relay is configured.
#[derive(Debug, Default, Clone)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<(), DispatchError> {
        if recipients.is_empty() {
            return Err(DispatchError::NoRecipients);
        }
        tracing::info!(
            recipients = recipients.len(),
            subject,
            body_len = body.len(),
            "Notification (log only)"
        );
        Ok(())
    }
}
