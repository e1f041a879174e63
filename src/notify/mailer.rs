//! Email transports

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// A rendered email
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Errors raised while handing an email to a transport
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("email transport error: {0}")]
    Transport(String),
    #[error("email provider rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("email transport is not configured: {0}")]
    Misconfigured(String),
}

/// Something that can deliver an [`EmailMessage`]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError>;
}

/// Writes emails to the log instead of sending them
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        tracing::info!(
            to = ?message.to,
            subject = %message.subject,
            "email not sent (log mailer)"
        );
        Ok(())
    }
}

/// Keeps every message in memory; optionally fails the first sends
#[derive(Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
    failures_left: Arc<AtomicU32>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the first `failures` sends with a transport error
    pub fn failing_first(failures: u32) -> Self {
        let mailer = Self::default();
        mailer.failures_left.store(failures, Ordering::SeqCst);
        mailer
    }

    /// Messages delivered so far
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(NotifyError::Transport("simulated outage".to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
        Ok(())
    }
}

/// Sends through the Resend HTTP API
#[cfg(feature = "email")]
pub struct ResendMailer {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

#[cfg(feature = "email")]
impl ResendMailer {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Result<Self, NotifyError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(NotifyError::Misconfigured("missing API key".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::Misconfigured(e.to_string()))?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[cfg(feature = "email")]
#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(format!("{}/emails", self.api_base))
            .bearer_auth(&self.api_key)
            .json(message)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> EmailMessage {
        EmailMessage {
            from: "tienda@example.com".to_string(),
            to: vec!["fan@example.com".to_string()],
            subject: "Pedido".to_string(),
            text: "hola".to_string(),
            html: "<p>hola</p>".to_string(),
        }
    }

    #[tokio::test]
    async fn test_recording_mailer_fails_first_sends() {
        let mailer = RecordingMailer::failing_first(2);
        assert!(mailer.send(&message()).await.is_err());
        assert!(mailer.send(&message()).await.is_err());
        assert!(mailer.send(&message()).await.is_ok());
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_log_mailer_never_fails() {
        assert!(LogMailer.send(&message()).await.is_ok());
    }

    #[cfg(feature = "email")]
    #[test]
    fn test_resend_requires_key() {
        assert!(matches!(
            ResendMailer::new("https://api.resend.com", " "),
            Err(NotifyError::Misconfigured(_))
        ));
    }
}
