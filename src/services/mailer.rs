//! Outbound mail. Delivery is fire-and-forget: callers never see a failure.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{MailConfig, MailTransport};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail transport error: {0}")]
    Transport(String),

    #[error("Mail relay rejected message with status {0}")]
    Rejected(u16),
}

impl From<reqwest::Error> for MailError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailError>;
}

/// Writes messages to the log instead of delivering them.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailError> {
        info!(to = %to, subject = %subject, body = %html_body, "Mail (log transport)");
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Posts each message as JSON to an HTTP mail relay.
pub struct WebhookMailer {
    client: Client,
    url: String,
    sender: String,
}

impl WebhookMailer {
    #[must_use]
    pub fn new(url: String, sender: String, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .user_agent("eventdesk/1.0")
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            url,
            sender,
        }
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailError> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookPayload {
                from: &self.sender,
                to,
                subject,
                html: html_body,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MailError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

#[must_use]
pub fn build_mailer(config: &MailConfig) -> Arc<dyn Mailer> {
    match (config.transport, config.webhook_url.as_deref()) {
        (MailTransport::Webhook, Some(url)) => Arc::new(WebhookMailer::new(
            url.to_string(),
            config.sender.clone(),
            Duration::from_secs(config.timeout_seconds),
        )),
        (MailTransport::Webhook, None) => {
            warn!("Webhook mail transport has no URL, falling back to log transport");
            Arc::new(LogMailer)
        }
        (MailTransport::Log, _) => Arc::new(LogMailer),
    }
}

/// Sends on a background task; failures are logged at `warn`.
pub fn dispatch(mailer: Arc<dyn Mailer>, to: String, subject: String, html_body: String) {
    tokio::spawn(async move {
        if let Err(e) = mailer.send(&to, &subject, &html_body).await {
            warn!(to = %to, subject = %subject, error = %e, "Failed to send mail");
        }
    });
}
