use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Outbound mail. Templates are named; `data` carries the values the
/// template interpolates.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, recipient: &str, template: &str, data: Value) -> anyhow::Result<()>;
}

/// Records deliveries in the log instead of talking to an SMTP server.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, recipient: &str, template: &str, data: Value) -> anyhow::Result<()> {
        // Token plaintext is in `data`; only its keys are logged.
        let fields: Vec<&str> = data
            .as_object()
            .map(|o| o.keys().map(String::as_str).collect())
            .unwrap_or_default();

        tracing::info!(recipient, template, ?fields, "Email dispatched");
        Ok(())
    }
}

/// Send without holding up the response. Failures are logged.
pub fn deliver_in_background(
    mailer: Arc<dyn Mailer>,
    recipient: String,
    template: &'static str,
    data: Value,
) {
    tokio::spawn(async move {
        if let Err(e) = mailer.send(&recipient, template, data).await {
            tracing::error!(error = %e, template, "Failed to deliver email");
        }
    });
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub recipient: String,
    pub template: String,
    pub data: Value,
}

/// Keeps every message in memory so tests can read activation tokens back.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    outbox: Mutex<Vec<SentMail>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.outbox
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Most recent message sent to `recipient`.
    pub fn last_to(&self, recipient: &str) -> Option<SentMail> {
        self.sent()
            .into_iter()
            .rev()
            .find(|mail| mail.recipient == recipient)
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, recipient: &str, template: &str, data: Value) -> anyhow::Result<()> {
        self.outbox
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(SentMail {
                recipient: recipient.to_string(),
                template: template.to_string(),
                data,
            });
        Ok(())
    }
}
