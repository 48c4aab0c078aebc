//! Operator channel for Spotwatch.
//!
//! Renders alerts and reports as Telegram HTML, delivers them through a
//! [`Transport`], and turns incoming bot messages into [`BotCommand`]s.

#![forbid(unsafe_code)]

pub mod command;
pub mod render;
pub mod telegram;

use async_trait::async_trait;
use spot_health::AlertSink;
use spot_proto::Alert;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub use command::{BotCommand, CommandHandler, CommandPoller, parse_command};
pub use render::{StatusLine, escape_html, render_alert, render_billing, render_help, render_status, render_traffic};
pub use telegram::{TelegramTransport, UpdateSource};

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("http error: {0}")]
    Http(reqwest::Error),

    #[error("telegram API error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("failed to decode telegram response: {0}")]
    Decode(String),
}

// Request URLs embed the bot token.
impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.without_url())
    }
}

pub type Result<T> = std::result::Result<T, NotifyError>;

// ─── Transport ────────────────────────────────────────────────────────────────

/// Delivers one pre-rendered message.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

/// Writes messages to the log instead of a chat. Used when the bot is disabled.
#[derive(Debug, Default, Clone)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn send(&self, text: &str) -> Result<()> {
        info!(message = %text, "notification");
        Ok(())
    }
}

/// Renders alerts and hands them to a transport. Delivery failures are
/// logged and dropped.
#[derive(Clone)]
pub struct Notifier {
    transport: Arc<dyn Transport>,
}

impl Notifier {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl AlertSink for Notifier {
    async fn emit(&self, alert: Alert) {
        let text = render_alert(&alert);
        if let Err(e) = self.transport.send(&text).await {
            warn!(kind = ?alert.kind(), instance = ?alert.instance_id(), error = %e, "failed to deliver alert");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use spot_proto::InstanceRef;

    #[derive(Default)]
    struct FlakyTransport {
        fail: bool,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn send(&self, text: &str) -> Result<()> {
            if self.fail {
                return Err(NotifyError::Api {
                    code: 429,
                    description: "Too Many Requests".to_string(),
                });
            }
            self.sent.lock().push(text.to_string());
            Ok(())
        }
    }

    fn reclaimed() -> Alert {
        Alert::Reclaimed {
            instance: InstanceRef {
                id: "i-1".to_string(),
                display_name: "web".to_string(),
                region_id: "cn-hongkong".to_string(),
            },
            at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_emit_renders_and_sends() {
        let transport = Arc::new(FlakyTransport::default());
        let notifier = Notifier::new(transport.clone());
        notifier.emit(reclaimed()).await;
        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("<code>i-1</code>"));
    }

    #[tokio::test]
    async fn test_emit_swallows_delivery_failure() {
        let transport = Arc::new(FlakyTransport {
            fail: true,
            ..Default::default()
        });
        let notifier = Notifier::new(transport.clone());
        notifier.emit(reclaimed()).await;
        assert!(transport.sent.lock().is_empty());
    }
}
