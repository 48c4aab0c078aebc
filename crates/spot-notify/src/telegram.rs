//! Telegram Bot API client: `sendMessage` for delivery, `getUpdates` for
//! command polling.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::{NotifyError, Result, Transport};

pub const TELEGRAM_API: &str = "https://api.telegram.org";

/// Server-side wait for `getUpdates`.
pub const LONG_POLL_SECS: u64 = 30;

fn build_client() -> reqwest::Client {
    // Must outlive the long poll.
    reqwest::Client::builder()
        .timeout(Duration::from_secs(LONG_POLL_SECS + 15))
        .build()
        .expect("failed to build HTTP client")
}

// ─── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Chat {
    pub id: i64,
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let resp: ApiResponse<T> =
        serde_json::from_slice(body).map_err(|e| NotifyError::Decode(e.to_string()))?;
    if !resp.ok {
        return Err(NotifyError::Api {
            code: resp.error_code.unwrap_or_default(),
            description: resp.description.unwrap_or_default(),
        });
    }
    resp.result
        .ok_or_else(|| NotifyError::Decode("missing result".to_string()))
}

// ─── Update source ────────────────────────────────────────────────────────────

/// Anything that can be long-polled for bot updates.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>>;
}

// ─── Transport ────────────────────────────────────────────────────────────────

pub struct TelegramTransport {
    token: String,
    chat_id: String,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for TelegramTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramTransport")
            .field("token", &"[redacted]")
            .field("chat_id", &self.chat_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl TelegramTransport {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            chat_id: chat_id.into(),
            base_url: TELEGRAM_API.to_string(),
            client: build_client(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base_url, self.token)
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send(&self, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        let bytes = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await?
            .bytes()
            .await?;

        decode::<serde_json::Value>(&bytes)?;
        debug!(chars = text.len(), "telegram message sent");
        Ok(())
    }
}

#[async_trait]
impl UpdateSource for TelegramTransport {
    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let bytes = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", timeout_secs.to_string()),
                ("allowed_updates", r#"["message"]"#.to_string()),
            ])
            .send()
            .await?
            .bytes()
            .await?;

        decode(&bytes)
    }
}
