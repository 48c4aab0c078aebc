//! Bot commands: parsing and the long-poll loop.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::telegram::{LONG_POLL_SECS, Update, UpdateSource};

/// Pause after a failed poll.
pub const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotCommand {
    Billing,
    Traffic,
    Status,
    Help,
}

impl BotCommand {
    /// Map a bare keyword, including aliases.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "billing" | "cost" | "fee" => Some(Self::Billing),
            "traffic" | "flow" | "bandwidth" => Some(Self::Traffic),
            "status" => Some(Self::Status),
            "help" | "start" => Some(Self::Help),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Billing => "billing",
            Self::Traffic => "traffic",
            Self::Status => "status",
            Self::Help => "help",
        }
    }
}

impl std::fmt::Display for BotCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BotCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_keyword(&s.trim().to_lowercase()).ok_or_else(|| format!("unknown command: {s}"))
    }
}

/// `/Billing@my_bot extra` → `Billing`. Non-commands and unknown keywords
/// yield `None`.
pub fn parse_command(text: &str) -> Option<BotCommand> {
    let rest = text.trim().strip_prefix('/')?;
    let token = rest.split_whitespace().next()?;
    let name = token.split('@').next().unwrap_or(token);
    BotCommand::from_keyword(&name.to_lowercase())
}

/// Executes a recognized command. Runs on its own task.
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    async fn handle(&self, command: BotCommand) -> anyhow::Result<()>;
}

// ─── Poller ───────────────────────────────────────────────────────────────────

/// Long-polls for updates from the one authorized chat and spawns a handler
/// task per recognized command.
pub struct CommandPoller {
    source: Arc<dyn UpdateSource>,
    handler: Arc<dyn CommandHandler>,
    authorized_chat: String,
    offset: i64,
}

impl CommandPoller {
    pub fn new(
        source: Arc<dyn UpdateSource>,
        handler: Arc<dyn CommandHandler>,
        authorized_chat: impl Into<String>,
    ) -> Self {
        Self {
            source,
            handler,
            authorized_chat: authorized_chat.into(),
            offset: 0,
        }
    }

    /// Poll until the task is dropped or aborted. Commands queued while the
    /// daemon was down are skipped, not answered.
    pub async fn run(mut self) {
        self.skip_backlog().await;
        info!(chat = %self.authorized_chat, offset = self.offset, "bot command polling started");
        loop {
            match self.source.get_updates(self.offset, LONG_POLL_SECS).await {
                Ok(updates) => self.dispatch(updates),
                Err(e) => {
                    warn!(error = %e, "failed to poll bot updates");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                }
            }
        }
    }

    /// Offset -1 returns only the newest pending update; polling past it
    /// confirms everything older.
    async fn skip_backlog(&mut self) {
        match self.source.get_updates(-1, 0).await {
            Ok(updates) => {
                if let Some(last) = updates.iter().map(|u| u.update_id).max() {
                    self.offset = last + 1;
                    info!(through = last, "skipped queued bot updates");
                }
            }
            Err(e) => warn!(error = %e, "failed to skip queued bot updates"),
        }
    }

    fn dispatch(&mut self, updates: Vec<Update>) {
        for update in updates {
            self.offset = self.offset.max(update.update_id + 1);
            let Some(command) = self.accept(&update) else {
                continue;
            };

            info!(command = %command, "bot command received");
            let handler = self.handler.clone();
            tokio::spawn(async move {
                if let Err(e) = handler.handle(command).await {
                    warn!(command = %command, error = %e, "bot command failed");
                }
            });
        }
    }

    fn accept(&self, update: &Update) -> Option<BotCommand> {
        let message = update.message.as_ref()?;
        if message.chat.id.to_string() != self.authorized_chat {
            debug!(chat = message.chat.id, "ignoring message from unauthorized chat");
            return None;
        }
        let text = message.text.as_deref()?;
        let command = parse_command(text);
        if command.is_none() {
            debug!(text, "ignoring unrecognized message");
        }
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::{Chat, Message};
    use crate::{NotifyError, Result};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use tokio::sync::mpsc;

    #[test]
    fn test_parse_aliases() {
        assert_eq!(parse_command("/billing"), Some(BotCommand::Billing));
        assert_eq!(parse_command("/cost"), Some(BotCommand::Billing));
        assert_eq!(parse_command("/fee"), Some(BotCommand::Billing));
        assert_eq!(parse_command("/flow"), Some(BotCommand::Traffic));
        assert_eq!(parse_command("/bandwidth"), Some(BotCommand::Traffic));
        assert_eq!(parse_command("/status"), Some(BotCommand::Status));
        assert_eq!(parse_command("/start"), Some(BotCommand::Help));
    }

    #[test]
    fn test_parse_strips_bot_suffix_and_case() {
        assert_eq!(parse_command("/Traffic@spot_bot now"), Some(BotCommand::Traffic));
        assert_eq!(parse_command("  /STATUS  "), Some(BotCommand::Status));
    }

    #[test]
    fn test_parse_rejects_non_commands() {
        assert_eq!(parse_command("billing"), None);
        assert_eq!(parse_command("/reboot"), None);
        assert_eq!(parse_command("/"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("Cost".parse::<BotCommand>(), Ok(BotCommand::Billing));
        assert!("nope".parse::<BotCommand>().is_err());
    }

    /// Scripted batches; once exhausted, polls hang forever.
    struct ScriptedSource {
        batches: Mutex<VecDeque<Result<Vec<Update>>>>,
        offsets: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl UpdateSource for ScriptedSource {
        async fn get_updates(&self, offset: i64, _: u64) -> Result<Vec<Update>> {
            self.offsets.lock().push(offset);
            let next = self.batches.lock().pop_front();
            match next {
                Some(batch) => batch,
                None => std::future::pending().await,
            }
        }
    }

    struct ChannelHandler(mpsc::UnboundedSender<BotCommand>);

    #[async_trait]
    impl CommandHandler for ChannelHandler {
        async fn handle(&self, command: BotCommand) -> anyhow::Result<()> {
            let _ = self.0.send(command);
            anyhow::bail!("handler errors are only logged")
        }
    }

    fn update(id: i64, chat: i64, text: &str) -> Update {
        Update {
            update_id: id,
            message: Some(Message {
                chat: Chat { id: chat },
                text: Some(text.to_string()),
            }),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_skips_backlog_filters_chat_and_advances_offset() {
        let source = Arc::new(ScriptedSource {
            batches: Mutex::new(VecDeque::from(vec![
                // Queued before startup: acknowledged, never dispatched.
                Ok(vec![update(90, 42, "/traffic")]),
                Err(NotifyError::Decode("boom".to_string())),
                Ok(vec![
                    update(100, 42, "/status"),
                    update(101, 7, "/billing"),
                    update(102, 42, "hello"),
                    update(103, 42, "/fee"),
                ]),
            ])),
            offsets: Mutex::new(Vec::new()),
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let poller = CommandPoller::new(source.clone(), Arc::new(ChannelHandler(tx)), "42");
        let task = tokio::spawn(poller.run());

        assert_eq!(rx.recv().await, Some(BotCommand::Status));
        assert_eq!(rx.recv().await, Some(BotCommand::Billing));
        tokio::task::yield_now().await;
        task.abort();

        assert!(rx.try_recv().is_err());
        assert_eq!(*source.offsets.lock(), [-1, 91, 91, 104]);
    }
}
