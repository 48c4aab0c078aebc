//! Bot command handling.

use anyhow::Context;
use async_trait::async_trait;
use spot_notify::{BotCommand, CommandHandler};
use std::sync::Arc;

use crate::monitor::Monitor;

/// Answers bot commands by sending the matching report to the chat.
pub struct CommandDispatcher {
    monitor: Arc<Monitor>,
}

impl CommandDispatcher {
    pub fn new(monitor: Arc<Monitor>) -> Self {
        Self { monitor }
    }
}

#[async_trait]
impl CommandHandler for CommandDispatcher {
    async fn handle(&self, command: BotCommand) -> anyhow::Result<()> {
        self.monitor
            .send_report(command)
            .await
            .with_context(|| format!("{command} report"))
    }
}
