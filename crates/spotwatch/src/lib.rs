//! spotwatch — spot instance reclaim watcher
//!
//! Watches pay-as-you-go spot instances, restarts the ones the provider
//! reclaims, and answers billing/traffic/status queries over a Telegram bot.

#![forbid(unsafe_code)]

pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod registry;

pub use commands::CommandDispatcher;
pub use config::{Config, TelegramConfig};
pub use error::{ConfigError, ReportError, ReportResult};
pub use monitor::{Monitor, MonitorParts, TickReport};
pub use registry::InstanceRegistry;
