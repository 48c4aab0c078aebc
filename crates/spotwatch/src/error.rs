//! Daemon error types

use spot_notify::NotifyError;
use spot_provider::ProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("provider query failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("delivery failed: {0}")]
    Notify(#[from] NotifyError),
}

pub type ReportResult<T> = Result<T, ReportError>;
