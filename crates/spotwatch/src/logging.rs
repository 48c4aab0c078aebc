//! Tracing subscriber setup.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::warn;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

const CRATES: &[&str] = &[
    "spotwatch",
    "spot_provider",
    "spot_ledger",
    "spot_health",
    "spot_notify",
];

/// Directives used when `RUST_LOG` is not set.
pub fn default_directives(level: &str) -> String {
    CRATES
        .iter()
        .map(|krate| format!("{krate}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber. A log file that cannot be opened is
/// reported once the subscriber is up, and output stays on stdout.
pub fn init(level: &str, log_file: Option<&Path>, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let mut open_error = None;
    let writer = match log_file {
        Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => BoxMakeWriter::new(Mutex::new(file)),
            Err(e) => {
                open_error = Some((path.display().to_string(), e));
                BoxMakeWriter::new(std::io::stdout)
            }
        },
        None => BoxMakeWriter::new(std::io::stdout),
    };
    let to_file = log_file.is_some() && open_error.is_none();

    let layer: Box<dyn Layer<Registry> + Send + Sync> = if json {
        fmt::layer().json().with_writer(writer).boxed()
    } else {
        fmt::layer().with_ansi(!to_file).with_writer(writer).boxed()
    };

    tracing_subscriber::registry().with(layer).with(filter).init();

    if let Some((path, e)) = open_error {
        warn!(path = %path, error = %e, "cannot open log file, logging to stdout");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_cover_all_crates() {
        let directives = default_directives("debug");
        assert!(directives.starts_with("spotwatch=debug,"));
        assert!(directives.contains("spot_health=debug"));
        assert_eq!(directives.split(',').count(), CRATES.len());
        assert!(EnvFilter::try_new(&directives).is_ok());
    }
}
