//! Post-start reachability checks.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Answers "does this address respond right now?".
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self, address: &str) -> bool;
}

/// ICMP echo through the system `ping` binary.
#[derive(Debug, Clone)]
pub struct PingProbe {
    count: u32,
    timeout: Duration,
}

impl Default for PingProbe {
    fn default() -> Self {
        Self {
            count: 3,
            timeout: Duration::from_secs(5),
        }
    }
}

impl PingProbe {
    pub fn new(count: u32, timeout: Duration) -> Self {
        Self {
            count: count.max(1),
            timeout,
        }
    }
}

#[async_trait]
impl ReachabilityProbe for PingProbe {
    async fn probe(&self, address: &str) -> bool {
        if address.is_empty() {
            return false;
        }

        let wait_secs = self.timeout.as_secs().max(1).to_string();
        let child = Command::new("ping")
            .arg("-c")
            .arg(self.count.to_string())
            .arg("-W")
            .arg(&wait_secs)
            .arg(address)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(status)) => {
                debug!(address, success = status.success(), "ping finished");
                status.success()
            }
            Ok(Err(e)) => {
                warn!(address, error = %e, "failed to run ping");
                false
            }
            Err(_) => {
                debug!(address, "ping timed out");
                false
            }
        }
    }
}
