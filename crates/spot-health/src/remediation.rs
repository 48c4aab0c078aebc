//! Reclaim remediation state machine.
//!
//! One call to [`Remediator::run`] handles one instance for one tick:
//!
//! ```text
//! RUNNING ─(status == Stopped)─▶ DETECTED ─▶ STARTING ─▶ WAITING_RUNNING
//!                                               ▲              │
//!                                   retry sleep │              ▼
//!                                               └── [HEALTH_CHECKING] ─▶ STARTED
//!                                   attempts exhausted ─▶ FAILED
//! ```
//!
//! Every wait is bounded: the fixed retry sleep, the wait-for-running
//! deadline and the health-check timeout.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use spot_proto::{Alert, InstanceRef, InstanceStatus, TrackedInstance};
use spot_provider::{ComputeApi, ProviderError, StartOutcome};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::{AlertSink, CooldownGovernor, ReachabilityProbe};

/// Default number of start attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

// ─── Policy ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckPolicy {
    /// Overall deadline for the instance to answer the probe.
    pub timeout: Duration,
    /// Pause between probes.
    pub interval: Duration,
}

impl Default for HealthCheckPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationPolicy {
    pub max_attempts: u32,
    /// Fixed sleep before every attempt after the first.
    pub retry_interval: Duration,
    pub running_poll_interval: Duration,
    /// Absolute deadline for reaching Running after a start command.
    pub running_deadline: Duration,
    /// `None` disables the post-start reachability check.
    pub health_check: Option<HealthCheckPolicy>,
}

impl Default for RemediationPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_interval: Duration::from_secs(30),
            running_poll_interval: Duration::from_secs(5),
            running_deadline: Duration::from_secs(120),
            health_check: Some(HealthCheckPolicy::default()),
        }
    }
}

// ─── States and results ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationState {
    Running,
    Detected,
    Starting,
    WaitingRunning,
    HealthChecking,
    Started,
    Failed,
}

impl std::fmt::Display for RemediationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Detected => "detected",
            Self::Starting => "starting",
            Self::WaitingRunning => "waiting_running",
            Self::HealthChecking => "health_checking",
            Self::Started => "started",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthVerdict {
    Reachable,
    /// Running, but the probe never answered before the timeout.
    Unreachable,
    /// Checking disabled, or no public address to probe.
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemediationOutcome {
    /// Not stopped; nothing to do this tick.
    NotStopped { status: InstanceStatus },
    /// The provider refused the start because the instance was no longer
    /// stopped. Treated as success, without a success alert.
    AlreadyStarted { attempts: u32 },
    Started {
        attempts: u32,
        elapsed: Duration,
        public_address: Option<String>,
        health: HealthVerdict,
    },
}

impl RemediationOutcome {
    pub fn final_state(&self) -> RemediationState {
        match self {
            Self::NotStopped { .. } => RemediationState::Running,
            Self::AlreadyStarted { .. } | Self::Started { .. } => RemediationState::Started,
        }
    }
}

#[derive(Debug, Error)]
pub enum RemediationError {
    /// The status query failed. No state was advanced and no attempt counted.
    #[error("failed to query status of {instance_id}: {source}")]
    StatusQuery {
        instance_id: String,
        #[source]
        source: ProviderError,
    },

    #[error("failed to start {instance_id} after {attempts} attempts: {last_error}")]
    Exhausted {
        instance_id: String,
        attempts: u32,
        last_error: String,
    },
}

/// Why one attempt did not reach Running.
#[derive(Debug, Error)]
enum AttemptError {
    #[error("start command failed: {0}")]
    Start(ProviderError),
    #[error("instance did not reach Running within {0:?}")]
    RunningDeadline(Duration),
}

// ─── Remediator ───────────────────────────────────────────────────────────────

/// Runs the remediation sequence against the compute API.
pub struct Remediator {
    compute: Arc<dyn ComputeApi>,
    probe: Arc<dyn ReachabilityProbe>,
    sink: Arc<dyn AlertSink>,
    cooldown: Arc<CooldownGovernor>,
    policy: RemediationPolicy,
}

impl Remediator {
    pub fn new(
        compute: Arc<dyn ComputeApi>,
        probe: Arc<dyn ReachabilityProbe>,
        sink: Arc<dyn AlertSink>,
        cooldown: Arc<CooldownGovernor>,
        policy: RemediationPolicy,
    ) -> Self {
        Self {
            compute,
            probe,
            sink,
            cooldown,
            policy,
        }
    }

    /// Observe one instance and, if it was reclaimed, bring it back.
    pub async fn run(
        &self,
        instance: &TrackedInstance,
    ) -> Result<RemediationOutcome, RemediationError> {
        let status = self
            .compute
            .instance_status(&instance.region_id, &instance.id)
            .await
            .map_err(|source| RemediationError::StatusQuery {
                instance_id: instance.id.clone(),
                source,
            })?;

        debug!(instance = %instance.id, status = %status, "observed status");
        if !status.is_stopped() {
            return Ok(RemediationOutcome::NotStopped { status });
        }

        self.enter(instance, RemediationState::Detected);
        warn!(instance = %instance.id, name = %instance.display_name, region = %instance.region_id, "instance reclaimed, attempting to start");
        self.announce_reclaimed(instance).await;

        let started_at = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                info!(instance = %instance.id, attempt, max_attempts, "retrying start");
                tokio::time::sleep(self.policy.retry_interval).await;
            }

            self.enter(instance, RemediationState::Starting);
            match self.attempt_start(instance).await {
                Ok(StartOutcome::AlreadyNotStopped) => {
                    info!(instance = %instance.id, attempt, "instance already left the stopped state");
                    return Ok(RemediationOutcome::AlreadyStarted { attempts: attempt });
                }
                Ok(StartOutcome::Accepted) => {}
                Err(e) => {
                    warn!(instance = %instance.id, attempt, error = %e, "start attempt failed");
                    last_error = e.to_string();
                    continue;
                }
            }

            let current = self.refresh(instance).await;
            let public_address = current.public_address.clone().filter(|a| !a.is_empty());

            let (health, waited) = match (&self.policy.health_check, public_address.as_deref()) {
                (Some(hc), Some(address)) => {
                    self.enter(instance, RemediationState::HealthChecking);
                    self.await_reachable(address, hc).await
                }
                _ => (HealthVerdict::Skipped, Duration::ZERO),
            };

            let elapsed = started_at.elapsed();
            self.enter(instance, RemediationState::Started);
            let instance_ref = InstanceRef::from(&current);

            let alert = if health == HealthVerdict::Unreachable {
                warn!(instance = %instance.id, waited_secs = waited.as_secs(), "instance running but unreachable");
                Alert::HealthCheckTimeout {
                    instance: instance_ref,
                    public_address: public_address.clone(),
                    waited,
                }
            } else {
                info!(instance = %instance.id, attempt, elapsed_secs = elapsed.as_secs(), "instance started");
                Alert::Started {
                    instance: instance_ref,
                    public_address: public_address.clone(),
                    elapsed,
                }
            };
            self.sink.emit(alert).await;

            return Ok(RemediationOutcome::Started {
                attempts: attempt,
                elapsed,
                public_address,
                health,
            });
        }

        self.enter(instance, RemediationState::Failed);
        error!(instance = %instance.id, attempts = max_attempts, error = %last_error, "giving up on instance");
        self.sink
            .emit(Alert::StartFailed {
                instance: InstanceRef::from(instance),
                attempts: max_attempts,
                error: last_error.clone(),
            })
            .await;

        Err(RemediationError::Exhausted {
            instance_id: instance.id.clone(),
            attempts: max_attempts,
            last_error,
        })
    }

    fn enter(&self, instance: &TrackedInstance, state: RemediationState) {
        debug!(instance = %instance.id, state = %state, "remediation state");
    }

    async fn announce_reclaimed(&self, instance: &TrackedInstance) {
        let now = Utc::now();
        if !self.cooldown.can_notify(&instance.id, now) {
            debug!(instance = %instance.id, "reclaimed alert suppressed by cooldown");
            return;
        }
        self.cooldown.record_notified(&instance.id, now);
        self.sink
            .emit(Alert::Reclaimed {
                instance: InstanceRef::from(instance),
                at: now,
            })
            .await;
    }

    /// Start command plus wait-for-running.
    async fn attempt_start(
        &self,
        instance: &TrackedInstance,
    ) -> Result<StartOutcome, AttemptError> {
        let outcome = self
            .compute
            .start_instance(&instance.region_id, &instance.id)
            .await
            .map_err(AttemptError::Start)?;
        if outcome == StartOutcome::AlreadyNotStopped {
            return Ok(outcome);
        }

        info!(instance = %instance.id, "start command accepted");
        self.enter(instance, RemediationState::WaitingRunning);
        self.wait_for_running(instance).await?;
        Ok(outcome)
    }

    async fn wait_for_running(&self, instance: &TrackedInstance) -> Result<(), AttemptError> {
        let poll = async {
            loop {
                tokio::time::sleep(self.policy.running_poll_interval).await;
                match self
                    .compute
                    .instance_status(&instance.region_id, &instance.id)
                    .await
                {
                    Ok(status) if status.is_running() => return,
                    Ok(status) => {
                        debug!(instance = %instance.id, status = %status, "waiting for Running")
                    }
                    Err(e) => {
                        warn!(instance = %instance.id, error = %e, "status poll failed while waiting")
                    }
                }
            }
        };

        tokio::time::timeout(self.policy.running_deadline, poll)
            .await
            .map_err(|_| AttemptError::RunningDeadline(self.policy.running_deadline))
    }

    /// Re-read the instance to pick up a newly assigned address. Falls back
    /// to the stale record on error.
    async fn refresh(&self, instance: &TrackedInstance) -> TrackedInstance {
        match self
            .compute
            .describe_instance(&instance.region_id, &instance.id)
            .await
        {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!(instance = %instance.id, error = %e, "failed to refresh instance, using stale data");
                instance.clone()
            }
        }
    }

    async fn await_reachable(
        &self,
        address: &str,
        policy: &HealthCheckPolicy,
    ) -> (HealthVerdict, Duration) {
        let began = Instant::now();
        let poll = async {
            loop {
                if self.probe.probe(address).await {
                    return;
                }
                tokio::time::sleep(policy.interval).await;
            }
        };

        match tokio::time::timeout(policy.timeout, poll).await {
            Ok(()) => {
                debug!(address, "reachability confirmed");
                (HealthVerdict::Reachable, began.elapsed())
            }
            Err(_) => (HealthVerdict::Unreachable, policy.timeout),
        }
    }
}
