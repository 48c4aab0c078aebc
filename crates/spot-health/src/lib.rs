//! Reclaim detection and recovery for spot instances.
//!
//! - [`CooldownGovernor`] spaces out repeated "reclaimed" alerts per instance.
//! - [`Remediator`] drives one instance through detect → start → wait →
//!   health-check with a bounded, fixed-interval retry policy.
//! - [`PingProbe`] confirms a started instance answers on its public address.
//!
//! Alerts leave this crate through [`AlertSink`]; delivery is best-effort and
//! never influences the remediation result.

#![forbid(unsafe_code)]

pub mod cooldown;
pub mod probe;
pub mod remediation;

use async_trait::async_trait;
use spot_proto::Alert;

pub use cooldown::CooldownGovernor;
pub use probe::{PingProbe, ReachabilityProbe};
pub use remediation::{
    HealthCheckPolicy, HealthVerdict, RemediationError, RemediationOutcome, RemediationPolicy,
    RemediationState, Remediator,
};

/// Destination for operator alerts. Implementations swallow and log their
/// own delivery failures.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn emit(&self, alert: Alert);
}
