//! Shared data model for Spotwatch.
//!
//! Defines the types exchanged between the provider client, the remediation
//! engine, the billing/traffic ledger and the notification layer.

#![forbid(unsafe_code)]

pub mod regions;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use regions::{Geography, classify_region, region_display_name};

// ─── Instance status ──────────────────────────────────────────────────────────

/// Provider-reported lifecycle status of a compute instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceStatus {
    Pending,
    Running,
    Starting,
    Stopping,
    Stopped,
    /// Anything the provider reports that we do not act on.
    Other(String),
}

impl InstanceStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Starting" => Self::Starting,
            "Stopping" => Self::Stopping,
            "Stopped" => Self::Stopped,
            other => Self::Other(other.to_string()),
        }
    }

    /// Only a stopped instance is a remediation candidate.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// In-flight transitions (starting, stopping, pending).
    pub fn is_transitional(&self) -> bool {
        matches!(self, Self::Pending | Self::Starting | Self::Stopping)
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Starting => write!(f, "Starting"),
            Self::Stopping => write!(f, "Stopping"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for InstanceStatus {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

// ─── Tracked instance ─────────────────────────────────────────────────────────

/// A spot instance under watch.
///
/// Built by discovery and replaced wholesale on the next discovery pass;
/// never partially mutated while a reconciliation tick reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedInstance {
    pub id: String,
    pub display_name: String,
    pub region_id: String,
    pub last_known_status: InstanceStatus,
    pub public_address: Option<String>,
    pub private_address: Option<String>,
    pub spot_strategy: String,
}

impl TrackedInstance {
    /// `name (id) - region`, the one-line form used in listings.
    pub fn summary_line(&self) -> String {
        format!("{} ({}) - {}", self.display_name, self.id, self.region_id)
    }
}

/// Minimal identity used when reporting on an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRef {
    pub id: String,
    pub display_name: String,
    pub region_id: String,
}

impl From<&TrackedInstance> for InstanceRef {
    fn from(inst: &TrackedInstance) -> Self {
        Self {
            id: inst.id.clone(),
            display_name: inst.display_name.clone(),
            region_id: inst.region_id.clone(),
        }
    }
}

// ─── Billing records ──────────────────────────────────────────────────────────

/// One line item as returned by the billing query API, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBillItem {
    pub instance_id: String,
    /// Provider category name of the line item (compute, system disk, ...).
    pub item_name: String,
    pub pretax_amount: f64,
    pub currency: String,
    /// Service period value as the provider reports it (a decimal string).
    pub service_period: String,
    /// Unit of `service_period`; open vocabulary.
    pub service_period_unit: String,
    pub instance_spec: String,
    pub product_code: String,
    pub product_detail: String,
}

// ─── Traffic records ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductTraffic {
    pub product: String,
    pub bytes: u64,
}

/// Internet traffic for one region over the queried range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionTraffic {
    pub region_id: String,
    pub bytes: u64,
    pub products: Vec<ProductTraffic>,
}

// ─── Alerts ───────────────────────────────────────────────────────────────────

/// Operator-facing events. Only [`Alert::Reclaimed`] is subject to cooldown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    MonitorStarted {
        instances: Vec<InstanceRef>,
        at: DateTime<Utc>,
    },
    Reclaimed {
        instance: InstanceRef,
        at: DateTime<Utc>,
    },
    Started {
        instance: InstanceRef,
        public_address: Option<String>,
        elapsed: Duration,
    },
    StartFailed {
        instance: InstanceRef,
        attempts: u32,
        error: String,
    },
    HealthCheckTimeout {
        instance: InstanceRef,
        public_address: Option<String>,
        waited: Duration,
    },
}

impl Alert {
    pub fn kind(&self) -> AlertKind {
        match self {
            Self::MonitorStarted { .. } => AlertKind::MonitorStarted,
            Self::Reclaimed { .. } => AlertKind::Reclaimed,
            Self::Started { .. } => AlertKind::Started,
            Self::StartFailed { .. } => AlertKind::StartFailed,
            Self::HealthCheckTimeout { .. } => AlertKind::HealthCheckTimeout,
        }
    }

    pub fn instance_id(&self) -> Option<&str> {
        match self {
            Self::MonitorStarted { .. } => None,
            Self::Reclaimed { instance, .. }
            | Self::Started { instance, .. }
            | Self::StartFailed { instance, .. }
            | Self::HealthCheckTimeout { instance, .. } => Some(&instance.id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    MonitorStarted,
    Reclaimed,
    Started,
    StartFailed,
    HealthCheckTimeout,
}
