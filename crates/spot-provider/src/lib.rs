//! Cloud API access for Spotwatch.
//!
//! The remediation engine and the reports only see the [`ComputeApi`],
//! [`BillingApi`] and [`TrafficApi`] traits. [`AliyunClient`] implements all
//! three against the Aliyun OpenAPI (ECS, BSS and CDT).

#![forbid(unsafe_code)]

pub mod aliyun;
pub mod signer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use spot_proto::{InstanceStatus, RawBillItem, RegionTraffic, TrackedInstance};
use thiserror::Error;
use tracing::{info, warn};

pub use aliyun::AliyunClient;
pub use signer::Credentials;

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{action} failed: {code}: {message}")]
    Api {
        action: String,
        code: String,
        message: String,
        request_id: Option<String>,
    },

    #[error("failed to decode {action} response: {reason}")]
    Decode { action: String, reason: String },

    #[error("instance {0} not found")]
    NotFound(String),

    #[error("signing error: {0}")]
    Signing(String),
}

impl ProviderError {
    pub fn api(action: &str, code: &str, message: &str) -> Self {
        Self::Api {
            action: action.to_string(),
            code: code.to_string(),
            message: message.to_string(),
            request_id: None,
        }
    }

    /// Provider error code, when the API answered with one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

// ─── API traits ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeType {
    /// Pay-as-you-go; spot instances are a subset.
    PostPaid,
    PrePaid,
}

impl ChargeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostPaid => "PostPaid",
            Self::PrePaid => "PrePaid",
        }
    }
}

/// Result of a start command that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The start command was accepted.
    Accepted,
    /// The instance was no longer stopped; someone else already started it.
    AlreadyNotStopped,
}

/// Compute control plane.
#[async_trait]
pub trait ComputeApi: Send + Sync {
    async fn list_regions(&self) -> Result<Vec<String>>;

    /// All instances of a charge type in one region, across every page.
    async fn list_instances(
        &self,
        region_id: &str,
        charge_type: ChargeType,
    ) -> Result<Vec<TrackedInstance>>;

    async fn instance_status(&self, region_id: &str, instance_id: &str) -> Result<InstanceStatus>;

    async fn start_instance(&self, region_id: &str, instance_id: &str) -> Result<StartOutcome>;

    async fn describe_instance(&self, region_id: &str, instance_id: &str)
    -> Result<TrackedInstance>;
}

/// Billing query API.
#[async_trait]
pub trait BillingApi: Send + Sync {
    /// Line items of one billing cycle (`YYYY-MM`) for one product code.
    async fn query_instance_bill(&self, cycle: &str, product_code: &str) -> Result<Vec<RawBillItem>>;
}

/// Internet traffic query API.
#[async_trait]
pub trait TrafficApi: Send + Sync {
    async fn query_internet_traffic(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RegionTraffic>>;
}

// ─── Discovery ────────────────────────────────────────────────────────────────

/// Spot instances carry a spot strategy other than `NoSpot`.
pub fn is_spot_strategy(strategy: &str) -> bool {
    !strategy.is_empty() && strategy != "NoSpot"
}

/// Find every pay-as-you-go spot instance in every region.
///
/// A failing region listing aborts the pass; a failing region is skipped.
pub async fn discover_spot_instances(api: &dyn ComputeApi) -> Result<Vec<TrackedInstance>> {
    let regions = api.list_regions().await?;

    let mut found = Vec::new();
    for region in &regions {
        match api.list_instances(region, ChargeType::PostPaid).await {
            Ok(instances) => found.extend(
                instances
                    .into_iter()
                    .filter(|i| is_spot_strategy(&i.spot_strategy)),
            ),
            Err(e) => warn!(region = %region, error = %e, "failed to list instances, skipping region"),
        }
    }

    info!(regions = regions.len(), instances = found.len(), "discovery complete");
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeCompute {
        regions: Vec<String>,
        by_region: HashMap<String, Result<Vec<TrackedInstance>>>,
    }

    fn inst(id: &str, region: &str, strategy: &str) -> TrackedInstance {
        TrackedInstance {
            id: id.to_string(),
            display_name: id.to_string(),
            region_id: region.to_string(),
            last_known_status: InstanceStatus::Running,
            public_address: None,
            private_address: None,
            spot_strategy: strategy.to_string(),
        }
    }

    #[async_trait]
    impl ComputeApi for FakeCompute {
        async fn list_regions(&self) -> Result<Vec<String>> {
            Ok(self.regions.clone())
        }

        async fn list_instances(&self, region_id: &str, _: ChargeType) -> Result<Vec<TrackedInstance>> {
            match self.by_region.get(region_id) {
                Some(Ok(list)) => Ok(list.clone()),
                Some(Err(_)) => Err(ProviderError::api("DescribeInstances", "Throttling", "slow down")),
                None => Ok(vec![]),
            }
        }

        async fn instance_status(&self, _: &str, _: &str) -> Result<InstanceStatus> {
            Ok(InstanceStatus::Running)
        }

        async fn start_instance(&self, _: &str, _: &str) -> Result<StartOutcome> {
            Ok(StartOutcome::Accepted)
        }

        async fn describe_instance(&self, _: &str, id: &str) -> Result<TrackedInstance> {
            Err(ProviderError::NotFound(id.to_string()))
        }
    }

    #[test]
    fn test_spot_strategy_filter() {
        assert!(is_spot_strategy("SpotAsPriceGo"));
        assert!(is_spot_strategy("SpotWithPriceLimit"));
        assert!(!is_spot_strategy("NoSpot"));
        assert!(!is_spot_strategy(""));
    }

    #[tokio::test]
    async fn test_discovery_filters_spot_and_skips_failing_region() {
        let mut by_region = HashMap::new();
        by_region.insert(
            "cn-hongkong".to_string(),
            Ok(vec![inst("i-spot", "cn-hongkong", "SpotAsPriceGo"), inst("i-od", "cn-hongkong", "NoSpot")]),
        );
        by_region.insert("us-west-1".to_string(), Err(ProviderError::NotFound(String::new())));
        by_region.insert(
            "ap-southeast-1".to_string(),
            Ok(vec![inst("i-sg", "ap-southeast-1", "SpotWithPriceLimit")]),
        );
        let api = FakeCompute {
            regions: vec!["cn-hongkong".into(), "us-west-1".into(), "ap-southeast-1".into()],
            by_region,
        };

        let found = discover_spot_instances(&api).await.expect("discovery");
        let ids: Vec<_> = found.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["i-spot", "i-sg"]);
    }

    #[test]
    fn test_error_code_accessor() {
        let err = ProviderError::api("StartInstance", "IncorrectInstanceStatus", "busy");
        assert_eq!(err.code(), Some("IncorrectInstanceStatus"));
        assert_eq!(err.to_string(), "StartInstance failed: IncorrectInstanceStatus: busy");
        assert_eq!(ProviderError::NotFound("i-1".into()).code(), None);
    }
}
