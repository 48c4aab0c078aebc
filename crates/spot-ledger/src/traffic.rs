//! Internet traffic aggregation by geography.

use crate::bytes_to_gb;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spot_proto::{Geography, RegionTraffic, classify_region};
use std::collections::BTreeMap;
use tracing::info;

/// Traffic accumulated for one geographic bucket. All counters are raw bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficRegionSummary {
    pub total_bytes: u64,
    pub regions: Vec<String>,
    /// Product identifier (eip, ipv6bandwidth, cbwp, ...) to bytes.
    pub products: BTreeMap<String, u64>,
}

impl TrafficRegionSummary {
    fn add(&mut self, record: &RegionTraffic) {
        self.total_bytes += record.bytes;
        self.regions.push(record.region_id.clone());
        for product in &record.products {
            *self.products.entry(product.product.clone()).or_default() += product.bytes;
        }
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn gigabytes(&self) -> f64 {
        bytes_to_gb(self.total_bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficSummary {
    pub cycle_label: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub domestic: TrafficRegionSummary,
    pub international: TrafficRegionSummary,
    pub total_bytes: u64,
}

impl TrafficSummary {
    pub fn bucket(&self, geography: Geography) -> &TrafficRegionSummary {
        match geography {
            Geography::Domestic => &self.domestic,
            Geography::International => &self.international,
        }
    }

    pub fn total_gigabytes(&self) -> f64 {
        bytes_to_gb(self.total_bytes)
    }
}

/// Partition per-region traffic into the domestic and international buckets.
pub fn aggregate_traffic(
    records: &[RegionTraffic],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> TrafficSummary {
    let mut domestic = TrafficRegionSummary::default();
    let mut international = TrafficRegionSummary::default();
    let mut total_bytes = 0u64;

    for record in records {
        total_bytes += record.bytes;
        match classify_region(&record.region_id) {
            Geography::Domestic => domestic.add(record),
            Geography::International => international.add(record),
        }
    }

    let summary = TrafficSummary {
        cycle_label: start.format("%Y-%m").to_string(),
        start,
        end,
        domestic,
        international,
        total_bytes,
    };

    info!(
        total_gb = summary.total_gigabytes(),
        domestic_gb = summary.domestic.gigabytes(),
        domestic_regions = summary.domestic.region_count(),
        international_gb = summary.international.gigabytes(),
        international_regions = summary.international.region_count(),
        "traffic aggregated"
    );

    summary
}
