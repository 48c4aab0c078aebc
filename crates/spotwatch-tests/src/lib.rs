//! Scripted fakes shared by the scenario tests.
//!
//! [`FakeCloud`] stands in for every provider API and records each call;
//! [`RecordingSink`] and [`RecordingTransport`] capture what would have
//! reached the operator.

#![forbid(unsafe_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use spot_health::{AlertSink, ReachabilityProbe};
use spot_notify::{NotifyError, Transport};
use spot_proto::{
    Alert, AlertKind, InstanceStatus, ProductTraffic, RawBillItem, RegionTraffic, TrackedInstance,
};
use spot_provider::{
    BillingApi, ChargeType, ComputeApi, ProviderError, Result, StartOutcome, TrafficApi,
};
use std::collections::{HashMap, HashSet, VecDeque};

// ─── Builders ─────────────────────────────────────────────────────────────────

pub fn spot_instance(id: &str, region: &str) -> TrackedInstance {
    TrackedInstance {
        id: id.to_string(),
        display_name: format!("{id}-name"),
        region_id: region.to_string(),
        last_known_status: InstanceStatus::Running,
        public_address: Some("203.0.113.10".to_string()),
        private_address: Some("10.0.0.10".to_string()),
        spot_strategy: "SpotAsPriceGo".to_string(),
    }
}

pub fn bill_item(instance_id: &str, item: &str, amount: f64, period: &str, unit: &str) -> RawBillItem {
    RawBillItem {
        instance_id: instance_id.to_string(),
        item_name: item.to_string(),
        pretax_amount: amount,
        currency: "CNY".to_string(),
        service_period: period.to_string(),
        service_period_unit: unit.to_string(),
        instance_spec: "ecs.t6-c1m1.large".to_string(),
        product_code: "ecs".to_string(),
        product_detail: "Elastic Compute Service".to_string(),
    }
}

pub fn region_traffic(region: &str, products: &[(&str, u64)]) -> RegionTraffic {
    RegionTraffic {
        region_id: region.to_string(),
        bytes: products.iter().map(|(_, b)| b).sum(),
        products: products
            .iter()
            .map(|(p, b)| ProductTraffic {
                product: p.to_string(),
                bytes: *b,
            })
            .collect(),
    }
}

// ─── Fake cloud ───────────────────────────────────────────────────────────────

/// One scripted answer. Errors are described rather than stored since
/// provider errors are not `Clone`.
#[derive(Debug, Clone)]
pub enum Scripted<T> {
    Ok(T),
    Fail(&'static str),
}

impl<T: Clone> Scripted<T> {
    fn resolve(&self, action: &str) -> Result<T> {
        match self {
            Self::Ok(v) => Ok(v.clone()),
            Self::Fail(code) => Err(ProviderError::api(action, code, "scripted failure")),
        }
    }
}

/// Answers in order; the last answer repeats once the script runs out.
#[derive(Debug, Clone)]
struct Script<T>(VecDeque<Scripted<T>>);

impl<T: Clone> Script<T> {
    fn next(&mut self, action: &str) -> Option<Result<T>> {
        let step = if self.0.len() > 1 {
            self.0.pop_front()
        } else {
            self.0.front().cloned()
        }?;
        Some(step.resolve(action))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListRegions,
    ListInstances(String),
    Status(String),
    Start(String),
    Describe(String),
    Bill(String),
    Traffic,
}

#[derive(Default)]
pub struct FakeCloud {
    regions: Mutex<Vec<String>>,
    regions_fail: Mutex<bool>,
    failing_regions: Mutex<HashSet<String>>,
    instances: Mutex<Vec<TrackedInstance>>,
    statuses: Mutex<HashMap<String, Script<InstanceStatus>>>,
    starts: Mutex<HashMap<String, Script<StartOutcome>>>,
    bills: Mutex<Vec<RawBillItem>>,
    traffic: Mutex<Vec<RegionTraffic>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an instance; its region is listed on first use.
    pub fn with_instance(self, instance: TrackedInstance) -> Self {
        {
            let mut regions = self.regions.lock();
            if !regions.contains(&instance.region_id) {
                regions.push(instance.region_id.clone());
            }
        }
        self.instances.lock().push(instance);
        self
    }

    pub fn with_region(self, region: &str) -> Self {
        self.regions.lock().push(region.to_string());
        self
    }

    pub fn fail_region(&self, region: &str) {
        self.failing_regions.lock().insert(region.to_string());
    }

    pub fn fail_region_listing(&self, fail: bool) {
        *self.regions_fail.lock() = fail;
    }

    pub fn script_status(&self, id: &str, steps: Vec<Scripted<InstanceStatus>>) {
        self.statuses.lock().insert(id.to_string(), Script(steps.into()));
    }

    pub fn script_start(&self, id: &str, steps: Vec<Scripted<StartOutcome>>) {
        self.starts.lock().insert(id.to_string(), Script(steps.into()));
    }

    pub fn set_bills(&self, items: Vec<RawBillItem>) {
        *self.bills.lock() = items;
    }

    pub fn set_traffic(&self, records: Vec<RegionTraffic>) {
        *self.traffic.lock() = records;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn start_calls(&self, id: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, Call::Start(i) if i == id))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn find(&self, id: &str) -> Option<TrackedInstance> {
        self.instances.lock().iter().find(|i| i.id == id).cloned()
    }
}

#[async_trait]
impl ComputeApi for FakeCloud {
    async fn list_regions(&self) -> Result<Vec<String>> {
        self.record(Call::ListRegions);
        if *self.regions_fail.lock() {
            return Err(ProviderError::api("DescribeRegions", "ServiceUnavailable", "scripted failure"));
        }
        Ok(self.regions.lock().clone())
    }

    async fn list_instances(&self, region_id: &str, _: ChargeType) -> Result<Vec<TrackedInstance>> {
        self.record(Call::ListInstances(region_id.to_string()));
        if self.failing_regions.lock().contains(region_id) {
            return Err(ProviderError::api("DescribeInstances", "Throttling", "scripted failure"));
        }
        Ok(self
            .instances
            .lock()
            .iter()
            .filter(|i| i.region_id == region_id)
            .cloned()
            .collect())
    }

    async fn instance_status(&self, _: &str, instance_id: &str) -> Result<InstanceStatus> {
        self.record(Call::Status(instance_id.to_string()));
        let next = self
            .statuses
            .lock()
            .get_mut(instance_id)
            .and_then(|s| s.next("DescribeInstanceStatus"));
        next.unwrap_or(Ok(InstanceStatus::Running))
    }

    async fn start_instance(&self, _: &str, instance_id: &str) -> Result<StartOutcome> {
        self.record(Call::Start(instance_id.to_string()));
        let next = self
            .starts
            .lock()
            .get_mut(instance_id)
            .and_then(|s| s.next("StartInstance"));
        next.unwrap_or(Ok(StartOutcome::Accepted))
    }

    async fn describe_instance(&self, _: &str, instance_id: &str) -> Result<TrackedInstance> {
        self.record(Call::Describe(instance_id.to_string()));
        self.find(instance_id)
            .ok_or_else(|| ProviderError::NotFound(instance_id.to_string()))
    }
}

#[async_trait]
impl BillingApi for FakeCloud {
    async fn query_instance_bill(&self, cycle: &str, _: &str) -> Result<Vec<RawBillItem>> {
        self.record(Call::Bill(cycle.to_string()));
        Ok(self.bills.lock().clone())
    }
}

#[async_trait]
impl TrafficApi for FakeCloud {
    async fn query_internet_traffic(
        &self,
        _: DateTime<Utc>,
        _: DateTime<Utc>,
    ) -> Result<Vec<RegionTraffic>> {
        self.record(Call::Traffic);
        Ok(self.traffic.lock().clone())
    }
}

// ─── Recorders ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingSink {
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }

    pub fn kinds(&self) -> Vec<AlertKind> {
        self.alerts.lock().iter().map(Alert::kind).collect()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn emit(&self, alert: Alert) {
        self.alerts.lock().push(alert);
    }
}

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<String>>,
    fail: Mutex<bool>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock() = fail;
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, text: &str) -> spot_notify::Result<()> {
        if *self.fail.lock() {
            return Err(NotifyError::Api {
                code: 502,
                description: "Bad Gateway".to_string(),
            });
        }
        self.sent.lock().push(text.to_string());
        Ok(())
    }
}

/// Probe with a fixed answer.
pub struct StaticProbe(pub bool);

#[async_trait]
impl ReachabilityProbe for StaticProbe {
    async fn probe(&self, _: &str) -> bool {
        self.0
    }
}
