//! Wiring shared by the scenario test binaries.

#![allow(dead_code)]

use spot_health::{CooldownGovernor, RemediationPolicy, Remediator};
use spotwatch::{Monitor, MonitorParts};
use spotwatch_tests::{FakeCloud, RecordingSink, RecordingTransport, StaticProbe};
use std::sync::Arc;
use std::time::Duration;

pub const COOLDOWN: Duration = Duration::from_secs(300);

pub struct Harness {
    pub cloud: Arc<FakeCloud>,
    pub sink: Arc<RecordingSink>,
    pub transport: Arc<RecordingTransport>,
    pub monitor: Arc<Monitor>,
}

pub fn no_health_check() -> RemediationPolicy {
    RemediationPolicy {
        health_check: None,
        ..RemediationPolicy::default()
    }
}

pub fn harness(cloud: FakeCloud, policy: RemediationPolicy) -> Harness {
    harness_with_probe(cloud, policy, true)
}

pub fn harness_with_probe(cloud: FakeCloud, policy: RemediationPolicy, reachable: bool) -> Harness {
    let cloud = Arc::new(cloud);
    let sink = Arc::new(RecordingSink::default());
    let transport = Arc::new(RecordingTransport::default());

    let remediator = Remediator::new(
        cloud.clone(),
        Arc::new(StaticProbe(reachable)),
        sink.clone(),
        Arc::new(CooldownGovernor::new(COOLDOWN)),
        policy,
    );
    let monitor = Monitor::new(MonitorParts {
        compute: cloud.clone(),
        billing: cloud.clone(),
        traffic: cloud.clone(),
        remediator,
        sink: sink.clone(),
        transport: transport.clone(),
    });

    Harness {
        cloud,
        sink,
        transport,
        monitor: Arc::new(monitor),
    }
}
