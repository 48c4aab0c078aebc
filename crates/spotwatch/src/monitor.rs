//! Reconciliation loop body and on-demand reports.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use spot_health::{AlertSink, RemediationError, RemediationOutcome, Remediator};
use spot_ledger::{BillingSummary, TrafficSummary, aggregate_billing, aggregate_traffic};
use spot_notify::{
    BotCommand, StatusLine, Transport, render_billing, render_help, render_status, render_traffic,
};
use spot_proto::{Alert, TrackedInstance};
use spot_provider::{BillingApi, ComputeApi, TrafficApi, discover_spot_instances};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::ReportResult;
use crate::registry::InstanceRegistry;

/// Product code billing is queried for.
pub const BILLING_PRODUCT_CODE: &str = "ecs";

/// Collaborators a [`Monitor`] is built from.
pub struct MonitorParts {
    pub compute: Arc<dyn ComputeApi>,
    pub billing: Arc<dyn BillingApi>,
    pub traffic: Arc<dyn TrafficApi>,
    pub remediator: Remediator,
    pub sink: Arc<dyn AlertSink>,
    pub transport: Arc<dyn Transport>,
}

/// Counts from one reconciliation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub checked: usize,
    pub not_stopped: usize,
    pub recovered: usize,
    pub already_started: usize,
    pub failed: usize,
    pub status_errors: usize,
}

pub struct Monitor {
    compute: Arc<dyn ComputeApi>,
    billing: Arc<dyn BillingApi>,
    traffic: Arc<dyn TrafficApi>,
    registry: InstanceRegistry,
    remediator: Remediator,
    sink: Arc<dyn AlertSink>,
    transport: Arc<dyn Transport>,
}

impl Monitor {
    pub fn new(parts: MonitorParts) -> Self {
        Self {
            compute: parts.compute,
            billing: parts.billing,
            traffic: parts.traffic,
            registry: InstanceRegistry::new(),
            remediator: parts.remediator,
            sink: parts.sink,
            transport: parts.transport,
        }
    }

    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    // ─── Discovery ────────────────────────────────────────────────────────────

    /// Run a discovery pass and swap the result into the registry. On error
    /// the previous snapshot stays in place. Never alerts.
    pub async fn discover(&self) -> spot_provider::Result<usize> {
        let found = discover_spot_instances(self.compute.as_ref()).await?;
        for inst in &found {
            debug!(instance = %inst.id, line = %inst.summary_line(), "tracking spot instance");
        }
        let count = self.registry.replace(found);
        info!(count, "spot instances discovered");
        Ok(count)
    }

    /// Send the startup announcement if anything is tracked.
    pub async fn announce_startup(&self) -> bool {
        let instances = self.registry.refs();
        if instances.is_empty() {
            warn!("no spot instances found; nothing to watch until rediscovery");
            return false;
        }
        self.sink
            .emit(Alert::MonitorStarted {
                instances,
                at: Utc::now(),
            })
            .await;
        true
    }

    // ─── Reconciliation ───────────────────────────────────────────────────────

    /// One tick: remediate every tracked instance in turn. A failure on one
    /// instance never stops the pass.
    pub async fn reconcile(&self) -> TickReport {
        let snapshot = self.registry.snapshot();
        let mut report = TickReport::default();

        for instance in snapshot.iter() {
            report.checked += 1;
            match self.remediator.run(instance).await {
                Ok(outcome) => {
                    debug!(instance = %instance.id, state = %outcome.final_state(), "instance checked");
                    match outcome {
                        RemediationOutcome::NotStopped { .. } => report.not_stopped += 1,
                        RemediationOutcome::AlreadyStarted { .. } => report.already_started += 1,
                        RemediationOutcome::Started { attempts, elapsed, .. } => {
                            report.recovered += 1;
                            info!(instance = %instance.id, attempts, elapsed_secs = elapsed.as_secs(), "instance recovered");
                        }
                    }
                }
                Err(e @ RemediationError::StatusQuery { .. }) => {
                    report.status_errors += 1;
                    warn!(instance = %instance.id, error = %e, "status check failed");
                }
                Err(e @ RemediationError::Exhausted { .. }) => {
                    report.failed += 1;
                    error!(instance = %instance.id, error = %e, "instance could not be restarted");
                }
            }
        }

        debug!(?report, "reconciliation pass complete");
        report
    }

    // ─── Reports ──────────────────────────────────────────────────────────────

    /// Current-month billing for the tracked instances.
    pub async fn billing_summary(&self, now: DateTime<Utc>) -> ReportResult<BillingSummary> {
        let cycle = now.format("%Y-%m").to_string();
        let raw = self
            .billing
            .query_instance_bill(&cycle, BILLING_PRODUCT_CODE)
            .await?;
        debug!(cycle = %cycle, items = raw.len(), "billing items fetched");
        Ok(aggregate_billing(&raw, &self.registry.refs(), now))
    }

    /// Internet traffic from the start of the month until `now`.
    pub async fn traffic_summary(&self, now: DateTime<Utc>) -> ReportResult<TrafficSummary> {
        let start = month_start(now);
        let records = self.traffic.query_internet_traffic(start, now).await?;
        debug!(regions = records.len(), "traffic records fetched");
        Ok(aggregate_traffic(&records, start, now))
    }

    /// Live status of each tracked instance. A failed query shows as unknown.
    pub async fn status_lines(&self) -> Vec<StatusLine> {
        let snapshot = self.registry.snapshot();
        let mut lines = Vec::with_capacity(snapshot.len());
        for instance in snapshot.iter() {
            lines.push(self.status_line(instance).await);
        }
        lines
    }

    async fn status_line(&self, instance: &TrackedInstance) -> StatusLine {
        let status = match self
            .compute
            .instance_status(&instance.region_id, &instance.id)
            .await
        {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(instance = %instance.id, error = %e, "status query failed");
                None
            }
        };
        StatusLine {
            instance: instance.into(),
            status,
        }
    }

    /// Produce the message for `command`.
    pub async fn render(&self, command: BotCommand) -> ReportResult<String> {
        let now = Utc::now();
        Ok(match command {
            BotCommand::Billing => render_billing(&self.billing_summary(now).await?),
            BotCommand::Traffic => render_traffic(&self.traffic_summary(now).await?),
            BotCommand::Status => render_status(&self.status_lines().await),
            BotCommand::Help => render_help(),
        })
    }

    /// Render `command` and deliver it to the chat.
    pub async fn send_report(&self, command: BotCommand) -> ReportResult<()> {
        let text = self.render(command).await?;
        self.transport.send(&text).await?;
        info!(command = %command, "report sent");
        Ok(())
    }
}

/// Midnight UTC on the first day of `now`'s month.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_start() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 13, 45, 2).unwrap();
        assert_eq!(
            month_start(now),
            Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(month_start(month_start(now)), month_start(now));
    }
}
