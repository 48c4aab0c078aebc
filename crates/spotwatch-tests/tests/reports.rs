//! On-demand reports and bot command dispatch against scripted provider data.

mod common;

use chrono::{TimeZone, Utc};
use common::{harness, no_health_check};
use spot_notify::{BotCommand, CommandHandler};
use spot_proto::InstanceStatus;
use spotwatch::{CommandDispatcher, ReportError};
use spotwatch_tests::{Call, FakeCloud, Scripted, bill_item, region_traffic, spot_instance};

const GB: u64 = 1024 * 1024 * 1024;

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

async fn tracked(cloud: FakeCloud) -> common::Harness {
    let h = harness(cloud, no_health_check());
    h.monitor.discover().await.expect("discover");
    h
}

fn two_instances() -> FakeCloud {
    FakeCloud::new()
        .with_instance(spot_instance("i-a", "cn-hangzhou"))
        .with_instance(spot_instance("i-b", "cn-hongkong"))
}

// ─── Billing ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_billing_deduplicates_running_time_per_instance() {
    let h = tracked(two_instances()).await;
    h.cloud.set_bills(vec![
        // Both items report the same hour of service for i-a.
        bill_item("i-a", "Cloud server configuration", 0.5, "3600", "Second"),
        bill_item("i-a", "System disk", 0.1, "3600", "Second"),
        bill_item("i-b", "Cloud server configuration", 0.4, "7200", "Second"),
        bill_item("i-untracked", "Cloud server configuration", 9.0, "3600", "Second"),
    ]);

    let now = Utc.with_ymd_and_hms(2026, 10, 10, 12, 0, 0).unwrap();
    let summary = h.monitor.billing_summary(now).await.expect("billing");

    assert_eq!(summary.cycle_label, "2026-10");
    assert_eq!(summary.instances.len(), 2);
    assert_eq!(summary.instances[0].instance.id, "i-a");
    assert!(approx(summary.instances[0].running_hours, 1.0));
    assert!(approx(summary.instances[0].total_amount, 0.6));
    assert!(approx(summary.total_running_hours, 3.0));
    assert!(approx(summary.total_amount, 1.0));
    // Hourly rates 0.6 + 0.2 over a 720-hour month.
    assert!(approx(summary.monthly_estimate, 0.8 * 720.0));
    assert!(h.cloud.calls().contains(&Call::Bill("2026-10".to_string())));
}

#[tokio::test]
async fn test_billing_falls_back_to_elapsed_days() {
    let h = tracked(two_instances()).await;
    h.cloud.set_bills(vec![bill_item("i-a", "Public bandwidth", 3.0, "1", "Day")]);

    let now = Utc.with_ymd_and_hms(2026, 10, 10, 12, 0, 0).unwrap();
    let summary = h.monitor.billing_summary(now).await.expect("billing");

    assert_eq!(summary.elapsed_days, 10);
    assert!(approx(summary.total_running_hours, 0.0));
    assert!(approx(summary.monthly_estimate, 3.0 / 10.0 * 30.0));
}

#[tokio::test]
async fn test_empty_billing_still_reports() {
    let h = tracked(two_instances()).await;

    h.monitor
        .send_report(BotCommand::Billing)
        .await
        .expect("report");
    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("No charges recorded"));
    assert!(sent[0].contains("¥0.00"));
}

// ─── Traffic ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_traffic_partitions_every_region_once() {
    let h = tracked(two_instances()).await;
    h.cloud.set_traffic(vec![
        region_traffic("cn-hangzhou", &[("ecs", 2 * GB), ("slb", GB)]),
        region_traffic("cn-hongkong", &[("ecs", GB)]),
        region_traffic("us-west-1", &[("ecs", 512)]),
    ]);

    let now = Utc.with_ymd_and_hms(2026, 10, 17, 8, 30, 0).unwrap();
    let summary = h.monitor.traffic_summary(now).await.expect("traffic");

    assert_eq!(summary.start, Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap());
    assert_eq!(summary.end, now);
    assert_eq!(summary.domestic.regions, ["cn-hangzhou"]);
    assert_eq!(summary.international.regions, ["cn-hongkong", "us-west-1"]);
    assert_eq!(
        summary.domestic.total_bytes + summary.international.total_bytes,
        summary.total_bytes
    );
    assert_eq!(summary.total_bytes, 4 * GB + 512);
    assert_eq!(summary.international.products.get("ecs"), Some(&(GB + 512)));
}

#[tokio::test]
async fn test_traffic_report_is_sent() {
    let h = tracked(two_instances()).await;
    h.cloud
        .set_traffic(vec![region_traffic("cn-shanghai", &[("ecs", GB)])]);

    h.monitor
        .send_report(BotCommand::Traffic)
        .await
        .expect("report");
    let sent = h.transport.sent();
    assert!(sent[0].contains("Shanghai"));
    assert!(h.cloud.calls().contains(&Call::Traffic));
}

// ─── Status and help ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_status_shows_unknown_for_failed_query() {
    let h = tracked(two_instances()).await;
    h.cloud
        .script_status("i-a", vec![Scripted::Ok(InstanceStatus::Running)]);
    h.cloud.script_status("i-b", vec![Scripted::Fail("Throttling")]);

    let lines = h.monitor.status_lines().await;
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].status, Some(InstanceStatus::Running));
    assert_eq!(lines[1].status, None);

    let text = h.monitor.render(BotCommand::Status).await.expect("render");
    assert!(text.contains("i-a-name"));
    assert!(text.contains("Unknown"));
}

#[tokio::test]
async fn test_help_needs_no_provider_calls() {
    let h = harness(two_instances(), no_health_check());
    let text = h.monitor.render(BotCommand::Help).await.expect("render");
    assert!(text.contains("/billing"));
    assert!(h.cloud.calls().is_empty());
}

// ─── Delivery ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_delivery_failure_is_reported_to_caller() {
    let h = tracked(two_instances()).await;
    h.transport.set_failing(true);

    let err = h
        .monitor
        .send_report(BotCommand::Help)
        .await
        .expect_err("delivery should fail");
    assert!(matches!(err, ReportError::Notify(_)));
}

#[tokio::test]
async fn test_dispatcher_sends_requested_report() {
    let h = tracked(two_instances()).await;
    let dispatcher = CommandDispatcher::new(h.monitor.clone());

    dispatcher.handle(BotCommand::Status).await.expect("handle");
    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("Instance status"));

    h.transport.set_failing(true);
    assert!(dispatcher.handle(BotCommand::Help).await.is_err());
}
