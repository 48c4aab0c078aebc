//! Telegram HTML rendering for alerts and reports.

use chrono::{DateTime, Utc};
use spot_ledger::{BillingSummary, TrafficRegionSummary, TrafficSummary, format_bytes};
use spot_proto::{Alert, Geography, InstanceRef, InstanceStatus, region_display_name};
use std::fmt::Write;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━";
const NO_PUBLIC_ADDRESS: &str = "no public IP";

/// Escape the three characters Telegram's HTML mode cares about.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn instance_block(out: &mut String, instance: &InstanceRef) {
    let _ = writeln!(out, "Instance: {}", escape_html(&instance.display_name));
    let _ = writeln!(out, "ID: <code>{}</code>", escape_html(&instance.id));
    let _ = writeln!(out, "Region: {}", escape_html(region_display_name(&instance.region_id)));
}

fn address(public_address: &Option<String>) -> String {
    match public_address.as_deref() {
        Some(a) if !a.is_empty() => escape_html(a),
        _ => NO_PUBLIC_ADDRESS.to_string(),
    }
}

// ─── Alerts ───────────────────────────────────────────────────────────────────

pub fn render_alert(alert: &Alert) -> String {
    let mut out = String::new();
    match alert {
        Alert::MonitorStarted { instances, at } => {
            let _ = writeln!(out, "🚀 <b>Monitor started</b>");
            let _ = writeln!(out, "{RULE}");
            let _ = writeln!(out, "Instances watched: {}", instances.len());
            let _ = writeln!(out, "Time: {}", timestamp(*at));
            let _ = writeln!(out, "{RULE}");
            out.push_str("<b>Instances:</b>");
            for inst in instances {
                let _ = write!(
                    out,
                    "\n• {} (<code>{}</code>) - {}",
                    escape_html(&inst.display_name),
                    escape_html(&inst.id),
                    escape_html(region_display_name(&inst.region_id)),
                );
            }
        }
        Alert::Reclaimed { instance, at } => {
            let _ = writeln!(out, "🔴 <b>Instance reclaimed</b>");
            let _ = writeln!(out, "{RULE}");
            instance_block(&mut out, instance);
            let _ = writeln!(out, "Time: {}", timestamp(*at));
            let _ = writeln!(out, "{RULE}");
            out.push_str("Attempting automatic start...");
        }
        Alert::Started {
            instance,
            public_address,
            elapsed,
        } => {
            let _ = writeln!(out, "✅ <b>Instance started</b>");
            let _ = writeln!(out, "{RULE}");
            instance_block(&mut out, instance);
            let _ = writeln!(out, "Public IP: <code>{}</code>", address(public_address));
            let _ = writeln!(out, "Status: Running ✓");
            let _ = writeln!(out, "Recovery time: {} s", elapsed.as_secs());
            out.push_str(RULE);
        }
        Alert::StartFailed {
            instance,
            attempts,
            error,
        } => {
            let _ = writeln!(out, "❌ <b>Start failed</b>");
            let _ = writeln!(out, "{RULE}");
            instance_block(&mut out, instance);
            let _ = writeln!(out, "Error: {}", escape_html(error));
            let _ = writeln!(out, "Attempts: {attempts}, all failed");
            let _ = writeln!(out, "{RULE}");
            out.push_str("Manual intervention required!");
        }
        Alert::HealthCheckTimeout {
            instance,
            public_address,
            waited,
        } => {
            let _ = writeln!(out, "⚠️ <b>Health check timed out</b>");
            let _ = writeln!(out, "{RULE}");
            instance_block(&mut out, instance);
            let _ = writeln!(out, "Public IP: <code>{}</code>", address(public_address));
            let _ = writeln!(out, "Check: ping");
            let _ = writeln!(out, "Waited: {} s", waited.as_secs());
            let _ = writeln!(out, "{RULE}");
            out.push_str("Instance is running but may not be ready, please check manually!");
        }
    }
    out
}

// ─── Billing ──────────────────────────────────────────────────────────────────

pub fn render_billing(summary: &BillingSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "📊 <b>Billing summary</b> ({})", summary.cycle_label);
    let _ = writeln!(out, "{RULE}");

    if summary.is_empty() {
        let _ = writeln!(out, "\nNo charges recorded\n");
        let _ = writeln!(out, "{RULE}");
        let _ = writeln!(out, "💰 Month to date: ¥0.00");
        out.push_str("📈 Monthly estimate: ¥0.00");
        return out;
    }

    let _ = writeln!(
        out,
        "📅 Period: {}-01 ~ {}",
        summary.cycle_label,
        summary.generated_at.format("%d %H:%M UTC")
    );
    let _ = writeln!(out, "⏱ Days elapsed: {}", summary.elapsed_days);
    let _ = writeln!(out, "🕐 Total running time: {:.1} h", summary.total_running_hours);
    let _ = writeln!(out, "{RULE}\n");

    for inst in &summary.instances {
        if inst.spec.is_empty() {
            let _ = writeln!(out, "🖥 <b>{}</b>", escape_html(&inst.instance.display_name));
        } else {
            let _ = writeln!(
                out,
                "🖥 <b>{}</b> [{}]",
                escape_html(&inst.instance.display_name),
                escape_html(&inst.spec)
            );
        }
        let _ = writeln!(
            out,
            "   <code>{}</code> | {}",
            escape_html(&inst.instance.id),
            escape_html(region_display_name(&inst.instance.region_id))
        );

        for (i, item) in inst.items.iter().enumerate() {
            let branch = if i + 1 == inst.items.len() { "└─" } else { "├─" };
            let _ = writeln!(out, "   {branch} {}: ¥{:.4}", escape_html(&item.label), item.amount);
        }

        match inst.hourly_cost {
            Some(rate) if rate > 0.0 => {
                let _ = writeln!(
                    out,
                    "   <b>Subtotal: ¥{:.4}</b> ({:.1}h, ¥{rate:.4}/h)\n",
                    inst.total_amount, inst.running_hours
                );
            }
            _ => {
                let _ = writeln!(out, "   <b>Subtotal: ¥{:.4}</b>\n", inst.total_amount);
            }
        }
    }

    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "💰 <b>Month to date: ¥{:.4}</b>", summary.total_amount);
    let _ = write!(out, "📈 <b>Monthly estimate: ¥{:.2}</b>", summary.monthly_estimate);
    if let Some(method) = summary.estimate_description() {
        let _ = write!(out, "\n📝 <i>{}</i>", escape_html(&method));
    }
    out
}

// ─── Traffic ──────────────────────────────────────────────────────────────────

fn traffic_bucket(out: &mut String, geography: Geography, bucket: &TrafficRegionSummary) {
    let marker = match geography {
        Geography::Domestic => "🇨🇳",
        Geography::International => "🌍",
    };
    let _ = writeln!(
        out,
        "{marker} <b>{geography}</b>: {} ({} regions)",
        format_bytes(bucket.total_bytes),
        bucket.region_count()
    );

    if bucket.regions.is_empty() {
        let _ = writeln!(out, "   No traffic\n");
        return;
    }

    let names: Vec<String> = bucket
        .regions
        .iter()
        .map(|r| escape_html(region_display_name(r)))
        .collect();
    let _ = writeln!(out, "   Regions: {}", names.join(", "));

    let products: Vec<_> = bucket.products.iter().filter(|(_, bytes)| **bytes > 0).collect();
    for (i, (product, bytes)) in products.iter().enumerate() {
        let branch = if i + 1 == products.len() { "└─" } else { "├─" };
        let _ = writeln!(out, "   {branch} {}: {}", escape_html(product), format_bytes(**bytes));
    }
    out.push('\n');
}

pub fn render_traffic(summary: &TrafficSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "🌐 <b>Internet traffic</b> ({})", summary.cycle_label);
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(
        out,
        "📅 Period: {} ~ {}",
        summary.start.format("%m-%d"),
        summary.end.format("%m-%d %H:%M UTC")
    );
    let _ = writeln!(out, "📦 <b>Total: {}</b>", format_bytes(summary.total_bytes));
    let _ = writeln!(out, "{RULE}\n");

    for geography in [Geography::Domestic, Geography::International] {
        traffic_bucket(&mut out, geography, summary.bucket(geography));
    }

    out.truncate(out.trim_end().len());
    out
}

// ─── Status and help ──────────────────────────────────────────────────────────

/// One instance's live status; `None` when the query failed.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    pub instance: InstanceRef,
    pub status: Option<InstanceStatus>,
}

fn status_marker(status: Option<&InstanceStatus>) -> &'static str {
    match status {
        Some(InstanceStatus::Stopped) => "🔴",
        Some(s) if s.is_transitional() => "🟡",
        Some(InstanceStatus::Running) => "🟢",
        _ => "⚪",
    }
}

pub fn render_status(lines: &[StatusLine]) -> String {
    let mut out = String::from("📊 <b>Instance status</b>\n");
    if lines.is_empty() {
        out.push_str("\nNo instances under watch");
        return out;
    }

    let _ = writeln!(out, "{RULE}\n");
    for line in lines {
        let status = line
            .status
            .as_ref()
            .map_or_else(|| "Unknown".to_string(), |s| escape_html(&s.to_string()));
        let _ = writeln!(
            out,
            "{} <b>{}</b>",
            status_marker(line.status.as_ref()),
            escape_html(&line.instance.display_name)
        );
        let _ = writeln!(out, "   ID: <code>{}</code>", escape_html(&line.instance.id));
        let _ = writeln!(out, "   Region: {}", escape_html(region_display_name(&line.instance.region_id)));
        let _ = writeln!(out, "   Status: {status}\n");
    }
    out.truncate(out.trim_end().len());
    out
}

pub fn render_help() -> String {
    format!(
        "🤖 <b>Available commands</b>\n{RULE}\n\n\
         /billing - month-to-date billing summary\n\
         /traffic - month-to-date internet traffic\n\
         /status - live instance status\n\
         /help - show this message\n\n\
         {RULE}\n\
         <i>Aliases: /cost, /fee, /flow, /bandwidth, /start</i>"
    )
}
