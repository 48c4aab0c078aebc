//! Billing normalization, per-instance deduplication and monthly estimation.
//!
//! Provider line items repeat the same service period across several cost
//! components (compute, disk, bandwidth, image). Amounts are summed per
//! instance; elapsed run time is the maximum seconds-unit period seen for
//! that instance, never the sum.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use spot_proto::{InstanceRef, RawBillItem};
use std::collections::HashMap;
use tracing::{debug, info};

/// Estimate horizon for the hourly-rate method (30 days x 24 hours).
pub const HOURS_PER_MONTH: f64 = 720.0;
/// Estimate horizon for the elapsed-days method.
pub const DAYS_PER_MONTH: f64 = 30.0;

const SECONDS_PER_HOUR: f64 = 3600.0;
const SECONDS_PER_DAY: f64 = 24.0 * SECONDS_PER_HOUR;

// ─── Duration units ───────────────────────────────────────────────────────────

/// Service-period units the provider is known to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    Day,
    Hour,
    Second,
}

impl DurationUnit {
    /// Recognizes both the localized and the English spellings.
    /// Returns `None` for anything else, including an empty unit.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match raw {
            "天" => return Some(Self::Day),
            "小时" => return Some(Self::Hour),
            "秒" => return Some(Self::Second),
            _ => {}
        }
        let lower = raw.to_ascii_lowercase();
        match lower.trim_end_matches('s') {
            "day" => Some(Self::Day),
            "hour" => Some(Self::Hour),
            "second" => Some(Self::Second),
            _ => None,
        }
    }

    pub fn to_seconds(self, value: f64) -> f64 {
        match self {
            Self::Day => value * SECONDS_PER_DAY,
            Self::Hour => value * SECONDS_PER_HOUR,
            Self::Second => value,
        }
    }
}

// ─── Normalized line item ─────────────────────────────────────────────────────

/// A provider line item in canonical form. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingItem {
    pub instance_id: String,
    pub label: String,
    pub amount: f64,
    pub currency: String,
    /// `None` when the provider period was empty or not a number.
    pub service_duration_seconds: Option<f64>,
    /// Only seconds-unit items count toward running time; day-unit periods
    /// belong to subscription resources.
    pub duration_unit_was_seconds: bool,
}

/// Convert a raw line item into a [`BillingItem`].
///
/// An unrecognized unit is taken as seconds for the duration value but is
/// not flagged as a seconds-unit item.
pub fn normalize_bill_item(raw: &RawBillItem) -> BillingItem {
    let value = raw.service_period.trim().parse::<f64>().ok();
    let unit = DurationUnit::parse(&raw.service_period_unit);

    let service_duration_seconds = value.map(|v| match unit {
        Some(u) => u.to_seconds(v),
        None => v,
    });

    BillingItem {
        instance_id: raw.instance_id.clone(),
        label: billing_item_label(&raw.item_name, &raw.instance_spec),
        amount: raw.pretax_amount,
        currency: raw.currency.clone(),
        service_duration_seconds,
        duration_unit_was_seconds: unit == Some(DurationUnit::Second),
    }
}

/// Display label for a provider billing category.
///
/// Compute line items carry the instance spec when one is known.
pub fn billing_item_label(item_name: &str, instance_spec: &str) -> String {
    let with_spec = |base: &str| {
        if instance_spec.is_empty() {
            base.to_string()
        } else {
            format!("{base} ({instance_spec})")
        }
    };

    match item_name {
        "系统盘" => "System disk".to_string(),
        "数据盘" => "Data disk".to_string(),
        "云服务器配置" => {
            if instance_spec.is_empty() {
                "Compute resources".to_string()
            } else {
                with_spec("Compute")
            }
        }
        "ImageOS" => "Image".to_string(),
        "公网带宽" => "Public bandwidth".to_string(),
        "流量" => "Public traffic".to_string(),
        "快照" => "Snapshot".to_string(),
        "实例" => with_spec("Instance"),
        "" => "Other".to_string(),
        other => other.to_string(),
    }
}

// ─── Summaries ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceBillingSummary {
    pub instance: InstanceRef,
    pub spec: String,
    pub items: Vec<BillingItem>,
    pub total_amount: f64,
    /// Longest seconds-unit service period among this instance's items.
    pub running_seconds: f64,
    pub running_hours: f64,
    /// `None` when no running time could be derived.
    pub hourly_cost: Option<f64>,
}

impl InstanceBillingSummary {
    fn new(instance: &InstanceRef, spec: &str) -> Self {
        Self {
            instance: instance.clone(),
            spec: spec.to_string(),
            items: Vec::new(),
            total_amount: 0.0,
            running_seconds: 0.0,
            running_hours: 0.0,
            hourly_cost: None,
        }
    }

    fn add(&mut self, item: BillingItem) {
        if item.duration_unit_was_seconds
            && let Some(seconds) = item.service_duration_seconds
            && seconds > self.running_seconds
        {
            self.running_seconds = seconds;
        }
        self.total_amount += item.amount;
        self.items.push(item);
    }

    fn finish(&mut self) {
        self.running_hours = self.running_seconds / SECONDS_PER_HOUR;
        self.hourly_cost = if self.running_hours > 0.0 {
            Some(self.total_amount / self.running_hours)
        } else {
            None
        };
    }

    /// Hourly cost for rate extrapolation; undefined counts as zero.
    pub fn hourly_rate(&self) -> f64 {
        self.hourly_cost.unwrap_or(0.0)
    }
}

/// How the monthly figure was derived.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum EstimateMethod {
    /// Sum of per-instance hourly rates over a 720-hour month.
    HourlyRate { total_hourly: f64 },
    /// Cycle total averaged over elapsed days, over a 30-day month.
    ElapsedDays { daily_rate: f64, elapsed_days: u32 },
    None,
}

impl EstimateMethod {
    pub fn description(&self) -> Option<String> {
        match self {
            Self::HourlyRate { total_hourly } => Some(format!(
                "sum of hourly rates: ¥{total_hourly:.4}/h × {HOURS_PER_MONTH:.0}h"
            )),
            Self::ElapsedDays { daily_rate, .. } => Some(format!(
                "elapsed-day average: ¥{daily_rate:.4}/day × {DAYS_PER_MONTH:.0} days"
            )),
            Self::None => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingSummary {
    /// Billing cycle as `YYYY-MM`.
    pub cycle_label: String,
    pub generated_at: DateTime<Utc>,
    pub elapsed_days: u32,
    /// Sum over instances of each instance's deduplicated hours.
    pub total_running_hours: f64,
    pub instances: Vec<InstanceBillingSummary>,
    pub total_amount: f64,
    pub monthly_estimate: f64,
    pub estimate_method: EstimateMethod,
}

impl BillingSummary {
    pub fn estimate_description(&self) -> Option<String> {
        self.estimate_method.description()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

// ─── Aggregation ──────────────────────────────────────────────────────────────

/// Two-tier monthly estimate.
///
/// Tier 1 uses the summed positive hourly rates; tier 2 falls back to the
/// cycle total over elapsed days; otherwise the estimate is zero.
pub fn estimate_monthly(
    instances: &[InstanceBillingSummary],
    total_amount: f64,
    elapsed_days: u32,
) -> (f64, EstimateMethod) {
    let total_hourly: f64 = instances
        .iter()
        .map(InstanceBillingSummary::hourly_rate)
        .filter(|rate| *rate > 0.0)
        .sum();

    if total_hourly > 0.0 {
        return (
            total_hourly * HOURS_PER_MONTH,
            EstimateMethod::HourlyRate { total_hourly },
        );
    }

    if total_amount > 0.0 && elapsed_days > 0 {
        let daily_rate = total_amount / f64::from(elapsed_days);
        return (
            daily_rate * DAYS_PER_MONTH,
            EstimateMethod::ElapsedDays {
                daily_rate,
                elapsed_days,
            },
        );
    }

    (0.0, EstimateMethod::None)
}

/// Build the cycle summary for `instances` from raw line items.
///
/// Items for instances outside `instances` are discarded. Output order
/// follows `instances`; instances without any line item are omitted.
pub fn aggregate_billing(
    raw_items: &[RawBillItem],
    instances: &[InstanceRef],
    now: DateTime<Utc>,
) -> BillingSummary {
    let wanted: HashMap<&str, &InstanceRef> =
        instances.iter().map(|i| (i.id.as_str(), i)).collect();
    let mut groups: HashMap<String, InstanceBillingSummary> = HashMap::new();

    for raw in raw_items {
        let Some(instance) = wanted.get(raw.instance_id.as_str()) else {
            continue;
        };
        debug!(
            instance = %raw.instance_id,
            item = %raw.item_name,
            spec = %raw.instance_spec,
            period = %raw.service_period,
            unit = %raw.service_period_unit,
            amount = raw.pretax_amount,
            "billing item"
        );

        let group = groups
            .entry(raw.instance_id.clone())
            .or_insert_with(|| InstanceBillingSummary::new(instance, &raw.instance_spec));
        if group.spec.is_empty() && !raw.instance_spec.is_empty() {
            group.spec = raw.instance_spec.clone();
        }
        group.add(normalize_bill_item(raw));
    }

    let mut summaries = Vec::with_capacity(groups.len());
    for instance in instances {
        if let Some(mut summary) = groups.remove(&instance.id) {
            summary.finish();
            summaries.push(summary);
        }
    }

    let total_amount: f64 = summaries.iter().map(|s| s.total_amount).sum();
    let total_running_hours: f64 = summaries.iter().map(|s| s.running_hours).sum();
    let elapsed_days = now.day();
    let (monthly_estimate, estimate_method) =
        estimate_monthly(&summaries, total_amount, elapsed_days);

    info!(
        instances = summaries.len(),
        total = total_amount,
        running_hours = total_running_hours,
        estimate = monthly_estimate,
        "billing aggregated"
    );

    BillingSummary {
        cycle_label: now.format("%Y-%m").to_string(),
        generated_at: now,
        elapsed_days,
        total_running_hours,
        instances: summaries,
        total_amount,
        monthly_estimate,
        estimate_method,
    }
}
