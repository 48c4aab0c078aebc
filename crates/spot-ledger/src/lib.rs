//! Cost and traffic accounting for the spot fleet.
//!
//! Turns raw provider billing line items into a deduplicated per-instance
//! cost picture with a monthly estimate, and buckets internet traffic into
//! mainland / non-mainland totals.

#![forbid(unsafe_code)]

pub mod billing;
pub mod traffic;

pub use billing::{
    BillingItem, BillingSummary, DurationUnit, EstimateMethod, InstanceBillingSummary,
    aggregate_billing, billing_item_label, estimate_monthly, normalize_bill_item,
};
pub use traffic::{TrafficRegionSummary, TrafficSummary, aggregate_traffic};

const KIB: u64 = 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;
const TIB: u64 = GIB * 1024;

/// Convert raw bytes to GB (binary) for display.
pub fn bytes_to_gb(bytes: u64) -> f64 {
    bytes as f64 / GIB as f64
}

/// Human-readable size with two decimals, B through TB.
pub fn format_bytes(bytes: u64) -> String {
    match bytes {
        b if b >= TIB => format!("{:.2} TB", b as f64 / TIB as f64),
        b if b >= GIB => format!("{:.2} GB", b as f64 / GIB as f64),
        b if b >= MIB => format!("{:.2} MB", b as f64 / MIB as f64),
        b if b >= KIB => format!("{:.2} KB", b as f64 / KIB as f64),
        b => format!("{b} B"),
    }
}
