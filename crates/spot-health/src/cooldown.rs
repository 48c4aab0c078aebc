//! Per-instance alert cooldown.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

/// Remembers when each instance was last alerted about and refuses repeats
/// inside the window. Entries are only ever upserted.
#[derive(Debug)]
pub struct CooldownGovernor {
    window: Duration,
    last_notified: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl CooldownGovernor {
    pub fn new(window: std::time::Duration) -> Self {
        Self {
            window: Duration::from_std(window).unwrap_or(Duration::MAX),
            last_notified: Mutex::new(HashMap::new()),
        }
    }

    /// True when the instance has never been alerted about, or the last alert
    /// is strictly older than the window.
    pub fn can_notify(&self, instance_id: &str, now: DateTime<Utc>) -> bool {
        match self.last_notified.lock().get(instance_id) {
            None => true,
            Some(last) => now.signed_duration_since(*last) > self.window,
        }
    }

    pub fn record_notified(&self, instance_id: &str, now: DateTime<Utc>) {
        self.last_notified.lock().insert(instance_id.to_string(), now);
        debug!(instance = instance_id, at = %now, "alert recorded for cooldown");
    }

    pub fn last_notified(&self, instance_id: &str) -> Option<DateTime<Utc>> {
        self.last_notified.lock().get(instance_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 17, 8, 0, 0).unwrap()
    }

    fn governor() -> CooldownGovernor {
        CooldownGovernor::new(std::time::Duration::from_secs(300))
    }

    #[test]
    fn test_unknown_instance_is_always_eligible() {
        let gov = governor();
        assert!(gov.can_notify("i-1", t0()));
        assert!(gov.can_notify("i-1", t0()));
        assert!(gov.last_notified("i-1").is_none());
    }

    #[test]
    fn test_second_check_inside_window_is_refused() {
        let gov = governor();
        assert!(gov.can_notify("i-1", t0()));
        gov.record_notified("i-1", t0());
        assert!(!gov.can_notify("i-1", t0() + Duration::seconds(10)));
        assert!(!gov.can_notify("i-1", t0() + Duration::seconds(299)));
    }

    #[test]
    fn test_window_boundary_is_strict() {
        let gov = governor();
        gov.record_notified("i-1", t0());
        assert!(!gov.can_notify("i-1", t0() + Duration::seconds(300)));
        assert!(gov.can_notify("i-1", t0() + Duration::seconds(301)));
    }

    #[test]
    fn test_keys_are_independent() {
        let gov = governor();
        gov.record_notified("i-1", t0());
        assert!(gov.can_notify("i-2", t0()));
    }

    #[test]
    fn test_record_is_upsert() {
        let gov = governor();
        gov.record_notified("i-1", t0());
        let later = t0() + Duration::seconds(400);
        assert!(gov.can_notify("i-1", later));
        gov.record_notified("i-1", later);
        assert_eq!(gov.last_notified("i-1"), Some(later));
        assert!(!gov.can_notify("i-1", later + Duration::seconds(60)));
    }
}
