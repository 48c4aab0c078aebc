//! The set of tracked spot instances.
//!
//! Readers take a cheap `Arc` snapshot; discovery swaps in a whole new list.
//! The live list is never mutated in place.

use parking_lot::RwLock;
use spot_proto::{InstanceRef, TrackedInstance};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct InstanceRegistry {
    snapshot: RwLock<Arc<Vec<TrackedInstance>>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<Vec<TrackedInstance>> {
        self.snapshot.read().clone()
    }

    /// Replace the tracked set, returning how many instances it now holds.
    pub fn replace(&self, instances: Vec<TrackedInstance>) -> usize {
        let count = instances.len();
        *self.snapshot.write() = Arc::new(instances);
        count
    }

    pub fn len(&self) -> usize {
        self.snapshot.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn refs(&self) -> Vec<InstanceRef> {
        self.snapshot().iter().map(InstanceRef::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spot_proto::InstanceStatus;

    fn instance(id: &str) -> TrackedInstance {
        TrackedInstance {
            id: id.to_string(),
            display_name: format!("{id}-name"),
            region_id: "cn-hangzhou".to_string(),
            last_known_status: InstanceStatus::Running,
            public_address: None,
            private_address: None,
            spot_strategy: "SpotAsPriceGo".to_string(),
        }
    }

    #[test]
    fn test_replace_swaps_whole_snapshot() {
        let registry = InstanceRegistry::new();
        assert!(registry.is_empty());

        assert_eq!(registry.replace(vec![instance("i-a"), instance("i-b")]), 2);
        let held = registry.snapshot();

        registry.replace(vec![instance("i-c")]);
        // Earlier readers keep the list they took.
        assert_eq!(held.len(), 2);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.refs()[0].id, "i-c");
        assert_eq!(registry.refs()[0].display_name, "i-c-name");
    }
}
