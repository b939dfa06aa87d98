//! Append-only record of resources created during one run.

use crate::labels::ResourceRef;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared between the state machine, fan-out tasks and dependent clusters.
#[derive(Debug, Clone, Default)]
pub struct RunTracker {
    created: Arc<Mutex<Vec<ResourceRef>>>,
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, resource: ResourceRef) {
        let mut created = self.created.lock().await;
        if !created.contains(&resource) {
            created.push(resource);
        }
    }

    pub async fn extend(&self, resources: impl IntoIterator<Item = ResourceRef>) {
        let mut created = self.created.lock().await;
        for resource in resources {
            if !created.contains(&resource) {
                created.push(resource);
            }
        }
    }

    /// Everything recorded so far, in creation order.
    pub async fn snapshot(&self) -> Vec<ResourceRef> {
        self.created.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.created.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::ResourceKind;

    #[tokio::test]
    async fn test_records_in_order_without_duplicates() {
        let tracker = RunTracker::new();
        tracker.record(ResourceRef::new(ResourceKind::Image, "minitrino/cluster:476-trino")).await;
        tracker.record(ResourceRef::container("minitrino-default")).await;
        tracker.extend([ResourceRef::container("minitrino-default")]).await;

        let snapshot = tracker.snapshot().await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].kind, ResourceKind::Image);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let tracker = RunTracker::new();
        let clone = tracker.clone();
        clone.record(ResourceRef::container("minitrino-worker-1-default")).await;
        assert_eq!(tracker.len().await, 1);
    }

}
