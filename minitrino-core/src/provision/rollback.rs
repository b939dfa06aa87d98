//! Rollback of a failed run.
//!
//! Removes exactly what the run tracker recorded, newest first. Containers
//! go before volumes and networks, images last. Rollback is not cancellable
//! and keeps going past individual failures. Only resources that exist and
//! carry the root marker are removed, so a recorded name that was never
//! created is skipped.

use super::tracker::RunTracker;
use crate::labels::{LabelSet, ResourceKind, ResourceRef};
use crate::runtime::ContainerRuntime;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// What a rollback managed to remove.
#[derive(Debug, Clone, Default)]
pub struct RollbackReport {
    pub removed: Vec<ResourceRef>,
    pub failed: Vec<(ResourceRef, String)>,
}

#[instrument(skip_all)]
pub async fn rollback(
    runtime: Arc<dyn ContainerRuntime>,
    tracker: &RunTracker,
    max_concurrency: usize,
) -> RollbackReport {
    let mut created = tracker.snapshot().await;
    created.reverse();
    warn!(resources = created.len(), "Rolling back provisioning run");

    let mut report = RollbackReport::default();
    for kind in ResourceKind::ALL {
        let mut batch: Vec<ResourceRef> =
            created.iter().filter(|r| r.kind == kind).cloned().collect();
        if batch.is_empty() {
            continue;
        }
        match runtime.list(kind, &LabelSet::root()).await {
            Ok(present) => batch.retain(|r| {
                let exists = present.iter().any(|p| p.name == r.name);
                if !exists {
                    debug!(resource = %r, "Skipping resource that does not exist");
                }
                exists
            }),
            Err(e) => warn!(%kind, error = %e, "Could not list resources, removing all recorded"),
        }

        let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
        let mut set = JoinSet::new();
        for resource in batch {
            let runtime = runtime.clone();
            let semaphore = semaphore.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let outcome = runtime.remove(&resource).await;
                (resource, outcome)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((resource, Ok(()))) => report.removed.push(resource),
                Ok((resource, Err(e))) => {
                    warn!(resource = %resource, error = %e, "Failed to remove resource during rollback");
                    report.failed.push((resource, e.to_string()));
                }
                Err(e) => warn!(error = %e, "Rollback task panicked"),
            }
        }
    }

    info!(removed = report.removed.len(), failed = report.failed.len(), "Rollback finished");
    report
}
