//! Cluster naming and cluster-wide operations.

use crate::error::Result;
use crate::labels::{ResourceKind, ResourceRef};
use crate::locator::{ClusterSelector, Query, ResourceLocator};
use crate::modules::{Distribution, EngineVersion};
use crate::provision::{fan_out, AbortSignal};
use crate::runtime::ContainerRuntime;
use std::sync::Arc;
use tracing::{info, instrument};

const PROJECT_PREFIX: &str = "minitrino-";

/// Compose project for a cluster.
pub fn project_name(cluster: &str) -> String {
    format!("{}{}", PROJECT_PREFIX, cluster)
}

pub fn cluster_from_project(project: &str) -> Option<&str> {
    project.strip_prefix(PROJECT_PREFIX).filter(|c| !c.is_empty())
}

pub fn coordinator_name(cluster: &str) -> String {
    format!("minitrino-{}", cluster)
}

/// Worker `index` is 1-based.
pub fn worker_name(cluster: &str, index: u32) -> String {
    format!("minitrino-worker-{}-{}", index, cluster)
}

/// Index of a worker container of `cluster`, if `name` is one.
pub fn worker_index(cluster: &str, name: &str) -> Option<u32> {
    name.strip_prefix("minitrino-worker-")?
        .strip_suffix(cluster)?
        .strip_suffix('-')?
        .parse()
        .ok()
}

pub fn network_name(cluster: &str) -> String {
    format!("minitrino_{}", cluster)
}

pub fn image_tag(version: &EngineVersion, distribution: Distribution) -> String {
    format!("minitrino/cluster:{}-{}", version, distribution)
}

/// Stop, remove and restart operations across a cluster's resources.
pub struct ClusterOps {
    runtime: Arc<dyn ContainerRuntime>,
    locator: ResourceLocator,
    max_concurrency: usize,
}

impl ClusterOps {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, max_concurrency: usize) -> Self {
        let locator = ResourceLocator::new(runtime.clone());
        Self { runtime, locator, max_concurrency }
    }

    pub fn locator(&self) -> &ResourceLocator {
        &self.locator
    }

    /// Stop every running container of the selected cluster(s), optionally
    /// removing all of their containers afterwards.
    #[instrument(skip(self))]
    pub async fn down(&self, cluster: &ClusterSelector, remove: bool) -> Result<Vec<String>> {
        let containers = self.locator.containers(cluster).await?;
        let running: Vec<String> =
            containers.iter().filter(|c| c.running).map(|c| c.name.clone()).collect();

        let runtime = self.runtime.clone();
        let stopped = fan_out("down", running, self.max_concurrency, &AbortSignal::never(), |name| {
            let runtime = runtime.clone();
            async move {
                runtime.stop(&name).await?;
                Ok(name)
            }
        })
        .await?;
        info!(count = stopped.len(), "Stopped containers");

        if remove {
            let refs = containers.iter().map(|c| c.to_ref()).collect();
            self.remove_refs("down", refs).await?;
        }
        Ok(stopped)
    }

    /// Remove everything matching `query`, containers first.
    #[instrument(skip(self))]
    pub async fn remove(&self, query: &Query) -> Result<Vec<ResourceRef>> {
        let found = self.locator.locate(query).await?;
        let mut removed = Vec::new();
        for kind in ResourceKind::ALL {
            let batch: Vec<ResourceRef> =
                found.iter().filter(|r| r.kind == kind).map(|r| r.to_ref()).collect();
            removed.extend(self.remove_refs("remove", batch).await?);
        }
        info!(count = removed.len(), "Removed resources");
        Ok(removed)
    }

    /// Restart every container of one cluster concurrently.
    #[instrument(skip(self))]
    pub async fn restart(&self, cluster: &ClusterSelector) -> Result<Vec<String>> {
        let names: Vec<String> =
            self.locator.containers(cluster).await?.into_iter().map(|c| c.name).collect();
        let runtime = self.runtime.clone();
        fan_out("restart", names, self.max_concurrency, &AbortSignal::never(), |name| {
            let runtime = runtime.clone();
            async move {
                runtime.restart(&name).await?;
                Ok(name)
            }
        })
        .await
    }

    async fn remove_refs(&self, label: &str, refs: Vec<ResourceRef>) -> Result<Vec<ResourceRef>> {
        let runtime = self.runtime.clone();
        fan_out(label, refs, self.max_concurrency, &AbortSignal::never(), |resource| {
            let runtime = runtime.clone();
            async move {
                runtime.remove(&resource).await?;
                Ok(resource)
            }
        })
        .await
    }
}
