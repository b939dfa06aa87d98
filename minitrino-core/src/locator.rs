//! Resource Locator.
//!
//! Finds Minitrino-owned resources through label filters. Every query
//! includes the root marker, so resources created outside Minitrino are
//! never returned.

use crate::cluster;
use crate::config::validate_cluster_name;
use crate::error::Result;
use crate::labels::{parse_module_label_key, LabelSet, ResourceKind, PROJECT_LABEL_KEY};
use crate::runtime::{ContainerRuntime, Resource};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Which cluster(s) a query targets. `*` selects every cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterSelector {
    All,
    Named(String),
}

impl ClusterSelector {
    pub fn parse(name: &str) -> Result<Self> {
        validate_cluster_name(name)?;
        Ok(if name == "*" { Self::All } else { Self::Named(name.to_string()) })
    }

    /// Narrow `filter` to this selector. A named cluster matches on the
    /// project label for every kind. The engine image carries no project
    /// label and is only reachable through `*`.
    fn apply(&self, filter: LabelSet) -> LabelSet {
        match self {
            Self::Named(name) => filter.with(PROJECT_LABEL_KEY, cluster::project_name(name)),
            Self::All => filter,
        }
    }
}

impl fmt::Display for ClusterSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// A locator query: cluster scope, optional module label keys (any of), kinds.
#[derive(Debug, Clone)]
pub struct Query {
    pub cluster: ClusterSelector,
    pub module_keys: Vec<String>,
    pub kinds: Vec<ResourceKind>,
}

impl Query {
    pub fn new(cluster: ClusterSelector) -> Self {
        Self { cluster, module_keys: Vec::new(), kinds: ResourceKind::ALL.to_vec() }
    }

    pub fn kinds(mut self, kinds: &[ResourceKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    pub fn module(mut self, label_key: impl Into<String>) -> Self {
        self.module_keys.push(label_key.into());
        self
    }
}

/// Label-based lookups against a runtime.
#[derive(Clone)]
pub struct ResourceLocator {
    runtime: Arc<dyn ContainerRuntime>,
}

impl ResourceLocator {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Resources matching `query`, grouped by kind in query order.
    #[instrument(skip(self), fields(cluster = %query.cluster))]
    pub async fn locate(&self, query: &Query) -> Result<Vec<Resource>> {
        let mut found: Vec<Resource> = Vec::new();

        for &kind in &query.kinds {
            let base = query.cluster.apply(LabelSet::root());
            let filters: Vec<LabelSet> = if query.module_keys.is_empty() {
                vec![base]
            } else {
                query.module_keys.iter().map(|key| base.clone().with(key.clone(), "true")).collect()
            };

            for filter in filters {
                for resource in self.runtime.list(kind, &filter).await? {
                    if !found.iter().any(|r| r.kind == resource.kind && r.name == resource.name) {
                        found.push(resource);
                    }
                }
            }
        }

        debug!(count = found.len(), "Located resources");
        Ok(found)
    }

    /// Containers of the selected cluster(s).
    pub async fn containers(&self, cluster: &ClusterSelector) -> Result<Vec<Resource>> {
        self.locate(&Query::new(cluster.clone()).kinds(&[ResourceKind::Container])).await
    }

    /// Names of modules whose containers are running on the selected cluster(s).
    pub async fn running_modules(&self, cluster: &ClusterSelector) -> Result<BTreeSet<String>> {
        let containers = self.containers(cluster).await?;
        Ok(containers
            .iter()
            .filter(|c| c.running)
            .flat_map(|c| c.labels.keys())
            .filter_map(|key| parse_module_label_key(key).map(|(_, name)| name.to_string()))
            .collect())
    }

    /// Clusters with at least one container.
    pub async fn clusters(&self) -> Result<BTreeSet<String>> {
        let containers = self.containers(&ClusterSelector::All).await?;
        Ok(containers.iter().filter_map(|c| c.cluster().map(str::to_string)).collect())
    }
}
