//! Resource labels.
//!
//! Every container, named volume, network and built image created by
//! Minitrino carries the root marker. Resources contributed by a module also
//! carry `org.minitrino.module.<type>.<name>=true`. Cluster membership comes
//! from the compose project label, which the runtime stamps on compose-managed
//! resources and the state machine stamps on workers.

use crate::modules::ModuleType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const ROOT_LABEL_KEY: &str = "org.minitrino.root";
pub const LABEL_TRUE: &str = "true";
pub const MODULE_LABEL_PREFIX: &str = "org.minitrino.module.";
pub const PROJECT_LABEL_KEY: &str = "com.docker.compose.project";

/// `org.minitrino.module.<type>.<name>`
pub fn module_label_key(module_type: ModuleType, name: &str) -> String {
    format!("{}{}.{}", MODULE_LABEL_PREFIX, module_type, name)
}

/// Split a module label key back into its type and name.
pub fn parse_module_label_key(key: &str) -> Option<(ModuleType, &str)> {
    let rest = key.strip_prefix(MODULE_LABEL_PREFIX)?;
    let (module_type, name) = rest.split_once('.')?;
    Some((module_type.parse().ok()?, name))
}

/// Kinds of runtime resources Minitrino creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Container,
    Volume,
    Network,
    Image,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [Self::Container, Self::Volume, Self::Network, Self::Image];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Volume => "volume",
            Self::Network => "network",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource identified by kind and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self { kind, name: name.into() }
    }

    pub fn container(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Container, name)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)
    }
}

/// An ordered set of label key/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    /// Just the root marker.
    pub fn root() -> Self {
        let mut set = Self::default();
        set.insert(ROOT_LABEL_KEY, LABEL_TRUE);
        set
    }

    /// Root marker plus one module marker.
    pub fn for_module(module_type: ModuleType, name: &str) -> Self {
        Self::root().with(module_label_key(module_type, name), LABEL_TRUE)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether every pair in `self` is present in `labels`.
    pub fn is_subset_of(&self, labels: &BTreeMap<String, String>) -> bool {
        self.0.iter().all(|(k, v)| labels.get(k) == Some(v))
    }

    /// Module label keys present in this set.
    pub fn module_keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str).filter(|k| k.starts_with(MODULE_LABEL_PREFIX))
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.0
    }
}

impl From<BTreeMap<String, String>> for LabelSet {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

/// Whether a label map carries the root marker.
pub fn is_owned(labels: &BTreeMap<String, String>) -> bool {
    labels.get(ROOT_LABEL_KEY).map(String::as_str) == Some(LABEL_TRUE)
}

/// Labels expected on one resource, as derived from the composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedResource {
    pub kind: ResourceKind,
    /// Service, volume, network or image name as written in the fragment.
    pub name: String,
    /// Contributing module, `None` for the base fragment.
    pub module: Option<String>,
    pub labels: LabelSet,
}

/// Full label plan for a provisioning run.
#[derive(Debug, Clone, Default)]
pub struct LabelPlan {
    pub resources: Vec<PlannedResource>,
    /// Labels the state machine stamps on worker containers.
    pub worker: LabelSet,
    /// Labels the state machine stamps on the engine image.
    pub image: LabelSet,
}

impl LabelPlan {
    /// Planned entries contributed by one module.
    pub fn for_module<'a>(&'a self, module: &'a str) -> impl Iterator<Item = &'a PlannedResource> {
        self.resources.iter().filter(move |r| r.module.as_deref() == Some(module))
    }
}
