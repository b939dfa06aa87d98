//! Composition fragment types.
//!
//! Only the parts of the Compose format Minitrino inspects are modelled.
//! Everything else in a fragment is passed through to the runtime untouched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root structure of a fragment (`docker-compose.yaml` or `<module>.yaml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComposeFile {
    /// Compose file format version (e.g., "3", "3.8")
    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub services: BTreeMap<String, Service>,

    /// Named volumes. `db-data:` with no body deserializes as `None`.
    #[serde(default)]
    pub volumes: BTreeMap<String, Option<VolumeDefinition>>,

    #[serde(default)]
    pub networks: BTreeMap<String, Option<NetworkDefinition>>,
}

impl ComposeFile {
    /// Named volumes with their labels, empty when the body is omitted.
    pub fn named_volumes(&self) -> impl Iterator<Item = (&str, Labels)> {
        self.volumes.iter().map(|(name, def)| {
            (name.as_str(), def.as_ref().map(|d| d.labels.clone()).unwrap_or_default())
        })
    }

    /// Networks declared by this fragment, skipping external ones.
    pub fn owned_networks(&self) -> impl Iterator<Item = (&str, Labels)> {
        self.networks.iter().filter_map(|(name, def)| match def {
            Some(def) if def.external => None,
            Some(def) => Some((name.as_str(), def.labels.clone())),
            None => Some((name.as_str(), Labels::default())),
        })
    }
}

/// A service in a fragment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Service {
    #[serde(default)]
    pub image: Option<String>,

    #[serde(default)]
    pub build: Option<BuildConfig>,

    #[serde(default)]
    pub container_name: Option<String>,

    #[serde(default)]
    pub hostname: Option<String>,

    #[serde(default)]
    pub environment: Environment,

    /// Volume mounts (e.g., ["./data:/data", "db:/var/lib/db"])
    #[serde(default)]
    pub volumes: Vec<VolumeMount>,

    #[serde(default)]
    pub labels: Labels,
}

impl Service {
    /// Name the runtime gives the container.
    pub fn container_name_or<'a>(&'a self, service: &'a str) -> &'a str {
        self.container_name.as_deref().unwrap_or(service)
    }
}

/// `build:` is either a context path or a full build section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BuildConfig {
    Context(String),
    Full {
        #[serde(default)]
        context: Option<String>,
        #[serde(default)]
        dockerfile: Option<String>,
        #[serde(default)]
        labels: Labels,
    },
}

impl BuildConfig {
    /// Image labels declared in the build section.
    pub fn labels(&self) -> Labels {
        match self {
            BuildConfig::Context(_) => Labels::default(),
            BuildConfig::Full { labels, .. } => labels.clone(),
        }
    }
}

/// Volume mount in short (`src:dst[:mode]`) or long syntax.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VolumeMount {
    Short(String),
    Long {
        #[serde(default, rename = "type")]
        mount_type: Option<String>,
        #[serde(default)]
        source: Option<String>,
        target: String,
    },
}

impl VolumeMount {
    /// Source of the mount, if any.
    pub fn source(&self) -> Option<&str> {
        match self {
            VolumeMount::Short(spec) => spec.split_once(':').map(|(src, _)| src),
            VolumeMount::Long { source, .. } => source.as_deref(),
        }
    }
}

/// Environment variables can be specified as a map or list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Environment {
    Map(BTreeMap<String, Option<serde_yaml::Value>>),
    List(Vec<String>),
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Map(BTreeMap::new())
    }
}

impl Environment {
    /// Convert environment to a map regardless of input format.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        match self {
            Environment::Map(map) => map
                .iter()
                .map(|(k, v)| (k.clone(), v.as_ref().map(scalar).unwrap_or_default()))
                .collect(),
            Environment::List(list) => parse_pairs(list),
        }
    }
}

/// Labels, written like environment variables as a map or `key=value` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Labels {
    Map(BTreeMap<String, serde_yaml::Value>),
    List(Vec<String>),
}

impl Default for Labels {
    fn default() -> Self {
        Labels::Map(BTreeMap::new())
    }
}

impl Labels {
    pub fn to_map(&self) -> BTreeMap<String, String> {
        match self {
            Labels::Map(map) => map.iter().map(|(k, v)| (k.clone(), scalar(v))).collect(),
            Labels::List(list) => parse_pairs(list),
        }
    }
}

/// YAML scalars as compose sees them (`true` and `"true"` are the same label).
fn scalar(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Null => String::new(),
        other => serde_yaml::to_string(other).unwrap_or_default().trim().to_string(),
    }
}

fn parse_pairs(list: &[String]) -> BTreeMap<String, String> {
    list.iter()
        .filter_map(|s| s.split_once('=').map(|(k, v)| (k.to_string(), v.to_string())))
        .collect()
}

/// Volume definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumeDefinition {
    #[serde(default)]
    pub driver: Option<String>,

    #[serde(default)]
    pub labels: Labels,
}

/// Network definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkDefinition {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub driver: Option<String>,

    #[serde(default)]
    pub external: bool,

    #[serde(default)]
    pub labels: Labels,
}
