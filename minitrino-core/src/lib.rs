//! Minitrino Core Library
//!
//! Module resolution, composition and provisioning for local multi-container
//! query-engine clusters.

pub mod bootstrap;
pub mod cluster;
pub mod compose;
pub mod config;
pub mod error;
pub mod federation;
pub mod labels;
pub mod locator;
pub mod modules;
pub mod observability;
pub mod paths;
pub mod provision;
pub mod runtime;
pub mod snapshot;

// Re-export commonly used items
pub use cluster::ClusterOps;
pub use config::{ConfigLayers, Settings, UserConfig};
pub use error::{ErrorKind, MinitrinoError, Result};
pub use labels::{LabelSet, ResourceKind, ResourceRef};
pub use locator::{ClusterSelector, Query, ResourceLocator};
pub use modules::{Module, ModuleRegistry, ModuleType, ResolvedModules};
pub use observability::init as init_logging;
pub use provision::{
    AbortHandle, AbortSignal, Phase, ProvisionReport, ProvisionRequest, Provisioner,
};
pub use runtime::{ContainerRuntime, DockerCli};
