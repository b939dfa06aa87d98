//! Module library: metadata, registry and resolution.

pub mod metadata;
pub mod registry;
pub mod resolver;
pub mod version;

pub use metadata::{DependentClusterSpec, Incompatibility, Module, ModuleType};
pub use registry::ModuleRegistry;
pub use resolver::{resolve, ResolveTarget, ResolvedModules};
pub use version::{Distribution, EngineVersion, VersionRange};
