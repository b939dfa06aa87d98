//! Container runtime abstraction.
//!
//! Everything Minitrino does to containers, volumes, networks and images
//! goes through the `ContainerRuntime` trait. The shipped implementation
//! drives the `docker` CLI; tests use an in-memory runtime.

use crate::compose::Composition;
use crate::config::Settings;
use crate::error::Result;
use crate::labels::{LabelSet, ResourceKind, ResourceRef, PROJECT_LABEL_KEY};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod docker;

pub use docker::DockerCli;

/// Container runtime trait.
///
/// Methods are instrumented by implementations, not here.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Whether an image with this tag exists locally.
    async fn image_exists(&self, tag: &str) -> Result<bool>;

    /// Build an image and return a reference to it.
    async fn build_image(&self, build: &ImageBuild) -> Result<ResourceRef>;

    /// Bring up every service of a composition, detached.
    ///
    /// Existing containers of the project are left running.
    async fn compose_up(&self, invocation: &ComposeInvocation) -> Result<()>;

    /// Create (but do not start) a standalone container.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<ResourceRef>;

    /// Start a created or stopped container.
    async fn start(&self, container: &str) -> Result<()>;

    /// Run a command inside a running container.
    async fn exec(&self, container: &str, command: &[&str]) -> Result<ExecOutput>;

    /// Copy a host file or directory into a container.
    async fn copy_into(&self, container: &str, source: &Path, dest: &str) -> Result<()>;

    /// Copy the contents of directory `path` in `from` to directory `dest` in `to`.
    async fn copy_between(&self, from: &str, path: &str, to: &str, dest: &str) -> Result<()>;

    /// Write a file inside a container, creating parent directories.
    async fn write_file(&self, container: &str, path: &str, contents: &[u8]) -> Result<()>;

    async fn restart(&self, container: &str) -> Result<()>;

    async fn stop(&self, container: &str) -> Result<()>;

    /// Force-remove a resource.
    async fn remove(&self, resource: &ResourceRef) -> Result<()>;

    /// List resources of one kind carrying every label in `filter`.
    async fn list(&self, kind: ResourceKind, filter: &LabelSet) -> Result<Vec<Resource>>;

    /// Runtime name (for logging).
    fn name(&self) -> &str;
}

/// Create the runtime selected in `settings`.
pub fn from_settings(settings: &Settings) -> Arc<dyn ContainerRuntime> {
    Arc::new(DockerCli::new(settings.runtime_bin.clone()))
}

/// Image build request.
#[derive(Debug, Clone)]
pub struct ImageBuild {
    pub tag: String,
    pub context: PathBuf,
    pub labels: LabelSet,
    pub build_args: BTreeMap<String, String>,
}

/// Compose invocation for one cluster.
#[derive(Debug, Clone)]
pub struct ComposeInvocation {
    pub project: String,
    pub project_dir: PathBuf,
    pub files: Vec<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl From<&Composition> for ComposeInvocation {
    fn from(composition: &Composition) -> Self {
        Self {
            project: composition.project.clone(),
            project_dir: composition.project_dir.clone(),
            files: composition.files(),
            env: composition.env.clone(),
        }
    }
}

/// Standalone container (workers).
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub hostname: String,
    pub image: String,
    pub network: String,
    pub labels: LabelSet,
    pub env: BTreeMap<String, String>,
}

/// Result of a command run inside a container.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A resource as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub kind: ResourceKind,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    /// Containers only; always false for other kinds.
    pub running: bool,
}

impl Resource {
    pub fn to_ref(&self) -> ResourceRef {
        ResourceRef::new(self.kind, self.name.clone())
    }

    /// Cluster this resource belongs to, from the compose project label.
    pub fn cluster(&self) -> Option<&str> {
        self.labels.get(PROJECT_LABEL_KEY).and_then(|p| crate::cluster::cluster_from_project(p))
    }
}
