//! Shared fixtures for integration tests: an in-memory container runtime and
//! a throwaway module library.

#![allow(dead_code)]

use async_trait::async_trait;
use minitrino_core::compose::ComposeParser;
use minitrino_core::error::{MinitrinoError, Result};
use minitrino_core::labels::{LabelSet, ResourceKind, ResourceRef, PROJECT_LABEL_KEY};
use minitrino_core::provision::health::HEALTH_PROBE;
use minitrino_core::runtime::{
    ComposeInvocation, ContainerRuntime, ContainerSpec, ExecOutput, ImageBuild, Resource,
};
use minitrino_core::{ModuleRegistry, Settings};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug, Clone)]
struct Entry {
    labels: BTreeMap<String, String>,
    running: bool,
}

#[derive(Default)]
struct State {
    resources: BTreeMap<ResourceRef, Entry>,
    /// container -> path -> contents
    files: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    /// (container, script contents) for every executed bootstrap script.
    scripts: Vec<(String, String)>,
    restarts: Vec<String>,
}

/// Failures the mock injects.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub build: bool,
    pub compose_up: bool,
    /// Containers whose `start` fails.
    pub start: BTreeSet<String>,
    /// Coordinator never reports ready.
    pub unhealthy: bool,
    /// Health checks never return.
    pub hang_health: bool,
    /// Containers whose `create` registers them and then never returns.
    pub hang_create: BTreeSet<String>,
}

/// In-memory container runtime with docker-like label semantics.
#[derive(Default)]
pub struct MockRuntime {
    state: Mutex<State>,
    faults: Mutex<Faults>,
}

impl MockRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_faults(&self, faults: Faults) {
        *self.faults.lock().unwrap() = faults;
    }

    fn faults(&self) -> Faults {
        self.faults.lock().unwrap().clone()
    }

    /// Add a resource created outside Minitrino's control.
    pub fn seed(&self, kind: ResourceKind, name: &str, labels: &[(&str, &str)]) {
        let labels = labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        self.state
            .lock()
            .unwrap()
            .resources
            .insert(ResourceRef::new(kind, name), Entry { labels, running: true });
    }

    pub fn names(&self, kind: ResourceKind) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.resources.keys().filter(|r| r.kind == kind).map(|r| r.name.clone()).collect()
    }

    pub fn exists(&self, kind: ResourceKind, name: &str) -> bool {
        self.state.lock().unwrap().resources.contains_key(&ResourceRef::new(kind, name))
    }

    pub fn labels(&self, kind: ResourceKind, name: &str) -> BTreeMap<String, String> {
        let state = self.state.lock().unwrap();
        state
            .resources
            .get(&ResourceRef::new(kind, name))
            .map(|e| e.labels.clone())
            .unwrap_or_default()
    }

    pub fn is_running(&self, name: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.resources.get(&ResourceRef::container(name)).is_some_and(|e| e.running)
    }

    pub fn resource_count(&self) -> usize {
        self.state.lock().unwrap().resources.len()
    }

    pub fn file(&self, container: &str, path: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .files
            .get(container)
            .and_then(|files| files.get(path))
            .map(|bytes| String::from_utf8_lossy(bytes).to_string())
    }

    pub fn put_file(&self, container: &str, path: &str, contents: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .files
            .entry(container.to_string())
            .or_default()
            .insert(path.to_string(), contents.as_bytes().to_vec());
    }

    pub fn scripts_run(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().scripts.clone()
    }

    pub fn restarts(&self) -> Vec<String> {
        self.state.lock().unwrap().restarts.clone()
    }

    pub fn stop_container(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.resources.get_mut(&ResourceRef::container(name)) {
            entry.running = false;
        }
    }

    fn insert(&self, resource: ResourceRef, labels: BTreeMap<String, String>, running: bool) {
        let mut state = self.state.lock().unwrap();
        state.resources.entry(resource).or_insert(Entry { labels, running }).running |= running;
    }

    fn require_running(&self, container: &str) -> Result<()> {
        if self.is_running(container) {
            Ok(())
        } else {
            Err(MinitrinoError::RuntimeCommand {
                command: format!("exec {}", container),
                reason: format!("container {} is not running", container),
            })
        }
    }
}

fn not_found(what: &str, name: &str) -> MinitrinoError {
    MinitrinoError::RuntimeCommand {
        command: format!("{} {}", what, name),
        reason: format!("no such object: {}", name),
    }
}

/// `${KEY}` substitution the way compose does it.
fn interpolate(raw: &str, env: &BTreeMap<String, String>) -> String {
    let mut out = raw.to_string();
    for (key, value) in env {
        out = out.replace(&format!("${{{}}}", key), value);
    }
    out
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn image_exists(&self, tag: &str) -> Result<bool> {
        Ok(self.exists(ResourceKind::Image, tag))
    }

    async fn build_image(&self, build: &ImageBuild) -> Result<ResourceRef> {
        if self.faults().build {
            return Err(MinitrinoError::BuildFailed {
                image: build.tag.clone(),
                reason: "injected".into(),
            });
        }
        let image = ResourceRef::new(ResourceKind::Image, build.tag.clone());
        self.insert(image.clone(), build.labels.clone().into_map(), false);
        Ok(image)
    }

    async fn compose_up(&self, invocation: &ComposeInvocation) -> Result<()> {
        let project_label = (PROJECT_LABEL_KEY.to_string(), invocation.project.clone());
        let mut staged: Vec<(ResourceRef, BTreeMap<String, String>, bool)> = Vec::new();

        for file in &invocation.files {
            let compose = ComposeParser::parse_file(file)?;
            for (key, network) in &compose.networks {
                let Some(network) = network else { continue };
                if network.external {
                    continue;
                }
                let name = network
                    .name
                    .as_deref()
                    .map(|n| interpolate(n, &invocation.env))
                    .unwrap_or_else(|| format!("{}_{}", invocation.project, key));
                let mut labels = network.labels.to_map();
                labels.insert(project_label.0.clone(), project_label.1.clone());
                staged.push((ResourceRef::new(ResourceKind::Network, name), labels, false));
            }
            for (key, labels) in compose.named_volumes() {
                let mut labels = labels.to_map();
                labels.insert(project_label.0.clone(), project_label.1.clone());
                let name = format!("{}_{}", invocation.project, key);
                staged.push((ResourceRef::new(ResourceKind::Volume, name), labels, false));
            }
            for (key, service) in &compose.services {
                if let Some(build) = &service.build {
                    let tag = service
                        .image
                        .as_deref()
                        .map(|i| interpolate(i, &invocation.env))
                        .unwrap_or_else(|| format!("{}-{}:latest", invocation.project, key));
                    let mut labels = build.labels().to_map();
                    labels.insert(project_label.0.clone(), project_label.1.clone());
                    staged.push((ResourceRef::new(ResourceKind::Image, tag), labels, false));
                }
                let name = service
                    .container_name
                    .as_deref()
                    .map(|n| interpolate(n, &invocation.env))
                    .unwrap_or_else(|| format!("{}-{}-1", invocation.project, key));
                let mut labels = service.labels.to_map();
                labels.insert(project_label.0.clone(), project_label.1.clone());
                staged.push((ResourceRef::container(name), labels, true));
            }
        }

        // Networks come up before services fail, like the real thing.
        let fail = self.faults().compose_up;
        for (resource, labels, running) in staged {
            if fail && resource.kind == ResourceKind::Container {
                return Err(MinitrinoError::StartFailed {
                    target: resource.name,
                    reason: "injected".into(),
                });
            }
            self.insert(resource, labels, running);
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<ResourceRef> {
        if !self.exists(ResourceKind::Network, &spec.network) {
            return Err(not_found("network", &spec.network));
        }
        let container = ResourceRef::container(spec.name.clone());
        if self.exists(ResourceKind::Container, &spec.name) {
            return Err(MinitrinoError::RuntimeCommand {
                command: format!("create {}", spec.name),
                reason: "name already in use".into(),
            });
        }
        self.insert(container.clone(), spec.labels.clone().into_map(), false);
        if self.faults().hang_create.contains(&spec.name) {
            std::future::pending::<()>().await;
        }
        Ok(container)
    }

    async fn start(&self, container: &str) -> Result<()> {
        if self.faults().start.contains(container) {
            return Err(MinitrinoError::StartFailed {
                target: container.to_string(),
                reason: "injected".into(),
            });
        }
        let mut state = self.state.lock().unwrap();
        match state.resources.get_mut(&ResourceRef::container(container)) {
            Some(entry) => {
                entry.running = true;
                Ok(())
            }
            None => Err(not_found("start", container)),
        }
    }

    async fn exec(&self, container: &str, command: &[&str]) -> Result<ExecOutput> {
        self.require_running(container)?;

        if command == HEALTH_PROBE {
            if self.faults().hang_health {
                std::future::pending::<()>().await;
            }
            return Ok(if self.faults().unhealthy {
                ExecOutput { exit_code: 7, ..Default::default() }
            } else {
                ExecOutput { stdout: r#"{"starting":false}"#.into(), ..Default::default() }
            });
        }

        match command {
            ["cat", path] => Ok(match self.file(container, path) {
                Some(stdout) => ExecOutput { stdout, ..Default::default() },
                None => ExecOutput {
                    exit_code: 1,
                    stderr: format!("cat: {}: No such file or directory", path),
                    ..Default::default()
                },
            }),
            ["bash", path] => {
                let script = self.file(container, path).unwrap_or_default();
                let mut state = self.state.lock().unwrap();
                state.scripts.push((container.to_string(), script.clone()));
                for created in script.lines().filter_map(|l| l.strip_prefix("touch ")) {
                    state
                        .files
                        .entry(container.to_string())
                        .or_default()
                        .insert(created.trim().to_string(), Vec::new());
                }
                Ok(if script.contains("exit 1") {
                    ExecOutput { exit_code: 1, stderr: "script failed".into(), ..Default::default() }
                } else {
                    ExecOutput::default()
                })
            }
            _ => Ok(ExecOutput::default()),
        }
    }

    async fn copy_into(&self, container: &str, source: &Path, dest: &str) -> Result<()> {
        let contents = std::fs::read(source).map_err(|e| MinitrinoError::IoError {
            path: source.to_path_buf(),
            source: e,
        })?;
        self.write_file(container, dest, &contents).await
    }

    async fn copy_between(&self, from: &str, path: &str, to: &str, dest: &str) -> Result<()> {
        if !self.exists(ResourceKind::Container, from) {
            return Err(not_found("cp", from));
        }
        if !self.exists(ResourceKind::Container, to) {
            return Err(not_found("cp", to));
        }
        let mut state = self.state.lock().unwrap();
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let copied: Vec<(String, Vec<u8>)> = state
            .files
            .get(from)
            .map(|files| {
                files
                    .iter()
                    .filter_map(|(p, bytes)| {
                        p.strip_prefix(&prefix).map(|rest| {
                            (format!("{}/{}", dest.trim_end_matches('/'), rest), bytes.clone())
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        state.files.entry(to.to_string()).or_default().extend(copied);
        Ok(())
    }

    async fn write_file(&self, container: &str, path: &str, contents: &[u8]) -> Result<()> {
        self.require_running(container)?;
        let mut state = self.state.lock().unwrap();
        state
            .files
            .entry(container.to_string())
            .or_default()
            .insert(path.to_string(), contents.to_vec());
        Ok(())
    }

    async fn restart(&self, container: &str) -> Result<()> {
        self.start(container).await?;
        self.state.lock().unwrap().restarts.push(container.to_string());
        Ok(())
    }

    async fn stop(&self, container: &str) -> Result<()> {
        if !self.exists(ResourceKind::Container, container) {
            return Err(not_found("stop", container));
        }
        self.stop_container(container);
        Ok(())
    }

    async fn remove(&self, resource: &ResourceRef) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.resources.remove(resource) {
            Some(_) => {
                state.files.remove(&resource.name);
                Ok(())
            }
            None => Err(not_found("rm", &resource.name)),
        }
    }

    async fn list(&self, kind: ResourceKind, filter: &LabelSet) -> Result<Vec<Resource>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .resources
            .iter()
            .filter(|(r, entry)| r.kind == kind && filter.is_subset_of(&entry.labels))
            .map(|(r, entry)| Resource {
                kind,
                name: r.name.clone(),
                labels: entry.labels.clone(),
                running: kind == ResourceKind::Container && entry.running,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub const BASE_YAML: &str = r#"
services:
  minitrino:
    image: minitrino/cluster:${CLUSTER_VER}-${CLUSTER_DIST}
    container_name: minitrino-${CLUSTER_NAME}
    hostname: minitrino-${CLUSTER_NAME}
    labels:
      - org.minitrino.root=true
networks:
  minitrino:
    name: minitrino_${CLUSTER_NAME}
    labels:
      - org.minitrino.root=true
"#;

fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn service_fragment(module_type: &str, name: &str, volume: bool, build: bool) -> String {
    let labels = format!(
        "      - org.minitrino.root=true\n      - org.minitrino.module.{}.{}=true\n",
        module_type, name
    );
    let source = if build {
        let nested = labels.replace("      -", "        -");
        format!("build:\n      context: ./image\n      labels:\n{}", nested)
    } else {
        format!("image: example/{}:latest\n", name)
    };
    let mut fragment = format!(
        "services:\n  {name}:\n    {source}    \
         container_name: {name}-${{CLUSTER_NAME}}\n    labels:\n{labels}"
    );
    if volume {
        fragment.push_str(&format!("volumes:\n  {}-data:\n    labels:\n{}", name, labels));
    }
    fragment
}

/// A module written into a test library.
pub struct ModuleFixture {
    pub module_type: &'static str,
    pub name: &'static str,
    pub metadata: String,
    pub volume: bool,
    /// Built from a local context instead of pulling an image.
    pub build: bool,
    pub before_start: Option<&'static str>,
    pub after_start: Option<&'static str>,
}

impl ModuleFixture {
    pub fn new(module_type: &'static str, name: &'static str) -> Self {
        Self {
            module_type,
            name,
            metadata: format!(r#"{{"description": "{}"}}"#, name),
            volume: false,
            build: false,
            before_start: None,
            after_start: None,
        }
    }

    pub fn metadata(mut self, json: &str) -> Self {
        self.metadata = json.to_string();
        self
    }

    pub fn with_volume(mut self) -> Self {
        self.volume = true;
        self
    }

    pub fn with_build(mut self) -> Self {
        self.build = true;
        self
    }

    pub fn before_start(mut self, script: &'static str) -> Self {
        self.before_start = Some(script);
        self
    }

    pub fn after_start(mut self, script: &'static str) -> Self {
        self.after_start = Some(script);
        self
    }
}

/// The standard test library.
///
/// - `postgres` (catalog): persistent volume, before-start script adding a catalog file
/// - `ldap` (security): after-start script
/// - `iceberg` (catalog): depends on `minio`
/// - `minio` (admin)
/// - `broken` (admin): after-start script that fails
/// - `custom` (admin): service image built from a local context
/// - `federated` (catalog): dependent cluster `remote` running `postgres`
/// - `federated-broken` (catalog): dependent cluster `remote` running `broken`
/// - `loop` (catalog): dependent cluster `loopy` running `loop`
pub fn standard_library() -> TempDir {
    library(vec![
        ModuleFixture::new("catalog", "postgres")
            .with_volume()
            .before_start("touch /etc/trino/catalog/postgres.properties\n"),
        ModuleFixture::new("security", "ldap").after_start("echo ldap\n"),
        ModuleFixture::new("catalog", "iceberg")
            .metadata(r#"{"description": "Iceberg", "dependentModules": ["minio"]}"#),
        ModuleFixture::new("admin", "minio"),
        ModuleFixture::new("admin", "broken").after_start("echo broken\nexit 1\n"),
        ModuleFixture::new("admin", "custom").with_build(),
        ModuleFixture::new("catalog", "federated").metadata(
            r#"{"description": "Federated", "dependentClusters": [
                {"name": "remote", "modules": ["postgres"], "workers": 1}
            ]}"#,
        ),
        ModuleFixture::new("catalog", "federated-broken").metadata(
            r#"{"description": "Broken federation", "dependentClusters": [
                {"name": "remote", "modules": ["broken"]}
            ]}"#,
        ),
        ModuleFixture::new("catalog", "loop").metadata(
            r#"{"description": "Loop", "dependentClusters": [
                {"name": "loopy", "modules": ["loop"]}
            ]}"#,
        ),
    ])
}

pub fn library(modules: Vec<ModuleFixture>) -> TempDir {
    let lib = TempDir::new().unwrap();
    write(&lib.path().join("docker-compose.yaml"), BASE_YAML);
    write(&lib.path().join("image/Dockerfile"), "FROM scratch\n");
    for module in modules {
        let dir = lib.path().join("modules").join(module.module_type).join(module.name);
        write(&dir.join("metadata.json"), &module.metadata);
        write(
            &dir.join(format!("{}.yaml", module.name)),
            &service_fragment(module.module_type, module.name, module.volume, module.build),
        );
        if let Some(script) = module.before_start {
            write(&dir.join("bootstrap/before_start.sh"), script);
        }
        if let Some(script) = module.after_start {
            write(&dir.join("bootstrap/after_start.sh"), script);
        }
    }
    lib
}

pub fn registry(lib: &TempDir) -> Arc<ModuleRegistry> {
    Arc::new(ModuleRegistry::load(lib.path()).unwrap())
}

/// Settings with fast health polling.
pub fn settings(lib: &TempDir, env: &[(&str, &str)]) -> Settings {
    let mut env: BTreeMap<String, String> =
        env.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    env.entry("HEALTH_RETRIES".into()).or_insert_with(|| "3".into());
    let mut settings = Settings::from_env(env, lib.path().to_path_buf()).unwrap();
    settings.health_interval = Duration::from_millis(5);
    settings
}

pub fn modules(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}
