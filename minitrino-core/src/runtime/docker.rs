//! `ContainerRuntime` backed by the docker CLI.

use super::{ComposeInvocation, ContainerRuntime, ContainerSpec, ExecOutput, ImageBuild, Resource};
use crate::error::{MinitrinoError, Result};
use crate::labels::{LabelSet, ResourceKind, ResourceRef};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Drives `docker` (or a compatible binary) as a child process.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    /// Run the binary and capture its output. Non-zero exit is not an error here.
    async fn output(
        &self,
        args: &[String],
        env: Option<&BTreeMap<String, String>>,
        stdin: Option<&[u8]>,
    ) -> Result<ExecOutput> {
        let shown = format!("{} {}", self.binary, args.join(" "));
        debug!(command = %shown, "Running runtime command");

        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(env) = env {
            cmd.envs(env);
        }

        let spawn_err = |e: std::io::Error| MinitrinoError::RuntimeCommand {
            command: shown.clone(),
            reason: e.to_string(),
        };
        let mut child = cmd.spawn().map_err(spawn_err)?;
        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input).await.map_err(spawn_err)?;
        }
        let output = child.wait_with_output().await.map_err(spawn_err)?;

        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Run the binary, failing on non-zero exit.
    async fn run(&self, args: &[String]) -> Result<String> {
        let output = self.output(args, None, None).await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(MinitrinoError::RuntimeCommand {
                command: format!("{} {}", self.binary, args.join(" ")),
                reason: output.stderr,
            })
        }
    }
}

fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn label_args(flag: &str, labels: &LabelSet) -> Vec<String> {
    labels.iter().flat_map(|(k, v)| [flag.to_string(), format!("{}={}", k, v)]).collect()
}

/// `docker ... ls --format '{{json .}}'` row. Field names differ per kind.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListRow {
    #[serde(default)]
    names: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    repository: Option<String>,
    #[serde(default)]
    tag: Option<String>,
    #[serde(default)]
    labels: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

impl ListRow {
    fn into_resource(self, kind: ResourceKind) -> Option<Resource> {
        let name = match kind {
            ResourceKind::Container => self.names?,
            ResourceKind::Volume | ResourceKind::Network => self.name?,
            ResourceKind::Image => format!("{}:{}", self.repository?, self.tag?),
        };
        Some(Resource {
            kind,
            name,
            labels: parse_label_string(self.labels.as_deref().unwrap_or_default()),
            running: self.state.as_deref() == Some("running"),
        })
    }
}

/// Parse the `k=v,k2=v2` label column.
fn parse_label_string(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

fn parse_rows(kind: ResourceKind, stdout: &str) -> Result<Vec<Resource>> {
    let mut resources = Vec::new();
    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        let row: ListRow = serde_json::from_str(line).map_err(|e| MinitrinoError::RuntimeCommand {
            command: format!("{} ls", kind),
            reason: format!("unexpected output '{}': {}", line, e),
        })?;
        resources.extend(row.into_resource(kind));
    }
    Ok(resources)
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    #[instrument(skip(self))]
    async fn image_exists(&self, tag: &str) -> Result<bool> {
        let output = self.output(&args(["image", "inspect", tag]), None, None).await?;
        Ok(output.success())
    }

    #[instrument(skip(self, build), fields(tag = %build.tag))]
    async fn build_image(&self, build: &ImageBuild) -> Result<ResourceRef> {
        let mut cmd = args(["build", "--tag", build.tag.as_str()]);
        cmd.extend(label_args("--label", &build.labels));
        for (key, value) in &build.build_args {
            cmd.push("--build-arg".into());
            cmd.push(format!("{}={}", key, value));
        }
        cmd.push(build.context.to_string_lossy().to_string());

        self.run(&cmd).await.map_err(|e| MinitrinoError::BuildFailed {
            image: build.tag.clone(),
            reason: e.to_string(),
        })?;
        Ok(ResourceRef::new(ResourceKind::Image, build.tag.clone()))
    }

    #[instrument(skip(self, invocation), fields(project = %invocation.project))]
    async fn compose_up(&self, invocation: &ComposeInvocation) -> Result<()> {
        let mut cmd = args(["compose", "--project-name", invocation.project.as_str()]);
        cmd.push("--project-directory".into());
        cmd.push(invocation.project_dir.to_string_lossy().to_string());
        for file in &invocation.files {
            cmd.push("--file".into());
            cmd.push(file.to_string_lossy().to_string());
        }
        cmd.extend(args(["up", "--detach"]));

        let output = self.output(&cmd, Some(&invocation.env), None).await?;
        if output.success() {
            Ok(())
        } else {
            Err(MinitrinoError::StartFailed {
                target: invocation.project.clone(),
                reason: output.stderr,
            })
        }
    }

    #[instrument(skip(self, spec), fields(name = %spec.name))]
    async fn create_container(&self, spec: &ContainerSpec) -> Result<ResourceRef> {
        let mut cmd = args(["create", "--name", spec.name.as_str()]);
        cmd.extend(args(["--hostname", spec.hostname.as_str(), "--network", spec.network.as_str()]));
        cmd.extend(label_args("--label", &spec.labels));
        for (key, value) in &spec.env {
            cmd.push("--env".into());
            cmd.push(format!("{}={}", key, value));
        }
        cmd.push(spec.image.clone());

        self.run(&cmd).await.map_err(|e| MinitrinoError::StartFailed {
            target: spec.name.clone(),
            reason: e.to_string(),
        })?;
        Ok(ResourceRef::container(spec.name.clone()))
    }

    #[instrument(skip(self))]
    async fn start(&self, container: &str) -> Result<()> {
        self.run(&args(["start", container])).await.map_err(|e| MinitrinoError::StartFailed {
            target: container.to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn exec(&self, container: &str, command: &[&str]) -> Result<ExecOutput> {
        let mut cmd = args(["exec", container]);
        cmd.extend(command.iter().map(|s| s.to_string()));
        self.output(&cmd, None, None).await
    }

    #[instrument(skip(self))]
    async fn copy_into(&self, container: &str, source: &Path, dest: &str) -> Result<()> {
        let target = format!("{}:{}", container, dest);
        let source = source.to_string_lossy();
        self.run(&args(["cp", source.as_ref(), target.as_str()])).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn copy_between(&self, from: &str, path: &str, to: &str, dest: &str) -> Result<()> {
        let staging = tempfile::tempdir().map_err(|e| MinitrinoError::IoError {
            path: std::env::temp_dir(),
            source: e,
        })?;
        let local = staging.path().join("contents");
        let local_str = local.to_string_lossy().to_string();

        let source = format!("{}:{}/.", from, path);
        self.run(&args(["cp", source.as_str(), local_str.as_str()])).await?;
        let staged = format!("{}/.", local_str);
        let target = format!("{}:{}", to, dest);
        self.run(&args(["cp", staged.as_str(), target.as_str()])).await?;
        Ok(())
    }

    #[instrument(skip(self, contents))]
    async fn write_file(&self, container: &str, path: &str, contents: &[u8]) -> Result<()> {
        let script = format!("mkdir -p \"$(dirname '{0}')\" && cat > '{0}'", path);
        let cmd = args(["exec", "--interactive", container, "sh", "-c", script.as_str()]);
        let output = self.output(&cmd, None, Some(contents)).await?;
        if output.success() {
            Ok(())
        } else {
            Err(MinitrinoError::RuntimeCommand {
                command: format!("write {}:{}", container, path),
                reason: output.stderr,
            })
        }
    }

    #[instrument(skip(self))]
    async fn restart(&self, container: &str) -> Result<()> {
        self.run(&args(["restart", container])).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop(&self, container: &str) -> Result<()> {
        self.run(&args(["stop", container])).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(resource = %resource))]
    async fn remove(&self, resource: &ResourceRef) -> Result<()> {
        let name = resource.name.as_str();
        let cmd = match resource.kind {
            ResourceKind::Container => args(["rm", "--force", "--volumes", name]),
            ResourceKind::Volume => args(["volume", "rm", "--force", name]),
            ResourceKind::Network => args(["network", "rm", name]),
            ResourceKind::Image => args(["image", "rm", "--force", name]),
        };
        self.run(&cmd).await?;
        Ok(())
    }

    #[instrument(skip(self, filter))]
    async fn list(&self, kind: ResourceKind, filter: &LabelSet) -> Result<Vec<Resource>> {
        let mut cmd = match kind {
            ResourceKind::Container => args(["ps", "--all"]),
            ResourceKind::Volume => args(["volume", "ls"]),
            ResourceKind::Network => args(["network", "ls"]),
            ResourceKind::Image => args(["image", "ls"]),
        };
        for (key, value) in filter.iter() {
            cmd.push("--filter".into());
            cmd.push(format!("label={}={}", key, value));
        }
        cmd.extend(args(["--format", "{{json .}}"]));

        let stdout = self.run(&cmd).await?;
        parse_rows(kind, &stdout)
    }

    fn name(&self) -> &str {
        &self.binary
    }
}
