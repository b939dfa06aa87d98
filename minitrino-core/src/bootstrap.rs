//! Bootstrap Runner.
//!
//! Modules may ship `bootstrap/before_start.sh` and `bootstrap/after_start.sh`.
//! A script runs only when its SHA-256 differs from the record left in the
//! container by the previous successful run, which makes re-provisioning an
//! existing cluster cheap.

use crate::error::{MinitrinoError, Result};
use crate::modules::Module;
use crate::runtime::ContainerRuntime;
use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument};

/// Directory inside the container holding checksum records.
pub const RECORD_DIR: &str = "/etc/minitrino/bootstrap";

/// Where scripts are staged before execution.
const STAGING_DIR: &str = "/tmp/minitrino/bootstrap";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BootstrapPhase {
    BeforeStart,
    AfterStart,
}

impl BootstrapPhase {
    pub fn script_name(&self) -> &'static str {
        match self {
            Self::BeforeStart => "before_start.sh",
            Self::AfterStart => "after_start.sh",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeStart => "before-start",
            Self::AfterStart => "after-start",
        }
    }
}

impl fmt::Display for BootstrapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BootstrapStatus {
    Executed,
    Skipped,
}

/// What happened to one script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapOutcome {
    pub module: String,
    pub container: String,
    pub phase: BootstrapPhase,
    pub status: BootstrapStatus,
}

/// Runs module bootstrap scripts. `None` means the module has no script for
/// that phase.
#[async_trait]
pub trait BootstrapRunner: Send + Sync {
    async fn before_start(&self, container: &str, module: &Module)
        -> Result<Option<BootstrapOutcome>>;

    async fn after_start(&self, container: &str, module: &Module)
        -> Result<Option<BootstrapOutcome>>;
}

/// Checksum-keyed runner that executes scripts through a container runtime.
pub struct ScriptRunner {
    runtime: Arc<dyn ContainerRuntime>,
}

impl ScriptRunner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    pub fn script_path(module: &Module, phase: BootstrapPhase) -> PathBuf {
        module.dir.join("bootstrap").join(phase.script_name())
    }

    pub fn record_path(module: &str, phase: BootstrapPhase) -> String {
        format!("{}/{}-{}.sha256", RECORD_DIR, module, phase)
    }

    #[instrument(skip(self, module), fields(module = %module.name))]
    async fn run(
        &self,
        container: &str,
        module: &Module,
        phase: BootstrapPhase,
    ) -> Result<Option<BootstrapOutcome>> {
        let script = Self::script_path(module, phase);
        if !script.is_file() {
            return Ok(None);
        }

        let content = tokio::fs::read(&script)
            .await
            .map_err(|e| MinitrinoError::IoError { path: script.clone(), source: e })?;
        let checksum = sha256_hex(&content);

        let record = Self::record_path(&module.name, phase);
        let previous = self.runtime.exec(container, &["cat", record.as_str()]).await?;
        let outcome = |status| BootstrapOutcome {
            module: module.name.clone(),
            container: container.to_string(),
            phase,
            status,
        };

        if previous.success() && previous.stdout.trim() == checksum {
            info!(%phase, "Bootstrap script unchanged, skipping");
            return Ok(Some(outcome(BootstrapStatus::Skipped)));
        }

        let staged = format!("{}/{}-{}.sh", STAGING_DIR, module.name, phase);
        let failed = |reason: String| MinitrinoError::BootstrapFailed {
            container: container.to_string(),
            script: script.to_string_lossy().to_string(),
            reason,
        };

        self.runtime
            .write_file(container, &staged, &content)
            .await
            .map_err(|e| failed(e.to_string()))?;
        let output = self.runtime.exec(container, &["bash", staged.as_str()]).await?;
        if !output.success() {
            let reason = if output.stderr.is_empty() {
                format!("exited with status {}", output.exit_code)
            } else {
                output.stderr
            };
            return Err(failed(reason));
        }

        self.runtime.write_file(container, &record, checksum.as_bytes()).await?;
        info!(%phase, "Bootstrap script executed");
        Ok(Some(outcome(BootstrapStatus::Executed)))
    }
}

#[async_trait]
impl BootstrapRunner for ScriptRunner {
    async fn before_start(
        &self,
        container: &str,
        module: &Module,
    ) -> Result<Option<BootstrapOutcome>> {
        self.run(container, module, BootstrapPhase::BeforeStart).await
    }

    async fn after_start(
        &self,
        container: &str,
        module: &Module,
    ) -> Result<Option<BootstrapOutcome>> {
        self.run(container, module, BootstrapPhase::AfterStart).await
    }
}

pub fn sha256_hex(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}
