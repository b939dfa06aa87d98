//! Provisioning State Machine.
//!
//! Drives one cluster from nothing to ready:
//!
//! ```text
//! Idle -> Building -> CoordinatorStarting -> PreBootstrap -> HealthGating
//!      -> PostBootstrap [-> WorkersProvisioning -> ConfigPropagating
//!      -> WorkersRestarting] [-> Federating] -> Ready
//! ```
//!
//! Any failure enters `RollingBack` (unless disabled) and returns to `Idle`.

pub mod abort;
pub mod events;
pub mod fanout;
pub mod health;
mod machine;
pub mod rollback;
pub mod tracker;

pub use abort::{AbortHandle, AbortSignal};
pub use events::{EventBus, EventSubscriber, PhaseEvent};
pub use fanout::fan_out;
pub use machine::Provisioner;
pub use rollback::RollbackReport;
pub use tracker::RunTracker;

use crate::bootstrap::BootstrapOutcome;
use crate::config::Settings;
use crate::labels::ResourceRef;
use serde::Serialize;
use std::fmt;

/// States of the provisioning state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Idle,
    Building,
    CoordinatorStarting,
    PreBootstrap,
    HealthGating,
    PostBootstrap,
    WorkersProvisioning,
    ConfigPropagating,
    WorkersRestarting,
    Federating,
    Ready,
    RollingBack,
}

impl Phase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Building => "building",
            Self::CoordinatorStarting => "coordinator-starting",
            Self::PreBootstrap => "pre-bootstrap",
            Self::HealthGating => "health-gating",
            Self::PostBootstrap => "post-bootstrap",
            Self::WorkersProvisioning => "workers-provisioning",
            Self::ConfigPropagating => "config-propagating",
            Self::WorkersRestarting => "workers-restarting",
            Self::Federating => "federating",
            Self::Ready => "ready",
            Self::RollingBack => "rolling-back",
        }
    }

    /// Human-readable progress message.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Building => "Building engine image",
            Self::CoordinatorStarting => "Starting coordinator and module services",
            Self::PreBootstrap => "Running before-start bootstrap scripts",
            Self::HealthGating => "Waiting for coordinator",
            Self::PostBootstrap => "Running after-start bootstrap scripts",
            Self::WorkersProvisioning => "Provisioning workers",
            Self::ConfigPropagating => "Propagating configuration to workers",
            Self::WorkersRestarting => "Restarting cluster",
            Self::Federating => "Provisioning dependent clusters",
            Self::Ready => "Ready",
            Self::RollingBack => "Rolling back",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to provision.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub modules: Vec<String>,
    pub settings: Settings,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub cluster: String,
    /// Resolved modules in deployment order.
    pub modules: Vec<String>,
    pub image: String,
    pub coordinator: String,
    pub workers: Vec<String>,
    /// Resources created by this run, including dependent clusters'.
    pub created: Vec<ResourceRef>,
    pub bootstrap: Vec<BootstrapOutcome>,
    pub health_attempts: u32,
    pub warnings: Vec<String>,
    pub dependents: Vec<ProvisionReport>,
}
