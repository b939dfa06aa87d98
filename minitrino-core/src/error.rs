//! Error types for Minitrino.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.
//! Variants are grouped by the stage that raises them so the CLI can map each
//! group to its own exit code.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Minitrino operations.
pub type Result<T> = std::result::Result<T, MinitrinoError>;

/// Main error type for Minitrino.
#[derive(Error, Debug)]
pub enum MinitrinoError {
    // Operator errors
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Unknown module: {module}")]
    UnknownModule { module: String },

    // Resolution conflicts
    #[error("Module '{module}' is incompatible with module '{other}'")]
    IncompatibleModules { module: String, other: String },

    #[error(
        "Module '{module}' supports versions {min} through {}, but the target version is {version}",
        .max.as_deref().unwrap_or("latest")
    )]
    VersionConflict { module: String, version: String, min: String, max: Option<String> },

    #[error("Module '{module}' requires an enterprise license, but no license path is configured")]
    LicenseRequired { module: String },

    // Registry errors
    #[error("Invalid metadata for module '{module}', field '{field}': {reason}")]
    InvalidMetadata { module: String, field: String, reason: String },

    #[error("Module library not found at {path:?}")]
    LibraryNotFound { path: PathBuf },

    #[error("File read error: {path}: {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // Composition errors
    #[error("Composition fragment for module '{module}' not found at {path:?}")]
    MissingFragment { module: String, path: PathBuf },

    #[error("Invalid composition fragment at {path:?}: {reason}")]
    InvalidFragment { path: PathBuf, reason: String },

    #[error("Resource '{resource}' in {path:?} is missing label '{label}'")]
    MissingLabel { path: PathBuf, resource: String, label: String },

    // Provisioning failures
    #[error("Image build failed for {image}: {reason}")]
    BuildFailed { image: String, reason: String },

    #[error("Failed to start {target}: {reason}")]
    StartFailed { target: String, reason: String },

    #[error("Bootstrap script '{script}' failed in container {container}: {reason}")]
    BootstrapFailed { container: String, script: String, reason: String },

    #[error("Coordinator {container} did not become ready after {attempts} attempts")]
    HealthTimeout { container: String, attempts: u32 },

    #[error("Phase {phase} failed with {} error(s): {}", .errors.len(), join_errors(.errors))]
    PhaseFailed { phase: String, errors: Vec<MinitrinoError> },

    #[error("Provisioning aborted during {phase}")]
    Aborted { phase: String },

    #[error("Container runtime command `{command}` failed: {reason}")]
    RuntimeCommand { command: String, reason: String },

    // Federation failures
    #[error("Dependent cluster '{cluster}' failed: {source}")]
    DependentClusterFailed {
        cluster: String,
        #[source]
        source: Box<MinitrinoError>,
    },

    #[error("Dependent cluster '{cluster}' is already being provisioned in this run")]
    FederationCycle { cluster: String },

    // Generic errors
    #[error("I/O error at {path:?}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn join_errors(errors: &[MinitrinoError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Broad failure category, used for exit codes and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Operator,
    Resolution,
    Composition,
    Provisioning,
    Federation,
    Runtime,
}

impl MinitrinoError {
    /// Create an Internal error from any error type.
    pub fn internal(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal(err.to_string())
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. } | Self::UnknownModule { .. } => ErrorKind::Operator,
            Self::IncompatibleModules { .. }
            | Self::VersionConflict { .. }
            | Self::LicenseRequired { .. } => ErrorKind::Resolution,
            Self::InvalidMetadata { .. }
            | Self::LibraryNotFound { .. }
            | Self::MissingFragment { .. }
            | Self::InvalidFragment { .. }
            | Self::MissingLabel { .. } => ErrorKind::Composition,
            Self::BuildFailed { .. }
            | Self::StartFailed { .. }
            | Self::BootstrapFailed { .. }
            | Self::HealthTimeout { .. }
            | Self::PhaseFailed { .. }
            | Self::Aborted { .. } => ErrorKind::Provisioning,
            Self::DependentClusterFailed { .. } | Self::FederationCycle { .. } => {
                ErrorKind::Federation
            }
            Self::RuntimeCommand { .. }
            | Self::FileReadError { .. }
            | Self::IoError { .. }
            | Self::Internal(_)
            | Self::Other(_) => ErrorKind::Runtime,
        }
    }

    /// Process exit code for this error.
    ///
    /// User-input problems use 2-9, runtime and provisioning failures use 10-19.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Operator => 2,
            ErrorKind::Resolution => 3,
            ErrorKind::Composition => 4,
            ErrorKind::Provisioning => 10,
            ErrorKind::Federation => 11,
            ErrorKind::Runtime => 12,
        }
    }
}
