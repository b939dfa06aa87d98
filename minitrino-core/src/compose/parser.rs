//! Fragment parser.
//!
//! Parses composition fragments and validates the structure Minitrino
//! relies on. Label checks live in the composer.

use super::types::*;
use crate::error::{MinitrinoError, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, instrument};

/// Parser for composition fragments.
pub struct ComposeParser;

impl ComposeParser {
    /// Parse a fragment from a string. `path` is only used in errors.
    #[instrument(skip(content))]
    pub fn parse(content: &str, path: &Path) -> Result<ComposeFile> {
        debug!("Parsing fragment");

        let compose: ComposeFile = serde_yaml::from_str(content).map_err(|e| {
            MinitrinoError::InvalidFragment { path: path.to_path_buf(), reason: e.to_string() }
        })?;

        Self::validate_version(&compose.version).map_err(|reason| {
            MinitrinoError::InvalidFragment { path: path.to_path_buf(), reason }
        })?;
        Self::validate_services(&compose.services).map_err(|reason| {
            MinitrinoError::InvalidFragment { path: path.to_path_buf(), reason }
        })?;

        Ok(compose)
    }

    /// Read and parse a fragment from disk.
    #[instrument]
    pub fn parse_file(path: &Path) -> Result<ComposeFile> {
        let content = std::fs::read_to_string(path).map_err(|e| MinitrinoError::FileReadError {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;

        Self::parse(&content, path)
    }

    /// Supports compose file format versions 2 and 3, or none.
    fn validate_version(version: &str) -> std::result::Result<(), String> {
        if version.is_empty() || version.starts_with('2') || version.starts_with('3') {
            Ok(())
        } else {
            Err(format!("unsupported compose version '{}'", version))
        }
    }

    /// Each service needs an image or a build section.
    fn validate_services(services: &BTreeMap<String, Service>) -> std::result::Result<(), String> {
        for (name, service) in services {
            let has_image = service.image.as_deref().is_some_and(|i| !i.trim().is_empty());
            if !has_image && service.build.is_none() {
                return Err(format!("service '{}' has neither image nor build", name));
            }
        }
        Ok(())
    }
}
