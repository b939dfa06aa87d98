//! Snapshot archives.
//!
//! A snapshot captures everything needed to reproduce a cluster elsewhere:
//! the base fragment, library defaults, the image context, the selected
//! modules' directories and a `provision-snapshot.sh` that replays the
//! provisioning command. The archive is a gzip-compressed tarball with every
//! entry under a `<name>/` prefix.

use crate::config::{Settings, KEY_CLUSTER_NAME, KEY_LIB_PATH};
use crate::error::{MinitrinoError, Result};
use crate::modules::ResolvedModules;
use crate::paths;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Name of the replay script inside the archive.
pub const SCRIPT_NAME: &str = "provision-snapshot.sh";

/// Name of the manifest inside the archive.
pub const MANIFEST_NAME: &str = "snapshot.json";

/// Description of a snapshot, stored as `snapshot.json`.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotManifest {
    pub name: String,
    pub cluster: String,
    pub distribution: String,
    pub version: String,
    pub workers: u32,
    pub modules: Vec<String>,
    pub created_at: String,
}

impl SnapshotManifest {
    fn new(name: &str, settings: &Settings, modules: &ResolvedModules) -> Self {
        Self {
            name: name.to_string(),
            cluster: settings.cluster_name.clone(),
            distribution: settings.distribution.to_string(),
            version: settings.version.to_string(),
            workers: settings.workers,
            modules: modules.names().into_iter().map(String::from).collect(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Snapshot names become file and directory names.
pub fn validate_snapshot_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        && !name.starts_with('-');
    if valid {
        Ok(())
    } else {
        Err(MinitrinoError::InvalidInput {
            reason: format!(
                "invalid snapshot name '{}': use letters, digits, '-' or '_'",
                name
            ),
        })
    }
}

/// Shell script that re-provisions the snapshotted cluster from the
/// library bundled next to it.
pub fn provision_script(settings: &Settings, modules: &ResolvedModules) -> String {
    let mut command = vec![
        "minitrino".to_string(),
        "--env".to_string(),
        format!("{}=\"${{SCRIPT_DIR}}/lib\"", KEY_LIB_PATH),
        "--env".to_string(),
        format!("{}={}", KEY_CLUSTER_NAME, settings.cluster_name),
        "provision".to_string(),
        "--image".to_string(),
        settings.distribution.to_string(),
        "--version".to_string(),
        settings.version.to_string(),
    ];
    if settings.workers > 0 {
        command.push("--workers".to_string());
        command.push(settings.workers.to_string());
    }
    for module in modules.iter() {
        command.push("--module".to_string());
        command.push(module.name.clone());
    }

    format!(
        "#!/usr/bin/env bash\n\
         set -euxo pipefail\n\
         \n\
         SCRIPT_DIR=\"$(cd \"$(dirname \"${{BASH_SOURCE[0]}}\")\" && pwd)\"\n\
         \n\
         {}\n",
        command.join(" \\\n    ")
    )
}

/// Write `<dest_dir>/<name>.tar.gz` and return its path.
#[instrument(skip(settings, modules), fields(cluster = %settings.cluster_name))]
pub fn create_snapshot(
    name: &str,
    settings: &Settings,
    modules: &ResolvedModules,
    dest_dir: &Path,
) -> Result<PathBuf> {
    validate_snapshot_name(name)?;

    let lib = &settings.lib_path;
    let base = paths::base_fragment(lib);
    if !base.is_file() {
        return Err(MinitrinoError::MissingFragment { module: "base".to_string(), path: base });
    }

    std::fs::create_dir_all(dest_dir)
        .map_err(|e| MinitrinoError::IoError { path: dest_dir.to_path_buf(), source: e })?;
    let archive_path = dest_dir.join(format!("{}.tar.gz", name));
    let file = File::create(&archive_path)
        .map_err(|e| MinitrinoError::IoError { path: archive_path.clone(), source: e })?;

    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |e: std::io::Error| MinitrinoError::IoError { path, source: e }
    };

    let encoder = GzEncoder::new(file, Compression::best());
    let mut archive = tar::Builder::new(encoder);
    let root = PathBuf::from(name);
    let lib_root = root.join("lib");

    archive
        .append_path_with_name(&base, lib_root.join("docker-compose.yaml"))
        .map_err(io_err(&base))?;

    let library_env = paths::library_env(lib);
    if library_env.is_file() {
        archive
            .append_path_with_name(&library_env, lib_root.join("minitrino.env"))
            .map_err(io_err(&library_env))?;
    }

    let image = paths::image_context(lib);
    if image.is_dir() {
        archive.append_dir_all(lib_root.join("image"), &image).map_err(io_err(&image))?;
    }

    for module in modules.iter() {
        let target = lib_root
            .join("modules")
            .join(module.module_type.as_str())
            .join(&module.name);
        archive.append_dir_all(&target, &module.dir).map_err(io_err(&module.dir))?;
    }

    let script = provision_script(settings, modules);
    append_bytes(&mut archive, &root.join(SCRIPT_NAME), script.as_bytes(), 0o755)
        .map_err(io_err(&archive_path))?;

    let manifest = SnapshotManifest::new(name, settings, modules);
    let manifest = serde_json::to_vec_pretty(&manifest).map_err(MinitrinoError::internal)?;
    append_bytes(&mut archive, &root.join(MANIFEST_NAME), &manifest, 0o644)
        .map_err(io_err(&archive_path))?;

    let encoder = archive.into_inner().map_err(io_err(&archive_path))?;
    encoder.finish().map_err(io_err(&archive_path))?;

    info!(path = %archive_path.display(), modules = modules.len(), "Snapshot written");
    Ok(archive_path)
}

fn append_bytes<W: std::io::Write>(
    archive: &mut tar::Builder<W>,
    path: &Path,
    data: &[u8],
    mode: u32,
) -> std::io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(mode);
    header.set_mtime(chrono::Utc::now().timestamp().max(0) as u64);
    header.set_cksum();
    archive.append_data(&mut header, path, data)
}
