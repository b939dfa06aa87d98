//! `minitrino snapshot` command

use super::{cluster_settings, selector, spinner, GlobalArgs};
use anyhow::Result;
use colored::Colorize;
use minitrino_core::locator::ClusterSelector;
use minitrino_core::modules::{resolve, ResolveTarget};
use minitrino_core::snapshot::{create_snapshot, validate_snapshot_name};
use minitrino_core::{runtime, MinitrinoError, ModuleRegistry, ResourceLocator};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct SnapshotArgs {
    pub name: String,
    pub modules: Vec<String>,
    pub cluster: Option<String>,
    pub directory: PathBuf,
    pub force: bool,
}

/// Archive path for a snapshot, refusing to clobber an existing one.
pub(crate) fn archive_path(directory: &Path, name: &str, force: bool) -> Result<PathBuf> {
    validate_snapshot_name(name)?;
    let path = directory.join(format!("{}.tar.gz", name));
    if path.exists() && !force {
        return Err(MinitrinoError::InvalidInput {
            reason: format!("snapshot {} already exists, pass --force to overwrite", path.display()),
        }
        .into());
    }
    Ok(path)
}

/// Write a snapshot archive
pub async fn snapshot(global: &GlobalArgs, args: SnapshotArgs) -> Result<()> {
    let settings = cluster_settings(global, args.cluster.clone())?;
    archive_path(&args.directory, &args.name, args.force)?;

    let requested = if args.modules.is_empty() {
        let selector = selector(&settings)?;
        if selector == ClusterSelector::All {
            return Err(MinitrinoError::InvalidInput {
                reason: "snapshot needs a single cluster, not '*'".to_string(),
            }
            .into());
        }
        let locator = ResourceLocator::new(runtime::from_settings(&settings));
        let running: Vec<String> = locator.running_modules(&selector).await?.into_iter().collect();
        if running.is_empty() {
            return Err(MinitrinoError::InvalidInput {
                reason: format!(
                    "no modules are running on cluster {}, pass --module to choose them",
                    settings.cluster_name
                ),
            }
            .into());
        }
        running
    } else {
        args.modules.clone()
    };

    let registry = ModuleRegistry::load(&settings.lib_path)?;
    let target =
        ResolveTarget { version: &settings.version, license_path: settings.license_path.as_ref() };
    let resolved = resolve(&requested, &registry, &target)?;

    let progress = spinner(format!("Writing snapshot {}...", args.name))?;
    let result = create_snapshot(&args.name, &settings, &resolved, &args.directory);
    progress.finish_and_clear();

    let path = result?;
    println!("{} Snapshot written to {}", "✓".green().bold(), path.display().to_string().bold());
    println!("  {} {}", "modules:".dimmed(), resolved.names().join(", "));
    Ok(())
}
