//! CLI command implementations

pub mod cluster;
pub mod modules;
pub mod provision;
pub mod snapshot;

#[cfg(test)]
mod commands_test;

pub use cluster::{down, remove, restart};
pub use modules::modules;
pub use provision::provision;
pub use snapshot::snapshot;

use anyhow::Result;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use minitrino_core::config::{parse_env_pairs, KEY_CLUSTER_NAME, KEY_LIB_PATH};
use minitrino_core::{paths, ClusterSelector, ConfigLayers, MinitrinoError, Settings, UserConfig};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Flags shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Module library directory
    #[arg(long, global = true, value_name = "PATH")]
    pub lib: Option<PathBuf>,

    /// Environment override, highest precedence (KEY=VALUE, repeatable)
    #[arg(short, long, global = true, value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

pub fn init_logging(global: &GlobalArgs) {
    // A broken user config is reported by the command itself.
    let configured = UserConfig::load().ok().and_then(|c| c.log_level);
    minitrino_core::observability::init(global.verbose, configured.as_deref());
}

/// Resolve settings from every configuration layer.
///
/// `flags` are dedicated command-line options; they win over `--env`.
pub fn load_settings(global: &GlobalArgs, flags: BTreeMap<String, String>) -> Result<Settings> {
    let mut overrides = parse_env_pairs(&global.env)?;
    overrides.extend(flags);

    let lib = global
        .lib
        .clone()
        .or_else(|| overrides.get(KEY_LIB_PATH).map(PathBuf::from))
        .unwrap_or_else(paths::default_lib_dir);

    let layers = ConfigLayers::gather(overrides, &lib)?;
    Ok(Settings::resolve(&layers, lib)?)
}

/// Settings with an optional `--cluster` flag applied.
pub fn cluster_settings(global: &GlobalArgs, cluster: Option<String>) -> Result<Settings> {
    let flags = cluster.map(|c| (KEY_CLUSTER_NAME.to_string(), c)).into_iter().collect();
    load_settings(global, flags)
}

pub fn selector(settings: &Settings) -> Result<ClusterSelector> {
    Ok(ClusterSelector::parse(&settings.cluster_name)?)
}

pub fn spinner(message: impl Into<String>) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

/// Process exit code for a failed command.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<MinitrinoError>()
        .map(|e| u8::try_from(e.exit_code()).unwrap_or(1))
        .unwrap_or(1)
}
