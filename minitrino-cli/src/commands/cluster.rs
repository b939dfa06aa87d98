//! `minitrino down`, `remove` and `restart` commands

use super::{cluster_settings, selector, spinner, GlobalArgs};
use anyhow::Result;
use colored::Colorize;
use minitrino_core::labels::ResourceKind;
use minitrino_core::{runtime, ClusterOps, ModuleRegistry, Query, Settings};
use tabled::{settings::Style, Table, Tabled};

#[derive(Debug, Clone, Default)]
pub struct RemoveArgs {
    pub cluster: Option<String>,
    pub modules: Vec<String>,
    pub labels: Vec<String>,
    pub containers: bool,
    pub volumes: bool,
    pub networks: bool,
    pub images: bool,
}

impl RemoveArgs {
    /// Selected resource kinds; none selected means all of them.
    pub fn kinds(&self) -> Vec<ResourceKind> {
        let selected: Vec<ResourceKind> = [
            (self.containers, ResourceKind::Container),
            (self.volumes, ResourceKind::Volume),
            (self.networks, ResourceKind::Network),
            (self.images, ResourceKind::Image),
        ]
        .into_iter()
        .filter_map(|(on, kind)| on.then_some(kind))
        .collect();

        if selected.is_empty() {
            ResourceKind::ALL.to_vec()
        } else {
            selected
        }
    }
}

#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "KIND")]
    kind: String,
    #[tabled(rename = "NAME")]
    name: String,
}

fn ops(settings: &Settings) -> ClusterOps {
    ClusterOps::new(runtime::from_settings(settings), settings.max_concurrency)
}

/// Stop (and optionally remove) a cluster's containers
pub async fn down(global: &GlobalArgs, cluster: Option<String>, remove: bool) -> Result<()> {
    let settings = cluster_settings(global, cluster)?;
    let selector = selector(&settings)?;

    let progress = spinner(format!("Stopping cluster {}...", selector))?;
    let result = ops(&settings).down(&selector, remove).await;
    progress.finish_and_clear();

    let stopped = result?;
    if stopped.is_empty() {
        println!("No running containers for cluster {}", selector.to_string().bold());
        return Ok(());
    }

    let verb = if remove { "Stopped and removed" } else { "Stopped" };
    println!("{} {} {} container(s)", "✓".green().bold(), verb, stopped.len());
    for name in stopped {
        println!("  {} {}", "•".dimmed(), name);
    }
    Ok(())
}

/// Remove resources matching the cluster, module and kind filters
pub async fn remove(global: &GlobalArgs, args: RemoveArgs) -> Result<()> {
    let settings = cluster_settings(global, args.cluster.clone())?;
    let mut query = Query::new(selector(&settings)?).kinds(&args.kinds());

    if !args.modules.is_empty() {
        let registry = ModuleRegistry::load(&settings.lib_path)?;
        for name in &args.modules {
            query = query.module(registry.require(name)?.label_key());
        }
    }
    for label in &args.labels {
        query = query.module(label.clone());
    }

    let progress = spinner("Removing resources...")?;
    let result = ops(&settings).remove(&query).await;
    progress.finish_and_clear();

    let removed = result?;
    if removed.is_empty() {
        println!("Nothing to remove");
        return Ok(());
    }

    println!("{} Removed {} resource(s)", "✓".green().bold(), removed.len());
    let rows: Vec<ResourceRow> = removed
        .into_iter()
        .map(|r| ResourceRow { kind: r.kind.to_string(), name: r.name })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::modern());
    println!("{}", table);
    Ok(())
}

/// Restart every container of a cluster
pub async fn restart(global: &GlobalArgs, cluster: Option<String>) -> Result<()> {
    let settings = cluster_settings(global, cluster)?;
    let selector = selector(&settings)?;

    let progress = spinner(format!("Restarting cluster {}...", selector))?;
    let result = ops(&settings).restart(&selector).await;
    progress.finish_and_clear();

    let restarted = result?;
    println!("{} Restarted {} container(s)", "✓".green().bold(), restarted.len());
    Ok(())
}
