//! `minitrino provision` command

use super::{load_settings, spinner, GlobalArgs};
use anyhow::Result;
use colored::Colorize;
use minitrino_core::bootstrap::BootstrapStatus;
use minitrino_core::config::{KEY_CLUSTER_DIST, KEY_CLUSTER_NAME, KEY_CLUSTER_VER, KEY_WORKERS};
use minitrino_core::{
    runtime, AbortSignal, ModuleRegistry, ProvisionReport, ProvisionRequest, Provisioner,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tabled::{settings::Style, Table, Tabled};

#[derive(Debug, Clone, Default)]
pub struct ProvisionArgs {
    pub modules: Vec<String>,
    pub image: Option<String>,
    pub version: Option<String>,
    pub workers: Option<u32>,
    pub cluster: Option<String>,
    pub no_rollback: bool,
}

impl ProvisionArgs {
    /// Dedicated flags as configuration overrides.
    pub fn overrides(&self) -> BTreeMap<String, String> {
        let mut flags = BTreeMap::new();
        if let Some(image) = &self.image {
            flags.insert(KEY_CLUSTER_DIST.to_string(), image.clone());
        }
        if let Some(version) = &self.version {
            flags.insert(KEY_CLUSTER_VER.to_string(), version.clone());
        }
        if let Some(workers) = self.workers {
            flags.insert(KEY_WORKERS.to_string(), workers.to_string());
        }
        if let Some(cluster) = &self.cluster {
            flags.insert(KEY_CLUSTER_NAME.to_string(), cluster.clone());
        }
        flags
    }
}

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "ROLE")]
    role: &'static str,
    #[tabled(rename = "CONTAINER")]
    container: String,
}

#[derive(Tabled)]
struct BootstrapRow {
    #[tabled(rename = "MODULE")]
    module: String,
    #[tabled(rename = "PHASE")]
    phase: String,
    #[tabled(rename = "STATUS")]
    status: String,
}

/// Provision a cluster
pub async fn provision(global: &GlobalArgs, args: ProvisionArgs) -> Result<()> {
    let mut settings = load_settings(global, args.overrides())?;
    if args.no_rollback {
        settings.rollback = false;
    }

    let registry = Arc::new(ModuleRegistry::load(&settings.lib_path)?);
    let provisioner = Provisioner::new(runtime::from_settings(&settings), registry);

    println!(
        "{} Provisioning cluster {} ({} {}, {} worker(s))",
        "→".cyan().bold(),
        settings.cluster_name.bold(),
        settings.distribution,
        settings.version,
        settings.workers
    );
    if !args.modules.is_empty() {
        println!("  {} {}", "modules:".dimmed(), args.modules.join(", "));
    }

    let progress = spinner("Resolving modules...")?;
    let mut events = provisioner.events().subscribe();
    let watcher = {
        let progress = progress.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                progress.set_message(format!("[{}] {}...", event.cluster, event.phase.describe()));
            }
        })
    };

    let request = ProvisionRequest { modules: args.modules, settings };
    let result = provisioner.provision(request, &AbortSignal::ctrl_c()).await;
    watcher.abort();
    progress.finish_and_clear();

    let report = result?;
    print_report(&report, 0);
    Ok(())
}

fn print_report(report: &ProvisionReport, depth: usize) {
    let indent = "  ".repeat(depth);
    println!("{}{} Cluster {} is ready", indent, "✓".green().bold(), report.cluster.bold());

    for warning in &report.warnings {
        println!("{}{} {}", indent, "⚠".yellow().bold(), warning.yellow());
    }

    let mut nodes = vec![NodeRow { role: "coordinator", container: report.coordinator.clone() }];
    nodes.extend(report.workers.iter().map(|w| NodeRow { role: "worker", container: w.clone() }));
    let mut table = Table::new(nodes);
    table.with(Style::rounded());
    println!("{}", table);

    if !report.modules.is_empty() {
        println!("{}{} {}", indent, "Modules:".dimmed(), report.modules.join(", "));
    }

    if !report.bootstrap.is_empty() {
        let rows: Vec<BootstrapRow> = report
            .bootstrap
            .iter()
            .map(|b| BootstrapRow {
                module: b.module.clone(),
                phase: b.phase.to_string(),
                status: match b.status {
                    BootstrapStatus::Executed => "executed".green().to_string(),
                    BootstrapStatus::Skipped => "unchanged".dimmed().to_string(),
                },
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::modern());
        println!("{}", table);
    }

    for dependent in &report.dependents {
        println!();
        print_report(dependent, depth + 1);
    }
}
