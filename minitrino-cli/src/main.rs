use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;

use commands::GlobalArgs;

#[derive(Parser)]
#[command(name = "minitrino")]
#[command(about = "Provision local Trino and Starburst clusters from composable modules", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision a cluster with the given modules
    Provision {
        /// Module to deploy (repeatable)
        #[arg(short, long = "module", value_name = "MODULE")]
        modules: Vec<String>,

        /// Engine distribution (trino or starburst)
        #[arg(short, long)]
        image: Option<String>,

        /// Engine version, e.g. 476 or 443-e.9
        #[arg(long = "version", value_name = "VERSION")]
        engine_version: Option<String>,

        /// Number of worker containers
        #[arg(short, long)]
        workers: Option<u32>,

        /// Cluster name
        #[arg(short, long)]
        cluster: Option<String>,

        /// Leave created resources in place if provisioning fails
        #[arg(long)]
        no_rollback: bool,
    },

    /// Stop a cluster's containers ('*' for every cluster)
    Down {
        /// Cluster name
        #[arg(short, long)]
        cluster: Option<String>,

        /// Remove the containers after stopping them
        #[arg(long)]
        remove: bool,
    },

    /// Remove cluster resources
    Remove {
        /// Cluster name ('*' for every cluster)
        #[arg(short, long)]
        cluster: Option<String>,

        /// Only resources contributed by this module (repeatable)
        #[arg(short, long = "module", value_name = "MODULE")]
        modules: Vec<String>,

        /// Only resources carrying this label key (repeatable)
        #[arg(short, long = "label", value_name = "KEY")]
        labels: Vec<String>,

        /// Remove containers
        #[arg(long)]
        containers: bool,

        /// Remove volumes
        #[arg(long)]
        volumes: bool,

        /// Remove networks
        #[arg(long)]
        networks: bool,

        /// Remove images (the shared engine image only with --cluster '*')
        #[arg(long)]
        images: bool,
    },

    /// Restart every container of a cluster
    Restart {
        /// Cluster name
        #[arg(short, long)]
        cluster: Option<String>,
    },

    /// List modules in the library
    Modules {
        /// Only modules of this type (admin, catalog, security)
        #[arg(short = 't', long = "type", value_name = "TYPE")]
        module_type: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Only modules running on the cluster
        #[arg(long)]
        running: bool,

        /// Cluster for --running
        #[arg(short, long)]
        cluster: Option<String>,
    },

    /// Write a snapshot archive of a cluster's modules
    Snapshot {
        /// Snapshot name
        #[arg(short, long)]
        name: String,

        /// Modules to include; defaults to the modules running on the cluster
        #[arg(short, long = "module", value_name = "MODULE")]
        modules: Vec<String>,

        /// Cluster to snapshot when no modules are given
        #[arg(short, long)]
        cluster: Option<String>,

        /// Directory the archive is written to
        #[arg(short, long, default_value = ".")]
        directory: PathBuf,

        /// Overwrite an existing archive
        #[arg(short, long)]
        force: bool,
    },
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let global = cli.global;

    match cli.command {
        Commands::Provision { modules, image, engine_version, workers, cluster, no_rollback } => {
            let args = commands::provision::ProvisionArgs {
                modules,
                image,
                version: engine_version,
                workers,
                cluster,
                no_rollback,
            };
            commands::provision(&global, args).await?;
        }

        Commands::Down { cluster, remove } => {
            commands::down(&global, cluster, remove).await?;
        }

        Commands::Remove { cluster, modules, labels, containers, volumes, networks, images } => {
            let args = commands::cluster::RemoveArgs {
                cluster,
                modules,
                labels,
                containers,
                volumes,
                networks,
                images,
            };
            commands::remove(&global, args).await?;
        }

        Commands::Restart { cluster } => {
            commands::restart(&global, cluster).await?;
        }

        Commands::Modules { module_type, json, running, cluster } => {
            let args = commands::modules::ModulesArgs { module_type, json, running, cluster };
            commands::modules(&global, args).await?;
        }

        Commands::Snapshot { name, modules, cluster, directory, force } => {
            let args =
                commands::snapshot::SnapshotArgs { name, modules, cluster, directory, force };
            commands::snapshot(&global, args).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    commands::init_logging(&cli.global);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::from(commands::exit_code(&e))
        }
    }
}
