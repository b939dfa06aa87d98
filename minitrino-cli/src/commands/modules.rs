//! `minitrino modules` command

use super::{cluster_settings, selector, GlobalArgs};
use anyhow::Result;
use minitrino_core::modules::Module;
use minitrino_core::{runtime, ModuleRegistry, ModuleType, ResourceLocator};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

#[derive(Debug, Clone, Default)]
pub struct ModulesArgs {
    pub module_type: Option<String>,
    pub json: bool,
    pub running: bool,
    pub cluster: Option<String>,
}

#[derive(Tabled)]
struct ModuleRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "TYPE")]
    module_type: String,
    #[tabled(rename = "DESCRIPTION")]
    description: String,
    #[tabled(rename = "VERSIONS")]
    versions: String,
    #[tabled(rename = "ENTERPRISE")]
    enterprise: String,
    #[tabled(rename = "DEPENDS ON")]
    depends_on: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ModuleInfo {
    name: String,
    #[serde(rename = "type")]
    module_type: String,
    description: String,
    enterprise: bool,
    versions: Option<String>,
    dependent_modules: Vec<String>,
    dependent_clusters: Vec<String>,
}

impl From<&Module> for ModuleInfo {
    fn from(module: &Module) -> Self {
        Self {
            name: module.name.clone(),
            module_type: module.module_type.to_string(),
            description: module.description.clone(),
            enterprise: module.enterprise,
            versions: module.versions.map(|v| v.to_string()),
            dependent_modules: module.dependent_modules.clone(),
            dependent_clusters: module.dependent_clusters.iter().map(|c| c.name.clone()).collect(),
        }
    }
}

impl From<&Module> for ModuleRow {
    fn from(module: &Module) -> Self {
        Self {
            name: module.name.clone(),
            module_type: module.module_type.to_string(),
            description: module.description.clone(),
            versions: module.versions.map_or_else(|| "any".to_string(), |v| v.to_string()),
            enterprise: if module.enterprise { "yes" } else { "" }.to_string(),
            depends_on: module.dependent_modules.join(", "),
        }
    }
}

/// Modules matching the type and running filters, sorted by name.
pub(crate) fn select<'r>(
    registry: &'r ModuleRegistry,
    module_type: Option<ModuleType>,
    running: Option<&std::collections::BTreeSet<String>>,
) -> Vec<&'r Module> {
    registry
        .iter()
        .filter(|m| module_type.map_or(true, |t| m.module_type == t))
        .filter(|m| running.map_or(true, |names| names.contains(&m.name)))
        .collect()
}

/// List modules in the library
pub async fn modules(global: &GlobalArgs, args: ModulesArgs) -> Result<()> {
    let settings = cluster_settings(global, args.cluster.clone())?;
    let registry = ModuleRegistry::load(&settings.lib_path)?;
    let module_type = args.module_type.as_deref().map(str::parse::<ModuleType>).transpose()?;

    let running = if args.running {
        let locator = ResourceLocator::new(runtime::from_settings(&settings));
        Some(locator.running_modules(&selector(&settings)?).await?)
    } else {
        None
    };

    let selected = select(&registry, module_type, running.as_ref());

    if args.json {
        let infos: Vec<ModuleInfo> = selected.into_iter().map(ModuleInfo::from).collect();
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    if selected.is_empty() {
        println!("No modules found");
        return Ok(());
    }

    let rows: Vec<ModuleRow> = selected.into_iter().map(ModuleRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::modern());
    println!("{}", table);
    Ok(())
}
