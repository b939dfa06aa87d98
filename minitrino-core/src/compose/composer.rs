//! Composition Composer.
//!
//! Collects the base fragment and one fragment per resolved module, checks
//! that every resource they declare carries the labels the locator relies
//! on, and produces the label plan for resources the state machine creates
//! itself (the engine image and worker containers).

use super::parser::ComposeParser;
use super::types::{ComposeFile, Labels};
use crate::cluster;
use crate::config::Settings;
use crate::error::{MinitrinoError, Result};
use crate::labels::{LabelPlan, LabelSet, PlannedResource, ResourceKind, PROJECT_LABEL_KEY};
use crate::modules::ResolvedModules;
use crate::paths;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

const BASE: &str = "base";

/// One parsed fragment.
#[derive(Debug, Clone)]
pub struct Fragment {
    /// Contributing module, `None` for the base fragment.
    pub module: Option<String>,
    pub path: PathBuf,
    pub compose: ComposeFile,
}

/// Everything the runtime needs to bring the cluster's services up.
#[derive(Debug, Clone)]
pub struct Composition {
    /// Compose project, `minitrino-<cluster>`.
    pub project: String,
    pub project_dir: PathBuf,
    /// Base fragment first, then modules in resolution order.
    pub fragments: Vec<Fragment>,
    pub labels: LabelPlan,
    /// Operator-facing notices, e.g. persistent volumes.
    pub warnings: Vec<String>,
    /// Variables compose interpolates into the fragments.
    pub env: BTreeMap<String, String>,
}

impl Composition {
    /// Fragment paths in the order they are passed to the runtime.
    pub fn files(&self) -> Vec<PathBuf> {
        self.fragments.iter().map(|f| f.path.clone()).collect()
    }

    /// Service names across all fragments, deduplicated, in fragment order.
    pub fn services(&self) -> Vec<String> {
        let mut services: Vec<String> = Vec::new();
        for fragment in &self.fragments {
            for name in fragment.compose.services.keys() {
                if !services.contains(name) {
                    services.push(name.clone());
                }
            }
        }
        services
    }

    /// Fragment contributed by one module.
    pub fn fragment(&self, module: &str) -> Option<&Fragment> {
        self.fragments.iter().find(|f| f.module.as_deref() == Some(module))
    }
}

/// Build the composition for `modules` on the cluster described by `settings`.
#[instrument(skip_all, fields(cluster = %settings.cluster_name))]
pub fn compose(settings: &Settings, modules: &ResolvedModules) -> Result<Composition> {
    let lib = settings.lib_path.as_path();
    let mut fragments = Vec::with_capacity(modules.len() + 1);
    let mut resources = Vec::new();
    let mut warnings = Vec::new();

    let base_path = paths::base_fragment(lib);
    let base = load_fragment(BASE, &base_path)?;
    let root = LabelSet::root();
    check_fragment(&base_path, &base, &root, None, &mut resources)?;
    fragments.push(Fragment { module: None, path: base_path, compose: base });

    for module in modules.iter() {
        let path = module.fragment_path();
        let compose = load_fragment(&module.name, &path)?;
        let required = LabelSet::for_module(module.module_type, &module.name);
        check_fragment(&path, &compose, &required, Some(&module.name), &mut resources)?;

        let volumes: Vec<&str> = compose.volumes.keys().map(String::as_str).collect();
        if !volumes.is_empty() {
            let notice = format!(
                "Module '{}' declares persistent volumes ({}). They outlive `minitrino down`; \
                 remove them with `minitrino remove --volumes --module {}`",
                module.name,
                volumes.join(", "),
                module.name
            );
            warn!(module = %module.name, "{}", notice);
            warnings.push(notice);
        }

        debug!(module = %module.name, services = compose.services.len(), "Added fragment");
        fragments.push(Fragment { module: Some(module.name.clone()), path, compose });
    }

    let project = cluster::project_name(&settings.cluster_name);
    let labels = LabelPlan {
        resources,
        worker: LabelSet::root().with(PROJECT_LABEL_KEY, project.clone()),
        image: LabelSet::root(),
    };

    info!(fragments = fragments.len(), project = %project, "Composed cluster");
    Ok(Composition {
        project,
        project_dir: lib.to_path_buf(),
        fragments,
        labels,
        warnings,
        env: settings.env.clone(),
    })
}

fn load_fragment(owner: &str, path: &Path) -> Result<ComposeFile> {
    if !path.is_file() {
        return Err(MinitrinoError::MissingFragment {
            module: owner.to_string(),
            path: path.to_path_buf(),
        });
    }
    ComposeParser::parse_file(path)
}

/// Verify every declared resource carries `required` and record it in the plan.
fn check_fragment(
    path: &Path,
    compose: &ComposeFile,
    required: &LabelSet,
    module: Option<&str>,
    plan: &mut Vec<PlannedResource>,
) -> Result<()> {
    let mut check = |kind: ResourceKind, name: &str, labels: &Labels| -> Result<()> {
        let actual = labels.to_map();
        let missing = required.iter().find(|(k, v)| actual.get(*k).map(String::as_str) != Some(*v));
        if let Some((key, _)) = missing {
            return Err(MinitrinoError::MissingLabel {
                path: path.to_path_buf(),
                resource: format!("{} '{}'", kind, name),
                label: key.to_string(),
            });
        }
        plan.push(PlannedResource {
            kind,
            name: name.to_string(),
            module: module.map(str::to_string),
            labels: LabelSet::from(actual),
        });
        Ok(())
    };

    for (name, service) in &compose.services {
        check(ResourceKind::Container, name, &service.labels)?;
        if let Some(build) = &service.build {
            check(ResourceKind::Image, name, &build.labels())?;
        }
    }
    for (name, labels) in compose.named_volumes() {
        check(ResourceKind::Volume, name, &labels)?;
    }
    for (name, labels) in compose.owned_networks() {
        check(ResourceKind::Network, name, &labels)?;
    }
    Ok(())
}
