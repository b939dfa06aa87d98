//! Module Resolver.
//!
//! Turns a requested module list into the closed, conflict-free,
//! version-compatible set that will be deployed together.

use super::metadata::{DependentClusterSpec, Module};
use super::registry::ModuleRegistry;
use super::version::EngineVersion;
use crate::error::{MinitrinoError, Result};
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use tracing::{debug, info, instrument};

/// What the resolver needs to know about the target cluster.
#[derive(Debug, Clone)]
pub struct ResolveTarget<'a> {
    pub version: &'a EngineVersion,
    pub license_path: Option<&'a PathBuf>,
}

/// A dependency-closed, conflict-free module set in deterministic order.
#[derive(Debug, Clone, Default)]
pub struct ResolvedModules {
    modules: Vec<Module>,
}

impl ResolvedModules {
    pub fn iter(&self) -> impl Iterator<Item = &Module> {
        self.modules.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.iter().any(|m| m.name == name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Dependent cluster specs declared by any resolved module, in module order.
    pub fn dependent_clusters(&self) -> impl Iterator<Item = (&Module, &DependentClusterSpec)> {
        self.modules.iter().flat_map(|m| m.dependent_clusters.iter().map(move |c| (m, c)))
    }
}

/// Resolve `requested` against the registry.
///
/// Dependencies are expanded breadth-first until fixpoint; cycles converge
/// because the working set is deduplicated. The result lists every module
/// after the modules it depends on, ties broken by discovery order.
#[instrument(skip(registry, target), fields(version = %target.version))]
pub fn resolve(
    requested: &[String],
    registry: &ModuleRegistry,
    target: &ResolveTarget<'_>,
) -> Result<ResolvedModules> {
    let discovered = expand(requested, registry)?;
    let ordered = dependency_order(&discovered, registry)?;

    check_incompatibilities(&ordered)?;
    check_versions(&ordered, target.version)?;
    check_licenses(&ordered, target.license_path)?;

    info!(modules = ?ordered.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(), "Resolved modules");
    Ok(ResolvedModules { modules: ordered })
}

/// Breadth-first fixpoint expansion over `dependentModules`.
fn expand<'r>(requested: &[String], registry: &'r ModuleRegistry) -> Result<Vec<&'r Module>> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut order = Vec::new();
    let mut queue: VecDeque<&'r Module> = VecDeque::new();

    for name in requested {
        let module = registry.require(name)?;
        if seen.insert(module.name.as_str()) {
            queue.push_back(module);
        }
    }

    while let Some(module) = queue.pop_front() {
        order.push(module);
        for dep in &module.dependent_modules {
            let dep_module = registry.get(dep).ok_or_else(|| MinitrinoError::InvalidMetadata {
                module: module.name.clone(),
                field: "dependentModules".to_string(),
                reason: format!("depends on unknown module '{}'", dep),
            })?;
            if seen.insert(dep_module.name.as_str()) {
                debug!(module = %module.name, dependency = %dep, "Adding dependent module");
                queue.push_back(dep_module);
            }
        }
    }

    Ok(order)
}

/// Order modules so dependencies precede dependents.
///
/// Iterative post-order walk seeded in discovery order. A module already on
/// the walk is not revisited, so cyclic dependencies keep discovery order.
fn dependency_order(discovered: &[&Module], registry: &ModuleRegistry) -> Result<Vec<Module>> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut ordered: Vec<Module> = Vec::with_capacity(discovered.len());

    for &root in discovered {
        if !visited.insert(root.name.as_str()) {
            continue;
        }
        // (module, index of the next dependency to visit)
        let mut stack: Vec<(&Module, usize)> = vec![(root, 0)];
        while let Some((module, next)) = stack.pop() {
            if let Some(dep) = module.dependent_modules.get(next) {
                stack.push((module, next + 1));
                let dep_module = registry.require(dep)?;
                if visited.insert(dep_module.name.as_str()) {
                    stack.push((dep_module, 0));
                }
            } else {
                ordered.push(module.clone());
            }
        }
    }

    Ok(ordered)
}

fn check_incompatibilities(modules: &[Module]) -> Result<()> {
    for (i, a) in modules.iter().enumerate() {
        for b in &modules[i + 1..] {
            if a.is_incompatible_with(&b.name) {
                return Err(MinitrinoError::IncompatibleModules {
                    module: a.name.clone(),
                    other: b.name.clone(),
                });
            }
            if b.is_incompatible_with(&a.name) {
                return Err(MinitrinoError::IncompatibleModules {
                    module: b.name.clone(),
                    other: a.name.clone(),
                });
            }
        }
    }
    Ok(())
}

fn check_versions(modules: &[Module], version: &EngineVersion) -> Result<()> {
    for module in modules {
        if let Some(range) = module.versions {
            if !range.contains(version) {
                return Err(MinitrinoError::VersionConflict {
                    module: module.name.clone(),
                    version: version.to_string(),
                    min: range.min.to_string(),
                    max: range.max.map(|m| m.to_string()),
                });
            }
        }
    }
    Ok(())
}

fn check_licenses(modules: &[Module], license_path: Option<&PathBuf>) -> Result<()> {
    let has_license = license_path.is_some_and(|p| !p.as_os_str().is_empty());
    match modules.iter().find(|m| m.enterprise) {
        Some(module) if !has_license => {
            Err(MinitrinoError::LicenseRequired { module: module.name.clone() })
        }
        _ => Ok(()),
    }
}
