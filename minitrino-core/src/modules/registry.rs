//! Module Registry.
//!
//! Walks `<lib>/modules/<type>/<name>/metadata.json`, validating every module
//! once at load time. The registry is read-only afterwards.

use super::metadata::{Module, ModuleType};
use crate::error::{MinitrinoError, Result};
use crate::paths;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

const METADATA_FILE: &str = "metadata.json";

/// All modules available in a library.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, Module>,
    lib_path: PathBuf,
}

impl ModuleRegistry {
    /// Load and validate every module under `lib`.
    #[instrument(skip(lib), fields(lib = %lib.display()))]
    pub fn load(lib: &Path) -> Result<Self> {
        let root = paths::modules_dir(lib);
        if !root.is_dir() {
            return Err(MinitrinoError::LibraryNotFound { path: root });
        }

        let mut registry = Self { modules: BTreeMap::new(), lib_path: lib.to_path_buf() };

        for module_type in ModuleType::ALL {
            let type_dir = root.join(module_type.as_str());
            if !type_dir.is_dir() {
                debug!(module_type = %module_type, "No modules of this type");
                continue;
            }

            for entry in read_dir_sorted(&type_dir)? {
                if !entry.is_dir() {
                    continue;
                }
                let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let metadata_path = entry.join(METADATA_FILE);
                let content = std::fs::read_to_string(&metadata_path).map_err(|e| {
                    MinitrinoError::FileReadError {
                        path: metadata_path.to_string_lossy().to_string(),
                        source: e,
                    }
                })?;
                let module = Module::parse(name, module_type, entry.clone(), &content)?;
                registry.insert(module)?;
            }
        }

        info!(count = registry.modules.len(), "Loaded module library");
        Ok(registry)
    }

    /// Build a registry from already-validated modules.
    pub fn from_modules(lib: &Path, modules: impl IntoIterator<Item = Module>) -> Result<Self> {
        let mut registry = Self { modules: BTreeMap::new(), lib_path: lib.to_path_buf() };
        for module in modules {
            registry.insert(module)?;
        }
        Ok(registry)
    }

    fn insert(&mut self, module: Module) -> Result<()> {
        if let Some(existing) = self.modules.get(&module.name) {
            return Err(MinitrinoError::InvalidMetadata {
                module: module.name.clone(),
                field: "name".to_string(),
                reason: format!(
                    "defined as both {} and {} module",
                    existing.module_type, module.module_type
                ),
            });
        }
        self.modules.insert(module.name.clone(), module);
        Ok(())
    }

    /// Look up a module by name.
    pub fn get(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    /// Look up a module, failing with an operator error when it is unknown.
    pub fn require(&self, name: &str) -> Result<&Module> {
        self.get(name).ok_or_else(|| MinitrinoError::UnknownModule { module: name.to_string() })
    }

    /// Modules sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    /// Modules of one type, sorted by name.
    pub fn of_type(&self, module_type: ModuleType) -> impl Iterator<Item = &Module> {
        self.modules.values().filter(move |m| m.module_type == module_type)
    }

    /// Find the module owning a label key.
    pub fn by_label_key(&self, key: &str) -> Option<&Module> {
        self.modules.values().find(|m| m.label_key() == key)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Library this registry was loaded from.
    pub fn lib_path(&self) -> &Path {
        &self.lib_path
    }
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| MinitrinoError::IoError { path: dir.to_path_buf(), source: e })?;
    let mut paths = entries
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| MinitrinoError::IoError { path: dir.to_path_buf(), source: e })?;
    paths.sort();
    Ok(paths)
}
