//! Module metadata schema.
//!
//! Each module directory carries a `metadata.json`. The raw file is decoded
//! into [`RawMetadata`] (unknown fields rejected), then validated field by
//! field into an immutable [`Module`].

use super::version::VersionRange;
use crate::error::{MinitrinoError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Wildcard entry in `incompatibleModules`.
pub const WILDCARD: &str = "*";

/// Module category, taken from the parent directory name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    Admin,
    Catalog,
    Security,
}

impl ModuleType {
    pub const ALL: [ModuleType; 3] = [Self::Admin, Self::Catalog, Self::Security];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Catalog => "catalog",
            Self::Security => "security",
        }
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleType {
    type Err = MinitrinoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "admin" => Ok(Self::Admin),
            "catalog" => Ok(Self::Catalog),
            "security" => Ok(Self::Security),
            other => Err(MinitrinoError::InvalidInput {
                reason: format!("unknown module type '{}', expected admin, catalog or security", other),
            }),
        }
    }
}

/// `metadata.json` exactly as written on disk.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawMetadata {
    pub description: String,
    #[serde(default)]
    pub enterprise: bool,
    #[serde(default)]
    pub incompatible_modules: Vec<String>,
    #[serde(default)]
    pub dependent_modules: Vec<String>,
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default)]
    pub dependent_clusters: Vec<DependentClusterSpec>,
}

/// A secondary cluster provisioned alongside the primary one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependentClusterSpec {
    pub name: String,
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default)]
    pub workers: u32,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Who a module refuses to co-deploy with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incompatibility {
    None,
    All,
    Modules(Vec<String>),
}

/// A validated module.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub module_type: ModuleType,
    pub description: String,
    pub enterprise: bool,
    pub incompatible: Incompatibility,
    pub dependent_modules: Vec<String>,
    pub versions: Option<VersionRange>,
    pub dependent_clusters: Vec<DependentClusterSpec>,
    /// Module directory inside the library.
    pub dir: PathBuf,
}

impl Module {
    /// Validate raw metadata into a module.
    pub fn from_raw(
        name: &str,
        module_type: ModuleType,
        dir: PathBuf,
        raw: RawMetadata,
    ) -> Result<Self> {
        let invalid = |field: &str, reason: String| MinitrinoError::InvalidMetadata {
            module: name.to_string(),
            field: field.to_string(),
            reason,
        };

        validate_module_name(name).map_err(|reason| invalid("name", reason))?;

        if raw.description.trim().is_empty() {
            return Err(invalid("description", "must not be empty".into()));
        }

        let incompatible = if raw.incompatible_modules.iter().any(|m| m == WILDCARD) {
            if raw.incompatible_modules.len() > 1 {
                return Err(invalid(
                    "incompatibleModules",
                    "the wildcard cannot be combined with module names".into(),
                ));
            }
            Incompatibility::All
        } else if raw.incompatible_modules.is_empty() {
            Incompatibility::None
        } else {
            for other in &raw.incompatible_modules {
                validate_module_name(other)
                    .map_err(|reason| invalid("incompatibleModules", reason))?;
                if other == name {
                    return Err(invalid(
                        "incompatibleModules",
                        "a module cannot be incompatible with itself".into(),
                    ));
                }
            }
            Incompatibility::Modules(raw.incompatible_modules)
        };

        for dep in &raw.dependent_modules {
            validate_module_name(dep).map_err(|reason| invalid("dependentModules", reason))?;
        }

        let versions =
            VersionRange::from_bounds(&raw.versions).map_err(|reason| invalid("versions", reason))?;

        for cluster in &raw.dependent_clusters {
            crate::config::validate_cluster_name(&cluster.name)
                .map_err(|e| invalid("dependentClusters", e.to_string()))?;
            if cluster.name == "*" {
                return Err(invalid("dependentClusters", "name cannot be a wildcard".into()));
            }
            for module in &cluster.modules {
                validate_module_name(module)
                    .map_err(|reason| invalid("dependentClusters", reason))?;
            }
        }

        Ok(Self {
            name: name.to_string(),
            module_type,
            description: raw.description,
            enterprise: raw.enterprise,
            incompatible,
            dependent_modules: dedup(raw.dependent_modules),
            versions,
            dependent_clusters: raw.dependent_clusters,
            dir,
        })
    }

    /// Parse and validate a `metadata.json` document.
    pub fn parse(name: &str, module_type: ModuleType, dir: PathBuf, content: &str) -> Result<Self> {
        let raw: RawMetadata =
            serde_json::from_str(content).map_err(|e| MinitrinoError::InvalidMetadata {
                module: name.to_string(),
                field: json_error_field(&e),
                reason: e.to_string(),
            })?;
        Self::from_raw(name, module_type, dir, raw)
    }

    /// Whether this module refuses to run next to `other`.
    pub fn is_incompatible_with(&self, other: &str) -> bool {
        if other == self.name {
            return false;
        }
        match &self.incompatible {
            Incompatibility::None => false,
            Incompatibility::All => true,
            Incompatibility::Modules(names) => names.iter().any(|n| n == other),
        }
    }

    /// Label key identifying resources contributed by this module.
    pub fn label_key(&self) -> String {
        crate::labels::module_label_key(self.module_type, &self.name)
    }

    /// Composition fragment path (`<dir>/<name>.yaml`).
    pub fn fragment_path(&self) -> PathBuf {
        self.dir.join(format!("{}.yaml", self.name))
    }
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items.into_iter().filter(|item| seen.insert(item.clone())).collect()
}

/// Module names are directory names and label suffixes.
pub fn validate_module_name(name: &str) -> std::result::Result<(), String> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-');
    if valid {
        Ok(())
    } else {
        Err(format!("'{}' is not a valid module name", name))
    }
}

/// Best-effort extraction of the offending field from a serde_json error.
fn json_error_field(err: &serde_json::Error) -> String {
    let msg = err.to_string();
    for marker in ["unknown field `", "missing field `", "field `"] {
        if let Some(start) = msg.find(marker) {
            let rest = &msg[start + marker.len()..];
            if let Some(end) = rest.find('`') {
                return rest[..end].to_string();
            }
        }
    }
    "metadata.json".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<Module> {
        Module::parse("iceberg", ModuleType::Catalog, PathBuf::from("/lib/modules/catalog/iceberg"), content)
    }

    #[test]
    fn test_parse_full_metadata() {
        let module = parse(
            r#"{
                "description": "Iceberg catalog backed by MinIO",
                "enterprise": false,
                "incompatibleModules": ["hive"],
                "dependentModules": ["minio", "minio"],
                "versions": ["413", "9999"],
                "dependentClusters": [
                    {"name": "remote", "modules": ["tpch"], "workers": 1, "env": {"CLUSTER_VER": "470"}}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(module.dependent_modules, vec!["minio"]);
        assert_eq!(module.incompatible, Incompatibility::Modules(vec!["hive".into()]));
        assert_eq!(module.versions, Some(VersionRange { min: 413, max: None }));
        assert_eq!(module.dependent_clusters[0].workers, 1);
        assert_eq!(module.label_key(), "org.minitrino.module.catalog.iceberg");
        assert_eq!(
            module.fragment_path(),
            PathBuf::from("/lib/modules/catalog/iceberg/iceberg.yaml")
        );
    }

    #[test]
    fn test_defaults_are_unconstrained() {
        let module = parse(r#"{"description": "minimal"}"#).unwrap();
        assert!(!module.enterprise);
        assert_eq!(module.incompatible, Incompatibility::None);
        assert!(module.versions.is_none());
        assert!(module.dependent_clusters.is_empty());
    }

    #[test]
    fn test_unknown_field_names_field() {
        let err = parse(r#"{"description": "x", "dependsOn": []}"#).unwrap_err();
        match err {
            MinitrinoError::InvalidMetadata { module, field, .. } => {
                assert_eq!(module, "iceberg");
                assert_eq!(field, "dependsOn");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_description() {
        let err = parse(r#"{"enterprise": true}"#).unwrap_err();
        assert!(matches!(err, MinitrinoError::InvalidMetadata { ref field, .. } if field == "description"));
    }

    #[test]
    fn test_invalid_versions_field() {
        let err = parse(r#"{"description": "x", "versions": ["1", "2", "3"]}"#).unwrap_err();
        assert!(matches!(err, MinitrinoError::InvalidMetadata { ref field, .. } if field == "versions"));
    }

    #[test]
    fn test_wildcard_incompatibility() {
        let module = parse(r#"{"description": "x", "incompatibleModules": ["*"]}"#).unwrap();
        assert_eq!(module.incompatible, Incompatibility::All);
        assert!(module.is_incompatible_with("anything"));
        assert!(!module.is_incompatible_with("iceberg"));

        assert!(parse(r#"{"description": "x", "incompatibleModules": ["*", "hive"]}"#).is_err());
    }

    #[test]
    fn test_module_name_rules() {
        assert!(validate_module_name("password-file").is_ok());
        assert!(validate_module_name("Hive").is_err());
        assert!(validate_module_name("-x").is_err());
        assert!(validate_module_name("").is_err());
    }
}
