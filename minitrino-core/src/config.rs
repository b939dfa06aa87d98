//! Configuration management.
//!
//! Settings come from four layers, highest precedence first:
//!
//! 1. Explicit per-invocation overrides (`--env KEY=VALUE`, dedicated flags)
//! 2. Process environment
//! 3. Persisted user config (`~/.minitrino/config.json`)
//! 4. Module-library defaults (`<lib>/minitrino.env`)
//!
//! The layers are flattened into one key/value environment, which is both
//! parsed into [`Settings`] and handed to the container runtime for compose
//! interpolation.

use crate::error::{MinitrinoError, Result};
use crate::modules::version::{Distribution, EngineVersion};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const KEY_LIB_PATH: &str = "LIB_PATH";
pub const KEY_CLUSTER_NAME: &str = "CLUSTER_NAME";
pub const KEY_CLUSTER_DIST: &str = "CLUSTER_DIST";
pub const KEY_CLUSTER_VER: &str = "CLUSTER_VER";
pub const KEY_WORKERS: &str = "WORKERS";
pub const KEY_LIC_PATH: &str = "LIC_PATH";
pub const KEY_RUNTIME: &str = "MINITRINO_RUNTIME";
pub const KEY_HEALTH_RETRIES: &str = "HEALTH_RETRIES";
pub const KEY_HEALTH_INTERVAL: &str = "HEALTH_INTERVAL_SECS";
pub const KEY_MAX_CONCURRENCY: &str = "MAX_CONCURRENCY";

/// Keys picked up from the process environment even when no lower layer sets them.
const KNOWN_KEYS: &[&str] = &[
    KEY_LIB_PATH,
    KEY_CLUSTER_NAME,
    KEY_CLUSTER_DIST,
    KEY_CLUSTER_VER,
    KEY_WORKERS,
    KEY_LIC_PATH,
    KEY_RUNTIME,
    KEY_HEALTH_RETRIES,
    KEY_HEALTH_INTERVAL,
    KEY_MAX_CONCURRENCY,
];

pub const DEFAULT_CLUSTER_NAME: &str = "default";
pub const DEFAULT_CLUSTER_VER: &str = "476";
pub const DEFAULT_RUNTIME: &str = "docker";
pub const DEFAULT_HEALTH_RETRIES: u32 = 60;
pub const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 2;
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Persistent user configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    /// Environment defaults applied to every invocation.
    pub env: BTreeMap<String, String>,
    /// Default log filter for the CLI.
    pub log_level: Option<String>,
}

impl UserConfig {
    /// Load configuration from disk, or defaults if the file is absent.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| MinitrinoError::FileReadError {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| MinitrinoError::InvalidInput {
            reason: format!("failed to parse {}: {}", path.display(), e),
        })
    }

    /// Load from the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::user_config_path())
    }

    /// Save configuration to disk.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MinitrinoError::IoError { path: parent.to_path_buf(), source: e })?;
        }
        let content = serde_json::to_string_pretty(self).map_err(MinitrinoError::internal)?;
        std::fs::write(path, content)
            .map_err(|e| MinitrinoError::IoError { path: path.to_path_buf(), source: e })
    }
}

/// Read `KEY=VALUE` defaults shipped with the module library.
pub fn load_library_env(lib: &Path) -> Result<BTreeMap<String, String>> {
    let path = paths::library_env(lib);
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let iter = dotenvy::from_path_iter(&path).map_err(|e| MinitrinoError::InvalidInput {
        reason: format!("failed to read {}: {}", path.display(), e),
    })?;
    iter.map(|item| {
        item.map_err(|e| MinitrinoError::InvalidInput {
            reason: format!("invalid entry in {}: {}", path.display(), e),
        })
    })
    .collect()
}

/// The four configuration layers, before flattening.
#[derive(Debug, Clone, Default)]
pub struct ConfigLayers {
    pub overrides: BTreeMap<String, String>,
    pub process: BTreeMap<String, String>,
    pub user: BTreeMap<String, String>,
    pub library: BTreeMap<String, String>,
}

impl ConfigLayers {
    /// Gather layers from the real process environment and user config.
    ///
    /// The library layer is read from `lib` once the library location is known.
    pub fn gather(overrides: BTreeMap<String, String>, lib: &Path) -> Result<Self> {
        Ok(Self {
            overrides,
            process: std::env::vars().collect(),
            user: UserConfig::load()?.env,
            library: load_library_env(lib)?,
        })
    }

    /// Flatten into a single environment.
    ///
    /// Process variables only participate for keys some other layer mentions
    /// or that are part of the known key set.
    pub fn flatten(&self) -> BTreeMap<String, String> {
        let mut env = self.library.clone();
        env.extend(self.user.clone());

        let mut keys: Vec<String> = env.keys().cloned().collect();
        keys.extend(self.overrides.keys().cloned());
        keys.extend(KNOWN_KEYS.iter().map(|k| k.to_string()));
        for key in keys {
            if let Some(value) = self.process.get(&key) {
                env.insert(key, value.clone());
            }
        }

        env.extend(self.overrides.clone());
        env
    }
}

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub lib_path: PathBuf,
    pub cluster_name: String,
    pub distribution: Distribution,
    pub version: EngineVersion,
    pub workers: u32,
    pub license_path: Option<PathBuf>,
    pub runtime_bin: String,
    pub health_retries: u32,
    pub health_interval: Duration,
    pub max_concurrency: usize,
    pub rollback: bool,
    /// Final environment passed to the container runtime.
    pub env: BTreeMap<String, String>,
}

impl Settings {
    /// Build settings from a flattened environment.
    pub fn from_env(mut env: BTreeMap<String, String>, lib_path: PathBuf) -> Result<Self> {
        let get = |key: &str| env.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let cluster_name = get(KEY_CLUSTER_NAME).unwrap_or(DEFAULT_CLUSTER_NAME).to_string();
        validate_cluster_name(&cluster_name)?;

        let distribution: Distribution =
            get(KEY_CLUSTER_DIST).map(str::parse::<Distribution>).transpose()?.unwrap_or_default();
        let version =
            EngineVersion::parse(get(KEY_CLUSTER_VER).unwrap_or(DEFAULT_CLUSTER_VER), distribution)?;

        let workers = parse_number(get(KEY_WORKERS), KEY_WORKERS, 0)?;
        let health_retries =
            parse_number(get(KEY_HEALTH_RETRIES), KEY_HEALTH_RETRIES, DEFAULT_HEALTH_RETRIES)?;
        let interval_secs = parse_number(
            get(KEY_HEALTH_INTERVAL),
            KEY_HEALTH_INTERVAL,
            DEFAULT_HEALTH_INTERVAL_SECS,
        )?;
        let max_concurrency =
            parse_number(get(KEY_MAX_CONCURRENCY), KEY_MAX_CONCURRENCY, DEFAULT_MAX_CONCURRENCY)?
                .max(1);

        let license_path = get(KEY_LIC_PATH).map(PathBuf::from);
        let runtime_bin = get(KEY_RUNTIME).unwrap_or(DEFAULT_RUNTIME).to_string();

        // Normalise the values compose interpolates.
        env.insert(KEY_CLUSTER_NAME.to_string(), cluster_name.clone());
        env.insert(KEY_CLUSTER_DIST.to_string(), distribution.to_string());
        env.insert(KEY_CLUSTER_VER.to_string(), version.to_string());
        env.insert(KEY_LIB_PATH.to_string(), lib_path.to_string_lossy().to_string());

        debug!(cluster = %cluster_name, dist = %distribution, version = %version, "Resolved settings");

        Ok(Self {
            lib_path,
            cluster_name,
            distribution,
            version,
            workers,
            license_path,
            runtime_bin,
            health_retries,
            health_interval: Duration::from_secs(interval_secs),
            max_concurrency,
            rollback: true,
            env,
        })
    }

    /// Resolve settings from all layers.
    pub fn resolve(layers: &ConfigLayers, lib_path: PathBuf) -> Result<Self> {
        Self::from_env(layers.flatten(), lib_path)
    }

    /// Derive settings for a dependent cluster.
    pub fn for_dependent(
        &self,
        name: &str,
        workers: u32,
        overrides: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let mut env = self.env.clone();
        env.extend(overrides.clone());
        env.insert(KEY_CLUSTER_NAME.to_string(), name.to_string());
        env.insert(KEY_WORKERS.to_string(), workers.to_string());

        let mut settings = Self::from_env(env, self.lib_path.clone())?;
        settings.rollback = self.rollback;
        settings.health_interval = self.health_interval;
        Ok(settings)
    }
}

fn parse_number<T: std::str::FromStr>(value: Option<&str>, key: &str, default: T) -> Result<T> {
    match value {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| MinitrinoError::InvalidInput {
            reason: format!("{} must be a non-negative integer, got '{}'", key, raw),
        }),
    }
}

/// Cluster names become part of container and network names.
pub fn validate_cluster_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        && name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
    if valid || name == "*" {
        Ok(())
    } else {
        Err(MinitrinoError::InvalidInput {
            reason: format!(
                "invalid cluster name '{}': use lowercase letters, digits, '-' or '_'",
                name
            ),
        })
    }
}

/// Parse `KEY=VALUE` pairs from the command line.
pub fn parse_env_pairs(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => Err(MinitrinoError::InvalidInput {
                reason: format!("invalid env format '{}', expected KEY=VALUE", pair),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_layer_precedence() {
        let layers = ConfigLayers {
            overrides: map(&[("CLUSTER_VER", "470")]),
            process: map(&[("CLUSTER_VER", "460"), ("WORKERS", "3"), ("UNRELATED", "x")]),
            user: map(&[("CLUSTER_VER", "450"), ("WORKERS", "1"), ("LIC_PATH", "/lic")]),
            library: map(&[("CLUSTER_VER", "440"), ("PORT", "8080")]),
        };
        let env = layers.flatten();
        assert_eq!(env["CLUSTER_VER"], "470");
        assert_eq!(env["WORKERS"], "3");
        assert_eq!(env["LIC_PATH"], "/lic");
        assert_eq!(env["PORT"], "8080");
        assert!(!env.contains_key("UNRELATED"));
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::from_env(BTreeMap::new(), PathBuf::from("/lib")).unwrap();
        assert_eq!(settings.cluster_name, DEFAULT_CLUSTER_NAME);
        assert_eq!(settings.distribution, Distribution::Trino);
        assert_eq!(settings.version.as_str(), DEFAULT_CLUSTER_VER);
        assert_eq!(settings.workers, 0);
        assert!(settings.rollback);
        assert_eq!(settings.env["CLUSTER_NAME"], "default");
    }

    #[test]
    fn test_settings_rejects_bad_values() {
        let bad_workers = map(&[("WORKERS", "two")]);
        assert!(Settings::from_env(bad_workers, PathBuf::from("/lib")).is_err());

        let bad_name = map(&[("CLUSTER_NAME", "My Cluster")]);
        assert!(Settings::from_env(bad_name, PathBuf::from("/lib")).is_err());

        let bad_version = map(&[("CLUSTER_DIST", "starburst"), ("CLUSTER_VER", "443")]);
        assert!(Settings::from_env(bad_version, PathBuf::from("/lib")).is_err());
    }

    #[test]
    fn test_dependent_settings_override_env() {
        let base = Settings::from_env(map(&[("CLUSTER_NAME", "main")]), PathBuf::from("/lib"))
            .unwrap();
        let dep = base.for_dependent("remote", 1, &map(&[("CLUSTER_VER", "470")])).unwrap();
        assert_eq!(dep.cluster_name, "remote");
        assert_eq!(dep.workers, 1);
        assert_eq!(dep.version.as_str(), "470");
        assert_eq!(base.cluster_name, "main");
    }

    #[test]
    fn test_library_env_and_user_config_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("minitrino.env"), "CLUSTER_VER=450\nWORKERS=2\n").unwrap();
        let env = load_library_env(dir.path()).unwrap();
        assert_eq!(env["CLUSTER_VER"], "450");

        let cfg_path = dir.path().join("user").join("config.json");
        let cfg = UserConfig { env: map(&[("LIC_PATH", "/tmp/lic")]), log_level: None };
        cfg.save_to(&cfg_path).unwrap();
        let loaded = UserConfig::load_from(&cfg_path).unwrap();
        assert_eq!(loaded.env["LIC_PATH"], "/tmp/lic");
    }

    #[test]
    fn test_parse_env_pairs() {
        let parsed = parse_env_pairs(&["A=1".to_string(), "B=x=y".to_string()]).unwrap();
        assert_eq!(parsed["A"], "1");
        assert_eq!(parsed["B"], "x=y");
        assert!(parse_env_pairs(&["nope".to_string()]).is_err());
    }
}
