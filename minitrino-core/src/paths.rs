//! Centralized path configuration for Minitrino.
//!
//! All user and library paths should go through this module so the CLI and
//! the core agree on where things live.

use std::path::{Path, PathBuf};

/// Get the Minitrino user directory.
///
/// Resolution order:
/// 1. `MINITRINO_USER_DIR` environment variable
/// 2. `~/.minitrino`
pub fn user_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("MINITRINO_USER_DIR") {
        return PathBuf::from(dir);
    }

    dirs::home_dir().map(|h| h.join(".minitrino")).unwrap_or_else(|| PathBuf::from(".minitrino"))
}

/// Get the persisted user configuration file.
pub fn user_config_path() -> PathBuf {
    user_dir().join("config.json")
}

/// Locate the module library.
///
/// Resolution order:
/// 1. `MINITRINO_LIB` or `LIB_PATH` environment variable
/// 2. `~/.minitrino/lib` if it exists
/// 3. `./lib`
pub fn default_lib_dir() -> PathBuf {
    for var in ["MINITRINO_LIB", "LIB_PATH"] {
        if let Ok(dir) = std::env::var(var) {
            return PathBuf::from(dir);
        }
    }

    let user_lib = user_dir().join("lib");
    if user_lib.exists() {
        return user_lib;
    }

    PathBuf::from("lib")
}

/// Base composition fragment inside a library.
pub fn base_fragment(lib: &Path) -> PathBuf {
    lib.join("docker-compose.yaml")
}

/// Build context for the engine image.
pub fn image_context(lib: &Path) -> PathBuf {
    lib.join("image")
}

/// Library-level defaults file.
pub fn library_env(lib: &Path) -> PathBuf {
    lib.join("minitrino.env")
}

/// Root of the module tree.
pub fn modules_dir(lib: &Path) -> PathBuf {
    lib.join("modules")
}
