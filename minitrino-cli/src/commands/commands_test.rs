//! Tests for CLI command helpers.

#[cfg(test)]
mod tests {
    use super::super::cluster::RemoveArgs;
    use super::super::modules::{select, ModuleInfo};
    use super::super::provision::ProvisionArgs;
    use super::super::snapshot::archive_path;
    use super::super::{exit_code, load_settings, GlobalArgs};
    use minitrino_core::modules::Module;
    use minitrino_core::{MinitrinoError, ModuleRegistry, ModuleType, ResourceKind};
    use std::collections::{BTreeMap, BTreeSet};
    use std::path::Path;
    use tempfile::TempDir;

    fn registry(lib: &Path) -> ModuleRegistry {
        let modules = [
            ("postgres", ModuleType::Catalog, r#"{"description": "PostgreSQL", "versions": ["400"]}"#),
            ("iceberg", ModuleType::Catalog, r#"{"description": "Iceberg", "dependentModules": ["minio"]}"#),
            ("minio", ModuleType::Admin, r#"{"description": "MinIO"}"#),
            ("ldap", ModuleType::Security, r#"{"description": "LDAP", "enterprise": true}"#),
        ]
        .into_iter()
        .map(|(name, kind, meta)| {
            Module::parse(name, kind, lib.join(kind.as_str()).join(name), meta).unwrap()
        })
        .collect::<Vec<_>>();
        ModuleRegistry::from_modules(lib, modules).unwrap()
    }

    #[test]
    fn test_provision_overrides() {
        let args = ProvisionArgs {
            image: Some("starburst".to_string()),
            version: Some("443-e.9".to_string()),
            workers: Some(2),
            cluster: Some("dev".to_string()),
            ..Default::default()
        };
        let flags = args.overrides();
        assert_eq!(flags["CLUSTER_DIST"], "starburst");
        assert_eq!(flags["CLUSTER_VER"], "443-e.9");
        assert_eq!(flags["WORKERS"], "2");
        assert_eq!(flags["CLUSTER_NAME"], "dev");

        assert!(ProvisionArgs::default().overrides().is_empty());
    }

    #[test]
    fn test_flags_win_over_env() {
        let lib = TempDir::new().unwrap();
        let global = GlobalArgs {
            lib: Some(lib.path().to_path_buf()),
            env: vec!["CLUSTER_NAME=from-env".to_string(), "WORKERS=1".to_string()],
            verbose: false,
        };
        let flags = BTreeMap::from([("CLUSTER_NAME".to_string(), "from-flag".to_string())]);

        let settings = load_settings(&global, flags).unwrap();
        assert_eq!(settings.cluster_name, "from-flag");
        assert_eq!(settings.workers, 1);
        assert_eq!(settings.lib_path, lib.path());
    }

    #[test]
    fn test_malformed_env_pair() {
        let global = GlobalArgs { env: vec!["NOEQUALS".to_string()], ..Default::default() };
        let err = load_settings(&global, BTreeMap::new()).unwrap_err();
        assert_eq!(exit_code(&err), 2);
    }

    #[test]
    fn test_remove_kinds() {
        assert_eq!(RemoveArgs::default().kinds(), ResourceKind::ALL.to_vec());

        let args = RemoveArgs { volumes: true, images: true, ..Default::default() };
        assert_eq!(args.kinds(), vec![ResourceKind::Volume, ResourceKind::Image]);
    }

    #[test]
    fn test_exit_codes() {
        let operator = anyhow::Error::from(MinitrinoError::UnknownModule { module: "x".into() });
        assert_eq!(exit_code(&operator), 2);

        let resolution = anyhow::Error::from(MinitrinoError::IncompatibleModules {
            module: "a".into(),
            other: "b".into(),
        });
        assert_eq!(exit_code(&resolution), 3);

        let wrapped = anyhow::Error::from(MinitrinoError::LicenseRequired { module: "ldap".into() })
            .context("provisioning failed");
        assert_eq!(exit_code(&wrapped), 3);

        assert_eq!(exit_code(&anyhow::anyhow!("plain failure")), 1);
    }

    #[test]
    fn test_select_modules() {
        let lib = TempDir::new().unwrap();
        let registry = registry(lib.path());

        let all: Vec<&str> = select(&registry, None, None).iter().map(|m| m.name.as_str()).collect();
        assert_eq!(all, vec!["iceberg", "ldap", "minio", "postgres"]);

        let catalogs = select(&registry, Some(ModuleType::Catalog), None);
        assert_eq!(catalogs.len(), 2);

        let running = BTreeSet::from(["minio".to_string(), "ldap".to_string()]);
        let admin = select(&registry, Some(ModuleType::Admin), Some(&running));
        assert_eq!(admin.len(), 1);
        assert_eq!(admin[0].name, "minio");
    }

    #[test]
    fn test_module_json() {
        let lib = TempDir::new().unwrap();
        let registry = registry(lib.path());

        let info = ModuleInfo::from(registry.require("iceberg").unwrap());
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["type"], "catalog");
        assert_eq!(json["dependent_modules"][0], "minio");
        assert!(json["versions"].is_null());

        let info = ModuleInfo::from(registry.require("postgres").unwrap());
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["versions"], "[400, latest]");
    }

    #[test]
    fn test_archive_path() {
        let dir = TempDir::new().unwrap();
        let path = archive_path(dir.path(), "nightly", false).unwrap();
        assert_eq!(path, dir.path().join("nightly.tar.gz"));

        std::fs::write(&path, b"old").unwrap();
        assert!(archive_path(dir.path(), "nightly", false).is_err());
        assert!(archive_path(dir.path(), "nightly", true).is_ok());

        let err = archive_path(dir.path(), "bad name", true).unwrap_err();
        assert_eq!(exit_code(&err), 2);
    }
}
