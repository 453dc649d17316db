// src/install.rs

//! Package installation
//!
//! The artifact is fully verified (header, length, payload hash) before the
//! filesystem is touched. The payload is then unpacked into
//! `<work_dir>/installed/<name>/`, its `include/` and `lib/` files are
//! deployed under the configured root, and the package is recorded in the
//! installed-state log.

use crate::builder::{INCLUDE_DIR, LIB_DIR};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::filesystem::{create_dir_all, remove_tree, safe_join};
use crate::packages::{self, Artifact};
use crate::state::{self, InstalledRecord, InstalledState, StateLock};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What an install wrote
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub name: String,
    pub version: String,
    /// Unpacked package tree
    pub install_path: PathBuf,
    /// Top-level entries extracted into the install directory
    pub top_level: Vec<String>,
    /// Files copied under the configured root
    pub deployed: Vec<PathBuf>,
}

/// Install the package file at `path`
///
/// Installing a name that is already installed fails with
/// `AlreadyInstalled`; remove it first.
pub fn install_package(config: &Config, path: &Path) -> Result<InstallReport> {
    let mut artifact = Artifact::open(path)?;
    let header = artifact.header.clone();
    header.validate()?;
    info!("Installing {} {} from {}", header.name, header.version, artifact.path.display());

    artifact.verify()?;
    debug!("Verified {}", artifact.path.display());

    let _lock = StateLock::acquire(config)?;
    let mut state = InstalledState::load(config)?;
    if state::resolve_installed(config, &state, &header.name).is_some() {
        return Err(Error::AlreadyInstalled(header.name));
    }

    let install_dir = config.install_dir();
    create_dir_all(&install_dir)?;
    let package_dir = config.package_dir(&header.name);

    let summary = match packages::unpack_into(artifact.payload()?, &install_dir, &header.name) {
        Ok(summary) => summary,
        Err(e) => {
            discard(&package_dir);
            return Err(e);
        }
    };

    let deployed = match deploy(config, &header, &package_dir) {
        Ok(deployed) => deployed,
        Err(e) => {
            discard(&package_dir);
            return Err(e);
        }
    };

    let record = InstalledRecord::new(&header.name, &package_dir, &header.version);
    if let Err(e) = record_install(config, &mut state, record, &deployed) {
        remove_files(&deployed);
        if let Err(err) = state::remove_file_list(config, &header.name) {
            warn!("{}", err);
        }
        discard(&package_dir);
        return Err(e);
    }

    info!(
        "Installed {} {} ({} files deployed)",
        header.name,
        header.version,
        deployed.len()
    );

    Ok(InstallReport {
        name: header.name,
        version: header.version,
        install_path: package_dir,
        top_level: summary.top_level,
        deployed,
    })
}

fn record_install(
    config: &Config,
    state: &mut InstalledState,
    record: InstalledRecord,
    deployed: &[PathBuf],
) -> Result<()> {
    state::write_file_list(config, &record.name, deployed)?;
    state.insert(record)?;
    state.save()
}

/// Copy the unpacked `include/` and `lib/` files to their install paths
///
/// Declared paths are joined under `config.root`, never used as-is. Every
/// target is checked before anything is copied: an existing file fails the
/// install with `FileConflict`. On failure every file copied so far is
/// removed again.
fn deploy(config: &Config, header: &packages::PackageHeader, package_dir: &Path) -> Result<Vec<PathBuf>> {
    let targets = [
        (INCLUDE_DIR, header.include_dir()),
        (LIB_DIR, header.lib_dir()),
    ];

    let mut plan = Vec::new();
    for (subdir, declared) in targets {
        let src = package_dir.join(subdir);
        if !src.is_dir() {
            continue;
        }
        let dest = safe_join(config.root(), declared)?;
        plan_dir(&src, &dest, &mut plan)?;
    }

    if let Some((_, to)) = plan.iter().find(|(_, to)| fs::symlink_metadata(to).is_ok()) {
        return Err(Error::FileConflict(to.clone()));
    }

    let mut deployed = Vec::new();
    for (from, to) in &plan {
        if let Err(e) = deploy_file(from, to) {
            remove_files(&deployed);
            return Err(e);
        }
        deployed.push(to.clone());
    }

    Ok(deployed)
}

/// Collect `(source, target)` pairs for the regular files in `src`
fn plan_dir(src: &Path, dest: &Path, plan: &mut Vec<(PathBuf, PathBuf)>) -> Result<()> {
    let mut entries = fs::read_dir(src)
        .map_err(|e| Error::IoError(format!("Failed to read {}: {}", src.display(), e)))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| Error::IoError(format!("Failed to read {}: {}", src.display(), e)))?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let from = entry.path();
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            warn!("Not deploying {}: not a regular file", from.display());
            continue;
        }
        plan.push((from, dest.join(entry.file_name())));
    }

    Ok(())
}

fn deploy_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        create_dir_all(parent)?;
    }
    fs::copy(from, to).map_err(|e| {
        Error::IoError(format!("Failed to install {} to {}: {}", from.display(), to.display(), e))
    })?;
    debug!("Deployed {}", to.display());
    Ok(())
}

fn remove_files(files: &[PathBuf]) {
    for file in files {
        if let Err(e) = fs::remove_file(file) {
            warn!("Failed to roll back {}: {}", file.display(), e);
        }
    }
}

fn discard(package_dir: &Path) {
    if let Err(e) = remove_tree(package_dir) {
        warn!("Failed to clean up {}: {}", package_dir.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::Manifest;
    use crate::packages::{PackageHeader, HEADER_SIZE};

    fn test_config(root: &Path) -> Config {
        let mut config = Config::new(root);
        config.require_root = false;
        config
    }

    fn write_package(dir: &Path, name: &str, payload: &[u8]) -> PathBuf {
        let manifest = Manifest {
            name: name.to_string(),
            version: "1.0".to_string(),
            ..Default::default()
        };
        let header = PackageHeader::from_manifest(&manifest)
            .unwrap()
            .finalize(payload)
            .unwrap();
        let path = dir.join(format!("{}-1.0.cpk", name));
        packages::write_artifact(&header, payload, &path).unwrap();
        path
    }

    fn tree_payload(name: &str) -> Vec<u8> {
        let src = tempfile::tempdir().unwrap();
        let pkg = src.path().join(name);
        fs::create_dir_all(pkg.join("include")).unwrap();
        fs::create_dir_all(pkg.join("lib")).unwrap();
        fs::write(pkg.join("include/demo.h"), b"int demo(void);\n").unwrap();
        fs::write(pkg.join("lib/libdemo.a"), b"!<arch>\n").unwrap();
        packages::pack_dir(&pkg).unwrap()
    }

    #[test]
    fn test_install_unpacks_deploys_and_records() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = test_config(&temp_dir.path().join("root"));
        let artifact = write_package(temp_dir.path(), "demo", &tree_payload("demo"));

        let report = install_package(&config, &artifact).unwrap();
        assert_eq!(report.name, "demo");
        assert_eq!(report.top_level, vec!["demo".to_string()]);
        assert_eq!(report.install_path, config.package_dir("demo"));
        assert!(config.package_dir("demo").join("include/demo.h").is_file());

        let header = config.root.join("usr/include/demo.h");
        let lib = config.root.join("usr/lib/libdemo.a");
        assert_eq!(report.deployed, vec![header.clone(), lib.clone()]);
        assert!(header.is_file());
        assert!(lib.is_file());

        let state = InstalledState::load(&config).unwrap();
        assert_eq!(state.find("demo").unwrap().version, "1.0");
        assert_eq!(state::read_file_list(&config, "demo").unwrap(), report.deployed);
    }

    #[test]
    fn test_reinstall_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = test_config(temp_dir.path());
        let artifact = write_package(temp_dir.path(), "demo", &tree_payload("demo"));

        install_package(&config, &artifact).unwrap();
        let again = install_package(&config, &artifact);
        assert!(matches!(again, Err(Error::AlreadyInstalled(name)) if name == "demo"));
    }

    #[test]
    fn test_hash_mismatch_extracts_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = test_config(&temp_dir.path().join("root"));
        let artifact = write_package(temp_dir.path(), "demo", &tree_payload("demo"));

        let mut bytes = fs::read(&artifact).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&artifact, &bytes).unwrap();

        let result = install_package(&config, &artifact);
        assert!(matches!(result, Err(Error::HashMismatch { .. })));
        assert!(!config.work_dir.exists());
        assert!(!config.root.join("usr").exists());
    }

    #[test]
    fn test_truncated_artifact_extracts_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = test_config(&temp_dir.path().join("root"));
        let artifact = write_package(temp_dir.path(), "demo", &tree_payload("demo"));

        let bytes = fs::read(&artifact).unwrap();
        fs::write(&artifact, &bytes[..HEADER_SIZE + 3]).unwrap();

        let result = install_package(&config, &artifact);
        assert!(matches!(result, Err(Error::Truncated { .. })));
        assert!(!config.work_dir.exists());
    }

    #[test]
    fn test_foreign_top_level_is_rejected_and_cleaned() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = test_config(temp_dir.path());
        // Payload built for "other" but labelled "demo"
        let artifact = write_package(temp_dir.path(), "demo", &tree_payload("other"));

        let result = install_package(&config, &artifact);
        assert!(matches!(result, Err(Error::PathTraversal(_))));
        assert!(!config.install_dir().join("other").exists());
        assert!(!config.package_dir("demo").exists());
        assert!(InstalledState::load(&config).unwrap().find("demo").is_none());
    }

    #[test]
    fn test_existing_target_file_is_a_conflict() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = test_config(&temp_dir.path().join("root"));
        let artifact = write_package(temp_dir.path(), "demo", &tree_payload("demo"));

        let existing = config.root.join("usr/include/demo.h");
        fs::create_dir_all(existing.parent().unwrap()).unwrap();
        fs::write(&existing, b"SYSTEM").unwrap();

        let result = install_package(&config, &artifact);
        assert!(matches!(result, Err(Error::FileConflict(path)) if path == existing));
        assert_eq!(fs::read(&existing).unwrap(), b"SYSTEM");
        assert!(!config.root.join("usr/lib/libdemo.a").exists());
        assert!(!config.package_dir("demo").exists());
        assert!(InstalledState::load(&config).unwrap().find("demo").is_none());
    }

    #[test]
    fn test_failed_record_rolls_back_install() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = test_config(&temp_dir.path().join("root"));
        let artifact = write_package(temp_dir.path(), "demo", &tree_payload("demo"));

        // A regular file where the info directory should be
        fs::create_dir_all(&config.work_dir).unwrap();
        fs::write(config.info_dir(), b"").unwrap();

        let result = install_package(&config, &artifact);
        assert!(matches!(result, Err(Error::NotADirectory(_))));
        assert!(!config.package_dir("demo").exists());
        assert!(!config.root.join("usr/include/demo.h").exists());
        assert!(!config.root.join("usr/lib/libdemo.a").exists());
        assert!(InstalledState::load(&config).unwrap().find("demo").is_none());

        // Nothing is left to block a clean install once the state is fixed
        fs::remove_file(config.info_dir()).unwrap();
        install_package(&config, &artifact).unwrap();
    }

    #[test]
    fn test_missing_artifact() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = test_config(temp_dir.path());
        let result = install_package(&config, &temp_dir.path().join("absent.cpk"));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
