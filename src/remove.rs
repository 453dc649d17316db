// src/remove.rs

//! Package removal
//!
//! Removal runs the package's optional `CPKG/prerm` hook, deletes the files
//! it deployed and its unpacked tree, then rewrites the installed-state log
//! without its record.

use crate::config::Config;
use crate::control::{META_DIR, PRERM_HOOK};
use crate::error::{Error, Result};
use crate::filesystem::remove_tree;
use crate::prompt::Confirm;
use crate::state::{self, InstalledRecord, InstalledState, StateLock};
use std::fs;
use std::io::ErrorKind;
use std::path::Component;
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub enum RemoveOutcome {
    Removed(InstalledRecord),
    /// The operator declined; nothing was changed
    Cancelled,
}

/// Remove the installed package `name`
pub fn remove_package(config: &Config, name: &str, confirm: &mut dyn Confirm) -> Result<RemoveOutcome> {
    if config.require_root && !nix::unistd::geteuid().is_root() {
        return Err(Error::PermissionDenied(
            "removing packages requires root privileges".to_string(),
        ));
    }

    let _lock = StateLock::acquire(config)?;
    let mut state = InstalledState::load(config)?;
    let record = state::resolve_installed(config, &state, name)
        .ok_or_else(|| Error::NotInstalled(name.to_string()))?;

    if !record.path.components().any(|c| matches!(c, Component::Normal(_))) {
        return Err(Error::Validation(format!(
            "refusing to remove {} for package {}",
            record.path.display(),
            name
        )));
    }

    let message = format!(
        "Package: {}\nVersion: {}\nPath: {}",
        record.name,
        record.version,
        record.path.display()
    );
    if !confirm.confirm(&message, "Remove this package?")? {
        info!("Removal of {} cancelled", name);
        return Ok(RemoveOutcome::Cancelled);
    }

    run_prerm_hook(&record);
    remove_deployed_files(config, name);

    if let Err(e) = remove_tree(&record.path) {
        warn!("{}", e);
    }

    state.remove(name);
    state.save()?;

    if fs::symlink_metadata(&record.path).is_ok() {
        return Err(Error::PartialRemoval(record.path));
    }

    info!("Removed {} {}", record.name, record.version);
    Ok(RemoveOutcome::Removed(record))
}

/// Run `<package>/CPKG/prerm` if it exists; failures are only logged
fn run_prerm_hook(record: &InstalledRecord) {
    let hook = record.path.join(META_DIR).join(PRERM_HOOK);
    if !hook.is_file() {
        debug!("No removal hook for {}", record.name);
        return;
    }

    info!("Running removal hook for {}", record.name);
    let output = Command::new("sh")
        .arg(&hook)
        .current_dir(&record.path)
        .env("CPKG_PACKAGE", &record.name)
        .env("CPKG_VERSION", &record.version)
        .stdin(Stdio::null())
        .output();

    match output {
        Ok(output) => {
            for line in String::from_utf8_lossy(&output.stdout).lines() {
                debug!("[{}] {}", PRERM_HOOK, line);
            }
            for line in String::from_utf8_lossy(&output.stderr).lines() {
                warn!("[{}] {}", PRERM_HOOK, line);
            }
            if !output.status.success() {
                warn!(
                    "Removal hook for {} exited with {}; continuing",
                    record.name, output.status
                );
            }
        }
        Err(e) => warn!("Failed to run removal hook {}: {}", hook.display(), e),
    }
}

fn remove_deployed_files(config: &Config, name: &str) {
    let files = match state::read_file_list(config, name) {
        Ok(files) => files,
        Err(e) => {
            warn!("{}", e);
            return;
        }
    };

    for file in &files {
        match fs::remove_file(file) {
            Ok(()) => debug!("Removed {}", file.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", file.display(), e),
        }
    }

    if let Err(e) = state::remove_file_list(config, name) {
        warn!("{}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{AssumeYes, Prompt};
    use std::path::{Path, PathBuf};

    fn test_config(root: &Path) -> Config {
        let mut config = Config::new(root);
        config.require_root = false;
        config
    }

    fn fake_install(config: &Config, name: &str) -> PathBuf {
        let dir = config.package_dir(name);
        fs::create_dir_all(dir.join("include")).unwrap();
        fs::write(dir.join("include/x.h"), b"").unwrap();
        let mut state = InstalledState::load(config).unwrap();
        state.insert(InstalledRecord::new(name, &dir, "1.0")).unwrap();
        state.save().unwrap();
        dir
    }

    #[test]
    fn test_remove_deletes_tree_and_record() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = test_config(temp_dir.path());
        let dir = fake_install(&config, "demo");
        fake_install(&config, "keep");

        let outcome = remove_package(&config, "demo", &mut AssumeYes).unwrap();
        assert!(matches!(outcome, RemoveOutcome::Removed(r) if r.name == "demo"));
        assert!(!dir.exists());

        let state = InstalledState::load(&config).unwrap();
        assert!(state.find("demo").is_none());
        assert!(state.find("keep").is_some());
    }

    #[test]
    fn test_remove_unknown_package() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = test_config(temp_dir.path());
        let result = remove_package(&config, "ghost", &mut AssumeYes);
        assert!(matches!(result, Err(Error::NotInstalled(name)) if name == "ghost"));
    }

    #[test]
    fn test_declined_removal_changes_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = test_config(temp_dir.path());
        let dir = fake_install(&config, "demo");

        let mut prompt = Prompt::new(&b"no\n"[..], Vec::new());
        let outcome = remove_package(&config, "demo", &mut prompt).unwrap();
        assert!(matches!(outcome, RemoveOutcome::Cancelled));
        assert!(dir.exists());
        assert!(InstalledState::load(&config).unwrap().find("demo").is_some());
    }

    #[test]
    fn test_directory_only_package_is_removable() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = test_config(temp_dir.path());
        let dir = config.package_dir("orphan");
        fs::create_dir_all(&dir).unwrap();

        let outcome = remove_package(&config, "orphan", &mut AssumeYes).unwrap();
        assert!(matches!(outcome, RemoveOutcome::Removed(r) if r.version == "unknown"));
        assert!(!dir.exists());
    }

    #[test]
    fn test_failing_hook_does_not_block_removal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = test_config(temp_dir.path());
        let dir = fake_install(&config, "demo");
        fs::create_dir_all(dir.join(META_DIR)).unwrap();
        let marker = temp_dir.path().join("hook-ran");
        fs::write(
            dir.join(META_DIR).join(PRERM_HOOK),
            format!("echo \"$CPKG_PACKAGE\" > {}\nexit 3\n", marker.display()),
        )
        .unwrap();

        remove_package(&config, "demo", &mut AssumeYes).unwrap();
        assert_eq!(fs::read_to_string(&marker).unwrap().trim(), "demo");
        assert!(!dir.exists());
    }

    #[test]
    fn test_deployed_files_are_removed() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = test_config(temp_dir.path());
        fake_install(&config, "demo");
        let deployed = temp_dir.path().join("usr/include/x.h");
        fs::create_dir_all(deployed.parent().unwrap()).unwrap();
        fs::write(&deployed, b"").unwrap();
        state::write_file_list(&config, "demo", std::slice::from_ref(&deployed)).unwrap();

        remove_package(&config, "demo", &mut AssumeYes).unwrap();
        assert!(!deployed.exists());
        assert!(!config.file_list_path("demo").exists());
    }

    #[test]
    fn test_root_is_required_when_configured() {
        if nix::unistd::geteuid().is_root() {
            return;
        }
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = test_config(temp_dir.path());
        config.require_root = true;
        let result = remove_package(&config, "demo", &mut AssumeYes);
        assert!(matches!(result, Err(Error::PermissionDenied(_))));
    }
}
