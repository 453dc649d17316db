// src/builder.rs

//! Package build pipeline
//!
//! Turns a package source tree into a `<name>-<version>.cpk` artifact:
//!
//! 1. parse `CPKG/control` and validate the manifest
//! 2. ask the operator to confirm
//! 3. stage the declared include and lib files under `<name>/`
//! 4. pack the staging tree into a tar.gz payload
//! 5. hash the payload and finalize the header
//! 6. write the artifact atomically, then drop the staging tree
//!
//! Failures are tagged with the `BuildStage` they happened in.

use crate::control::{self, ControlParser, Manifest, CONTROL_FILE, META_DIR, PRERM_HOOK};
use crate::error::{BuildStage, Error, Result};
use crate::filesystem::{copy_file, create_dir_all};
use crate::packages::{self, PackageHeader};
use crate::prompt::Confirm;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Prefix of the scratch directory created next to the output
const STAGING_PREFIX: &str = ".cpkg-build-";

/// Staged subdirectory for header files
pub const INCLUDE_DIR: &str = "include";

/// Staged subdirectory for libraries
pub const LIB_DIR: &str = "lib";

/// A successfully written package
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub manifest: Manifest,
    pub header: PackageHeader,
    pub artifact_path: PathBuf,
}

#[derive(Debug, Clone)]
pub enum BuildOutcome {
    Built(BuildResult),
    /// The operator declined; nothing was written
    Cancelled,
}

/// Build the package in `source_dir` into `output_dir`
pub fn build_package(source_dir: &Path, output_dir: &Path, confirm: &mut dyn Confirm) -> Result<BuildOutcome> {
    let source_dir = normalize_source_dir(source_dir);
    if !source_dir.is_dir() {
        return Err(Error::NotADirectory(source_dir).at_stage(BuildStage::ParseControl));
    }

    let control_file = control::control_path(&source_dir);
    let manifest = ControlParser::new(&source_dir)
        .parse_file(&control_file)
        .map_err(|e| e.at_stage(BuildStage::ParseControl))?;
    debug!("Parsed {}", control_file.display());

    let header = manifest
        .validate()
        .and_then(|_| packages::build_header(&manifest))
        .map_err(|e| e.at_stage(BuildStage::Validate))?;

    if !confirm.confirm(&manifest.to_string(), "Build this package?")? {
        info!("Build of {} cancelled", manifest.name);
        return Ok(BuildOutcome::Cancelled);
    }

    create_dir_all(output_dir).map_err(|e| e.at_stage(BuildStage::Stage))?;
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(output_dir)
        .map_err(|e| {
            Error::IoError(format!(
                "Failed to create staging directory in {}: {}",
                output_dir.display(),
                e
            ))
            .at_stage(BuildStage::Stage)
        })?;
    debug!("Staging in {}", staging.path().display());

    let result = assemble(&manifest, header, &source_dir, staging.path(), output_dir);

    let staging_path = staging.path().to_path_buf();
    if let Err(e) = staging.close() {
        warn!("Failed to remove staging directory {}: {}", staging_path.display(), e);
    }

    let (header, artifact_path) = result?;
    info!(
        "Built {} {} -> {}",
        manifest.name,
        manifest.version,
        artifact_path.display()
    );

    Ok(BuildOutcome::Built(BuildResult {
        manifest,
        header,
        artifact_path,
    }))
}

/// Stage, pack, hash and write; the caller owns staging cleanup
fn assemble(
    manifest: &Manifest,
    header: PackageHeader,
    source_dir: &Path,
    staging_root: &Path,
    output_dir: &Path,
) -> Result<(PackageHeader, PathBuf)> {
    let stage = staging_root.join(&manifest.name);
    stage_files(manifest, source_dir, &stage).map_err(|e| e.at_stage(BuildStage::Stage))?;

    let payload = packages::pack_dir(&stage).map_err(|e| e.at_stage(BuildStage::Archive))?;

    let header = packages::finalize_hash(header, &payload).map_err(|e| e.at_stage(BuildStage::Hash))?;
    debug!("Payload {} bytes, sha256 {}", header.payload_len, header.hash);

    let artifact_path = output_dir.join(manifest.artifact_file_name());
    packages::write_artifact(&header, &payload, &artifact_path)
        .map_err(|e| e.at_stage(BuildStage::Write))?;

    Ok((header, artifact_path))
}

fn stage_files(manifest: &Manifest, source_dir: &Path, stage: &Path) -> Result<()> {
    create_dir_all(stage)?;

    stage_list(&manifest.include_files, &stage.join(INCLUDE_DIR))?;
    stage_list(&manifest.lib_files, &stage.join(LIB_DIR))?;

    let meta = stage.join(META_DIR);
    create_dir_all(&meta)?;
    copy_file(source_dir.join(META_DIR).join(CONTROL_FILE), &meta)?;

    let hook = source_dir.join(META_DIR).join(PRERM_HOOK);
    if hook.is_file() {
        copy_file(&hook, &meta)?;
        debug!("Staged removal hook {}", hook.display());
    }

    Ok(())
}

fn stage_list(files: &[PathBuf], dest: &Path) -> Result<()> {
    if files.is_empty() {
        return Ok(());
    }
    create_dir_all(dest)?;

    let mut seen = HashSet::new();
    for file in files {
        let base = file
            .file_name()
            .ok_or_else(|| Error::Validation(format!("{} has no file name", file.display())))?;
        if !seen.insert(base.to_os_string()) {
            return Err(Error::Validation(format!(
                "more than one file named {} would be staged in {}",
                base.to_string_lossy(),
                dest.display()
            )));
        }
        copy_file(file, dest)?;
    }

    Ok(())
}

/// Drop trailing separators and `.` components
fn normalize_source_dir(path: &Path) -> PathBuf {
    let normalized: PathBuf = path.components().collect();
    if normalized.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        normalized
    }
}
