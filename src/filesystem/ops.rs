// src/filesystem/ops.rs

//! Directory creation, recursive deletion and file copying

use crate::error::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Create `path` and every missing parent
///
/// Components that already exist as directories are accepted, so calling
/// this twice is harmless. A component that exists but is not a directory
/// fails with `NotADirectory`.
pub fn create_dir_all(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(Error::Validation("Cannot create an empty directory path".to_string()));
    }

    let mut current = PathBuf::new();
    for component in path.components() {
        current.push(component);

        match fs::metadata(&current) {
            Ok(metadata) if metadata.is_dir() => continue,
            Ok(_) => return Err(Error::NotADirectory(current)),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::IoError(format!(
                    "Failed to inspect {}: {}",
                    current.display(),
                    e
                )));
            }
        }

        if let Err(e) = fs::create_dir(&current) {
            // Another process may have created it in the meantime
            if e.kind() == ErrorKind::AlreadyExists && current.is_dir() {
                continue;
            }
            return Err(Error::IoError(format!(
                "Failed to create directory {}: {}",
                current.display(),
                e
            )));
        }
        debug!("Created directory {}", current.display());
    }

    Ok(())
}

/// Recursively delete a file or directory tree
///
/// A missing path counts as success. Symlinks are removed, never followed.
/// Failures do not stop the walk: remaining siblings are still removed and
/// every failure is reported together at the end.
pub fn remove_tree(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut failures = Vec::new();
    remove_tree_inner(path, &mut failures);

    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::IoError(format!(
            "Failed to remove {} path(s) under {}: {}",
            failures.len(),
            path.display(),
            failures.join("; ")
        )))
    }
}

fn remove_tree_inner(path: &Path, failures: &mut Vec<String>) {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return,
        Err(e) => {
            failures.push(format!("{}: {}", path.display(), e));
            return;
        }
    };

    if !metadata.is_dir() {
        if let Err(e) = fs::remove_file(path)
            && e.kind() != ErrorKind::NotFound
        {
            warn!("Failed to remove {}: {}", path.display(), e);
            failures.push(format!("{}: {}", path.display(), e));
        }
        return;
    }

    match fs::read_dir(path) {
        Ok(entries) => {
            for entry in entries {
                match entry {
                    Ok(entry) => remove_tree_inner(&entry.path(), failures),
                    Err(e) => failures.push(format!("{}: {}", path.display(), e)),
                }
            }
        }
        Err(e) => {
            failures.push(format!("{}: {}", path.display(), e));
            return;
        }
    }

    if let Err(e) = fs::remove_dir(path)
        && e.kind() != ErrorKind::NotFound
    {
        warn!("Failed to remove directory {}: {}", path.display(), e);
        failures.push(format!("{}: {}", path.display(), e));
    }
}

/// Copy a regular file into `dst_dir`, keeping its base name
///
/// Returns the path of the new copy.
pub fn copy_file(src: impl AsRef<Path>, dst_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let src = src.as_ref();
    let dst_dir = dst_dir.as_ref();

    let metadata = fs::metadata(src).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            Error::NotFound(format!("Source file {}", src.display()))
        } else {
            Error::IoError(format!("Failed to inspect {}: {}", src.display(), e))
        }
    })?;
    if !metadata.is_file() {
        return Err(Error::Validation(format!(
            "{} is not a regular file",
            src.display()
        )));
    }

    if !dst_dir.is_dir() {
        return Err(Error::NotADirectory(dst_dir.to_path_buf()));
    }

    let file_name = src
        .file_name()
        .ok_or_else(|| Error::Validation(format!("{} has no file name", src.display())))?;
    let dst = dst_dir.join(file_name);

    fs::copy(src, &dst).map_err(|e| {
        Error::IoError(format!(
            "Failed to copy {} to {}: {}",
            src.display(),
            dst.display(),
            e
        ))
    })?;

    debug!("Copied {} -> {}", src.display(), dst.display());
    Ok(dst)
}
