// src/packages/archive.rs

//! Package payload: a gzip-compressed tar of the staged package directory
//!
//! Every entry lives under a single top-level directory named after the
//! package. Only directories and regular files are packed or extracted.

use crate::error::{Error, Result};
use crate::filesystem::{create_dir_all, sanitize_path};
use crate::filesystem::path::top_level;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder, HeaderMode};
use tracing::{debug, warn};

/// What an extraction wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnpackSummary {
    /// Top-level entries written (the package directory)
    pub top_level: Vec<String>,
    /// Regular files written, relative to the extraction root
    pub files: Vec<PathBuf>,
}

/// Pack `dir` into an in-memory tar.gz
///
/// The archive's top-level entry is the base name of `dir`. Entries are
/// added in sorted order; permissions and modification times are kept.
pub fn pack_dir(dir: &Path) -> Result<Vec<u8>> {
    let base = dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Validation(format!("{} has no usable base name", dir.display())))?;

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);
    builder.mode(HeaderMode::Complete);
    builder.follow_symlinks(false);

    append_tree(&mut builder, dir, Path::new(base))?;

    let encoder = builder
        .into_inner()
        .map_err(|e| Error::IoError(format!("Failed to finish archive: {}", e)))?;
    let bytes = encoder
        .finish()
        .map_err(|e| Error::IoError(format!("Failed to finish compression: {}", e)))?;

    debug!("Packed {} into {} compressed bytes", dir.display(), bytes.len());
    Ok(bytes)
}

fn append_tree<W: std::io::Write>(builder: &mut Builder<W>, fs_path: &Path, archive_path: &Path) -> Result<()> {
    builder.append_dir(archive_path, fs_path).map_err(|e| {
        Error::IoError(format!("Failed to archive directory {}: {}", fs_path.display(), e))
    })?;

    let mut entries = fs::read_dir(fs_path)
        .map_err(|e| Error::IoError(format!("Failed to read {}: {}", fs_path.display(), e)))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| Error::IoError(format!("Failed to read {}: {}", fs_path.display(), e)))?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let file_type = entry
            .file_type()
            .map_err(|e| Error::IoError(format!("Failed to stat {}: {}", entry.path().display(), e)))?;
        let entry_archive_path = archive_path.join(entry.file_name());

        if file_type.is_dir() {
            append_tree(builder, &entry.path(), &entry_archive_path)?;
        } else if file_type.is_file() {
            builder
                .append_path_with_name(entry.path(), &entry_archive_path)
                .map_err(|e| {
                    Error::IoError(format!("Failed to archive {}: {}", entry.path().display(), e))
                })?;
        } else {
            warn!("Not packing {}: not a regular file or directory", entry.path().display());
        }
    }

    Ok(())
}

/// Extract a tar.gz stream into `dest`
///
/// Every entry must be a plain relative path under `expected_top`; anything
/// else fails with `PathTraversal` before it is written. Symlinks, devices
/// and other special entries are skipped.
pub fn unpack_into<R: Read>(reader: R, dest: &Path, expected_top: &str) -> Result<UnpackSummary> {
    let mut archive = Archive::new(GzDecoder::new(reader));
    archive.set_preserve_mtime(true);

    let entries = archive
        .entries()
        .map_err(|e| Error::Format(format!("Failed to read package payload: {}", e)))?;

    let mut summary = UnpackSummary::default();
    for entry in entries {
        let mut entry =
            entry.map_err(|e| Error::Format(format!("Failed to read archive entry: {}", e)))?;
        let raw_path = entry
            .path()
            .map_err(|e| Error::Format(format!("Invalid archive entry name: {}", e)))?
            .into_owned();

        if raw_path.is_absolute() {
            return Err(Error::PathTraversal(format!(
                "archive entry {} is absolute",
                raw_path.display()
            )));
        }
        let relative = sanitize_path(&raw_path)?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        match top_level(&relative) {
            Some(top) if top == expected_top => {}
            _ => {
                return Err(Error::PathTraversal(format!(
                    "archive entry {} is outside package directory {}",
                    raw_path.display(),
                    expected_top
                )));
            }
        }

        let entry_type = entry.header().entry_type();
        if !entry_type.is_file() && !entry_type.is_dir() {
            warn!("Skipping archive entry {} ({:?})", raw_path.display(), entry_type);
            continue;
        }

        let target = dest.join(&relative);
        if let Some(parent) = target.parent() {
            create_dir_all(parent)?;
        }
        entry.unpack(&target).map_err(|e| {
            Error::IoError(format!("Failed to extract {}: {}", raw_path.display(), e))
        })?;

        if !summary.top_level.iter().any(|t| t == expected_top) {
            summary.top_level.push(expected_top.to_string());
        }
        if entry_type.is_file() {
            summary.files.push(relative);
        }
    }

    debug!("Extracted {} files into {}", summary.files.len(), dest.display());
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn sample_tree(root: &Path) -> PathBuf {
        let pkg = root.join("demo");
        fs::create_dir_all(pkg.join("include")).unwrap();
        fs::create_dir_all(pkg.join("lib")).unwrap();
        fs::write(pkg.join("include/demo.h"), b"int demo(void);\n").unwrap();
        fs::write(pkg.join("lib/libdemo.a"), b"!<arch>\n").unwrap();
        fs::set_permissions(pkg.join("lib/libdemo.a"), fs::Permissions::from_mode(0o640)).unwrap();
        pkg
    }

    fn raw_tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Regular);
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            // set_path refuses `..`, so write the name bytes directly
            let name_field = &mut header.as_old_mut().name;
            name_field[..name.len()].copy_from_slice(name.as_bytes());
            header.set_cksum();
            builder.append(&header, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_pack_unpack_preserves_tree() {
        let src = tempfile::tempdir().unwrap();
        let pkg = sample_tree(src.path());

        let bytes = pack_dir(&pkg).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);

        let dest = tempfile::tempdir().unwrap();
        let summary = unpack_into(bytes.as_slice(), dest.path(), "demo").unwrap();

        assert_eq!(summary.top_level, vec!["demo".to_string()]);
        assert_eq!(
            summary.files,
            vec![
                PathBuf::from("demo/include/demo.h"),
                PathBuf::from("demo/lib/libdemo.a")
            ]
        );
        assert_eq!(
            fs::read(dest.path().join("demo/include/demo.h")).unwrap(),
            b"int demo(void);\n"
        );
        let mode = fs::metadata(dest.path().join("demo/lib/libdemo.a"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[test]
    fn test_pack_skips_symlinks() {
        let src = tempfile::tempdir().unwrap();
        let pkg = sample_tree(src.path());
        std::os::unix::fs::symlink("/etc/passwd", pkg.join("include/passwd")).unwrap();

        let bytes = pack_dir(&pkg).unwrap();
        let dest = tempfile::tempdir().unwrap();
        unpack_into(bytes.as_slice(), dest.path(), "demo").unwrap();
        assert!(fs::symlink_metadata(dest.path().join("demo/include/passwd")).is_err());
    }

    #[test]
    fn test_unpack_rejects_parent_traversal() {
        let bytes = raw_tar_gz(&[("demo/../../escape.txt", b"x")]);
        let dest = tempfile::tempdir().unwrap();
        let inner = dest.path().join("a/b");
        fs::create_dir_all(&inner).unwrap();

        let result = unpack_into(bytes.as_slice(), &inner, "demo");
        assert!(matches!(result, Err(Error::PathTraversal(_))));
        assert!(!dest.path().join("a/escape.txt").exists());
        assert!(!dest.path().join("escape.txt").exists());
    }

    #[test]
    fn test_unpack_rejects_foreign_top_level() {
        let bytes = raw_tar_gz(&[("other/file.txt", b"x")]);
        let dest = tempfile::tempdir().unwrap();

        let result = unpack_into(bytes.as_slice(), dest.path(), "demo");
        assert!(matches!(result, Err(Error::PathTraversal(_))));
        assert!(!dest.path().join("other").exists());
    }

    #[test]
    fn test_unpack_rejects_garbage() {
        let dest = tempfile::tempdir().unwrap();
        let result = unpack_into(&b"definitely not gzip"[..], dest.path(), "demo");
        assert!(result.is_err());
    }
}
