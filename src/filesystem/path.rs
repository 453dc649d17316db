// src/filesystem/path.rs

//! Path handling for values that come from packages
//!
//! Archive entry names and declared install directories are untrusted. They
//! are reduced to plain relative paths before being joined to a root the
//! caller chose.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Reduce an untrusted path to a normal relative path
///
/// Leading `/` and `.` components are dropped; any `..` component is
/// rejected outright instead of being resolved.
pub fn sanitize_path(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let mut relative = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir => {
                return Err(Error::PathTraversal(path.display().to_string()));
            }
            Component::Prefix(_) => {
                return Err(Error::PathTraversal(format!(
                    "{} has a platform prefix",
                    path.display()
                )));
            }
        }
    }

    Ok(relative)
}

/// Join an untrusted path under `root`
///
/// The result is always lexically inside `root`; an empty or `/` path maps
/// to `root` itself.
pub fn safe_join(root: impl AsRef<Path>, path: impl AsRef<Path>) -> Result<PathBuf> {
    let root = root.as_ref();
    let relative = sanitize_path(path)?;
    let joined = root.join(&relative);

    if !joined.starts_with(root) {
        return Err(Error::PathTraversal(format!(
            "{} escapes {}",
            joined.display(),
            root.display()
        )));
    }

    Ok(joined)
}

/// First normal component of a relative path, if any
pub fn top_level(path: &Path) -> Option<&str> {
    path.components().find_map(|component| match component {
        Component::Normal(part) => part.to_str(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_keeps_normal_paths() {
        assert_eq!(
            sanitize_path("demo/include/a.h").unwrap(),
            PathBuf::from("demo/include/a.h")
        );
        assert_eq!(
            sanitize_path("./demo/./lib").unwrap(),
            PathBuf::from("demo/lib")
        );
    }

    #[test]
    fn test_sanitize_strips_root() {
        assert_eq!(
            sanitize_path("/usr/include").unwrap(),
            PathBuf::from("usr/include")
        );
        assert_eq!(sanitize_path("/").unwrap(), PathBuf::new());
    }

    #[test]
    fn test_sanitize_rejects_parent_components() {
        assert!(matches!(
            sanitize_path("../etc/passwd"),
            Err(Error::PathTraversal(_))
        ));
        assert!(matches!(
            sanitize_path("demo/../../etc"),
            Err(Error::PathTraversal(_))
        ));
    }

    #[test]
    fn test_safe_join_stays_under_root() {
        let root = Path::new("/srv/sysroot");
        assert_eq!(
            safe_join(root, "/usr/lib").unwrap(),
            PathBuf::from("/srv/sysroot/usr/lib")
        );
        assert_eq!(safe_join(root, "").unwrap(), PathBuf::from("/srv/sysroot"));
        assert!(safe_join(root, "/usr/../../etc").is_err());
    }

    #[test]
    fn test_top_level() {
        assert_eq!(top_level(Path::new("demo/include/a.h")), Some("demo"));
        assert_eq!(top_level(Path::new("./demo")), Some("demo"));
        assert_eq!(top_level(Path::new("")), None);
    }
}
