// src/error.rs

use crate::control::ParseError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Step of the build pipeline that produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    ParseControl,
    Validate,
    Stage,
    Archive,
    Hash,
    Write,
}

impl BuildStage {
    pub fn as_str(&self) -> &str {
        match self {
            BuildStage::ParseControl => "parse-control",
            BuildStage::Validate => "validate",
            BuildStage::Stage => "stage",
            BuildStage::Archive => "archive",
            BuildStage::Hash => "hash",
            BuildStage::Write => "write",
        }
    }
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core error types for cpkg
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed control descriptor
    #[error("Control file parse error: {0}")]
    Parse(#[from] ParseError),

    /// Manifest or header fields that cannot be used
    #[error("Validation error: {0}")]
    Validation(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O errors with context about the operation that failed
    #[error("I/O error: {0}")]
    IoError(String),

    /// Package source tree has no control descriptor
    #[error("Control file not found at {}", .0.display())]
    ControlNotFound(PathBuf),

    /// A path component exists but is not a directory
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Artifact does not start with the package magic
    #[error("Invalid package file (bad magic {found:02x?})")]
    BadMagic { found: [u8; 4] },

    /// Artifact is shorter than its header claims
    #[error("Package truncated: expected {expected} bytes, found {actual}")]
    Truncated { expected: u64, actual: u64 },

    /// Structurally invalid artifact contents
    #[error("Invalid package format: {0}")]
    Format(String),

    /// Integrity check failed
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Package '{0}' is already installed")]
    AlreadyInstalled(String),

    #[error("Package '{0}' is not installed")]
    NotInstalled(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Archive entry or declared path escapes its root
    #[error("Path traversal rejected: {0}")]
    PathTraversal(String),

    /// Deploying would replace a file cpkg does not own
    #[error("File conflict: {} already exists", .0.display())]
    FileConflict(PathBuf),

    /// Files were left behind after a removal
    #[error("Partial removal: {} still exists", .0.display())]
    PartialRemoval(PathBuf),

    /// Download failure that a retry will not fix (e.g. HTTP 404)
    #[error("Network error: {0}")]
    Network(String),

    /// Connection failure or server error (retryable)
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// Download timed out (retryable)
    #[error("Network timeout: {0}")]
    NetworkTimeout(String),

    /// Builder failure tagged with the failing step
    #[error("Build failed at stage '{stage}': {source}")]
    Build {
        stage: BuildStage,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Whether a retry of the same network operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::NetworkTimeout(_) | Error::NetworkUnavailable(_))
    }

    /// Tag an error with the build step it came from
    pub fn at_stage(self, stage: BuildStage) -> Self {
        Error::Build {
            stage,
            source: Box::new(self),
        }
    }
}

/// Result type alias using cpkg's Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_names_stage() {
        let err = Error::ControlNotFound(PathBuf::from("/src/CPKG/control"))
            .at_stage(BuildStage::ParseControl);
        let message = err.to_string();
        assert!(message.contains("parse-control"));
        assert!(message.contains("/src/CPKG/control"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::NetworkTimeout("slow".to_string()).is_transient());
        assert!(Error::NetworkUnavailable("reset".to_string()).is_transient());
        assert!(!Error::Network("HTTP 404".to_string()).is_transient());
        assert!(!Error::NotFound("demo".to_string()).is_transient());
        assert!(!Error::HashMismatch {
            expected: "a".to_string(),
            actual: "b".to_string()
        }
        .is_transient());
    }
}
