// src/control/keys.rs

//! Control file key aliases
//!
//! Several spellings are accepted for most keys; they all resolve to one
//! `Field` here, so the parser never compares key strings itself.

/// Manifest field a control key writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Version,
    Description,
    Author,
    License,
    Homepage,
    IncludeInstallPath,
    LibInstallPath,
    IncludeFiles,
    LibFiles,
}

impl Field {
    /// Resolve a key as written in the control file
    ///
    /// Keys are matched case-insensitively and `-` is treated as `_`.
    /// Unknown keys return `None` and are skipped by the parser.
    pub fn from_key(key: &str) -> Option<Self> {
        let normalized = key.trim().to_ascii_lowercase().replace('-', "_");
        let field = match normalized.as_str() {
            "package" | "packet" | "name" => Field::Name,
            "version" => Field::Version,
            "description" => Field::Description,
            "author" | "auther" | "maintainer" => Field::Author,
            "license" => Field::License,
            "homepage" => Field::Homepage,
            "include_install_dir" | "include_path" => Field::IncludeInstallPath,
            "lib_install_dir" | "lib_path" => Field::LibInstallPath,
            "include" | "includes" | "include_header_files" => Field::IncludeFiles,
            "lib" | "libs" | "lib_files" => Field::LibFiles,
            _ => return None,
        };
        Some(field)
    }

    /// Whether the field holds a file list rather than a single string
    pub fn is_list(self) -> bool {
        matches!(self, Field::IncludeFiles | Field::LibFiles)
    }

    /// Canonical key, used when rendering a manifest
    pub fn canonical_key(self) -> &'static str {
        match self {
            Field::Name => "package",
            Field::Version => "version",
            Field::Description => "description",
            Field::Author => "author",
            Field::License => "license",
            Field::Homepage => "homepage",
            Field::IncludeInstallPath => "include_install_dir",
            Field::LibInstallPath => "lib_install_dir",
            Field::IncludeFiles => "include",
            Field::LibFiles => "lib",
        }
    }
}
