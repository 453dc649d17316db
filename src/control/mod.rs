// src/control/mod.rs

//! Control descriptor parsing
//!
//! A package source tree carries `CPKG/control`, a line-oriented file of
//! `key: value` pairs:
//!
//! ```text
//! # demo package
//! package: "demo"
//! version: 1.0
//! include: { "include/demo.h", "include/demo_util.h" }
//! lib: "build/*.a"          # wildcards are expanded at parse time
//! ```
//!
//! Parsing only checks syntax. Whether the manifest is complete enough to
//! build or install is decided by `Manifest::validate`.

mod keys;
mod value;

pub use keys::Field;

use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error as ThisError;
use tracing::debug;

/// Directory inside a package source tree that holds package metadata
pub const META_DIR: &str = "CPKG";

/// Control descriptor file name inside `META_DIR`
pub const CONTROL_FILE: &str = "control";

/// Optional pre-removal hook inside `META_DIR`
pub const PRERM_HOOK: &str = "prerm";

/// Syntax errors in a control file, with 1-based line numbers
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: expected 'key: value'")]
    MissingSeparator { line: usize },

    #[error("line {line}: unbalanced double quotes")]
    UnbalancedQuote { line: usize },

    #[error("line {line}: list is missing its closing '}}'")]
    UnterminatedList { line: usize },

    #[error("line {line}: unexpected text after list: {trailing}")]
    TrailingText { line: usize, trailing: String },

    #[error("line {line}: list item {item:?} must be double-quoted")]
    UnquotedItem { line: usize, item: String },

    #[error("line {line}: key '{key}' does not take a list")]
    UnexpectedList { line: usize, key: String },

    #[error("line {line}: invalid wildcard {pattern:?}: {message}")]
    BadPattern {
        line: usize,
        pattern: String,
        message: String,
    },
}

/// Parsed control descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    pub description: String,
    pub homepage: String,
    pub author: String,
    pub license: String,
    pub include_install_path: String,
    pub lib_install_path: String,
    /// Header files, in declaration order
    pub include_files: Vec<PathBuf>,
    /// Library files, in declaration order
    pub lib_files: Vec<PathBuf>,
}

impl Manifest {
    /// Check the fields a build or install cannot proceed without
    pub fn validate(&self) -> Result<()> {
        check_identifier("package name", &self.name)?;
        check_identifier("version", &self.version)?;
        if self.name == "." || self.name == ".." {
            return Err(Error::Validation(format!(
                "package name '{}' is reserved",
                self.name
            )));
        }
        Ok(())
    }

    /// Artifact file name, `<name>-<version>.cpk`
    pub fn artifact_file_name(&self) -> String {
        format!(
            "{}-{}.{}",
            self.name,
            self.version,
            crate::packages::PACKAGE_EXTENSION
        )
    }

    fn set_scalar(&mut self, field: Field, value: String) {
        match field {
            Field::Name => self.name = value,
            Field::Version => self.version = value,
            Field::Description => self.description = value,
            Field::Author => self.author = value,
            Field::License => self.license = value,
            Field::Homepage => self.homepage = value,
            Field::IncludeInstallPath => self.include_install_path = value,
            Field::LibInstallPath => self.lib_install_path = value,
            Field::IncludeFiles | Field::LibFiles => {}
        }
    }

    fn set_list(&mut self, field: Field, files: Vec<PathBuf>) {
        match field {
            Field::IncludeFiles => self.include_files = files,
            Field::LibFiles => self.lib_files = files,
            _ => {}
        }
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "package name: {}", self.name)?;
        writeln!(f, "version: {}", self.version)?;
        writeln!(f, "description: {}", self.description)?;
        writeln!(f, "homepage: {}", self.homepage)?;
        writeln!(f, "author: {}", self.author)?;
        writeln!(f, "license: {}", self.license)?;
        writeln!(f, "include_install_path: {}", self.include_install_path)?;
        writeln!(f, "lib_install_path: {}", self.lib_install_path)?;
        writeln!(f, "include_files:")?;
        for file in &self.include_files {
            writeln!(f, "  {}", file.display())?;
        }
        writeln!(f, "lib_files:")?;
        for file in &self.lib_files {
            writeln!(f, "  {}", file.display())?;
        }
        Ok(())
    }
}

/// Reject values that cannot be used as a path component or log field
pub(crate) fn check_identifier(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::Validation(format!("{} must not be empty", what)));
    }
    if let Some(bad) = value
        .chars()
        .find(|c| *c == '/' || *c == '\\' || *c == ':' || c.is_whitespace() || c.is_control())
    {
        return Err(Error::Validation(format!(
            "{} '{}' contains invalid character {:?}",
            what, value, bad
        )));
    }
    Ok(())
}

/// Control file parser
///
/// Relative file paths and wildcards are resolved against `base_dir`,
/// normally the package source directory.
#[derive(Debug, Clone)]
pub struct ControlParser {
    base_dir: PathBuf,
}

impl ControlParser {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Parse control file text into a manifest
    pub fn parse(&self, text: &str) -> std::result::Result<Manifest, ParseError> {
        let mut manifest = Manifest::default();

        for (index, raw_line) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = value::strip_comment(raw_line);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (key, raw_value) = line
                .split_once(':')
                .ok_or(ParseError::MissingSeparator { line: line_no })?;
            let key = key.trim();
            let raw_value = raw_value.trim();

            let Some(field) = Field::from_key(key) else {
                debug!("Ignoring unknown control key '{}' on line {}", key, line_no);
                continue;
            };

            if raw_value.starts_with('{') {
                if !field.is_list() {
                    return Err(ParseError::UnexpectedList {
                        line: line_no,
                        key: key.to_string(),
                    });
                }
                let items = value::parse_brace_list(raw_value, line_no)?;
                let files = items.iter().map(|item| self.base_dir.join(item)).collect();
                manifest.set_list(field, files);
                continue;
            }

            let unquoted = value::unquote(raw_value, line_no)?;
            if field.is_list() {
                let files = self.resolve_bare(unquoted, line_no)?;
                manifest.set_list(field, files);
            } else {
                manifest.set_scalar(field, unquoted.to_string());
            }
        }

        Ok(manifest)
    }

    /// Read and parse a control file from disk
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<Manifest> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::ControlNotFound(path.to_path_buf())
            } else {
                Error::IoError(format!("Failed to read {}: {}", path.display(), e))
            }
        })?;
        Ok(self.parse(&text)?)
    }

    fn resolve_bare(&self, value: &str, line: usize) -> std::result::Result<Vec<PathBuf>, ParseError> {
        if value.is_empty() {
            return Ok(Vec::new());
        }
        if value::is_pattern(value) {
            return value::expand_pattern(&self.base_dir, value, line);
        }
        Ok(vec![self.base_dir.join(value)])
    }
}

/// Parse control text, resolving relative paths against the current directory
pub fn parse(text: &str) -> std::result::Result<Manifest, ParseError> {
    ControlParser::new("").parse(text)
}

/// Location of the control file inside a package source tree
pub fn control_path(source_dir: &Path) -> PathBuf {
    source_dir.join(META_DIR).join(CONTROL_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serialize a manifest back into control syntax
    fn render(manifest: &Manifest) -> String {
        let scalars = [
            (Field::Name, &manifest.name),
            (Field::Version, &manifest.version),
            (Field::Description, &manifest.description),
            (Field::Homepage, &manifest.homepage),
            (Field::Author, &manifest.author),
            (Field::License, &manifest.license),
            (Field::IncludeInstallPath, &manifest.include_install_path),
            (Field::LibInstallPath, &manifest.lib_install_path),
        ];

        let mut out = String::new();
        for (field, value) in scalars {
            out.push_str(&format!(
                "{}: \"{}\"\n",
                field.canonical_key(),
                value.replace('#', "\\#")
            ));
        }
        for (field, files) in [
            (Field::IncludeFiles, &manifest.include_files),
            (Field::LibFiles, &manifest.lib_files),
        ] {
            let items: Vec<String> = files
                .iter()
                .map(|f| format!("\"{}\"", f.display()))
                .collect();
            out.push_str(&format!("{}: {{ {} }}\n", field.canonical_key(), items.join(", ")));
        }
        out
    }

    #[test]
    fn test_parse_basic_control() {
        let text = r#"
# demo control file
package: "demo"
version: 1.0
description: "A demo library"   # trailing comment
author: Jane Doe
license: MIT
homepage: "https://example.com/demo"
include_install_dir: /usr/local/include
lib_install_dir: "/usr/local/lib"
include: {"a.h", "b.h"}
lib: "libdemo.a"
"#;
        let manifest = parse(text).unwrap();
        assert_eq!(manifest.name, "demo");
        assert_eq!(manifest.version, "1.0");
        assert_eq!(manifest.description, "A demo library");
        assert_eq!(manifest.author, "Jane Doe");
        assert_eq!(manifest.license, "MIT");
        assert_eq!(manifest.homepage, "https://example.com/demo");
        assert_eq!(manifest.include_install_path, "/usr/local/include");
        assert_eq!(manifest.lib_install_path, "/usr/local/lib");
        assert_eq!(
            manifest.include_files,
            vec![PathBuf::from("a.h"), PathBuf::from("b.h")]
        );
        assert_eq!(manifest.lib_files, vec![PathBuf::from("libdemo.a")]);
    }

    #[test]
    fn test_aliases_last_occurrence_wins() {
        let text = "packet: old\npackage: new\nauther: a\nmaintainer: b\ninclude_path: /x\n";
        let manifest = parse(text).unwrap();
        assert_eq!(manifest.name, "new");
        assert_eq!(manifest.author, "b");
        assert_eq!(manifest.include_install_path, "/x");
    }

    #[test]
    fn test_only_first_colon_separates() {
        let manifest = parse("homepage: https://example.com:8080/demo\n").unwrap();
        assert_eq!(manifest.homepage, "https://example.com:8080/demo");
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let text = "package: demo\narchitecture: amd64\nsection: { not even valid\n";
        let manifest = parse(text).unwrap();
        assert_eq!(manifest.name, "demo");
    }

    #[test]
    fn test_missing_fields_parse_but_fail_validation() {
        let manifest = parse("description: nothing else\n").unwrap();
        assert!(manifest.name.is_empty());
        assert!(matches!(manifest.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_path_characters() {
        let mut manifest = parse("package: demo\nversion: 1.0\n").unwrap();
        assert!(manifest.validate().is_ok());

        manifest.name = "../evil".to_string();
        assert!(manifest.validate().is_err());

        manifest.name = "demo".to_string();
        manifest.version = "1:2.0".to_string();
        assert!(manifest.validate().is_err());

        manifest.version = "1.0".to_string();
        manifest.name = "..".to_string();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_syntax_errors_report_line() {
        assert_eq!(
            parse("package: demo\nversion 1.0\n"),
            Err(ParseError::MissingSeparator { line: 2 })
        );
        assert_eq!(
            parse("package: \"demo\n"),
            Err(ParseError::UnbalancedQuote { line: 1 })
        );
        assert_eq!(
            parse("\n\ninclude: { \"a.h\", b.h }\n"),
            Err(ParseError::UnquotedItem {
                line: 3,
                item: "b.h".to_string()
            })
        );
        assert_eq!(
            parse("include: { \"a.h\"\n"),
            Err(ParseError::UnterminatedList { line: 1 })
        );
        assert_eq!(
            parse("version: { \"1.0\" }\n"),
            Err(ParseError::UnexpectedList {
                line: 1,
                key: "version".to_string()
            })
        );
    }

    #[test]
    fn test_empty_list_clears_field() {
        let manifest = parse("include: {\"a.h\"}\ninclude: {}\nlib:\n").unwrap();
        assert!(manifest.include_files.is_empty());
        assert!(manifest.lib_files.is_empty());
    }

    #[test]
    fn test_paths_resolve_against_base_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::create_dir(temp_dir.path().join("lib")).unwrap();
        fs::write(temp_dir.path().join("lib/libb.a"), b"").unwrap();
        fs::write(temp_dir.path().join("lib/liba.a"), b"").unwrap();

        let parser = ControlParser::new(temp_dir.path());
        let manifest = parser
            .parse("include: \"a.h\"\nlib: lib/*.a\n")
            .unwrap();
        assert_eq!(manifest.include_files, vec![temp_dir.path().join("a.h")]);
        assert_eq!(
            manifest.lib_files,
            vec![
                temp_dir.path().join("lib/liba.a"),
                temp_dir.path().join("lib/libb.a")
            ]
        );

        let manifest = parser.parse("lib: \"*.so\"\n").unwrap();
        assert_eq!(manifest.lib_files, vec![temp_dir.path().join("*.so")]);
    }

    #[test]
    fn test_render_round_trips_scalars() {
        let original = Manifest {
            name: "demo".to_string(),
            version: "2.3.1".to_string(),
            description: "Tiny C helpers: strings, lists #1".to_string(),
            homepage: "https://example.com/demo".to_string(),
            author: "Jane Doe <jane@example.com>".to_string(),
            license: "GPL-3.0-or-later".to_string(),
            include_install_path: "/usr/local/include/demo".to_string(),
            lib_install_path: "/usr/local/lib".to_string(),
            include_files: vec![PathBuf::from("demo.h")],
            lib_files: vec![PathBuf::from("libdemo.a"), PathBuf::from("libdemo.so")],
        };

        let parsed = parse(&render(&original)).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_parse_file_missing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let parser = ControlParser::new(temp_dir.path());
        let result = parser.parse_file(control_path(temp_dir.path()));
        assert!(matches!(result, Err(Error::ControlNotFound(_))));
    }

    #[test]
    fn test_display_lists_files() {
        let manifest = parse("package: demo\ninclude: {\"a.h\"}\n").unwrap();
        let shown = manifest.to_string();
        assert!(shown.contains("package name: demo"));
        assert!(shown.contains("  a.h"));
    }
}
