// src/state/mod.rs

//! Installed-state bookkeeping
//!
//! Installed packages are recorded in a plain text log, one
//! `name:path:version` record per line. The log is only ever replaced
//! wholesale (write a temporary file, then rename), so readers see either
//! the old or the new contents. Lines that do not parse as records are kept
//! verbatim when the log is rewritten.

pub mod lock;

pub use lock::StateLock;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::filesystem::create_dir_all;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Field separator of the installed-state log
const SEPARATOR: char = ':';

/// Version recorded for packages found only as a directory
pub const UNKNOWN_VERSION: &str = "unknown";

/// One installed package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledRecord {
    pub name: String,
    /// Root of the package's unpacked tree
    pub path: PathBuf,
    pub version: String,
}

impl InstalledRecord {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            version: version.into(),
        }
    }

    /// Parse a `name:path:version` line
    ///
    /// The name ends at the first separator and the version starts after the
    /// last one, so the path may itself contain the separator.
    pub fn parse(line: &str) -> Option<Self> {
        let (name, rest) = line.split_once(SEPARATOR)?;
        let (path, version) = rest.rsplit_once(SEPARATOR)?;
        if name.is_empty() || path.is_empty() || version.is_empty() {
            return None;
        }
        Some(Self::new(name, path, version))
    }
}

impl fmt::Display for InstalledRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.name,
            self.path.display(),
            self.version,
            sep = SEPARATOR
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LogLine {
    Record(InstalledRecord),
    Other(String),
}

/// In-memory copy of the installed-state log
#[derive(Debug, Clone)]
pub struct InstalledState {
    log_path: PathBuf,
    lines: Vec<LogLine>,
}

impl InstalledState {
    /// Load the log for `config`; a missing log is an empty state
    pub fn load(config: &Config) -> Result<Self> {
        Self::load_from(config.log_path())
    }

    pub fn load_from(log_path: impl Into<PathBuf>) -> Result<Self> {
        let log_path = log_path.into();
        let text = match fs::read_to_string(&log_path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(Error::IoError(format!(
                    "Failed to read installed-state log {}: {}",
                    log_path.display(),
                    e
                )));
            }
        };

        let lines = text
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| match InstalledRecord::parse(line) {
                Some(record) => LogLine::Record(record),
                None => {
                    warn!("Keeping unrecognized installed-state line: {}", line);
                    LogLine::Other(line.to_string())
                }
            })
            .collect();

        Ok(Self { log_path, lines })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Records in log order
    pub fn records(&self) -> impl Iterator<Item = &InstalledRecord> {
        self.lines.iter().filter_map(|line| match line {
            LogLine::Record(record) => Some(record),
            LogLine::Other(_) => None,
        })
    }

    pub fn find(&self, name: &str) -> Option<&InstalledRecord> {
        self.records().find(|record| record.name == name)
    }

    /// Append a record; names stay unique
    pub fn insert(&mut self, record: InstalledRecord) -> Result<()> {
        if self.find(&record.name).is_some() {
            return Err(Error::AlreadyInstalled(record.name));
        }
        self.lines.push(LogLine::Record(record));
        Ok(())
    }

    /// Drop the record for `name`, keeping every other line in order
    pub fn remove(&mut self, name: &str) -> Option<InstalledRecord> {
        let index = self
            .lines
            .iter()
            .position(|line| matches!(line, LogLine::Record(r) if r.name == name))?;
        match self.lines.remove(index) {
            LogLine::Record(record) => Some(record),
            LogLine::Other(_) => None,
        }
    }

    /// Atomically replace the log on disk with the current contents
    pub fn save(&self) -> Result<()> {
        let dir = match self.log_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        create_dir_all(dir)?;

        let mut temp = NamedTempFile::new_in(dir).map_err(|e| {
            Error::IoError(format!("Failed to create temporary log in {}: {}", dir.display(), e))
        })?;

        let mut contents = String::new();
        for line in &self.lines {
            match line {
                LogLine::Record(record) => contents.push_str(&record.to_string()),
                LogLine::Other(text) => contents.push_str(text),
            }
            contents.push('\n');
        }

        temp.write_all(contents.as_bytes())
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| Error::IoError(format!("Failed to write installed-state log: {}", e)))?;

        temp.persist(&self.log_path).map_err(|e| {
            Error::IoError(format!(
                "Failed to replace {}: {}",
                self.log_path.display(),
                e.error
            ))
        })?;

        debug!("Saved installed-state log {}", self.log_path.display());
        Ok(())
    }
}

/// Resolve an installed package from the log, or from its directory alone
pub fn resolve_installed(config: &Config, state: &InstalledState, name: &str) -> Option<InstalledRecord> {
    if let Some(record) = state.find(name) {
        return Some(record.clone());
    }

    let dir = config.package_dir(name);
    if dir.is_dir() {
        debug!("{} has no log record; found directory {}", name, dir.display());
        return Some(InstalledRecord::new(name, dir, UNKNOWN_VERSION));
    }
    None
}

/// Every installed package: logged records first, then directory-only ones
pub fn list_installed(config: &Config, state: &InstalledState) -> Result<Vec<InstalledRecord>> {
    let mut records: Vec<InstalledRecord> = state.records().cloned().collect();

    let install_dir = config.install_dir();
    let entries = match fs::read_dir(&install_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(records),
        Err(e) => {
            return Err(Error::IoError(format!(
                "Failed to read {}: {}",
                install_dir.display(),
                e
            )));
        }
    };

    let mut orphans = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::IoError(format!("Failed to read {}: {}", install_dir.display(), e)))?;
        if !entry.path().is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if state.find(&name).is_none() {
            orphans.push(InstalledRecord::new(name, entry.path(), UNKNOWN_VERSION));
        }
    }
    orphans.sort_by(|a, b| a.name.cmp(&b.name));
    records.extend(orphans);

    Ok(records)
}

/// Record the files a package deployed outside its own directory
pub fn write_file_list(config: &Config, name: &str, files: &[PathBuf]) -> Result<()> {
    let path = config.file_list_path(name);
    let dir = config.info_dir();
    create_dir_all(&dir)?;

    let mut temp = NamedTempFile::new_in(&dir).map_err(|e| {
        Error::IoError(format!("Failed to create temporary file in {}: {}", dir.display(), e))
    })?;
    for file in files {
        writeln!(temp, "{}", file.display())
            .map_err(|e| Error::IoError(format!("Failed to write {}: {}", path.display(), e)))?;
    }
    temp.persist(&path)
        .map_err(|e| Error::IoError(format!("Failed to replace {}: {}", path.display(), e.error)))?;
    Ok(())
}

/// Files recorded for `name`; empty when no list exists
pub fn read_file_list(config: &Config, name: &str) -> Result<Vec<PathBuf>> {
    let path = config.file_list_path(name);
    match fs::read_to_string(&path) {
        Ok(text) => Ok(text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(PathBuf::from)
            .collect()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(Error::IoError(format!("Failed to read {}: {}", path.display(), e))),
    }
}

pub fn remove_file_list(config: &Config, name: &str) -> Result<()> {
    let path = config.file_list_path(name);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::IoError(format!("Failed to remove {}: {}", path.display(), e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_record() {
        let record = InstalledRecord::parse("foo:/opt/foo:1.0").unwrap();
        assert_eq!(record, InstalledRecord::new("foo", "/opt/foo", "1.0"));
        assert_eq!(record.to_string(), "foo:/opt/foo:1.0");

        let odd = InstalledRecord::parse("foo:/srv/a:b/foo:2.0").unwrap();
        assert_eq!(odd.path, PathBuf::from("/srv/a:b/foo"));
        assert_eq!(odd.version, "2.0");

        assert!(InstalledRecord::parse("garbage").is_none());
        assert!(InstalledRecord::parse("foo:1.0").is_none());
        assert!(InstalledRecord::parse(":/opt/foo:1.0").is_none());
    }

    #[test]
    fn test_missing_log_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let state = InstalledState::load_from(temp_dir.path().join("installed.file")).unwrap();
        assert_eq!(state.records().count(), 0);
    }

    #[test]
    fn test_remove_keeps_order_of_remaining_lines() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log = temp_dir.path().join("installed.file");
        fs::write(&log, "foo:/opt/foo:1.0\n# hand edited\nbar:/opt/bar:2.0\nbaz:/opt/baz:3.0\n").unwrap();

        let mut state = InstalledState::load_from(&log).unwrap();
        let removed = state.remove("foo").unwrap();
        assert_eq!(removed.path, PathBuf::from("/opt/foo"));
        assert!(state.remove("foo").is_none());
        state.save().unwrap();

        assert_eq!(
            fs::read_to_string(&log).unwrap(),
            "# hand edited\nbar:/opt/bar:2.0\nbaz:/opt/baz:3.0\n"
        );
    }

    #[test]
    fn test_insert_rejects_duplicate_names() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut state = InstalledState::load_from(temp_dir.path().join("installed.file")).unwrap();

        state.insert(InstalledRecord::new("demo", "/w/installed/demo", "1.0")).unwrap();
        let again = state.insert(InstalledRecord::new("demo", "/w/installed/demo", "2.0"));
        assert!(matches!(again, Err(Error::AlreadyInstalled(name)) if name == "demo"));
        assert_eq!(state.records().count(), 1);
    }

    #[test]
    fn test_save_creates_missing_directories() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log = temp_dir.path().join("var/lib/cpkg/installed.file");
        let mut state = InstalledState::load_from(&log).unwrap();
        state.insert(InstalledRecord::new("demo", "/x", "1.0")).unwrap();
        state.save().unwrap();

        let reloaded = InstalledState::load_from(&log).unwrap();
        assert_eq!(reloaded.find("demo").unwrap().version, "1.0");
    }

    #[test]
    fn test_resolve_and_list_include_directory_only_packages() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = Config::new(temp_dir.path());
        fs::create_dir_all(config.package_dir("orphan")).unwrap();
        fs::create_dir_all(config.package_dir("logged")).unwrap();

        let mut state = InstalledState::load(&config).unwrap();
        state
            .insert(InstalledRecord::new("logged", config.package_dir("logged"), "1.2"))
            .unwrap();

        let orphan = resolve_installed(&config, &state, "orphan").unwrap();
        assert_eq!(orphan.version, UNKNOWN_VERSION);
        assert_eq!(resolve_installed(&config, &state, "logged").unwrap().version, "1.2");
        assert!(resolve_installed(&config, &state, "absent").is_none());

        let names: Vec<String> = list_installed(&config, &state)
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["logged".to_string(), "orphan".to_string()]);
    }

    #[test]
    fn test_file_list_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = Config::new(temp_dir.path());

        assert!(read_file_list(&config, "demo").unwrap().is_empty());

        let files = vec![PathBuf::from("/usr/include/demo.h"), PathBuf::from("/usr/lib/libdemo.a")];
        write_file_list(&config, "demo", &files).unwrap();
        assert_eq!(read_file_list(&config, "demo").unwrap(), files);

        remove_file_list(&config, "demo").unwrap();
        remove_file_list(&config, "demo").unwrap();
        assert!(!config.file_list_path("demo").exists());
    }
}
