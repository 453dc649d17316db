// src/config.rs

//! Process-wide settings shared by every lifecycle operation
//!
//! Installation targets are always derived from these values, never from
//! fields read out of a package header.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the remote index location
pub const INDEX_URL_ENV: &str = "CPKG_INDEX_URL";

/// Environment variable overriding the installation prefix
pub const ROOT_ENV: &str = "CPKG_ROOT";

/// Environment variable overriding the state directory
pub const WORK_DIR_ENV: &str = "CPKG_WORK_DIR";

/// Index used when no override is configured
pub const DEFAULT_INDEX_URL: &str = "https://example.com/cpkg/index.txt";

/// State directory relative to the installation prefix
pub const DEFAULT_WORK_DIR: &str = "var/lib/cpkg";

/// Default timeout for HTTP requests (30 seconds)
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum attempts for a transient network failure
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const INSTALL_DIR: &str = "installed";
const INSTALLED_LOG_FILE: &str = "installed.file";
const INFO_DIR: &str = "info";
const LOCK_FILE: &str = "cpkg.lock";

#[derive(Debug, Clone)]
pub struct Config {
    /// Prefix under which declared install paths are deployed
    pub root: PathBuf,
    /// Directory holding unpacked packages and installed-state bookkeeping
    pub work_dir: PathBuf,
    pub index_url: String,
    pub http_timeout: Duration,
    pub max_retries: u32,
    /// Refuse privileged operations unless running as root
    pub require_root: bool,
}

impl Config {
    /// Configuration rooted at `root`, with the state directory inside it
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let work_dir = root.join(DEFAULT_WORK_DIR);
        Self {
            root,
            work_dir,
            index_url: DEFAULT_INDEX_URL.to_string(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            require_root: true,
        }
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_index_url(mut self, url: impl Into<String>) -> Self {
        self.index_url = url.into();
        self
    }

    /// Directory packages are unpacked into, one subdirectory per package
    pub fn install_dir(&self) -> PathBuf {
        self.work_dir.join(INSTALL_DIR)
    }

    /// Unpacked tree of a single package
    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.install_dir().join(name)
    }

    /// Installed-state log (`name:path:version` per line)
    pub fn log_path(&self) -> PathBuf {
        self.work_dir.join(INSTALLED_LOG_FILE)
    }

    /// Directory holding per-package deployed file lists
    pub fn info_dir(&self) -> PathBuf {
        self.work_dir.join(INFO_DIR)
    }

    pub fn file_list_path(&self, name: &str) -> PathBuf {
        self.info_dir().join(format!("{}.list", name))
    }

    pub fn lock_path(&self) -> PathBuf {
        self.work_dir.join(LOCK_FILE)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("/")
    }
}
