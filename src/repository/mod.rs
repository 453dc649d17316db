// src/repository/mod.rs

//! Remote index lookup and package downloading
//!
//! This module provides functionality for:
//! - Fetching and searching the package index
//! - Downloading packages with timeout and retry support
//! - Verifying downloaded packages against the index hash
//! - Installing a package by name straight from the index

pub mod index;

pub use index::{RepoIndex, RepoIndexEntry};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::install::{self, InstallReport};
use crate::packages::{self, HASH_LEN};
use reqwest::blocking::{Client, Response};
use std::fs::{self, File};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Retry delay in milliseconds, multiplied by the attempt number
const RETRY_DELAY_MS: u64 = 1000;

const FILE_SCHEME: &str = "file://";

/// Prefix of the temporary file used by `install_by_name`
const DOWNLOAD_PREFIX: &str = "cpkg_download_";

/// Source of index documents and package files
pub trait Transport {
    /// Fetch a small document into memory
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;

    /// Stream `url` to `dest`, replacing it only once complete
    fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

/// HTTP(S) transport with retry support; `file://` URLs read local files
pub struct HttpTransport {
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration, max_retries: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cpkg/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: max_retries.max(1),
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.http_timeout, config.max_retries)
    }

    /// Run `op`, retrying transient failures with linear backoff
    fn with_retries<T>(&self, url: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    warn!("Attempt {} for {} failed: {}, retrying...", attempt, url, e);
                    std::thread::sleep(self.retry_delay * attempt);
                }
                Err(e) => {
                    if attempt > 1 {
                        warn!("Giving up on {} after {} attempts", url, attempt);
                    }
                    return Err(e);
                }
            }
        }
    }

    fn get(&self, url: &str) -> Result<Response> {
        let response = self.client.get(url).send().map_err(|e| classify(url, e))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(Error::NetworkUnavailable(format!("HTTP {} from {}", status, url)));
        }
        if !status.is_success() {
            return Err(Error::Network(format!("HTTP {} from {}", status, url)));
        }
        Ok(response)
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if let Some(path) = url.strip_prefix(FILE_SCHEME) {
            return read_local(path);
        }

        info!("Fetching {}", url);
        self.with_retries(url, || {
            let response = self.get(url)?;
            let bytes = response.bytes().map_err(|e| classify(url, e))?;
            Ok(bytes.to_vec())
        })
    }

    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        info!("Downloading {} to {}", url, dest.display());

        let dir = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        crate::filesystem::create_dir_all(&dir)?;

        if let Some(path) = url.strip_prefix(FILE_SCHEME) {
            fs::copy(path, dest).map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    Error::NotFound(format!("Local package {}", path))
                } else {
                    Error::IoError(format!("Failed to copy {} to {}: {}", path, dest.display(), e))
                }
            })?;
            return Ok(());
        }

        self.with_retries(url, || {
            let mut response = self.get(url)?;

            // Write to a temporary file first, then move it into place
            let mut temp = NamedTempFile::new_in(&dir).map_err(|e| {
                Error::IoError(format!("Failed to create file in {}: {}", dir.display(), e))
            })?;
            io::copy(&mut response, &mut temp).map_err(|e| {
                Error::NetworkUnavailable(format!("Download of {} interrupted: {}", url, e))
            })?;

            temp.persist(dest).map_err(|e| {
                Error::IoError(format!("Failed to move download to {}: {}", dest.display(), e.error))
            })?;
            Ok(())
        })?;

        info!("Successfully downloaded to {}", dest.display());
        Ok(())
    }
}

fn classify(url: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::NetworkTimeout(format!("{}: {}", url, e))
    } else if e.is_connect() || e.is_request() || e.is_body() {
        Error::NetworkUnavailable(format!("{}: {}", url, e))
    } else {
        Error::Network(format!("{}: {}", url, e))
    }
}

fn read_local(path: &str) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            Error::NotFound(format!("Local file {}", path))
        } else {
            Error::IoError(format!("Failed to read {}: {}", path, e))
        }
    })
}

/// Package index client
pub struct Repository<T> {
    transport: T,
    index_url: String,
}

impl Repository<HttpTransport> {
    /// Repository using the HTTP transport and index URL from `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(HttpTransport::from_config(config)?, &config.index_url))
    }
}

impl<T: Transport> Repository<T> {
    pub fn new(transport: T, index_url: impl Into<String>) -> Self {
        Self {
            transport,
            index_url: index_url.into(),
        }
    }

    pub fn index_url(&self) -> &str {
        &self.index_url
    }

    /// Download and parse the index
    pub fn fetch_index(&self) -> Result<RepoIndex> {
        let bytes = self.transport.fetch(&self.index_url)?;
        let index = RepoIndex::parse(&String::from_utf8_lossy(&bytes));
        debug!("Index {} lists {} packages", self.index_url, index.len());
        Ok(index)
    }

    /// Index entries whose line contains `query`
    pub fn search(&self, query: &str) -> Result<Vec<RepoIndexEntry>> {
        let index = self.fetch_index()?;
        Ok(index.search(query).into_iter().cloned().collect())
    }

    /// Download package `name` to `dest` and check it against the index hash
    ///
    /// On a hash mismatch `dest` is deleted. Entries without a hash are
    /// downloaded unverified, with a warning.
    pub fn fetch_by_name(&self, name: &str, dest: &Path) -> Result<RepoIndexEntry> {
        let index = self.fetch_index()?;
        let entry = index
            .find(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Package '{}' in index {}", name, self.index_url)))?;

        let expected = entry
            .sha256
            .as_deref()
            .map(|hash| normalize_hash(name, hash))
            .transpose()?;

        self.transport.download(&entry.url, dest)?;

        match expected {
            Some(expected) => {
                if let Err(e) = verify_file(dest, &expected) {
                    if let Err(rm) = fs::remove_file(dest) {
                        warn!("Failed to remove {}: {}", dest.display(), rm);
                    }
                    return Err(e);
                }
                debug!("Checksum verified: {}", expected);
            }
            None => warn!("Index has no hash for {}; download not verified", name),
        }

        info!("Fetched {} {} to {}", entry.name, entry.version, dest.display());
        Ok(entry)
    }

    /// Fetch package `name` into a temporary file and install it
    ///
    /// The temporary file is removed whatever the install outcome.
    pub fn install_by_name(&self, config: &Config, name: &str) -> Result<InstallReport> {
        let temp_path = tempfile::Builder::new()
            .prefix(DOWNLOAD_PREFIX)
            .suffix(&format!(".{}", packages::PACKAGE_EXTENSION))
            .tempfile()
            .map_err(|e| Error::IoError(format!("Failed to create download file: {}", e)))?
            .into_temp_path();

        let result = self
            .fetch_by_name(name, &temp_path)
            .and_then(|_| install::install_package(config, &temp_path));

        let path = temp_path.to_path_buf();
        if let Err(e) = temp_path.close()
            && e.kind() != ErrorKind::NotFound
        {
            warn!("Failed to remove {}: {}", path.display(), e);
        }

        result
    }
}

fn normalize_hash(name: &str, hash: &str) -> Result<String> {
    let hash = hash.to_ascii_lowercase();
    if hash.len() != HASH_LEN || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::Validation(format!(
            "index hash for '{}' is not a {}-digit hex SHA-256: {}",
            name, HASH_LEN, hash
        )));
    }
    Ok(hash)
}

/// Verify file checksum matches the expected value
fn verify_file(path: &Path, expected: &str) -> Result<()> {
    debug!("Verifying checksum for {}", path.display());

    let mut file = File::open(path)
        .map_err(|e| Error::IoError(format!("Failed to open file for checksum: {}", e)))?;
    let (actual, _) = packages::sha256_reader(&mut file)
        .map_err(|e| Error::IoError(format!("Failed to read file for checksum: {}", e)))?;

    if actual != expected {
        return Err(Error::HashMismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}
