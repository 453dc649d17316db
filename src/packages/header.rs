// src/packages/header.rs

//! Fixed-size package header
//!
//! On disk the header is a packed sequence of fixed-width fields:
//!
//! | field                 | bytes |
//! |-----------------------|-------|
//! | magic `CPK\x01`       | 4     |
//! | SHA-256 of payload    | 64    |
//! | payload length (LE)   | 8     |
//! | name                  | 256   |
//! | version               | 64    |
//! | description           | 1024  |
//! | homepage              | 256   |
//! | author                | 256   |
//! | license               | 128   |
//! | include install path  | 512   |
//! | lib install path      | 512   |
//!
//! Text fields are UTF-8, NUL-padded, and always keep at least one
//! terminating NUL. Values that do not fit are rejected, never truncated.

use crate::control::{check_identifier, Manifest};
use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;

/// Format identifier; the last byte is the format version
pub const MAGIC: [u8; 4] = *b"CPK\x01";

/// Length of the lowercase hex SHA-256 digest
pub const HASH_LEN: usize = 64;

const PAYLOAD_LEN_SIZE: usize = 8;
const NAME_LEN: usize = 256;
const VERSION_LEN: usize = 64;
const DESCRIPTION_LEN: usize = 1024;
const HOMEPAGE_LEN: usize = 256;
const AUTHOR_LEN: usize = 256;
const LICENSE_LEN: usize = 128;
const PATH_LEN: usize = 512;

/// Total header size; identical for every package of this format version
pub const HEADER_SIZE: usize = MAGIC.len()
    + HASH_LEN
    + PAYLOAD_LEN_SIZE
    + NAME_LEN
    + VERSION_LEN
    + DESCRIPTION_LEN
    + HOMEPAGE_LEN
    + AUTHOR_LEN
    + LICENSE_LEN
    + PATH_LEN * 2;

/// Install directory used when a package does not declare one
pub const DEFAULT_INCLUDE_DIR: &str = "/usr/include";
pub const DEFAULT_LIB_DIR: &str = "/usr/lib";

/// Decoded package header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageHeader {
    /// Lowercase hex SHA-256 of the payload; empty until finalized
    pub hash: String,
    /// Exact payload size in bytes
    pub payload_len: u64,
    pub name: String,
    pub version: String,
    pub description: String,
    pub homepage: String,
    pub author: String,
    pub license: String,
    pub include_install_path: String,
    pub lib_install_path: String,
}

impl PackageHeader {
    /// Copy the scalar manifest fields into a header
    ///
    /// Field capacities are checked here so an over-long value fails before
    /// any payload is produced.
    pub fn from_manifest(manifest: &Manifest) -> Result<Self> {
        let header = Self {
            hash: String::new(),
            payload_len: 0,
            name: manifest.name.clone(),
            version: manifest.version.clone(),
            description: manifest.description.clone(),
            homepage: manifest.homepage.clone(),
            author: manifest.author.clone(),
            license: manifest.license.clone(),
            include_install_path: manifest.include_install_path.clone(),
            lib_install_path: manifest.lib_install_path.clone(),
        };
        for (what, value, capacity) in header.text_fields() {
            check_capacity(what, value, capacity)?;
        }
        Ok(header)
    }

    /// Record the digest and size of `payload`
    pub fn finalize(mut self, payload: &[u8]) -> Result<Self> {
        let digest = super::sha256_hex(payload);
        if digest.len() != HASH_LEN {
            return Err(Error::Format(format!(
                "digest has {} hex digits, expected {}",
                digest.len(),
                HASH_LEN
            )));
        }
        self.hash = digest;
        self.payload_len = payload.len() as u64;
        Ok(self)
    }

    /// Package name and version must be usable before installing
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

    /// Declared include directory, or the default
    pub fn include_dir(&self) -> &str {
        non_empty_or(&self.include_install_path, DEFAULT_INCLUDE_DIR)
    }

    /// Declared lib directory, or the default
    pub fn lib_dir(&self) -> &str {
        non_empty_or(&self.lib_install_path, DEFAULT_LIB_DIR)
    }

    /// Serialize to exactly `HEADER_SIZE` bytes
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.hash.len() != HASH_LEN || !is_lower_hex(&self.hash) {
            return Err(Error::Validation(
                "header hash must be finalized before encoding".to_string(),
            ));
        }

        let mut out = Vec::with_capacity(HEADER_SIZE);
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(self.hash.as_bytes());
        out.extend_from_slice(&self.payload_len.to_le_bytes());
        for (what, value, capacity) in self.text_fields() {
            put_field(&mut out, what, value, capacity)?;
        }

        debug_assert_eq!(out.len(), HEADER_SIZE);
        Ok(out)
    }

    /// Parse a header from exactly `HEADER_SIZE` bytes
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MAGIC.len() || bytes[..MAGIC.len()] != MAGIC {
            let mut found = [0u8; 4];
            let n = bytes.len().min(4);
            found[..n].copy_from_slice(&bytes[..n]);
            return Err(Error::BadMagic { found });
        }
        if bytes.len() < HEADER_SIZE {
            return Err(Error::Truncated {
                expected: HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }
        if bytes.len() > HEADER_SIZE {
            return Err(Error::Format(format!(
                "header is {} bytes, expected {}",
                bytes.len(),
                HEADER_SIZE
            )));
        }

        let mut fields = FieldReader {
            rest: &bytes[MAGIC.len()..],
        };

        let hash_bytes = fields.take(HASH_LEN);
        let hash = std::str::from_utf8(hash_bytes)
            .ok()
            .filter(|h| is_lower_hex(h))
            .ok_or_else(|| Error::Format("header hash is not lowercase hex".to_string()))?
            .to_string();

        let mut len_bytes = [0u8; PAYLOAD_LEN_SIZE];
        len_bytes.copy_from_slice(fields.take(PAYLOAD_LEN_SIZE));
        let payload_len = u64::from_le_bytes(len_bytes);

        Ok(Self {
            hash,
            payload_len,
            name: fields.text("name", NAME_LEN)?,
            version: fields.text("version", VERSION_LEN)?,
            description: fields.text("description", DESCRIPTION_LEN)?,
            homepage: fields.text("homepage", HOMEPAGE_LEN)?,
            author: fields.text("author", AUTHOR_LEN)?,
            license: fields.text("license", LICENSE_LEN)?,
            include_install_path: fields.text("include install path", PATH_LEN)?,
            lib_install_path: fields.text("lib install path", PATH_LEN)?,
        })
    }

    fn text_fields(&self) -> [(&'static str, &str, usize); 8] {
        [
            ("name", &self.name, NAME_LEN),
            ("version", &self.version, VERSION_LEN),
            ("description", &self.description, DESCRIPTION_LEN),
            ("homepage", &self.homepage, HOMEPAGE_LEN),
            ("author", &self.author, AUTHOR_LEN),
            ("license", &self.license, LICENSE_LEN),
            ("include install path", &self.include_install_path, PATH_LEN),
            ("lib install path", &self.lib_install_path, PATH_LEN),
        ]
    }
}

impl fmt::Display for PackageHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Package: {}", self.name)?;
        writeln!(f, "Version: {}", self.version)?;
        writeln!(f, "Description: {}", self.description)?;
        writeln!(f, "Homepage: {}", self.homepage)?;
        writeln!(f, "Author: {}", self.author)?;
        writeln!(f, "License: {}", self.license)?;
        writeln!(f, "Include path: {}", self.include_dir())?;
        writeln!(f, "Lib path: {}", self.lib_dir())?;
        writeln!(f, "Payload: {} bytes", self.payload_len)?;
        write!(f, "SHA-256: {}", self.hash)
    }
}

struct FieldReader<'a> {
    rest: &'a [u8],
}

impl<'a> FieldReader<'a> {
    fn take(&mut self, len: usize) -> &'a [u8] {
        let (field, rest) = self.rest.split_at(len);
        self.rest = rest;
        field
    }

    fn text(&mut self, what: &str, capacity: usize) -> Result<String> {
        let raw = self.take(capacity);
        let end = raw.iter().position(|b| *b == 0).ok_or_else(|| {
            Error::Format(format!("header field '{}' is not NUL-terminated", what))
        })?;
        String::from_utf8(raw[..end].to_vec())
            .map_err(|_| Error::Format(format!("header field '{}' is not valid UTF-8", what)))
    }
}

fn check_capacity(what: &str, value: &str, capacity: usize) -> Result<()> {
    if value.len() >= capacity {
        return Err(Error::Validation(format!(
            "{} is {} bytes; the package format allows at most {}",
            what,
            value.len(),
            capacity - 1
        )));
    }
    if value.as_bytes().contains(&0) {
        return Err(Error::Validation(format!("{} contains a NUL byte", what)));
    }
    Ok(())
}

fn put_field(out: &mut Vec<u8>, what: &str, value: &str, capacity: usize) -> Result<()> {
    check_capacity(what, value, capacity)?;
    out.extend_from_slice(value.as_bytes());
    out.resize(out.len() + capacity - value.len(), 0);
    Ok(())
}

fn is_lower_hex(s: &str) -> bool {
    s.len() == HASH_LEN && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn non_empty_or<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() { default } else { value }
}
