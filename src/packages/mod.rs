// src/packages/mod.rs

//! Package format support for cpkg
//!
//! A package file is a fixed-size header followed by a gzip-compressed tar
//! payload. This module provides the header codec, payload packing and
//! unpacking, and artifact-level reading, writing and verification.

pub mod archive;
pub mod artifact;
pub mod header;

pub use archive::{pack_dir, unpack_into, UnpackSummary};
pub use artifact::{read_header, verify_payload_hash, write_artifact, Artifact};
pub use header::{PackageHeader, DEFAULT_INCLUDE_DIR, DEFAULT_LIB_DIR, HASH_LEN, HEADER_SIZE, MAGIC};

use crate::control::Manifest;
use crate::error::Result;
use sha2::{Digest, Sha256};
use std::io::{self, Read};

/// File extension of built packages
pub const PACKAGE_EXTENSION: &str = "cpk";

/// Build an unfinalized header from a validated manifest
pub fn build_header(manifest: &Manifest) -> Result<PackageHeader> {
    PackageHeader::from_manifest(manifest)
}

/// Fill in the payload digest and length
pub fn finalize_hash(header: PackageHeader, payload: &[u8]) -> Result<PackageHeader> {
    header.finalize(payload)
}

/// Lowercase hex SHA-256 of an in-memory buffer
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Stream `reader` through SHA-256, returning the digest and byte count
pub fn sha256_reader<R: Read>(reader: &mut R) -> io::Result<(String, u64)> {
    let mut hasher = Sha256::new();
    let count = io::copy(reader, &mut hasher)?;
    Ok((format!("{:x}", hasher.finalize()), count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_known_value() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_sha256_reader_matches_buffer() {
        let data = vec![7u8; 200_000];
        let (digest, count) = sha256_reader(&mut data.as_slice()).unwrap();
        assert_eq!(digest, sha256_hex(&data));
        assert_eq!(count, 200_000);
    }
}
