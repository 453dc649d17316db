// src/packages/artifact.rs

//! Reading, writing and verifying package files

use super::header::{PackageHeader, HEADER_SIZE, MAGIC};
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Write `header` followed by `payload` to `out_path`
///
/// The file is assembled next to its destination and renamed into place, so
/// `out_path` is either the complete artifact or untouched.
pub fn write_artifact(header: &PackageHeader, payload: &[u8], out_path: &Path) -> Result<()> {
    if header.payload_len != payload.len() as u64 {
        return Err(Error::Validation(format!(
            "header records {} payload bytes but {} were supplied",
            header.payload_len,
            payload.len()
        )));
    }
    let encoded = header.encode()?;

    let dir = match out_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir).map_err(|e| {
        Error::IoError(format!("Failed to create temporary file in {}: {}", dir.display(), e))
    })?;

    let write_result = temp
        .write_all(&encoded)
        .and_then(|_| temp.write_all(payload))
        .and_then(|_| temp.flush())
        .and_then(|_| temp.as_file().sync_all());
    write_result.map_err(|e| {
        Error::IoError(format!("Failed to write package {}: {}", out_path.display(), e))
    })?;

    temp.persist(out_path).map_err(|e| {
        Error::IoError(format!("Failed to move package into {}: {}", out_path.display(), e.error))
    })?;

    info!(
        "Wrote {} ({} byte header, {} byte payload)",
        out_path.display(),
        HEADER_SIZE,
        payload.len()
    );
    Ok(())
}

/// Read and decode the header at the current position of `reader`
///
/// A short read that already shows the wrong magic reports `BadMagic`
/// rather than `Truncated`.
pub fn read_header<R: Read>(reader: &mut R) -> Result<PackageHeader> {
    let mut buf = vec![0u8; HEADER_SIZE];
    let mut filled = 0;
    while filled < HEADER_SIZE {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::IoError(format!("Failed to read package header: {}", e))),
        }
    }

    if filled >= MAGIC.len() && buf[..MAGIC.len()] != MAGIC {
        let mut found = [0u8; 4];
        found.copy_from_slice(&buf[..MAGIC.len()]);
        return Err(Error::BadMagic { found });
    }
    if filled < HEADER_SIZE {
        return Err(Error::Truncated {
            expected: HEADER_SIZE as u64,
            actual: filled as u64,
        });
    }

    PackageHeader::decode(&buf)
}

/// Hash everything `reader` yields and compare it with the header
///
/// The reader must be positioned at the start of the payload. Fewer bytes
/// than `payload_len` is `Truncated`; more is a format error.
pub fn verify_payload_hash<R: Read>(reader: &mut R, header: &PackageHeader) -> Result<()> {
    let (actual, count) = super::sha256_reader(reader)
        .map_err(|e| Error::IoError(format!("Failed to read package payload: {}", e)))?;

    if count < header.payload_len {
        return Err(Error::Truncated {
            expected: header.payload_len,
            actual: count,
        });
    }
    if count > header.payload_len {
        return Err(Error::Format(format!(
            "{} bytes of trailing data after payload",
            count - header.payload_len
        )));
    }
    if actual != header.hash {
        return Err(Error::HashMismatch {
            expected: header.hash.clone(),
            actual,
        });
    }

    debug!("Payload hash verified: {}", actual);
    Ok(())
}

/// An opened package file with its decoded header
#[derive(Debug)]
pub struct Artifact {
    pub path: PathBuf,
    pub header: PackageHeader,
    file: File,
}

impl Artifact {
    /// Open a package file and decode its header
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path = path.canonicalize().map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::NotFound(format!("Package file {}", path.display()))
            } else {
                Error::IoError(format!("Failed to resolve {}: {}", path.display(), e))
            }
        })?;

        let mut file = File::open(&path)
            .map_err(|e| Error::IoError(format!("Failed to open {}: {}", path.display(), e)))?;
        let header = read_header(&mut file)?;

        Ok(Self { path, header, file })
    }

    /// Check the file size against the header, then the payload hash
    ///
    /// Nothing is written anywhere; a corrupt package is rejected before any
    /// install step touches the filesystem.
    pub fn verify(&mut self) -> Result<()> {
        let expected = HEADER_SIZE as u64 + self.header.payload_len;
        let actual = self
            .file
            .metadata()
            .map_err(|e| Error::IoError(format!("Failed to stat {}: {}", self.path.display(), e)))?
            .len();
        if actual < expected {
            return Err(Error::Truncated { expected, actual });
        }

        self.seek_payload()?;
        verify_payload_hash(&mut self.file, &self.header)
    }

    /// Reader over exactly the payload bytes
    pub fn payload(&mut self) -> Result<io::Take<&mut File>> {
        self.seek_payload()?;
        Ok((&mut self.file).take(self.header.payload_len))
    }

    fn seek_payload(&mut self) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(HEADER_SIZE as u64))
            .map_err(|e| Error::IoError(format!("Failed to seek in {}: {}", self.path.display(), e)))?;
        Ok(())
    }
}
