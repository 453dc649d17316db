// src/repository/index.rs

//! Remote package index
//!
//! The index is a text document with one package per line:
//!
//! ```text
//! demo|1.0|https://mirror.example/cpkg/demo-1.0.cpk|<sha256 hex>
//! ```
//!
//! The hash field is optional. Lines with fewer than three fields, or an
//! empty name or URL, are skipped.

use serde::Serialize;
use tracing::debug;

const FIELD_SEPARATOR: char = '|';

/// One package listed in the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoIndexEntry {
    pub name: String,
    pub version: String,
    pub url: String,
    /// Expected SHA-256 of the package file, as written in the index
    pub sha256: Option<String>,
}

impl RepoIndexEntry {
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.trim().split(FIELD_SEPARATOR).map(str::trim);
        let name = fields.next()?;
        let version = fields.next()?;
        let url = fields.next()?;
        let sha256 = fields.next().filter(|h| !h.is_empty());

        if name.is_empty() || url.is_empty() {
            return None;
        }

        Some(Self {
            name: name.to_string(),
            version: version.to_string(),
            url: url.to_string(),
            sha256: sha256.map(str::to_string),
        })
    }
}

/// Parsed index, in document order
#[derive(Debug, Clone, Default)]
pub struct RepoIndex {
    lines: Vec<(String, RepoIndexEntry)>,
}

impl RepoIndex {
    pub fn parse(text: &str) -> Self {
        let mut lines = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match RepoIndexEntry::parse(line) {
                Some(entry) => lines.push((line.to_string(), entry)),
                None => debug!("Skipping malformed index line: {}", line),
            }
        }
        Self { lines }
    }

    pub fn entries(&self) -> impl Iterator<Item = &RepoIndexEntry> {
        self.lines.iter().map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// First entry named exactly `name`
    pub fn find(&self, name: &str) -> Option<&RepoIndexEntry> {
        self.entries().find(|entry| entry.name == name)
    }

    /// Entries whose index line contains `query`
    pub fn search(&self, query: &str) -> Vec<&RepoIndexEntry> {
        self.lines
            .iter()
            .filter(|(line, _)| line.contains(query))
            .map(|(_, entry)| entry)
            .collect()
    }
}
