// src/lib.rs

//! cpkg Package Manager
//!
//! Minimal package manager for C headers and libraries. It builds packages
//! from a source tree described by a `CPKG/control` file, installs and
//! removes them, and fetches them by name from a remote index.
//!
//! # Architecture
//!
//! - Single-file packages: fixed-size header followed by a tar.gz payload
//! - Verify before touching disk: header, length and SHA-256 are checked
//!   before anything is extracted
//! - Plain-text state: installed packages live in a `name:path:version` log
//!   that is only ever replaced atomically, under an exclusive lock
//! - Untrusted paths: archive entries and declared install paths are always
//!   confined to their configured roots

pub mod builder;
pub mod config;
pub mod control;
mod error;
pub mod filesystem;
pub mod install;
pub mod packages;
pub mod prompt;
pub mod remove;
pub mod repository;
pub mod state;

pub use builder::{build_package, BuildOutcome, BuildResult};
pub use config::Config;
pub use error::{BuildStage, Error, Result};
pub use install::{install_package, InstallReport};
pub use remove::{remove_package, RemoveOutcome};
