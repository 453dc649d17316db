// src/filesystem/mod.rs

//! Filesystem primitives used by every lifecycle operation
//!
//! - `ops`: directory creation, recursive deletion, single-file copy
//! - `path`: sanitising untrusted paths before they touch the filesystem

pub mod ops;
pub mod path;

pub use ops::{copy_file, create_dir_all, remove_tree};
pub use path::{safe_join, sanitize_path};
