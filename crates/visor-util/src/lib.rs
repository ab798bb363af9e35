//! Shared utilities for visor.
//!
//! Cross-cutting concerns used by the other visor crates: the top-level
//! error type, filesystem helpers, SHA-256 hashing, external process
//! spawning, and terminal status output.

pub mod errors;
pub mod fs;
pub mod hash;
pub mod process;
pub mod progress;

use std::path::{Path, PathBuf};

/// Returns the path to the visor data directory (`~/.visor/`).
pub fn dirs_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".visor")
}
