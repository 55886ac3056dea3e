//! I/O helpers: HTTP clients for the remote services and on-disk state.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

pub mod api;
pub mod config;
pub mod context_store;
pub mod executor;
pub mod gateway;
pub mod planner;
pub mod retry;
pub mod transcript;
pub mod wire;

/// Write `contents` to `path` via a sibling temp file and rename.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents).with_context(|| format!("write temp {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
