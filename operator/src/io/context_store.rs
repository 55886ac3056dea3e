//! Provider context id persisted between invocations (`.operator/context.json`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Last provider context handed out by the session gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextState {
    pub context_id: String,
    /// RFC 3339 timestamp of the write.
    pub updated_at: String,
}

impl ContextState {
    pub fn now(context_id: impl Into<String>) -> Self {
        Self {
            context_id: context_id.into(),
            updated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Load the stored context, `None` if nothing has been stored yet.
pub fn load_context(path: &Path) -> Result<Option<ContextState>> {
    if !path.exists() {
        return Ok(None);
    }
    debug!(path = %path.display(), "loading context state");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read context {}", path.display()))?;
    let state: ContextState = serde_json::from_str(&contents)
        .with_context(|| format!("parse context {}", path.display()))?;
    Ok(Some(state))
}

/// Atomically write the context state (temp file + rename).
pub fn write_context(path: &Path, state: &ContextState) -> Result<()> {
    debug!(path = %path.display(), context_id = %state.context_id, "writing context state");
    let mut buf = serde_json::to_string_pretty(state)?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

/// Forget the stored context. Returns whether anything was removed.
pub fn clear_context(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_file(path).with_context(|| format!("remove context {}", path.display()))?;
    Ok(true)
}
