//! Run transcripts under `<runs_dir>/<run_id>/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::types::{Phase, Step};
use crate::error::Failure;

/// Fresh run id: `run-<UTC timestamp>-<8 hex>`.
pub fn new_run_id(now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("run-{}-{}", now.format("%Y%m%dT%H%M%SZ"), &suffix[..8])
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub run_id: String,
    pub goal: String,
    pub session_id: Option<String>,
    pub phase: Phase,
    pub failure: Option<Failure>,
    pub step_count: usize,
    pub started_at: String,
    pub ended_at: String,
    pub duration_ms: u64,
}

impl RunMeta {
    pub fn new(run_id: &str, goal: &str, started: DateTime<Utc>, ended: DateTime<Utc>) -> Self {
        Self {
            run_id: run_id.to_string(),
            goal: goal.to_string(),
            session_id: None,
            phase: Phase::Idle,
            failure: None,
            step_count: 0,
            started_at: started.to_rfc3339(),
            ended_at: ended.to_rfc3339(),
            duration_ms: (ended - started).num_milliseconds().max(0) as u64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranscriptPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub steps_path: PathBuf,
}

impl TranscriptPaths {
    pub fn new(runs_dir: &Path, run_id: &str) -> Self {
        let dir = runs_dir.join(run_id);
        Self {
            meta_path: dir.join("meta.json"),
            steps_path: dir.join("steps.json"),
            dir,
        }
    }
}

pub fn write_transcript(
    runs_dir: &Path,
    meta: &RunMeta,
    steps: &[Step],
) -> Result<TranscriptPaths> {
    let paths = TranscriptPaths::new(runs_dir, &meta.run_id);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create run dir {}", paths.dir.display()))?;

    // Meta first, then steps.
    write_json(&paths.meta_path, meta)?;
    write_json(&paths.steps_path, &steps)?;
    Ok(paths)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}
