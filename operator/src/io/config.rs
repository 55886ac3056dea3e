//! Operator configuration stored under `.operator/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = ".operator/config.toml";

/// Operator configuration (TOML).
///
/// Intended to be edited by humans. Missing fields fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OperatorConfig {
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub retry: RetryConfig,
    pub state: StateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the service exposing `/api/session` and `/api/agent`.
    pub base_url: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            request_timeout_secs: 120,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// IANA timezone sent when opening a session. Falls back to `TZ`, then UTC.
    pub timezone: Option<String>,

    /// Viewer URL prefix to replace. Empty disables the rewrite.
    pub viewer_rewrite_from: String,

    pub viewer_rewrite_to: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timezone: None,
            viewer_rewrite_from: "https://www.browserbase.com/devtools-fullscreen/inspector.html"
                .to_string(),
            viewer_rewrite_to: "https://www.browserbase.com/devtools-internal-compiled/index.html"
                .to_string(),
        }
    }
}

impl SessionConfig {
    pub fn resolved_timezone(&self) -> String {
        resolve_timezone(self.timezone.as_deref(), std::env::var("TZ").ok().as_deref())
    }
}

fn resolve_timezone(configured: Option<&str>, env_tz: Option<&str>) -> String {
    configured
        .or(env_tz)
        .map(str::trim)
        .filter(|tz| !tz.is_empty())
        .unwrap_or("UTC")
        .to_string()
}

/// Bounded retry for transient API failures. `max_retries = 0` disables it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Fraction of the delay randomized in both directions (0.0..=1.0).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            jitter_factor: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StateConfig {
    /// Where the provider context id is persisted between runs.
    pub context_path: PathBuf,

    /// Directory receiving one transcript directory per run.
    pub runs_dir: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            context_path: PathBuf::from(".operator/context.json"),
            runs_dir: PathBuf::from(".operator/runs"),
        }
    }
}

impl OperatorConfig {
    pub fn validate(&self) -> Result<()> {
        let base_url = self.api.base_url.trim();
        if base_url.is_empty() {
            return Err(anyhow!("api.base_url must be non-empty"));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(anyhow!("api.base_url must start with http:// or https://"));
        }
        if self.api.request_timeout_secs == 0 {
            return Err(anyhow!("api.request_timeout_secs must be > 0"));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(anyhow!("retry.base_delay_ms must be <= retry.max_delay_ms"));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(anyhow!("retry.jitter_factor must be within 0.0..=1.0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `OperatorConfig::default()`.
pub fn load_config(path: &Path) -> Result<OperatorConfig> {
    if !path.exists() {
        let cfg = OperatorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: OperatorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &OperatorConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}
