//! smsgate configuration loader.

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote_command: RemoteCommandConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Settings the pipeline reads once per inbound command. The management
/// surface writes the file; the pipeline only ever sees a cloned snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteCommandConfig {
    /// Master switch. Off by default: nobody can trigger sends until it is
    /// explicitly enabled.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_hourly_cap")]
    pub hourly_cap: i64,
    #[serde(default = "default_daily_cap")]
    pub daily_cap: i64,
    #[serde(default)]
    pub security_mode: SecurityMode,
    /// Send an outcome SMS back to the command's sender.
    #[serde(default = "default_send_responses")]
    pub send_responses: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    #[default]
    Immediate,
    /// Accepted in config but not wired to a prompt flow; commands execute
    /// immediately in both modes.
    Confirm,
}

fn default_hourly_cap() -> i64 {
    10
}

fn default_daily_cap() -> i64 {
    50
}

fn default_send_responses() -> bool {
    true
}

impl Default for RemoteCommandConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            hourly_cap: default_hourly_cap(),
            daily_cap: default_daily_cap(),
            security_mode: SecurityMode::default(),
            send_responses: default_send_responses(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Sqlite file holding senders and the attempt log.
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
}

fn default_db_path() -> String {
    default_root().join("smsgate.db").to_string_lossy().into_owned()
}

fn default_queue_capacity() -> usize {
    64
}

fn default_worker_count() -> usize {
    4
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            queue_capacity: default_queue_capacity(),
            worker_count: default_worker_count(),
        }
    }
}

impl Config {
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let (cfg, _) = Self::load_with_path(path).await?;
        Ok(cfg)
    }

    pub async fn load_with_path(path: Option<PathBuf>) -> anyhow::Result<(Self, PathBuf)> {
        let path = path.unwrap_or_else(default_config_path);
        if !path.exists() {
            return Ok((Self::default(), path));
        }
        let contents = tokio::fs::read_to_string(&path).await?;
        let cfg: Config = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))?;
        Ok((cfg, path))
    }
}

fn default_root() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".smsgate")
}

pub fn default_config_path() -> PathBuf {
    default_root().join("config.toml")
}
