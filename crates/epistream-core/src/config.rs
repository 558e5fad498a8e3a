use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Retry policy parameters for fetch attempts (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per fetch (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 1.0,
            max_delay_secs: 30,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(self.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }
}

/// Per-attempt fetch limits and progress publishing cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Wall-clock bound for one fetch attempt.
    pub attempt_timeout_secs: u64,
    /// Abort an attempt when no bytes arrive for this long.
    pub idle_timeout_secs: u64,
    /// Publish progress after at least this many new bytes...
    pub progress_flush_bytes: u64,
    /// ...or after this much time, whichever comes first.
    pub progress_interval_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: 7200,
            idle_timeout_secs: 60,
            progress_flush_bytes: 1024 * 1024,
            progress_interval_ms: 250,
        }
    }
}

/// Progressive stream reader tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Upper bound on a single wait for new bytes before re-checking the ledger.
    pub poll_ms: u64,
    /// Give up when the fetch makes no progress for this long.
    pub stall_secs: u64,
    /// Largest single read handed to the HTTP body.
    pub read_chunk_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_ms: 200,
            stall_secs: 120,
            read_chunk_bytes: 256 * 1024,
        }
    }
}

/// Upload relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub chunk_size_bytes: u64,
    pub max_concurrent_chunks: usize,
    pub chunk_max_attempts: u32,
    pub chunk_base_delay_secs: f64,
    pub chunk_timeout_secs: u64,
    /// Keep the local copy this long after the remote URL is recorded.
    pub local_grace_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: 100 * 1024 * 1024,
            max_concurrent_chunks: 3,
            chunk_max_attempts: 3,
            chunk_base_delay_secs: 5.0,
            chunk_timeout_secs: 900,
            local_grace_secs: 3600,
        }
    }
}

impl RelayConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.chunk_max_attempts.max(1),
            base_delay: Duration::from_secs_f64(self.chunk_base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Retention of terminal progress entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub shards: usize,
    pub retention_secs: u64,
    pub max_entries: usize,
    /// How often the reaper sweeps the ledger and pending local deletions.
    pub sweep_interval_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            shards: 16,
            retention_secs: 6 * 3600,
            max_entries: 4096,
            sweep_interval_secs: 300,
        }
    }
}

/// HTTP endpoint of a collaborator (content source or object store).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Base URL; the object id (or chunk key) is appended as a path segment.
    pub base_url: String,
    /// Extra request headers (e.g. an API key).
    pub headers: HashMap<String, String>,
    /// Public URL prefix returned for committed objects (storage only).
    pub public_url: Option<String>,
}

/// Global configuration loaded from `~/.config/epistream/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpiConfig {
    /// Address the HTTP server binds to.
    pub listen_addr: String,
    /// Directory for in-progress and fetched media files. Defaults to the XDG cache dir.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Number of concurrent fetch workers.
    pub fetch_workers: usize,
    /// Number of lock shards in the admission gate.
    #[serde(default = "default_gate_shards")]
    pub gate_shards: usize,
    /// Buffer percentage reported as `playable` by the progress endpoint.
    #[serde(default = "default_min_buffer_percent")]
    pub min_buffer_percent: f64,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub source: EndpointConfig,
    #[serde(default)]
    pub storage: EndpointConfig,
}

fn default_gate_shards() -> usize {
    16
}

fn default_min_buffer_percent() -> f64 {
    3.0
}

impl Default for EpiConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            data_dir: None,
            fetch_workers: 4,
            gate_shards: default_gate_shards(),
            min_buffer_percent: default_min_buffer_percent(),
            retry: None,
            fetch: FetchConfig::default(),
            stream: StreamConfig::default(),
            relay: RelayConfig::default(),
            ledger: LedgerConfig::default(),
            source: EndpointConfig::default(),
            storage: EndpointConfig::default(),
        }
    }
}

impl EpiConfig {
    /// Fetch retry policy (config section or defaults).
    pub fn fetch_retry_policy(&self) -> RetryPolicy {
        self.retry.clone().unwrap_or_default().policy()
    }

    /// Directory where fetched media lands, falling back to `~/.cache/epistream/media`.
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        let xdg_dirs = xdg::BaseDirectories::with_prefix("epistream")?;
        Ok(xdg_dirs.get_cache_home().join("media"))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("epistream")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<EpiConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = EpiConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: EpiConfig = toml::from_str(&data)?;
    Ok(cfg)
}
