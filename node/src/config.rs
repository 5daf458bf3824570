// blockfill/node/src/config.rs

use blockfill_rpc::RpcClientConfig;
use blockfill_sync::{QueueConfig, SyncConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Environment variable overriding `rpc.url`
pub const ENV_RPC_URL: &str = "BLOCKFILL_RPC_URL";

/// Node configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Remote node endpoint
    #[serde(default)]
    pub rpc: RpcClientConfig,

    /// Local block store
    #[serde(default)]
    pub storage: StorageConfig,

    /// Gap detection, batching and admission control
    #[serde(default)]
    pub sync: SyncConfig,

    /// In-process job queue
    #[serde(default)]
    pub queue: QueueConfig,

    /// Prometheus exporter
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Keep blocks in memory only (nothing survives the process)
    #[serde(default)]
    pub in_memory: bool,
}

fn default_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".blockfill")
}

fn default_data_dir() -> PathBuf {
    default_home().join("blocks")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            in_memory: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Serve Prometheus metrics
    #[serde(default)]
    pub enabled: bool,

    /// Exporter listen address
    #[serde(default = "default_metrics_addr")]
    pub listen_addr: SocketAddr,
}

fn default_metrics_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9464))
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_addr(),
        }
    }
}

impl NodeConfig {
    /// Where `init-config` writes and where the node looks when no
    /// `--config` is given.
    pub fn default_path() -> PathBuf {
        default_home().join("config.toml")
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), String> {
        let url = self.rpc.url.trim();
        if url.is_empty() {
            return Err("rpc.url must be set".to_string());
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(format!("rpc.url must be an http(s) endpoint, got '{}'", url));
        }
        if self.queue.workers == 0 {
            return Err("queue.workers must be at least 1".to_string());
        }
        if self.queue.capacity == 0 {
            return Err("queue.capacity must be at least 1".to_string());
        }
        self.sync.validate().map_err(|e| e.to_string())?;

        // an admitted chunk must fit in the channel, or submit blocks
        let peak_depth = (self.sync.queue_threshold - 1).saturating_add(self.batches_per_chunk());
        if peak_depth > self.queue.capacity {
            return Err(format!(
                "queue.capacity ({}) must hold sync.queue_threshold - 1 plus one chunk of \
                 batches ({} in total)",
                self.queue.capacity, peak_depth
            ));
        }
        Ok(())
    }

    /// Most batches a single chunk can carry.
    fn batches_per_chunk(&self) -> usize {
        let batch = self.sync.batch_size.max(1);
        let chunk = self.sync.chunk_size;
        (chunk / batch + usize::from(chunk % batch != 0)).max(1)
    }

    /// Apply environment overrides
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_RPC_URL) {
            if !url.trim().is_empty() {
                self.rpc.url = url;
            }
        }
    }

    /// Load from file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: NodeConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}
