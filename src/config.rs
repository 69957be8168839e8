//! Configuration module for the endpoint benchmark
//!
//! Loads TOML configuration (after reading a `.env` file, if any) into
//! structured sections. Every field has a default so a missing file or a
//! partial one still yields a runnable configuration.

use crate::dispatcher::MIN_BATCH_SIZE;
use crate::types::NetworkId;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// JSON-RPC transport
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Signing identity
    #[serde(default)]
    pub wallet: WalletConfig,

    /// Pre-signed pool sizing
    #[serde(default)]
    pub pool: PoolConfig,

    /// Monitoring and metrics
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Request timeout in milliseconds
    #[serde(default = "default_rpc_timeout_ms")]
    pub timeout_ms: u64,

    /// Per-network RPC URL overrides, keyed by network id
    #[serde(default)]
    pub urls: HashMap<NetworkId, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Environment variable holding the hex private key
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,

    /// File holding the hex private key; used when the variable is unset
    #[serde(default)]
    pub key_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Operations signed per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Execution records kept in history
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Enable Prometheus metrics endpoint
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

// Default value functions
fn default_rpc_timeout_ms() -> u64 { 10_000 }
fn default_private_key_env() -> String { "PRIVATE_KEY".to_string() }
fn default_batch_size() -> usize { 10 }
fn default_history_capacity() -> usize { 50 }
fn default_metrics_port() -> u16 { 9090 }
fn default_true() -> bool { true }

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_rpc_timeout_ms(),
            urls: HashMap::new(),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            private_key_env: default_private_key_env(),
            key_file: None,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: default_true(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl RpcConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `.env` first, then the TOML file
    pub fn from_file_with_env(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_file(path)
    }

    /// Reject values the pool cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pool.batch_size < MIN_BATCH_SIZE {
            anyhow::bail!(
                "pool.batch_size must be at least {}, got {}",
                MIN_BATCH_SIZE,
                self.pool.batch_size
            );
        }
        if self.pool.history_capacity == 0 {
            anyhow::bail!("pool.history_capacity must be greater than 0");
        }
        if self.rpc.timeout_ms == 0 {
            anyhow::bail!("rpc.timeout_ms must be greater than 0");
        }
        if let Some(network) = self.rpc.urls.keys().find(|n| n.is_sentinel()) {
            anyhow::bail!("rpc.urls cannot contain an entry for '{}'", network);
        }
        Ok(())
    }
}
