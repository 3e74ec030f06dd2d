use serde::{Deserialize, Serialize};

use crate::models::datasets::events::TransformerConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    #[serde(default = "default_metrics_address")]
    pub address: String,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
            port: default_metrics_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderSyncConfig {
    #[serde(default)]
    pub starting_block_number: u64,
    #[serde(default = "default_validation_window")]
    pub validation_window: u64,
    #[serde(default = "default_polling_interval")]
    pub polling_interval_secs: u64,
    // Back-off after a backfill pass that populated nothing
    #[serde(default = "default_backfill_idle")]
    pub backfill_idle_secs: u64,
}

impl Default for HeaderSyncConfig {
    fn default() -> Self {
        Self {
            starting_block_number: 0,
            validation_window: default_validation_window(),
            polling_interval_secs: default_polling_interval(),
            backfill_idle_secs: default_backfill_idle(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteConfig {
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,
    #[serde(default = "default_max_unexpected_errors")]
    pub max_consecutive_unexpected_errors: u32,
}

impl Default for ExecuteConfig {
    fn default() -> Self {
        Self {
            retry_interval_secs: default_retry_interval(),
            max_consecutive_unexpected_errors: default_max_unexpected_errors(),
        }
    }
}

/// Block reward schedule. Static reward drops from 5 to 3 native units at
/// `byzantium_block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSchedule {
    pub byzantium_block: u64,
}

impl Default for RewardSchedule {
    fn default() -> Self {
        Self {
            byzantium_block: 4_370_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub rpc_url: String,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub header_sync: HeaderSyncConfig,
    #[serde(default)]
    pub execute: ExecuteConfig,
    #[serde(default)]
    pub transformers: Vec<TransformerConfig>,
    #[serde(default)]
    pub rewards: RewardSchedule,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Identity of the node this indexer is attached to. `id` doubles as the header
/// node fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: String,
    pub client_name: String,
    pub network_id: String,
    pub genesis_block: String,
}

impl NodeInfo {
    pub fn fingerprint(&self) -> &str {
        &self.id
    }
}

fn default_metrics_address() -> String {
    "0.0.0.0".to_string()
}

fn default_metrics_port() -> u16 {
    9100
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_validation_window() -> u64 {
    15
}

fn default_polling_interval() -> u64 {
    7
}

fn default_backfill_idle() -> u64 {
    3
}

fn default_retry_interval() -> u64 {
    7
}

fn default_max_unexpected_errors() -> u32 {
    5
}
