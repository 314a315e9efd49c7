//! Node configuration loading and validation.
//!
//! `NodeConfig` is loaded from a TOML file (or built programmatically in
//! tests), then validated before `start` touches the bus hardware.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_POLL_TIMEOUT_MS, DEFAULT_POOL_BYTES, DEFAULT_RX_QUEUE_DEPTH, DEFAULT_TX_QUEUE_DEPTH,
    NODE_ID_MAX, NODE_ID_MIN, RX_QUEUE_CAP, TX_QUEUE_CAP,
};
use crate::error::NodeError;

fn default_driver() -> String {
    "sim".to_string()
}

fn default_bitrate() -> u32 {
    1_000_000
}

fn default_poll_timeout_ms() -> u16 {
    DEFAULT_POLL_TIMEOUT_MS
}

fn default_tx_queue_depth() -> usize {
    DEFAULT_TX_QUEUE_DEPTH
}

fn default_rx_queue_depth() -> usize {
    DEFAULT_RX_QUEUE_DEPTH
}

fn default_pool_bytes() -> usize {
    DEFAULT_POOL_BYTES
}

fn default_rt_priority() -> i32 {
    80
}

/// Main node configuration, loaded from `node.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Bus node identity (1..=127).
    pub node_id: u8,

    /// Bus bitrate [bit/s].
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,

    /// Bus driver to load (e.g. "sim", "socketcan").
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Bounded multiplex-wait timeout [ms]. Bounds arming latency and
    /// teardown observation time.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u16,

    /// Outbound transmit queue depth (≤ TX_QUEUE_CAP).
    #[serde(default = "default_tx_queue_depth")]
    pub tx_queue_depth: usize,

    /// Inbound receive queue depth (≤ RX_QUEUE_CAP).
    #[serde(default = "default_rx_queue_depth")]
    pub rx_queue_depth: usize,

    /// Fixed memory pool for protocol objects [bytes].
    #[serde(default = "default_pool_bytes")]
    pub pool_bytes: usize,

    /// SCHED_FIFO priority for the event-loop task (rt feature only).
    #[serde(default = "default_rt_priority")]
    pub rt_priority: i32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            bitrate: default_bitrate(),
            driver: default_driver(),
            poll_timeout_ms: default_poll_timeout_ms(),
            tx_queue_depth: default_tx_queue_depth(),
            rx_queue_depth: default_rx_queue_depth(),
            pool_bytes: default_pool_bytes(),
            rt_priority: default_rt_priority(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            NodeError::Config(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, NodeError> {
        let config: NodeConfig = toml::from_str(content)
            .map_err(|e| NodeError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Validation Rules
    /// 1. `node_id` in 1..=127
    /// 2. `bitrate` > 0
    /// 3. `poll_timeout_ms` > 0
    /// 4. queue depths > 0 and within compile-time capacity
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.node_id < NODE_ID_MIN || self.node_id > NODE_ID_MAX {
            return Err(NodeError::Config(format!(
                "node_id {} out of range ({NODE_ID_MIN}..={NODE_ID_MAX})",
                self.node_id
            )));
        }
        if self.bitrate == 0 {
            return Err(NodeError::Config(
                "bitrate must be greater than 0".to_string(),
            ));
        }
        if self.poll_timeout_ms == 0 {
            return Err(NodeError::Config(
                "poll_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.tx_queue_depth == 0 || self.tx_queue_depth > TX_QUEUE_CAP {
            return Err(NodeError::Config(format!(
                "tx_queue_depth {} out of range (1..={TX_QUEUE_CAP})",
                self.tx_queue_depth
            )));
        }
        if self.rx_queue_depth == 0 || self.rx_queue_depth > RX_QUEUE_CAP {
            return Err(NodeError::Config(format!(
                "rx_queue_depth {} out of range (1..={RX_QUEUE_CAP})",
                self.rx_queue_depth
            )));
        }
        Ok(())
    }
}
