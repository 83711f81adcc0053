//! Flush policy configuration.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_DRAIN_BUDGET_MS, DEFAULT_FLUSH_BULK_SIZE, DEFAULT_FLUSH_INTERVAL_MS,
    DEFAULT_MAX_CACHE_ROWS,
};
use crate::network::NetworkType;

/// Batching, scheduling, and buffer capacity.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FlushConfig {
    /// Events per batch; reaching it after an append triggers a flush. Default: 100.
    pub bulk_size: Option<usize>,
    /// Periodic flush interval in milliseconds. Default: 15000.
    pub interval_ms: Option<u64>,
    /// Network type bitmask on which delivery may proceed. Default: 3G|4G|5G|WIFI.
    pub network_policy: Option<u32>,
    /// Durable buffer capacity in rows. Default: 10000.
    pub max_cache_rows: Option<usize>,
    /// Wall-clock budget for one draining flush in milliseconds. Default: 10000.
    pub drain_budget_ms: Option<u64>,
}

impl FlushConfig {
    pub fn effective_bulk_size(&self) -> usize {
        self.bulk_size.unwrap_or(DEFAULT_FLUSH_BULK_SIZE)
    }

    pub fn effective_interval_ms(&self) -> u64 {
        self.interval_ms.unwrap_or(DEFAULT_FLUSH_INTERVAL_MS)
    }

    pub fn effective_network_policy(&self) -> NetworkType {
        self.network_policy
            .map(NetworkType::from_bits)
            .unwrap_or(NetworkType::DEFAULT_POLICY)
    }

    pub fn effective_max_cache_rows(&self) -> usize {
        self.max_cache_rows.unwrap_or(DEFAULT_MAX_CACHE_ROWS)
    }

    pub fn effective_drain_budget_ms(&self) -> u64 {
        self.drain_budget_ms.unwrap_or(DEFAULT_DRAIN_BUDGET_MS)
    }
}
