//! Runtime flush and session policy.
//!
//! Values start from config, are overridden by persisted values, and can
//! be changed at runtime through validated setters. Rejected values leave
//! the previous value in place.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tally_core::constants::{
    MAX_SESSION_INTERVAL_MS, MIN_FLUSH_INTERVAL_MS, MIN_SESSION_INTERVAL_MS,
};
use tally_core::errors::ValidationError;
use tally_core::{NetworkType, TallyConfig};

/// Persisted keys for policy values.
pub mod keys {
    pub const ENABLED: &str = "enabled";
    pub const FLUSH_BULK_SIZE: &str = "flush_bulk_size";
    pub const FLUSH_INTERVAL_MS: &str = "flush_interval_ms";
    pub const NETWORK_POLICY: &str = "network_policy";
    pub const MAX_CACHE_ROWS: &str = "max_cache_rows";
    pub const SESSION_INTERVAL_MS: &str = "session_interval_ms";
}

fn out_of_range(key: &str, reason: String) -> ValidationError {
    ValidationError::InvalidValue {
        key: key.to_string(),
        reason,
    }
}

/// Lock-free policy shared by callers, the worker, and the scheduler.
#[derive(Debug)]
pub struct FlushPolicy {
    enabled: AtomicBool,
    network_mask: AtomicU32,
    bulk_size: AtomicUsize,
    interval_ms: AtomicU64,
    max_cache_rows: AtomicUsize,
    session_interval_ms: AtomicU64,
    drain_budget: Duration,
}

impl FlushPolicy {
    pub fn from_config(config: &TallyConfig) -> Self {
        Self {
            enabled: AtomicBool::new(true),
            network_mask: AtomicU32::new(config.flush.effective_network_policy().bits()),
            bulk_size: AtomicUsize::new(config.flush.effective_bulk_size()),
            interval_ms: AtomicU64::new(config.flush.effective_interval_ms()),
            max_cache_rows: AtomicUsize::new(config.flush.effective_max_cache_rows()),
            session_interval_ms: AtomicU64::new(config.session.effective_interval_ms()),
            drain_budget: Duration::from_millis(config.flush.effective_drain_budget_ms()),
        }
    }

    /// Apply a persisted `key = value` pair. Unknown keys and invalid
    /// values are ignored with a warning.
    pub fn apply_persisted(&self, key: &str, value: &str) {
        let result = match key {
            keys::ENABLED => match value.parse::<bool>() {
                Ok(v) => {
                    self.enabled.store(v, Ordering::SeqCst);
                    Ok(())
                }
                Err(e) => Err(out_of_range(key, e.to_string())),
            },
            keys::FLUSH_BULK_SIZE => parse(key, value).and_then(|v| self.set_bulk_size(v)),
            keys::FLUSH_INTERVAL_MS => parse(key, value).and_then(|v| self.set_interval_ms(v)),
            keys::NETWORK_POLICY => parse(key, value).map(|v| self.set_network_policy(NetworkType::from_bits(v))),
            keys::MAX_CACHE_ROWS => parse(key, value).and_then(|v| self.set_max_cache_rows(v)),
            keys::SESSION_INTERVAL_MS => {
                parse(key, value).and_then(|v| self.set_session_interval_ms(v))
            }
            _ => Ok(()),
        };
        if let Err(e) = result {
            tracing::warn!("policy: ignoring persisted value: {e}");
        }
    }

    // ---- Enabled ----

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Flip enabled -> disabled. Returns false if already disabled.
    pub fn try_disable(&self) -> bool {
        self.enabled
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Flip disabled -> enabled. Returns false if already enabled.
    pub fn try_enable(&self) -> bool {
        self.enabled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    // ---- Network ----

    pub fn network_policy(&self) -> NetworkType {
        NetworkType::from_bits(self.network_mask.load(Ordering::SeqCst))
    }

    pub fn set_network_policy(&self, mask: NetworkType) {
        self.network_mask.store(mask.bits(), Ordering::SeqCst);
    }

    pub fn allows(&self, current: NetworkType) -> bool {
        self.network_policy().allows(current)
    }

    // ---- Batching ----

    pub fn bulk_size(&self) -> usize {
        self.bulk_size.load(Ordering::SeqCst)
    }

    pub fn set_bulk_size(&self, size: usize) -> Result<(), ValidationError> {
        if size == 0 {
            return Err(out_of_range(keys::FLUSH_BULK_SIZE, "must be at least 1".to_string()));
        }
        self.bulk_size.store(size, Ordering::SeqCst);
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::SeqCst))
    }

    pub fn set_interval_ms(&self, interval_ms: u64) -> Result<(), ValidationError> {
        if interval_ms < MIN_FLUSH_INTERVAL_MS {
            return Err(out_of_range(
                keys::FLUSH_INTERVAL_MS,
                format!("{interval_ms} is below {MIN_FLUSH_INTERVAL_MS}"),
            ));
        }
        self.interval_ms.store(interval_ms, Ordering::SeqCst);
        Ok(())
    }

    pub fn max_cache_rows(&self) -> usize {
        self.max_cache_rows.load(Ordering::SeqCst)
    }

    pub fn set_max_cache_rows(&self, rows: usize) -> Result<(), ValidationError> {
        if rows == 0 {
            return Err(out_of_range(keys::MAX_CACHE_ROWS, "must be at least 1".to_string()));
        }
        self.max_cache_rows.store(rows, Ordering::SeqCst);
        Ok(())
    }

    pub fn drain_budget(&self) -> Duration {
        self.drain_budget
    }

    // ---- Session ----

    pub fn session_interval_ms(&self) -> u64 {
        self.session_interval_ms.load(Ordering::SeqCst)
    }

    pub fn set_session_interval_ms(&self, interval_ms: u64) -> Result<(), ValidationError> {
        if !(MIN_SESSION_INTERVAL_MS..=MAX_SESSION_INTERVAL_MS).contains(&interval_ms) {
            return Err(out_of_range(
                keys::SESSION_INTERVAL_MS,
                format!(
                    "{interval_ms} is outside {MIN_SESSION_INTERVAL_MS}..={MAX_SESSION_INTERVAL_MS}"
                ),
            ));
        }
        self.session_interval_ms.store(interval_ms, Ordering::SeqCst);
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ValidationError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| out_of_range(key, format!("`{value}`: {e}")))
}
