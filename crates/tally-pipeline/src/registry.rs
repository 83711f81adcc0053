//! Process-wide named instances.
//!
//! Hosts that cannot thread a handle through their code start an instance
//! once under a key and look it up later. Starting a key that already
//! exists returns the running instance and ignores the new builder.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tally_core::errors::TallyResult;

use crate::client::{Tally, TallyBuilder};

/// Key used by hosts that only ever run one instance.
pub const DEFAULT_INSTANCE: &str = "default";

static INSTANCES: OnceLock<DashMap<String, Arc<Tally>>> = OnceLock::new();

fn instances() -> &'static DashMap<String, Arc<Tally>> {
    INSTANCES.get_or_init(DashMap::new)
}

/// Build and register the instance for `key`, or return the existing one.
/// Installs the default tracing subscriber on first use.
///
/// The build runs outside the map's locks. When two callers race on the
/// same key, the first insert wins and the loser's instance is shut down.
pub fn start_with_config(key: &str, builder: TallyBuilder) -> TallyResult<Arc<Tally>> {
    tally_core::tracing::init_tracing();
    if let Some(existing) = shared(key) {
        tracing::debug!(key, "registry: instance already running");
        return Ok(existing);
    }

    let built = Arc::new(builder.build()?);
    let winner = {
        let entry = instances()
            .entry(key.to_string())
            .or_insert_with(|| Arc::clone(&built));
        Arc::clone(entry.value())
    };
    if Arc::ptr_eq(&winner, &built) {
        tracing::info!(key, "registry: instance started");
    } else {
        tracing::debug!(key, "registry: lost start race, discarding duplicate");
        built.shutdown();
    }
    Ok(winner)
}

/// The instance registered under `key`, if any.
pub fn shared(key: &str) -> Option<Arc<Tally>> {
    instances().get(key).map(|entry| Arc::clone(entry.value()))
}

/// Unregister `key`. The instance keeps running while handles remain.
pub fn remove(key: &str) -> Option<Arc<Tally>> {
    instances().remove(key).map(|(_, tally)| tally)
}

pub fn keys() -> Vec<String> {
    instances().iter().map(|entry| entry.key().clone()).collect()
}
