//! Identity snapshot: anonymous id, login id, and the derived distinct id.
//!
//! Caller threads read the snapshot under a short lock. Swaps happen under
//! the task-queue lock together with enqueueing the unit that persists
//! them, so the in-memory order always matches the persisted order.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tally_core::traits::DeviceInfo;
use tally_core::validation::is_valid_device_id;

/// Immutable view of the current identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySnapshot {
    pub anonymous_id: String,
    pub login_id: Option<String>,
}

impl IdentitySnapshot {
    /// Login id when logged in, anonymous id otherwise.
    pub fn distinct_id(&self) -> &str {
        self.login_id.as_deref().unwrap_or(&self.anonymous_id)
    }

    pub fn is_login(&self) -> bool {
        self.login_id.is_some()
    }
}

/// Caller-visible identity state.
#[derive(Debug)]
pub struct IdentityStore {
    snapshot: RwLock<IdentitySnapshot>,
}

impl IdentityStore {
    pub fn new(anonymous_id: String, login_id: Option<String>) -> Self {
        Self {
            snapshot: RwLock::new(IdentitySnapshot {
                anonymous_id,
                login_id,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, IdentitySnapshot> {
        self.snapshot.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, IdentitySnapshot> {
        self.snapshot.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> IdentitySnapshot {
        self.read().clone()
    }

    pub fn anonymous_id(&self) -> String {
        self.read().anonymous_id.clone()
    }

    pub fn login_id(&self) -> Option<String> {
        self.read().login_id.clone()
    }

    pub fn distinct_id(&self) -> String {
        self.read().distinct_id().to_string()
    }

    /// Replace the anonymous id. Returns the prior value if it changed.
    pub fn replace_anonymous_id(&self, id: &str) -> Option<String> {
        let mut snapshot = self.write();
        if snapshot.anonymous_id == id {
            return None;
        }
        Some(std::mem::replace(&mut snapshot.anonymous_id, id.to_string()))
    }

    /// Set the login id unless `id` is the current anonymous id.
    /// Returns the anonymous id at the time of the switch when accepted.
    pub fn begin_login(&self, id: &str) -> Option<String> {
        let mut snapshot = self.write();
        if snapshot.anonymous_id == id {
            return None;
        }
        snapshot.login_id = Some(id.to_string());
        Some(snapshot.anonymous_id.clone())
    }

    /// Clear the login id. Returns the prior value.
    pub fn clear_login_id(&self) -> Option<String> {
        self.write().login_id.take()
    }

    /// Overwrite the whole snapshot, e.g. with what storage holds.
    pub fn restore(&self, snapshot: IdentitySnapshot) {
        *self.write() = snapshot;
    }
}

/// A fresh anonymous id: the device id when usable, else a random UUID.
pub fn generate_anonymous_id(device: &dyn DeviceInfo) -> String {
    match device.device_id() {
        Some(id) if is_valid_device_id(&id) => id,
        _ => uuid::Uuid::new_v4().to_string(),
    }
}
