//! Worker-owned state and event assembly.
//!
//! The engine holds the durable buffer, the persisted key/value store, and
//! the authoritative copies of persisted identity and super properties. It
//! lives behind a mutex so it outlives any single worker generation; queued
//! units lock it only for the steps that touch storage.

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, Utc};
use tally_core::constants::property_keys;
use tally_core::errors::{StorageError, TallyResult, ValidationError};
use tally_core::traits::{DeviceInfo, EventInterceptor, EventStore, KeyValueStore};
use tally_core::validation::{sanitize_properties, validate_id, validate_key};
use tally_core::{Event, EventKind, Properties, SequenceId, Value};

use crate::identity::IdentitySnapshot;
use crate::properties::{enrich, PropertyLayers};

/// Persisted keys owned by the engine.
pub mod keys {
    pub const ANONYMOUS_ID: &str = "anonymous_id";
    pub const LOGIN_ID: &str = "login_id";
    pub const SUPER_PROPERTIES: &str = "super_properties";
    pub const FIRST_DAY: &str = "first_day";
    /// Set once the install event has been recorded.
    pub const INSTALLED: &str = "installed";
}

const FIRST_DAY_FORMAT: &str = "%Y-%m-%d";

/// Everything captured on the caller thread for one event.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub kind: EventKind,
    pub name: Option<String>,
    pub properties: Properties,
    /// Dynamic super properties plus `$network_type`, Track kinds only.
    pub dynamic: Properties,
    pub identity: IdentitySnapshot,
    pub timestamp: DateTime<Utc>,
    pub item: Option<(String, String)>,
    /// `event_duration` of an ended timer, already in its unit.
    pub duration: Option<f64>,
    pub original_id: Option<String>,
}

impl EventDraft {
    pub fn new(kind: EventKind, identity: IdentitySnapshot) -> Self {
        Self {
            kind,
            name: None,
            properties: Properties::new(),
            dynamic: Properties::new(),
            identity,
            timestamp: Utc::now(),
            item: None,
            duration: None,
            original_id: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }
}

/// State mutated only by the task-queue worker.
pub struct Engine {
    store: Box<dyn EventStore>,
    kv: Box<dyn KeyValueStore>,
    device: Arc<dyn DeviceInfo>,
    interceptor: Option<Arc<dyn EventInterceptor>>,
    persisted_login_id: Option<String>,
    super_properties: Properties,
    first_day: NaiveDate,
}

impl Engine {
    /// Load persisted state, generating and persisting what is missing.
    pub fn load(
        store: Box<dyn EventStore>,
        mut kv: Box<dyn KeyValueStore>,
        device: Arc<dyn DeviceInfo>,
    ) -> TallyResult<Self> {
        let persisted_login_id = kv.get(keys::LOGIN_ID)?.filter(|id| !id.is_empty());

        let super_properties = match kv.get(keys::SUPER_PROPERTIES)? {
            Some(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("engine: discarding unreadable super properties: {e}");
                Properties::new()
            }),
            None => Properties::new(),
        };

        let today = Local::now().date_naive();
        let first_day = match kv
            .get(keys::FIRST_DAY)?
            .and_then(|d| NaiveDate::parse_from_str(&d, FIRST_DAY_FORMAT).ok())
        {
            Some(day) => day,
            None => {
                kv.set(keys::FIRST_DAY, &today.format(FIRST_DAY_FORMAT).to_string())?;
                today
            }
        };

        Ok(Self {
            store,
            kv,
            device,
            interceptor: None,
            persisted_login_id,
            super_properties,
            first_day,
        })
    }

    pub fn set_interceptor(&mut self, interceptor: Option<Arc<dyn EventInterceptor>>) {
        self.interceptor = interceptor;
    }

    pub fn store(&self) -> &dyn EventStore {
        self.store.as_ref()
    }

    pub fn store_mut(&mut self) -> &mut dyn EventStore {
        self.store.as_mut()
    }

    // ---- Persisted key/value ----

    pub fn get_value(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.kv.get(key)
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.kv.set(key, value)
    }

    /// Persisted anonymous id, or a fresh one (persisted) when absent.
    pub fn load_or_create_anonymous_id(&mut self, generate: impl FnOnce() -> String) -> TallyResult<String> {
        if let Some(id) = self.kv.get(keys::ANONYMOUS_ID)?.filter(|id| !id.is_empty()) {
            return Ok(id);
        }
        let id = generate();
        self.kv.set(keys::ANONYMOUS_ID, &id)?;
        Ok(id)
    }

    pub fn persist_anonymous_id(&mut self, id: &str) -> Result<(), StorageError> {
        self.kv.set(keys::ANONYMOUS_ID, id)
    }

    pub fn persisted_login_id(&self) -> Option<&str> {
        self.persisted_login_id.as_deref()
    }

    /// Identity as last committed to storage.
    pub fn persisted_identity(&self) -> Result<Option<IdentitySnapshot>, StorageError> {
        Ok(self
            .kv
            .get(keys::ANONYMOUS_ID)?
            .filter(|id| !id.is_empty())
            .map(|anonymous_id| IdentitySnapshot {
                anonymous_id,
                login_id: self.persisted_login_id.clone(),
            }))
    }

    /// Persist `id` as the login id. Returns false if it already was.
    pub fn commit_login(&mut self, id: &str) -> Result<bool, StorageError> {
        if self.persisted_login_id.as_deref() == Some(id) {
            return Ok(false);
        }
        self.kv.set(keys::LOGIN_ID, id)?;
        self.persisted_login_id = Some(id.to_string());
        Ok(true)
    }

    /// Clear the persisted login id. Returns false if none was set.
    pub fn commit_logout(&mut self) -> Result<bool, StorageError> {
        if self.persisted_login_id.is_none() {
            return Ok(false);
        }
        self.kv.remove(keys::LOGIN_ID)?;
        self.persisted_login_id = None;
        Ok(true)
    }

    // ---- Super properties ----

    pub fn super_properties(&self) -> &Properties {
        &self.super_properties
    }

    /// Apply `mutate` to the super properties and persist the result.
    pub fn update_super_properties<F>(&mut self, mutate: F) -> TallyResult<Properties>
    where
        F: FnOnce(&mut Properties),
    {
        let mut next = self.super_properties.clone();
        mutate(&mut next);
        let json = serde_json::to_string(&next).map_err(|e| StorageError::Serialization {
            what: "super properties",
            message: e.to_string(),
        })?;
        self.kv.set(keys::SUPER_PROPERTIES, &json)?;
        self.super_properties = next.clone();
        Ok(next)
    }

    pub fn is_first_day(&self) -> bool {
        Local::now().date_naive() == self.first_day
    }

    // ---- Events ----

    /// Validate and enrich a draft into a final event.
    ///
    /// Returns `Ok(None)` when the interceptor drops it. Invalid properties
    /// are removed; an invalid name, item, or identity rejects the event.
    pub fn assemble(&self, draft: EventDraft) -> Result<Option<Event>, ValidationError> {
        let EventDraft {
            kind,
            name,
            properties,
            dynamic,
            identity,
            timestamp,
            item,
            duration,
            original_id,
        } = draft;

        if kind.is_track() {
            match name.as_deref() {
                Some(n) => validate_key(n)?,
                None => return Err(ValidationError::Empty { field: "event name" }),
            }
        }
        validate_id("distinct_id", identity.distinct_id())?;
        if let Some((item_type, item_id)) = &item {
            validate_key(item_type)?;
            validate_id("item_id", item_id)?;
        }

        let (caller, _rejected) = sanitize_properties(properties);
        let caller = restrict_values(kind, caller);
        let (dynamic, _rejected) = sanitize_properties(dynamic);

        let mut properties = if kind.is_track() {
            let presets = self.device.preset_properties();
            let mut reserved = Properties::new();
            reserved.insert(
                property_keys::IS_LOGIN_ID.to_string(),
                Value::Boolean(identity.is_login()),
            );
            reserved.insert(
                property_keys::IS_FIRST_DAY.to_string(),
                Value::Boolean(self.is_first_day()),
            );
            if let Some(d) = duration {
                reserved.insert(property_keys::EVENT_DURATION.to_string(), Value::Number(d));
            }
            enrich(PropertyLayers {
                presets: Some(&presets),
                supers: Some(&self.super_properties),
                dynamic: Some(&dynamic),
                caller,
                reserved,
            })
        } else {
            caller
        };

        if kind == EventKind::Track {
            if let (Some(interceptor), Some(n)) = (&self.interceptor, name.as_deref()) {
                if !interceptor.on_track_event(n, &mut properties) {
                    tracing::debug!(event = n, "engine: interceptor dropped event");
                    return Ok(None);
                }
            }
        }

        let IdentitySnapshot {
            anonymous_id,
            login_id,
        } = identity;
        let distinct_id = login_id.clone().unwrap_or_else(|| anonymous_id.clone());

        let mut event = Event::new(kind, distinct_id, anonymous_id)
            .with_properties(properties)
            .with_login_id(login_id)
            .with_timestamp(timestamp);
        if let Some(n) = name {
            event = event.with_name(n);
        }
        if let Some((item_type, item_id)) = item {
            event = event.with_item(item_type, item_id);
        }
        if let Some(original) = original_id {
            event = event.with_original_id(original);
        }
        Ok(Some(event))
    }

    /// Assemble and append. Returns the assigned sequence id, or `None`
    /// when the interceptor dropped the event.
    pub fn record(&mut self, draft: EventDraft) -> TallyResult<Option<SequenceId>> {
        let Some(mut event) = self.assemble(draft)? else {
            return Ok(None);
        };
        let seq = self.store.append(&mut event)?;
        tracing::trace!(seq, kind = ?event.kind, "engine: event buffered");
        Ok(Some(seq))
    }
}

/// Profile increment takes numbers and profile append takes lists; other
/// value types are dropped with a warning.
fn restrict_values(kind: EventKind, properties: Properties) -> Properties {
    let wanted: fn(&Value) -> bool = match kind {
        EventKind::ProfileIncrement => |v| matches!(v, Value::Number(_)),
        EventKind::ProfileAppend => |v| matches!(v, Value::List(_)),
        _ => return properties,
    };
    properties
        .into_iter()
        .filter(|(key, value)| {
            let ok = wanted(value);
            if !ok {
                tracing::warn!(
                    key = %key,
                    found = value.type_name(),
                    "engine: dropping property of the wrong type for {kind:?}"
                );
            }
            ok
        })
        .collect()
}
