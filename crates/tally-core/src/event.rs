//! Event model: what gets built on the worker, buffered, and delivered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value::Properties;

/// Position of an event in the durable buffer. Strictly increasing and
/// never reused; defines delivery order.
pub type SequenceId = u64;

/// The kind of an outgoing event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "track")]
    Track,
    #[serde(rename = "profile_set")]
    ProfileSet,
    #[serde(rename = "profile_set_once")]
    ProfileSetOnce,
    #[serde(rename = "profile_increment")]
    ProfileIncrement,
    #[serde(rename = "profile_append")]
    ProfileAppend,
    #[serde(rename = "profile_unset")]
    ProfileUnset,
    #[serde(rename = "profile_delete")]
    ProfileDelete,
    #[serde(rename = "item_set")]
    ItemSet,
    #[serde(rename = "item_delete")]
    ItemDelete,
    #[serde(rename = "track_signup")]
    SignUp,
}

impl EventKind {
    /// Track-like events carry an event name and receive super properties.
    pub fn is_track(self) -> bool {
        matches!(self, Self::Track | Self::SignUp)
    }

    pub fn is_profile(self) -> bool {
        matches!(
            self,
            Self::ProfileSet
                | Self::ProfileSetOnce
                | Self::ProfileIncrement
                | Self::ProfileAppend
                | Self::ProfileUnset
                | Self::ProfileDelete
        )
    }

    pub fn is_item(self) -> bool {
        matches!(self, Self::ItemSet | Self::ItemDelete)
    }
}

/// A fully enriched event, ready to be appended to the buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(rename = "event", skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    pub properties: Properties,
    pub distinct_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub login_id: Option<String>,
    pub anonymous_id: String,
    #[serde(rename = "time", with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Assigned by the buffer on append; zero until then.
    #[serde(rename = "_track_id", default)]
    pub sequence_id: SequenceId,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub item_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub item_id: Option<String>,
    /// Prior anonymous id, set on sign-up.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub original_id: Option<String>,
}

impl Event {
    /// Start an event of `kind` attributed to `distinct_id`, stamped now.
    pub fn new(kind: EventKind, distinct_id: impl Into<String>, anonymous_id: impl Into<String>) -> Self {
        Self {
            kind,
            name: None,
            properties: Properties::new(),
            distinct_id: distinct_id.into(),
            login_id: None,
            anonymous_id: anonymous_id.into(),
            timestamp: Utc::now(),
            sequence_id: 0,
            item_type: None,
            item_id: None,
            original_id: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_login_id(mut self, login_id: Option<String>) -> Self {
        self.login_id = login_id;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_item(mut self, item_type: impl Into<String>, item_id: impl Into<String>) -> Self {
        self.item_type = Some(item_type.into());
        self.item_id = Some(item_id.into());
        self
    }

    pub fn with_original_id(mut self, original_id: impl Into<String>) -> Self {
        self.original_id = Some(original_id.into());
        self
    }
}

/// A serialized event owned by the durable buffer between append and
/// confirmed delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedRecord {
    pub sequence_id: SequenceId,
    pub payload: String,
}
