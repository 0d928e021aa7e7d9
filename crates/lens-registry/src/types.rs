//! Registry value types and events.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use lens_core::SessionId;
use lens_laws::LawSelection;
use serde::{Serialize, Serializer};
use serde_json::Value;

fn serialize_arc_value<S: Serializer>(value: &Arc<Value>, s: S) -> Result<S::Ok, S::Error> {
    value.as_ref().serialize(s)
}

/// How [`register`](crate::StoreRegistry::register) treats an existing key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RegisterMode {
    /// Fail with `Conflict` if the key exists.
    #[default]
    CreateOnly,
    /// Reset an existing store to version 0 with fresh history, keeping its
    /// position in key order.
    Replace,
}

/// One retained version of a store.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Version this value was committed as.
    pub version: u64,
    /// The value.
    #[serde(serialize_with = "serialize_arc_value")]
    pub value: Arc<Value>,
    /// Commit time.
    pub timestamp: DateTime<Utc>,
    /// Session that committed it.
    pub actor_session_id: SessionId,
}

/// Point-in-time copy of a store.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    /// Store key.
    pub key: String,
    /// Current value.
    #[serde(serialize_with = "serialize_arc_value")]
    pub value: Arc<Value>,
    /// Current version.
    pub version: u64,
    /// Session that registered the store (lookup only).
    pub owner_session_id: Option<SessionId>,
    /// Registration time.
    pub registered_at: DateTime<Utc>,
    /// Time of the last commit.
    pub updated_at: DateTime<Utc>,
    /// Laws applied when no explicit selection is given.
    pub enabled_laws: LawSelection,
    /// Retained history entries.
    pub history_len: usize,
}

/// Result of an accepted change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeReceipt {
    /// Store key.
    pub key: String,
    /// New version.
    pub version: u64,
    /// Commit time.
    pub timestamp: DateTime<Utc>,
}

/// Registry change notification.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreEvent {
    /// A store was created (or reset by a replacing registration).
    Registered {
        /// Store key.
        key: String,
        /// Initial value.
        value: Arc<Value>,
        /// Registration time.
        timestamp: DateTime<Utc>,
    },
    /// A change was committed.
    Changed {
        /// Store key.
        key: String,
        /// New version.
        version: u64,
        /// Version before this change.
        previous_version: u64,
        /// New value.
        value: Arc<Value>,
        /// Commit time.
        timestamp: DateTime<Utc>,
        /// Session that made the change.
        actor_session_id: SessionId,
    },
    /// A store was removed.
    Removed {
        /// Store key.
        key: String,
        /// Version at removal.
        last_version: u64,
        /// Removal time.
        timestamp: DateTime<Utc>,
    },
}

impl StoreEvent {
    /// Key the event concerns.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Registered { key, .. } | Self::Changed { key, .. } | Self::Removed { key, .. } => {
                key
            }
        }
    }

    /// Wire event type.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Registered { .. } => "store_registered",
            Self::Changed { .. } => "store_changed",
            Self::Removed { .. } => "store_removed",
        }
    }

    /// Store version after the event.
    #[must_use]
    pub fn version(&self) -> u64 {
        match self {
            Self::Registered { .. } => 0,
            Self::Changed { version, .. } => *version,
            Self::Removed { last_version, .. } => *last_version,
        }
    }

    /// Event time.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Registered { timestamp, .. }
            | Self::Changed { timestamp, .. }
            | Self::Removed { timestamp, .. } => *timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn history_entry_serializes_value_inline() {
        let entry = HistoryEntry {
            version: 2,
            value: Arc::new(json!({"items": ["x"]})),
            timestamp: Utc::now(),
            actor_session_id: SessionId::from("sess_a"),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["value"], json!({"items": ["x"]}));
        assert_eq!(json["actorSessionId"], "sess_a");
    }

    #[test]
    fn event_accessors() {
        let event = StoreEvent::Changed {
            key: "cart".into(),
            version: 3,
            previous_version: 2,
            value: Arc::new(json!(null)),
            timestamp: Utc::now(),
            actor_session_id: SessionId::new(),
        };
        assert_eq!(event.key(), "cart");
        assert_eq!(event.event_type(), "store_changed");
        assert_eq!(event.version(), 3);
    }
}
