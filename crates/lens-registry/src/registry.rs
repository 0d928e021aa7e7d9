//! Store registry.
//!
//! Locking:
//! - each store lives in its own `Mutex<StoreSlot>` inside a `DashMap`
//! - `order` (insertion-ordered keys) is taken by registration and removal
//!   only, always before any shard or slot lock
//! - `apply_change` clones the slot `Arc` out of the map and locks only that
//!   slot, so different keys never contend
//!
//! A removed slot is flagged so a change that raced the removal fails with
//! `NotFound` instead of writing to a detached store.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use lens_auth::Session;
use lens_core::{Role, SessionId};
use lens_laws::{Evaluation, LawEngine, LawSelection};
use lens_settings::LensSettings;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};

use crate::errors::{RegistryError, Result};
use crate::types::{ChangeReceipt, HistoryEntry, RegisterMode, StoreEvent, StoreSnapshot};

/// Maximum store key length in bytes.
const MAX_KEY_LEN: usize = 256;

/// Registry configuration.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// History entries retained per store.
    pub history_limit: usize,
    /// Laws enabled on newly registered stores.
    pub default_laws: LawSelection,
    /// Event channel capacity.
    pub event_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::from(&LensSettings::default())
    }
}

impl From<&LensSettings> for RegistryConfig {
    fn from(s: &LensSettings) -> Self {
        Self {
            history_limit: s.registry.history_limit.max(1),
            default_laws: LawSelection::from_ids(&s.laws.default_enabled),
            event_capacity: 1024,
        }
    }
}

struct StoreSlot {
    value: Arc<Value>,
    version: u64,
    owner: Option<SessionId>,
    registered_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    enabled_laws: LawSelection,
    history: VecDeque<HistoryEntry>,
    removed: bool,
}

impl StoreSlot {
    fn snapshot(&self, key: &str) -> StoreSnapshot {
        StoreSnapshot {
            key: key.to_string(),
            value: Arc::clone(&self.value),
            version: self.version,
            owner_session_id: self.owner.clone(),
            registered_at: self.registered_at,
            updated_at: self.updated_at,
            enabled_laws: self.enabled_laws.clone(),
            history_len: self.history.len(),
        }
    }
}

/// The registry of live stores.
pub struct StoreRegistry {
    stores: DashMap<String, Arc<Mutex<StoreSlot>>>,
    order: RwLock<Vec<String>>,
    config: RegistryConfig,
    events: broadcast::Sender<StoreEvent>,
}

impl StoreRegistry {
    /// Create an empty registry.
    pub fn new(config: RegistryConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            stores: DashMap::new(),
            order: RwLock::new(Vec::new()),
            config,
            events,
        }
    }

    /// Receive store events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Number of stores.
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    /// Whether the registry has no stores.
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Create a store at version 0.
    ///
    /// With [`RegisterMode::Replace`] an existing key starts over as a fresh
    /// store: version, owner, history and law selection are all reset, only
    /// its position in key order is kept.
    #[instrument(skip(self, initial, session), fields(session_id = %session.id))]
    pub fn register(
        &self,
        key: &str,
        initial: Value,
        session: &Session,
        mode: RegisterMode,
    ) -> Result<StoreSnapshot> {
        authorize(session, Role::Editor)?;
        validate_key(key)?;

        let now = Utc::now();
        let value = Arc::new(initial);
        let mut order = self.order.write();

        if let Some(existing) = self.stores.get(key).map(|s| Arc::clone(s.value())) {
            if mode != RegisterMode::Replace {
                return Err(RegistryError::Conflict {
                    key: key.to_string(),
                });
            }
            let mut slot = existing.lock();
            slot.value = Arc::clone(&value);
            slot.version = 0;
            slot.owner = Some(session.id.clone());
            slot.registered_at = now;
            slot.updated_at = now;
            slot.enabled_laws = self.config.default_laws.clone();
            slot.history.clear();
            slot.history
                .push_back(initial_entry(&value, now, &session.id));
            self.emit(StoreEvent::Registered {
                key: key.to_string(),
                value,
                timestamp: now,
            });
            info!(key, "store replaced");
            return Ok(slot.snapshot(key));
        }

        let slot = StoreSlot {
            value: Arc::clone(&value),
            version: 0,
            owner: Some(session.id.clone()),
            registered_at: now,
            updated_at: now,
            enabled_laws: self.config.default_laws.clone(),
            history: VecDeque::from([initial_entry(&value, now, &session.id)]),
            removed: false,
        };
        let snapshot = slot.snapshot(key);
        let _ = self
            .stores
            .insert(key.to_string(), Arc::new(Mutex::new(slot)));
        order.push(key.to_string());
        self.emit(StoreEvent::Registered {
            key: key.to_string(),
            value,
            timestamp: now,
        });
        info!(key, "store registered");
        Ok(snapshot)
    }

    /// Commit a new value. Never creates a store.
    #[instrument(skip(self, value, session), fields(session_id = %session.id))]
    pub fn apply_change(&self, key: &str, value: Value, session: &Session) -> Result<ChangeReceipt> {
        authorize(session, Role::Editor)?;
        let slot = self.slot(key)?;
        let mut slot = slot.lock();
        if slot.removed {
            return Err(not_found(key));
        }
        Ok(self.commit(key, &mut slot, Arc::new(value), &session.id))
    }

    /// Current snapshot of a store.
    pub fn get(&self, key: &str) -> Result<StoreSnapshot> {
        let slot = self.slot(key)?;
        let slot = slot.lock();
        if slot.removed {
            return Err(not_found(key));
        }
        Ok(slot.snapshot(key))
    }

    /// Remove a store.
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub fn deregister(&self, key: &str, session: &Session) -> Result<()> {
        authorize(session, Role::Editor)?;
        let mut order = self.order.write();
        let (_, slot) = self.stores.remove(key).ok_or_else(|| not_found(key))?;
        order.retain(|k| k != key);
        self.detach(key, &slot);
        info!(key, "store removed");
        Ok(())
    }

    /// Remove every store registered by `session_id`. Returns the removed keys
    /// in key order.
    pub fn deregister_owned_by(&self, session_id: &SessionId) -> Vec<String> {
        let mut order = self.order.write();
        let owned: Vec<String> = order
            .iter()
            .filter(|key| {
                self.stores
                    .get(key.as_str())
                    .is_some_and(|slot| slot.lock().owner.as_ref() == Some(session_id))
            })
            .cloned()
            .collect();

        for key in &owned {
            if let Some((_, slot)) = self.stores.remove(key.as_str()) {
                self.detach(key, &slot);
            }
        }
        order.retain(|k| !owned.contains(k));
        if !owned.is_empty() {
            info!(%session_id, count = owned.len(), "removed stores owned by ended session");
        }
        owned
    }

    /// Keys in registration order.
    pub fn list_keys(&self) -> Vec<String> {
        self.order.read().clone()
    }

    /// Retained history, oldest first.
    pub fn history(&self, key: &str) -> Result<Vec<HistoryEntry>> {
        let slot = self.slot(key)?;
        let slot = slot.lock();
        if slot.removed {
            return Err(not_found(key));
        }
        Ok(slot.history.iter().cloned().collect())
    }

    /// The history entry committed as `version`.
    pub fn entry_at(&self, key: &str, version: u64) -> Result<HistoryEntry> {
        let slot = self.slot(key)?;
        let slot = slot.lock();
        if slot.removed {
            return Err(not_found(key));
        }
        find_entry(&slot, key, version).cloned()
    }

    /// Commit the value of a historical `version` as a new change. History is
    /// never rewritten.
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub fn revert_to(&self, key: &str, version: u64, session: &Session) -> Result<ChangeReceipt> {
        authorize(session, Role::Editor)?;
        let slot = self.slot(key)?;
        let mut slot = slot.lock();
        if slot.removed {
            return Err(not_found(key));
        }
        let value = Arc::clone(&find_entry(&slot, key, version)?.value);
        debug!(key, from_version = version, "reverting store");
        Ok(self.commit(key, &mut slot, value, &session.id))
    }

    /// Replace the laws applied by default when evaluating this store.
    ///
    /// The selection is stored as given; callers resolve it against the law
    /// catalog first.
    pub fn set_enabled_laws(
        &self,
        key: &str,
        selection: LawSelection,
        session: &Session,
    ) -> Result<LawSelection> {
        authorize(session, Role::Editor)?;
        let slot = self.slot(key)?;
        let mut slot = slot.lock();
        if slot.removed {
            return Err(not_found(key));
        }
        slot.enabled_laws = selection;
        Ok(slot.enabled_laws.clone())
    }

    /// Laws applied by default when evaluating this store.
    pub fn enabled_laws(&self, key: &str) -> Result<LawSelection> {
        Ok(self.get(key)?.enabled_laws)
    }

    /// Evaluate a store's current value. `selection` defaults to the store's
    /// enabled laws. The law engine runs on a snapshot, outside the key lock.
    pub fn evaluate(
        &self,
        key: &str,
        selection: Option<&LawSelection>,
        engine: &LawEngine,
    ) -> Result<(StoreSnapshot, Evaluation)> {
        let snapshot = self.get(key)?;
        let selection = selection.unwrap_or(&snapshot.enabled_laws);
        let evaluation = engine.evaluate(&snapshot.value, selection)?;
        Ok((snapshot, evaluation))
    }

    /// Stores still at version 0 that were registered at least `min_age` ago.
    /// Best-effort hint for producers that registered and never wrote.
    pub fn orphans(&self, min_age: Duration) -> Vec<String> {
        let cutoff = TimeDelta::from_std(min_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age));
        let Some(cutoff) = cutoff else {
            return Vec::new();
        };
        self.list_keys()
            .into_iter()
            .filter(|key| {
                self.stores.get(key.as_str()).is_some_and(|slot| {
                    let slot = slot.lock();
                    slot.version == 0 && slot.registered_at <= cutoff
                })
            })
            .collect()
    }

    fn slot(&self, key: &str) -> Result<Arc<Mutex<StoreSlot>>> {
        self.stores
            .get(key)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| not_found(key))
    }

    /// Append a version under the held slot lock and emit `store_changed`.
    fn commit(
        &self,
        key: &str,
        slot: &mut StoreSlot,
        value: Arc<Value>,
        actor: &SessionId,
    ) -> ChangeReceipt {
        let now = Utc::now();
        let previous_version = slot.version;
        let version = previous_version + 1;

        slot.version = version;
        slot.value = Arc::clone(&value);
        slot.updated_at = now;
        while slot.history.len() >= self.config.history_limit {
            let _ = slot.history.pop_front();
        }
        slot.history.push_back(HistoryEntry {
            version,
            value: Arc::clone(&value),
            timestamp: now,
            actor_session_id: actor.clone(),
        });

        self.emit(StoreEvent::Changed {
            key: key.to_string(),
            version,
            previous_version,
            value,
            timestamp: now,
            actor_session_id: actor.clone(),
        });
        debug!(key, version, "store changed");

        ChangeReceipt {
            key: key.to_string(),
            version,
            timestamp: now,
        }
    }

    fn detach(&self, key: &str, slot: &Mutex<StoreSlot>) {
        let mut slot = slot.lock();
        slot.removed = true;
        self.emit(StoreEvent::Removed {
            key: key.to_string(),
            last_version: slot.version,
            timestamp: Utc::now(),
        });
    }

    fn emit(&self, event: StoreEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("store_count", &self.stores.len())
            .field("history_limit", &self.config.history_limit)
            .finish_non_exhaustive()
    }
}

fn authorize(session: &Session, required: Role) -> Result<()> {
    if session.role.satisfies(required) {
        Ok(())
    } else {
        Err(RegistryError::Forbidden {
            required,
            actual: session.role,
        })
    }
}

fn validate_key(key: &str) -> Result<()> {
    let reason = if key.trim().is_empty() {
        "key must not be empty"
    } else if key.len() > MAX_KEY_LEN {
        "key exceeds 256 bytes"
    } else if key.contains('*') {
        "key must not contain '*'"
    } else if key.chars().any(char::is_control) {
        "key must not contain control characters"
    } else {
        return Ok(());
    };
    Err(RegistryError::InvalidKey {
        reason: reason.to_string(),
    })
}

fn not_found(key: &str) -> RegistryError {
    RegistryError::NotFound {
        key: key.to_string(),
    }
}

fn initial_entry(value: &Arc<Value>, now: DateTime<Utc>, actor: &SessionId) -> HistoryEntry {
    HistoryEntry {
        version: 0,
        value: Arc::clone(value),
        timestamp: now,
        actor_session_id: actor.clone(),
    }
}

fn find_entry<'a>(slot: &'a StoreSlot, key: &str, version: u64) -> Result<&'a HistoryEntry> {
    slot.history
        .iter()
        .find(|e| e.version == version)
        .ok_or_else(|| RegistryError::VersionNotFound {
            key: key.to_string(),
            version,
        })
}
