//! In-memory session table.
//!
//! A single mutex guards both the session map and the digest index. Lazy
//! purge on lookup and the periodic sweep go through the same critical
//! section, so each session ends (and emits `Expired`) exactly once.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use lens_core::{Role, SessionId};
use lens_settings::AuthSettings;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::errors::{AuthError, Result};
use crate::session::{IssuedSession, Session, SessionLifecycle};
use crate::token::{self, TokenDigest};

/// Lifecycle channel capacity. Slow subscribers observe `Lagged`.
const LIFECYCLE_CAPACITY: usize = 256;

/// Id of the synthetic session produced by the legacy shared secret.
const LEGACY_SESSION_ID: &str = "sess_legacy";

/// Session manager configuration.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// TTL used when a request gives none.
    pub default_ttl: Duration,
    /// Upper bound on any TTL.
    pub max_ttl: Duration,
    /// Shared secret accepted as an admin token, if any.
    pub legacy_shared_secret: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&AuthSettings::default())
    }
}

impl From<&AuthSettings> for SessionConfig {
    fn from(s: &AuthSettings) -> Self {
        Self {
            default_ttl: Duration::from_secs(s.default_ttl_secs),
            max_ttl: Duration::from_secs(s.max_ttl_secs),
            legacy_shared_secret: s.legacy_shared_secret.clone(),
        }
    }
}

struct Entry {
    session: Session,
    digest: TokenDigest,
}

#[derive(Default)]
struct SessionTable {
    sessions: HashMap<SessionId, Entry>,
    by_digest: HashMap<TokenDigest, SessionId>,
}

impl SessionTable {
    fn remove(&mut self, id: &SessionId) -> Option<Session> {
        let entry = self.sessions.remove(id)?;
        let _ = self.by_digest.remove(&entry.digest);
        Some(entry.session)
    }
}

/// Issues, validates, renews, and expires sessions.
pub struct SessionManager {
    table: Mutex<SessionTable>,
    config: SessionConfig,
    legacy: Option<(TokenDigest, Session)>,
    events: broadcast::Sender<SessionLifecycle>,
}

impl SessionManager {
    /// Create an empty manager.
    pub fn new(config: SessionConfig) -> Self {
        let legacy = config.legacy_shared_secret.as_deref().map(|secret| {
            let now = Utc::now();
            let session = Session {
                id: SessionId::from(LEGACY_SESSION_ID),
                role: Role::Admin,
                label: "legacy".into(),
                created_at: now,
                expires_at: DateTime::<Utc>::MAX_UTC,
            };
            (token::digest(secret), session)
        });
        let (events, _) = broadcast::channel(LIFECYCLE_CAPACITY);
        Self {
            table: Mutex::new(SessionTable::default()),
            config,
            legacy,
            events,
        }
    }

    /// Receive lifecycle events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionLifecycle> {
        self.events.subscribe()
    }

    /// Issue a new session. `ttl` defaults to the configured default and is
    /// clamped to the configured maximum.
    pub fn create_session(
        &self,
        role: Role,
        label: impl Into<String>,
        ttl: Option<Duration>,
    ) -> IssuedSession {
        let now = Utc::now();
        let token = token::generate();
        let session = Session {
            id: SessionId::new(),
            role,
            label: label.into(),
            created_at: now,
            expires_at: self.expiry_from(now, ttl),
        };

        {
            let mut table = self.table.lock();
            let _ = table
                .by_digest
                .insert(token::digest(&token), session.id.clone());
            let _ = table.sessions.insert(
                session.id.clone(),
                Entry {
                    session: session.clone(),
                    digest: token::digest(&token),
                },
            );
        }

        info!(session_id = %session.id, %role, label = %session.label, "session created");
        self.emit(SessionLifecycle::Created {
            session_id: session.id.clone(),
            role,
        });
        IssuedSession { session, token }
    }

    /// Resolve a bearer token to its session.
    pub fn validate_token(&self, token: &str) -> Result<Session> {
        let digest = token::digest(token);

        if let Some((legacy_digest, session)) = &self.legacy {
            if token::digests_match(&digest, legacy_digest) {
                return Ok(session.clone());
            }
        }

        let now = Utc::now();
        let expired = {
            let mut table = self.table.lock();
            let id = table
                .by_digest
                .get(&digest)
                .cloned()
                .ok_or(AuthError::Unauthorized)?;
            let valid = table
                .sessions
                .get(&id)
                .map(|e| e.session.is_valid_at(now));
            match valid {
                Some(true) => {
                    return table
                        .sessions
                        .get(&id)
                        .map(|e| e.session.clone())
                        .ok_or(AuthError::Unauthorized);
                }
                Some(false) => table.remove(&id),
                None => {
                    let _ = table.by_digest.remove(&digest);
                    None
                }
            }
        };

        if let Some(session) = expired {
            self.ended(&session.id, false);
        }
        Err(AuthError::Unauthorized)
    }

    /// Check that `session` holds at least `required`.
    pub fn authorize(&self, session: &Session, required: Role) -> Result<()> {
        session.require(required)
    }

    /// Revoke a session. Returns whether a session was removed; revoking an
    /// unknown id is a no-op.
    pub fn revoke(&self, session_id: &SessionId) -> bool {
        let removed = self.table.lock().remove(session_id);
        match removed {
            Some(_) => {
                self.ended(session_id, true);
                true
            }
            None => false,
        }
    }

    /// Extend a live session's expiry to `now + ttl` (clamped).
    pub fn renew(&self, session_id: &SessionId, ttl: Option<Duration>) -> Result<Session> {
        let now = Utc::now();
        let expires_at = self.expiry_from(now, ttl);

        let outcome = {
            let mut table = self.table.lock();
            match table.sessions.get_mut(session_id) {
                Some(entry) if entry.session.is_valid_at(now) => {
                    entry.session.expires_at = expires_at;
                    Ok(entry.session.clone())
                }
                Some(_) => Err(table.remove(session_id)),
                None => Err(None),
            }
        };

        match outcome {
            Ok(session) => {
                debug!(session_id = %session.id, %expires_at, "session renewed");
                self.emit(SessionLifecycle::Renewed {
                    session_id: session.id.clone(),
                    expires_at,
                });
                Ok(session)
            }
            Err(expired) => {
                if expired.is_some() {
                    self.ended(session_id, false);
                }
                Err(AuthError::SessionNotFound(session_id.clone()))
            }
        }
    }

    /// Purge every expired session. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let purged: Vec<SessionId> = {
            let mut table = self.table.lock();
            let expired: Vec<SessionId> = table
                .sessions
                .values()
                .filter(|e| !e.session.is_valid_at(now))
                .map(|e| e.session.id.clone())
                .collect();
            for id in &expired {
                let _ = table.remove(id);
            }
            expired
        };

        for id in &purged {
            self.ended(id, false);
        }
        if !purged.is_empty() {
            debug!(count = purged.len(), "swept expired sessions");
        }
        purged.len()
    }

    /// Live sessions, oldest first.
    pub fn list(&self) -> Vec<Session> {
        let now = Utc::now();
        let mut sessions: Vec<Session> = self
            .table
            .lock()
            .sessions
            .values()
            .filter(|e| e.session.is_valid_at(now))
            .map(|e| e.session.clone())
            .collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        sessions
    }

    /// Number of live sessions.
    pub fn active_count(&self) -> usize {
        let now = Utc::now();
        self.table
            .lock()
            .sessions
            .values()
            .filter(|e| e.session.is_valid_at(now))
            .count()
    }

    /// Whether `session_id` names a live session. Does not purge.
    pub fn is_live(&self, session_id: &SessionId) -> bool {
        if self.legacy.as_ref().is_some_and(|(_, s)| &s.id == session_id) {
            return true;
        }
        let now = Utc::now();
        self.table
            .lock()
            .sessions
            .get(session_id)
            .is_some_and(|e| e.session.is_valid_at(now))
    }

    fn expiry_from(&self, now: DateTime<Utc>, ttl: Option<Duration>) -> DateTime<Utc> {
        let ttl = ttl.unwrap_or(self.config.default_ttl).min(self.config.max_ttl);
        TimeDelta::from_std(ttl)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn ended(&self, session_id: &SessionId, revoked: bool) {
        let session_id = session_id.clone();
        if revoked {
            info!(%session_id, "session revoked");
            self.emit(SessionLifecycle::Revoked { session_id });
        } else {
            info!(%session_id, "session expired");
            self.emit(SessionLifecycle::Expired { session_id });
        }
    }

    fn emit(&self, event: SessionLifecycle) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    fn manager() -> SessionManager {
        SessionManager::default()
    }

    fn short_lived(mgr: &SessionManager) -> IssuedSession {
        mgr.create_session(Role::Editor, "short", Some(Duration::from_millis(20)))
    }

    #[test]
    fn create_then_validate() {
        let mgr = manager();
        let issued = mgr.create_session(Role::Editor, "producer", None);
        let session = mgr.validate_token(&issued.token).unwrap();
        assert_eq!(session, issued.session);
        assert_eq!(session.role, Role::Editor);
        assert_eq!(session.label, "producer");
    }

    #[test]
    fn default_ttl_is_four_hours() {
        let mgr = manager();
        let s = mgr.create_session(Role::Viewer, "", None).session;
        assert_eq!((s.expires_at - s.created_at).num_hours(), 4);
    }

    #[test]
    fn ttl_is_clamped_to_max() {
        let mgr = manager();
        let s = mgr
            .create_session(Role::Viewer, "", Some(Duration::from_secs(365 * 86_400)))
            .session;
        assert_eq!((s.expires_at - s.created_at).num_hours(), 24);
    }

    #[test]
    fn unknown_token_is_unauthorized() {
        assert_matches!(
            manager().validate_token("lens_nope"),
            Err(AuthError::Unauthorized)
        );
    }

    #[test]
    fn expired_token_is_unauthorized_and_purged() {
        let mgr = manager();
        let issued = short_lived(&mgr);
        std::thread::sleep(Duration::from_millis(40));
        assert_matches!(mgr.validate_token(&issued.token), Err(AuthError::Unauthorized));
        assert_eq!(mgr.table.lock().sessions.len(), 0);
        assert_eq!(mgr.table.lock().by_digest.len(), 0);
    }

    #[test]
    fn revoke_is_idempotent() {
        let mgr = manager();
        let issued = mgr.create_session(Role::Editor, "", None);
        assert!(mgr.revoke(&issued.session.id));
        assert!(!mgr.revoke(&issued.session.id));
        assert!(!mgr.revoke(&SessionId::from("sess_missing")));
        assert_matches!(mgr.validate_token(&issued.token), Err(AuthError::Unauthorized));
    }

    #[test]
    fn renew_extends_expiry() {
        let mgr = manager();
        let issued = mgr.create_session(Role::Viewer, "", Some(Duration::from_secs(60)));
        let renewed = mgr
            .renew(&issued.session.id, Some(Duration::from_secs(3600)))
            .unwrap();
        assert!(renewed.expires_at > issued.session.expires_at);
        assert_eq!(mgr.validate_token(&issued.token).unwrap().expires_at, renewed.expires_at);
    }

    #[test]
    fn renew_expired_is_not_found() {
        let mgr = manager();
        let issued = short_lived(&mgr);
        std::thread::sleep(Duration::from_millis(40));
        assert_matches!(
            mgr.renew(&issued.session.id, None),
            Err(AuthError::SessionNotFound(_))
        );
        assert_eq!(mgr.active_count(), 0);
    }

    #[test]
    fn authorize_checks_order() {
        let mgr = manager();
        let viewer = mgr.create_session(Role::Viewer, "", None).session;
        assert!(mgr.authorize(&viewer, Role::Viewer).is_ok());
        assert_matches!(
            mgr.authorize(&viewer, Role::Editor),
            Err(AuthError::Forbidden { .. })
        );
    }

    #[test]
    fn sweep_removes_only_expired() {
        let mgr = manager();
        let _short = short_lived(&mgr);
        let long = mgr.create_session(Role::Viewer, "long", None);
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(mgr.sweep_expired(), 1);
        assert_eq!(mgr.sweep_expired(), 0);
        assert_eq!(mgr.list(), vec![long.session]);
    }

    #[test]
    fn list_is_oldest_first() {
        let mgr = manager();
        let a = mgr.create_session(Role::Viewer, "a", None).session;
        let b = mgr.create_session(Role::Viewer, "b", None).session;
        let ids: Vec<_> = mgr.list().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
        assert_eq!(mgr.active_count(), 2);
    }

    #[test]
    fn legacy_secret_is_admin() {
        let mgr = SessionManager::new(SessionConfig {
            legacy_shared_secret: Some("0123456789abcdef".into()),
            ..SessionConfig::default()
        });
        let session = mgr.validate_token("0123456789abcdef").unwrap();
        assert_eq!(session.role, Role::Admin);
        assert_eq!(session.label, "legacy");
        assert_matches!(mgr.validate_token("0123456789abcdeX"), Err(AuthError::Unauthorized));
        // Not listed and not renewable.
        assert!(mgr.list().is_empty());
        assert_matches!(mgr.renew(&session.id, None), Err(AuthError::SessionNotFound(_)));
    }

    #[test]
    fn is_live_tracks_revoke_and_expiry() {
        let mgr = SessionManager::new(SessionConfig {
            legacy_shared_secret: Some("0123456789abcdef".into()),
            ..SessionConfig::default()
        });
        let issued = mgr.create_session(Role::Viewer, "", None);
        assert!(mgr.is_live(&issued.session.id));
        assert!(mgr.revoke(&issued.session.id));
        assert!(!mgr.is_live(&issued.session.id));

        let short = short_lived(&mgr);
        std::thread::sleep(Duration::from_millis(40));
        assert!(!mgr.is_live(&short.session.id));

        let legacy = mgr.validate_token("0123456789abcdef").unwrap();
        assert!(mgr.is_live(&legacy.id));
        assert!(!mgr.is_live(&SessionId::from("sess_unknown")));
    }

    #[test]
    fn lifecycle_events_in_order() {
        let mgr = manager();
        let mut rx = mgr.subscribe();
        let issued = mgr.create_session(Role::Editor, "", None);
        let id = issued.session.id.clone();
        let _ = mgr.renew(&id, None).unwrap();
        assert!(mgr.revoke(&id));

        assert_matches!(rx.try_recv(), Ok(SessionLifecycle::Created { role: Role::Editor, .. }));
        assert_matches!(rx.try_recv(), Ok(SessionLifecycle::Renewed { .. }));
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionLifecycle::Revoked { session_id: id }
        );
    }

    #[test]
    fn concurrent_purge_emits_expired_once() {
        let mgr = Arc::new(manager());
        let issued = short_lived(&mgr);
        let mut rx = mgr.subscribe();
        std::thread::sleep(Duration::from_millis(40));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let mgr = Arc::clone(&mgr);
                let token = issued.token.clone();
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        let _ = mgr.sweep_expired();
                    } else {
                        let _ = mgr.validate_token(&token);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_matches!(rx.try_recv(), Ok(SessionLifecycle::Expired { .. }));
        assert!(rx.try_recv().is_err());
    }
}
