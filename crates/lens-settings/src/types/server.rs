//! Server, auth, registry, and logging settings.
//!
//! Grouped here because they are small and all consumed at server startup.

use lens_core::Role;
use serde::{Deserialize, Serialize};

/// Server network and connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (`0` = auto-assign).
    pub port: u16,
    /// Maximum concurrent observer connections.
    pub max_connections: usize,
    /// Interval between server pings, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close a connection after this long without a pong, in seconds.
    pub heartbeat_timeout_secs: u64,
    /// Per-connection outbound queue capacity (frames).
    pub outbound_queue_capacity: usize,
    /// Maximum inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7411,
            max_connections: 64,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            outbound_queue_capacity: 256,
            max_message_size: 4 * 1024 * 1024,
        }
    }
}

/// Session lifecycle settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// TTL applied when a create-session request gives none, in seconds.
    pub default_ttl_secs: u64,
    /// Upper bound on any requested TTL, in seconds.
    pub max_ttl_secs: u64,
    /// How often expired sessions are swept, in seconds.
    pub sweep_interval_secs: u64,
    /// Single shared secret accepted as an admin bearer token. Intended only
    /// for deployments that predate per-session tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy_shared_secret: Option<String>,
    /// Highest role an unauthenticated `session.create` may request.
    /// Higher roles require an admin caller.
    pub open_enrollment_max_role: Role,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            default_ttl_secs: 4 * 60 * 60,
            max_ttl_secs: 24 * 60 * 60,
            sweep_interval_secs: 60,
            legacy_shared_secret: None,
            open_enrollment_max_role: Role::Editor,
        }
    }
}

/// Store registry settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrySettings {
    /// History entries retained per store (oldest evicted first).
    pub history_limit: usize,
    /// Remove a session's stores when the session is revoked or expires.
    pub cleanup_on_session_end: bool,
    /// A store still at version 0 after this many seconds is reported as a
    /// likely orphan.
    pub orphan_after_secs: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            history_limit: 100,
            cleanup_on_session_end: false,
            orphan_after_secs: 300,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (overridden by `RUST_LOG`).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
