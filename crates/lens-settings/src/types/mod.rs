//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` for the JSON file
//! format. Each type implements [`Default`] with production values, and
//! `#[serde(default)]` lets a settings file specify only what it changes.

mod laws;
mod server;

pub use laws::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// Loaded from `~/.statelens/settings.json` with defaults applied for
/// missing fields. Example:
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "registry": { "historyLimit": 500 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LensSettings {
    /// HTTP/WebSocket server settings.
    pub server: ServerSettings,
    /// Session and token settings.
    pub auth: AuthSettings,
    /// Store registry settings.
    pub registry: RegistrySettings,
    /// Law engine settings.
    pub laws: LawSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl LensSettings {
    /// Reject combinations the components cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.registry.history_limit == 0 {
            return Err(SettingsError::InvalidValue(
                "registry.historyLimit must be at least 1".into(),
            ));
        }
        if self.server.outbound_queue_capacity < 2 {
            return Err(SettingsError::InvalidValue(
                "server.outboundQueueCapacity must be at least 2".into(),
            ));
        }
        if self.auth.default_ttl_secs == 0 || self.auth.max_ttl_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "auth session TTLs must be positive".into(),
            ));
        }
        if self.auth.default_ttl_secs > self.auth.max_ttl_secs {
            return Err(SettingsError::InvalidValue(format!(
                "auth.defaultTtlSecs ({}) exceeds auth.maxTtlSecs ({})",
                self.auth.default_ttl_secs, self.auth.max_ttl_secs
            )));
        }
        if let Some(secret) = &self.auth.legacy_shared_secret {
            if secret.len() < 16 {
                return Err(SettingsError::InvalidValue(
                    "auth.legacySharedSecret must be at least 16 characters".into(),
                ));
            }
        }
        let mut seen = std::collections::HashSet::new();
        for law in &self.laws.custom_laws {
            if !seen.insert(law.id.as_str()) {
                return Err(SettingsError::InvalidValue(format!(
                    "duplicate custom law id: {}",
                    law.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn partial_json_fills_defaults() {
        let s: LensSettings =
            serde_json::from_str(r#"{"registry": {"historyLimit": 5}}"#).unwrap();
        assert_eq!(s.registry.history_limit, 5);
        assert_eq!(s.server.port, 7411);
        assert!(!s.registry.cleanup_on_session_end);
    }

    #[test]
    fn zero_history_limit_rejected() {
        let mut s = LensSettings::default();
        s.registry.history_limit = 0;
        assert_matches!(s.validate(), Err(SettingsError::InvalidValue(m)) if m.contains("historyLimit"));
    }

    #[test]
    fn tiny_queue_rejected() {
        let mut s = LensSettings::default();
        s.server.outbound_queue_capacity = 1;
        assert!(s.validate().is_err());
    }

    #[test]
    fn default_ttl_above_max_rejected() {
        let mut s = LensSettings::default();
        s.auth.default_ttl_secs = s.auth.max_ttl_secs + 1;
        assert!(s.validate().is_err());
    }

    #[test]
    fn short_shared_secret_rejected() {
        let mut s = LensSettings::default();
        s.auth.legacy_shared_secret = Some("short".into());
        assert!(s.validate().is_err());
        s.auth.legacy_shared_secret = Some("a-long-enough-shared-secret".into());
        assert!(s.validate().is_ok());
    }

    #[test]
    fn duplicate_custom_law_rejected() {
        let mut s = LensSettings::default();
        let law = CustomLawSettings {
            id: "custom.email".into(),
            severity: LawSeveritySetting::Warning,
            pointer: "/email".into(),
            pattern: "@".into(),
            description: None,
        };
        s.laws.custom_laws = vec![law.clone(), law];
        assert_matches!(s.validate(), Err(SettingsError::InvalidValue(m)) if m.contains("custom.email"));
    }

    #[test]
    fn camel_case_serialization() {
        let json = serde_json::to_value(LensSettings::default()).unwrap();
        assert!(json["server"]["outboundQueueCapacity"].is_number());
        assert!(json["auth"]["defaultTtlSecs"].is_number());
        assert!(json["laws"]["defaultEnabled"].is_array());
    }
}
