//! Law engine settings.
//!
//! Limits for the built-in catalog, the compliance sweep cadence, and
//! user-defined pattern laws.

use serde::{Deserialize, Serialize};

/// Law engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LawSettings {
    /// Laws enabled on newly registered stores. The entry `"all"` enables
    /// the whole catalog.
    pub default_enabled: Vec<String>,
    /// `size.bounded`: maximum encoded size of a store value in bytes.
    pub max_bytes: usize,
    /// `size.bounded`: maximum length of any array inside a value.
    pub max_array_len: usize,
    /// `serializable.json-safe`: maximum nesting depth.
    pub max_depth: usize,
    /// Seconds between compliance sweeps (`0` disables the sweep).
    pub sweep_interval_secs: u64,
    /// Maximum cached evaluations.
    pub cache_capacity: usize,
    /// User-defined pattern laws.
    pub custom_laws: Vec<CustomLawSettings>,
}

impl Default for LawSettings {
    fn default() -> Self {
        Self {
            default_enabled: vec!["all".to_string()],
            max_bytes: 256 * 1024,
            max_array_len: 10_000,
            max_depth: 64,
            sweep_interval_secs: 15,
            cache_capacity: 1024,
            custom_laws: Vec::new(),
        }
    }
}

/// Severity of a user-defined law.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LawSeveritySetting {
    /// Counts heavily against the score.
    Error,
    /// Counts moderately against the score.
    Warning,
    /// Counts lightly against the score.
    Info,
}

/// A user-defined law: the string at `pointer` must match `pattern`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomLawSettings {
    /// Unique law identifier (e.g. `custom.user-email`).
    pub id: String,
    /// Severity of a violation.
    pub severity: LawSeveritySetting,
    /// RFC 6901 JSON pointer into the store value (e.g. `/user/email`).
    pub pointer: String,
    /// Regex the pointed-to string must match.
    pub pattern: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
