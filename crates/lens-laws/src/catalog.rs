//! Built-in law catalog.
//!
//! ## Default laws (5)
//! - `serializable.json-safe` (error): depth and integer range
//! - `naming.key-style` (warning): consistent, well-formed keys
//! - `lifecycle.status-field` (info): `status`/`state`/`phase` present
//! - `size.bounded` (warning): encoded size and array length
//! - `metadata.present` (info): `meta`/`_meta` present
//!
//! Custom pattern laws from settings are appended after the defaults.

use std::sync::Arc;

use lens_settings::LawSettings;

use crate::errors::Result;
use crate::laws::{
    JsonSafeLaw, KeyStyleLaw, Law, MetadataLaw, PatternLaw, SizeBoundLaw, StatusFieldLaw,
};

/// Limits the default laws are built with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CatalogLimits {
    /// Maximum encoded size in bytes.
    pub max_bytes: usize,
    /// Maximum array length.
    pub max_array_len: usize,
    /// Maximum nesting depth.
    pub max_depth: usize,
}

impl Default for CatalogLimits {
    fn default() -> Self {
        Self::from(&LawSettings::default())
    }
}

impl From<&LawSettings> for CatalogLimits {
    fn from(s: &LawSettings) -> Self {
        Self {
            max_bytes: s.max_bytes,
            max_array_len: s.max_array_len,
            max_depth: s.max_depth,
        }
    }
}

/// IDs of the default laws.
pub const DEFAULT_LAW_IDS: &[&str] = &[
    JsonSafeLaw::ID,
    KeyStyleLaw::ID,
    StatusFieldLaw::ID,
    SizeBoundLaw::ID,
    MetadataLaw::ID,
];

/// Build the five default laws.
pub fn default_laws(limits: CatalogLimits) -> Vec<Arc<dyn Law>> {
    vec![
        Arc::new(JsonSafeLaw::new(limits.max_depth)),
        Arc::new(KeyStyleLaw),
        Arc::new(StatusFieldLaw),
        Arc::new(SizeBoundLaw::new(limits.max_bytes, limits.max_array_len)),
        Arc::new(MetadataLaw),
    ]
}

/// Default laws plus every custom law in `settings`.
pub fn laws_from_settings(settings: &LawSettings) -> Result<Vec<Arc<dyn Law>>> {
    let mut laws = default_laws(CatalogLimits::from(settings));
    for custom in &settings.custom_laws {
        let law = PatternLaw::new(
            custom.id.clone(),
            custom.severity.into(),
            custom.pointer.clone(),
            &custom.pattern,
            custom.description.clone(),
        )?;
        laws.push(Arc::new(law));
    }
    Ok(laws)
}
