//! # lens-settings
//!
//! Configuration management with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** - [`LensSettings::default()`]
//! 2. **User file** - `~/.statelens/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** - `LENS_*` overrides (highest priority)
//!
//! There is no process-wide settings singleton: the binary loads settings once
//! and hands the pieces each component needs to its constructor.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
