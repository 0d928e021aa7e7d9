//! # lens-laws
//!
//! Law engine for statelens store values.
//!
//! - Laws: pure predicates over a `serde_json::Value` implementing [`Law`]
//! - Severities: error, warning, info (weighted into a 0–100 score)
//! - Default catalog: one law per category (serializability, naming,
//!   lifecycle, size, metadata) plus user-defined pattern laws
//!
//! A law that errors or panics never aborts an evaluation: it is reported as
//! an `error`-severity violation and the remaining laws still run.

#![deny(unsafe_code)]

mod cache;
pub mod catalog;
pub mod engine;
pub mod errors;
pub mod laws;
pub mod types;

pub use catalog::{CatalogLimits, default_laws};
pub use engine::LawEngine;
pub use errors::{LawError, Result};
pub use laws::{Law, PatternLaw};
pub use types::{Category, Evaluation, LawInfo, LawOutcome, LawSelection, Severity, Violation, score};
