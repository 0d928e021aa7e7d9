//! `lifecycle.status-field`: object stores expose where they are in their
//! lifecycle.

use serde_json::Value;

use super::Law;
use crate::errors::Result;
use crate::types::{Category, LawOutcome, Severity};

/// Field names accepted as a lifecycle marker.
pub const LIFECYCLE_FIELDS: &[&str] = &["status", "state", "phase"];

/// A top-level object carries a string `status`, `state`, or `phase`.
/// Non-object values are not subject to this law.
#[derive(Debug, Default)]
pub struct StatusFieldLaw;

impl StatusFieldLaw {
    /// Law ID.
    pub const ID: &'static str = "lifecycle.status-field";
}

impl Law for StatusFieldLaw {
    fn id(&self) -> &str {
        Self::ID
    }

    fn category(&self) -> Category {
        Category::Lifecycle
    }

    fn severity(&self) -> Severity {
        Severity::Info
    }

    fn description(&self) -> &str {
        "Top-level objects expose a status, state, or phase string"
    }

    fn remediation(&self) -> Option<&str> {
        Some("Add a \"status\" string such as \"idle\", \"loading\", or \"ready\"")
    }

    fn check(&self, value: &Value) -> Result<LawOutcome> {
        let Value::Object(map) = value else {
            return Ok(LawOutcome::pass());
        };

        for field in LIFECYCLE_FIELDS {
            match map.get(*field) {
                Some(Value::String(_)) => return Ok(LawOutcome::pass()),
                Some(_) => {
                    return Ok(LawOutcome::fail(format!("\"{field}\" is present but not a string"))
                        .with_suggestion(format!("Store \"{field}\" as a string label")));
                }
                None => {}
            }
        }

        Ok(
            LawOutcome::fail("no lifecycle field (status, state, or phase)")
                .with_suggestion("Add a \"status\" string field"),
        )
    }
}
