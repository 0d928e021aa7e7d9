//! `metadata.present`: object stores carry a metadata block.

use serde_json::Value;

use super::Law;
use crate::errors::Result;
use crate::types::{Category, LawOutcome, Severity};

/// A top-level object has a `meta` or `_meta` object.
#[derive(Debug, Default)]
pub struct MetadataLaw;

impl MetadataLaw {
    /// Law ID.
    pub const ID: &'static str = "metadata.present";
}

impl Law for MetadataLaw {
    fn id(&self) -> &str {
        Self::ID
    }

    fn category(&self) -> Category {
        Category::Metadata
    }

    fn severity(&self) -> Severity {
        Severity::Info
    }

    fn description(&self) -> &str {
        "Top-level objects carry a meta or _meta object"
    }

    fn remediation(&self) -> Option<&str> {
        Some("Add a \"_meta\" object with fields such as source or updatedBy")
    }

    fn check(&self, value: &Value) -> Result<LawOutcome> {
        let Value::Object(map) = value else {
            return Ok(LawOutcome::pass());
        };
        let has_meta = ["meta", "_meta"]
            .iter()
            .any(|k| map.get(*k).is_some_and(Value::is_object));
        Ok(if has_meta {
            LawOutcome::pass()
        } else {
            LawOutcome::fail("no meta or _meta object").with_suggestion("Add a \"_meta\" object")
        })
    }
}
