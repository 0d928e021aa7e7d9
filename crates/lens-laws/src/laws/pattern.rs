//! User-defined pattern laws: the string at a JSON pointer matches a regex.

use regex::Regex;
use serde_json::Value;

use super::Law;
use crate::errors::{LawError, Result};
use crate::types::{Category, LawOutcome, Severity};

/// The string at `pointer` must match `pattern`. A missing target is a
/// violation.
#[derive(Debug)]
pub struct PatternLaw {
    id: String,
    severity: Severity,
    pointer: String,
    pattern: Regex,
    description: String,
}

impl PatternLaw {
    /// Compile a pattern law.
    ///
    /// The pointer must be empty (the whole value) or start with `/`.
    pub fn new(
        id: impl Into<String>,
        severity: Severity,
        pointer: impl Into<String>,
        pattern: &str,
        description: Option<String>,
    ) -> Result<Self> {
        let id = id.into();
        let pointer = pointer.into();
        if id.trim().is_empty() {
            return Err(LawError::InvalidLaw {
                message: "law id must not be empty".into(),
            });
        }
        if !pointer.is_empty() && !pointer.starts_with('/') {
            return Err(LawError::InvalidLaw {
                message: format!("{id}: pointer must start with '/', got \"{pointer}\""),
            });
        }
        let pattern = Regex::new(pattern)?;
        let description =
            description.unwrap_or_else(|| format!("Value at {pointer} matches /{pattern}/"));
        Ok(Self {
            id,
            severity,
            pointer,
            pattern,
            description,
        })
    }
}

impl Law for PatternLaw {
    fn id(&self) -> &str {
        &self.id
    }

    fn category(&self) -> Category {
        Category::Custom
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn check(&self, value: &Value) -> Result<LawOutcome> {
        Ok(match value.pointer(&self.pointer) {
            None => LawOutcome::fail(format!("no value at {}", self.pointer))
                .with_suggestion(format!("Set {} to a string matching /{}/", self.pointer, self.pattern)),
            Some(Value::String(s)) if self.pattern.is_match(s) => LawOutcome::pass(),
            Some(Value::String(s)) => LawOutcome::fail(format!(
                "\"{s}\" at {} does not match /{}/",
                self.pointer, self.pattern
            )),
            Some(_) => LawOutcome::fail(format!("value at {} is not a string", self.pointer)),
        })
    }
}
