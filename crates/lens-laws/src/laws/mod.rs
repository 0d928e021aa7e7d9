//! Law trait and the built-in law implementations.
//!
//! Laws are keyed by ID in the engine; adding one never touches the
//! evaluation loop.

mod lifecycle;
mod metadata;
mod naming;
mod pattern;
mod serializable;
mod size;

pub use lifecycle::StatusFieldLaw;
pub use metadata::MetadataLaw;
pub use naming::KeyStyleLaw;
pub use pattern::PatternLaw;
pub use serializable::JsonSafeLaw;
pub use size::SizeBoundLaw;

use serde_json::Value;

use crate::errors::Result;
use crate::types::{Category, LawInfo, LawOutcome, Severity};

/// A pure, deterministic predicate over a store value.
pub trait Law: Send + Sync {
    /// Unique ID (e.g. `size.bounded`).
    fn id(&self) -> &str;

    /// Category.
    fn category(&self) -> Category;

    /// Severity of a violation.
    fn severity(&self) -> Severity;

    /// One-line description for the catalog.
    fn description(&self) -> &str;

    /// Generic remediation, used when a violation carries no suggestion.
    fn remediation(&self) -> Option<&str> {
        None
    }

    /// Check `value`. Must not have side effects.
    fn check(&self, value: &Value) -> Result<LawOutcome>;

    /// Catalog listing entry.
    fn info(&self) -> LawInfo {
        LawInfo {
            id: self.id().to_string(),
            category: self.category(),
            severity: self.severity(),
            description: self.description().to_string(),
        }
    }
}

/// Visit every node of `value` depth-first with its JSON pointer and nesting
/// depth (the root is depth 0). Stops early when `visit` returns `Some`.
///
/// Iterative, so deeply nested values cannot overflow the stack.
pub(crate) fn find_node<T>(
    value: &Value,
    mut visit: impl FnMut(&Value, &str, usize) -> Option<T>,
) -> Option<T> {
    let mut stack: Vec<(&Value, String, usize)> = vec![(value, String::new(), 0)];
    while let Some((node, pointer, depth)) = stack.pop() {
        if let Some(found) = visit(node, &pointer, depth) {
            return Some(found);
        }
        match node {
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate().rev() {
                    stack.push((item, format!("{pointer}/{i}"), depth + 1));
                }
            }
            Value::Object(map) => {
                for (key, child) in map.iter().rev() {
                    stack.push((child, format!("{pointer}/{}", escape_token(key)), depth + 1));
                }
            }
            _ => {}
        }
    }
    None
}

/// RFC 6901 reference-token escaping.
fn escape_token(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

/// Pointer for display: the root is shown as `/`.
pub(crate) fn display_pointer(pointer: &str) -> &str {
    if pointer.is_empty() { "/" } else { pointer }
}
