//! `size.bounded`: the value stays small enough to stream to observers.

use serde_json::Value;

use super::{Law, display_pointer, find_node};
use crate::errors::{LawError, Result};
use crate::types::{Category, LawOutcome, Severity};

/// Encoded size and array lengths are bounded.
#[derive(Debug)]
pub struct SizeBoundLaw {
    max_bytes: usize,
    max_array_len: usize,
}

impl SizeBoundLaw {
    /// Law ID.
    pub const ID: &'static str = "size.bounded";

    /// Create with explicit limits.
    #[must_use]
    pub fn new(max_bytes: usize, max_array_len: usize) -> Self {
        Self {
            max_bytes,
            max_array_len,
        }
    }
}

impl Law for SizeBoundLaw {
    fn id(&self) -> &str {
        Self::ID
    }

    fn category(&self) -> Category {
        Category::Size
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn description(&self) -> &str {
        "Encoded value and every array inside it stay within configured bounds"
    }

    fn remediation(&self) -> Option<&str> {
        Some("Paginate large collections or move bulk data out of the store")
    }

    fn check(&self, value: &Value) -> Result<LawOutcome> {
        let encoded = serde_json::to_vec(value).map_err(|e| LawError::Check {
            message: e.to_string(),
        })?;
        if encoded.len() > self.max_bytes {
            return Ok(LawOutcome::fail(format!(
                "encoded value is {} bytes (limit {})",
                encoded.len(),
                self.max_bytes
            ))
            .with_suggestion("Split the value across several stores or drop cached data"));
        }

        let long_array = find_node(value, |node, pointer, _| match node {
            Value::Array(items) if items.len() > self.max_array_len => {
                Some((pointer.to_string(), items.len()))
            }
            _ => None,
        });

        Ok(match long_array {
            None => LawOutcome::pass(),
            Some((pointer, len)) => LawOutcome::fail(format!(
                "array at {} has {len} items (limit {})",
                display_pointer(&pointer),
                self.max_array_len
            ))
            .with_suggestion("Paginate or window the collection"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn small_value_passes() {
        let law = SizeBoundLaw::new(256 * 1024, 10_000);
        assert!(law.check(&json!({"a": 1})).unwrap().valid);
    }

    #[test]
    fn byte_limit() {
        let law = SizeBoundLaw::new(16, 10_000);
        let outcome = law.check(&json!({"text": "a long enough string"})).unwrap();
        assert!(!outcome.valid);
        assert!(outcome.message.contains("limit 16"));
    }

    #[test]
    fn array_limit_applies_to_nested_arrays() {
        let law = SizeBoundLaw::new(usize::MAX, 3);
        assert!(law.check(&json!({"items": [1, 2, 3]})).unwrap().valid);
        let outcome = law.check(&json!({"page": {"items": [1, 2, 3, 4]}})).unwrap();
        assert!(!outcome.valid);
        assert!(outcome.message.contains("/page/items"));
    }
}
