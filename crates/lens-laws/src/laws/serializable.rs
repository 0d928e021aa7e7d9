//! `serializable.json-safe`: the value round-trips through any JSON observer.

use serde_json::Value;

use super::{Law, display_pointer, find_node};
use crate::errors::Result;
use crate::types::{Category, LawOutcome, Severity};

/// Largest integer a JavaScript `Number` represents exactly (2^53 − 1).
pub const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991;

/// Nesting depth is bounded and every integer is within ±(2^53 − 1).
#[derive(Debug)]
pub struct JsonSafeLaw {
    max_depth: usize,
}

impl JsonSafeLaw {
    /// Law ID.
    pub const ID: &'static str = "serializable.json-safe";

    /// Create with a maximum nesting depth.
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }
}

enum Problem {
    TooDeep(String, usize),
    UnsafeInteger(String),
}

fn is_unsafe_integer(value: &Value) -> bool {
    let Value::Number(n) = value else {
        return false;
    };
    if let Some(u) = n.as_u64() {
        u > MAX_SAFE_INTEGER
    } else if let Some(i) = n.as_i64() {
        i.unsigned_abs() > MAX_SAFE_INTEGER
    } else {
        false
    }
}

impl Law for JsonSafeLaw {
    fn id(&self) -> &str {
        Self::ID
    }

    fn category(&self) -> Category {
        Category::Serializability
    }

    fn severity(&self) -> Severity {
        Severity::Error
    }

    fn description(&self) -> &str {
        "Value nests at most the configured depth and all integers are exactly representable in JavaScript"
    }

    fn remediation(&self) -> Option<&str> {
        Some("Flatten deeply nested structures and encode large integers as strings")
    }

    fn check(&self, value: &Value) -> Result<LawOutcome> {
        let problem = find_node(value, |node, pointer, depth| {
            if depth > self.max_depth {
                Some(Problem::TooDeep(pointer.to_string(), depth))
            } else if is_unsafe_integer(node) {
                Some(Problem::UnsafeInteger(pointer.to_string()))
            } else {
                None
            }
        });

        Ok(match problem {
            None => LawOutcome::pass(),
            Some(Problem::TooDeep(pointer, depth)) => LawOutcome::fail(format!(
                "value nests deeper than {} levels (depth {depth} at {})",
                self.max_depth,
                display_pointer(&pointer)
            ))
            .with_suggestion("Flatten the structure or split it across several stores"),
            Some(Problem::UnsafeInteger(pointer)) => LawOutcome::fail(format!(
                "integer at {} exceeds ±(2^53 − 1) and will lose precision in JavaScript",
                display_pointer(&pointer)
            ))
            .with_suggestion("Encode the integer as a string"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nested(depth: usize) -> Value {
        (0..depth).fold(json!(1), |acc, _| json!([acc]))
    }

    #[test]
    fn plain_value_passes() {
        let law = JsonSafeLaw::new(64);
        assert!(law.check(&json!({"a": 1, "b": [true, null, "x", 1.5]})).unwrap().valid);
    }

    #[test]
    fn depth_limit_is_inclusive() {
        let law = JsonSafeLaw::new(4);
        assert!(law.check(&nested(4)).unwrap().valid);
        let outcome = law.check(&nested(5)).unwrap();
        assert!(!outcome.valid);
        assert!(outcome.message.contains("deeper than 4"));
    }

    #[test]
    fn large_integers_fail() {
        let law = JsonSafeLaw::new(64);
        assert!(law.check(&json!({"n": MAX_SAFE_INTEGER})).unwrap().valid);
        assert!(law.check(&json!({"n": -9_007_199_254_740_991_i64})).unwrap().valid);

        let outcome = law.check(&json!({"n": MAX_SAFE_INTEGER + 1})).unwrap();
        assert!(!outcome.valid);
        assert!(outcome.message.contains("/n"));

        assert!(!law.check(&json!([i64::MIN])).unwrap().valid);
    }

    #[test]
    fn floats_pass() {
        let law = JsonSafeLaw::new(64);
        assert!(law.check(&json!(1.0e300)).unwrap().valid);
    }
}
