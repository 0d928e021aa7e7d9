//! `naming.key-style`: object keys are well-formed and use one style.

use serde_json::Value;

use super::{Law, display_pointer, find_node};
use crate::errors::Result;
use crate::types::{Category, LawOutcome, Severity};

/// Keys are non-empty, contain no whitespace, and each object sticks to
/// either camelCase or `snake_case`.
#[derive(Debug, Default)]
pub struct KeyStyleLaw;

impl KeyStyleLaw {
    /// Law ID.
    pub const ID: &'static str = "naming.key-style";
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Style {
    /// Single lowercase word; compatible with both styles.
    Plain,
    Camel,
    Snake,
    Other,
}

fn classify(key: &str) -> Style {
    // Leading underscores mark private/meta keys and don't affect style.
    let key = key.trim_start_matches('_');
    let has_upper = key.chars().any(char::is_uppercase);
    let has_underscore = key.contains('_');
    let starts_lower = key.chars().next().is_none_or(|c| !c.is_uppercase());

    match (has_upper, has_underscore) {
        (false, false) => Style::Plain,
        (false, true) => Style::Snake,
        (true, false) if starts_lower => Style::Camel,
        _ => Style::Other,
    }
}

fn style_name(style: Style) -> &'static str {
    match style {
        Style::Camel => "camelCase",
        Style::Snake => "snake_case",
        Style::Plain | Style::Other => "mixed",
    }
}

fn object_problem(map: &serde_json::Map<String, Value>, pointer: &str) -> Option<LawOutcome> {
    let mut seen: Option<(Style, &str)> = None;
    for key in map.keys() {
        if key.is_empty() {
            return Some(
                LawOutcome::fail(format!("empty key in object at {}", display_pointer(pointer)))
                    .with_suggestion("Give every field a descriptive name"),
            );
        }
        if key.chars().any(char::is_whitespace) {
            return Some(
                LawOutcome::fail(format!(
                    "key \"{key}\" at {} contains whitespace",
                    display_pointer(pointer)
                ))
                .with_suggestion("Use camelCase or snake_case instead of spaces"),
            );
        }
        match classify(key) {
            Style::Plain | Style::Other => {}
            style => match seen {
                None => seen = Some((style, key)),
                Some((first, first_key)) if first != style => {
                    return Some(
                        LawOutcome::fail(format!(
                            "object at {} mixes {} (\"{first_key}\") and {} (\"{key}\") keys",
                            display_pointer(pointer),
                            style_name(first),
                            style_name(style)
                        ))
                        .with_suggestion(format!(
                            "Rename keys to {} to match the rest of the object",
                            style_name(first)
                        )),
                    );
                }
                Some(_) => {}
            },
        }
    }
    None
}

impl Law for KeyStyleLaw {
    fn id(&self) -> &str {
        Self::ID
    }

    fn category(&self) -> Category {
        Category::Naming
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn description(&self) -> &str {
        "Object keys are non-empty, whitespace-free, and consistently camelCase or snake_case"
    }

    fn remediation(&self) -> Option<&str> {
        Some("Pick one key style per object and rename the outliers")
    }

    fn check(&self, value: &Value) -> Result<LawOutcome> {
        let problem = find_node(value, |node, pointer, _| match node {
            Value::Object(map) => object_problem(map, pointer),
            _ => None,
        });
        Ok(problem.unwrap_or_else(LawOutcome::pass))
    }
}
