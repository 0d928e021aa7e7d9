//! Law engine value types: severities, selections, violations, scores.

use std::fmt;

use lens_settings::LawSeveritySetting;
use serde::{Deserialize, Serialize};

/// Score of a value with no violations.
pub const MAX_SCORE: u8 = 100;

/// How much a violation counts against the score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Structural problem observers will trip over.
    Error,
    /// Likely problem.
    Warning,
    /// Convention not followed.
    Info,
}

impl Severity {
    /// Score penalty per violation.
    #[must_use]
    pub const fn penalty(self) -> u32 {
        match self {
            Self::Error => 20,
            Self::Warning => 8,
            Self::Info => 2,
        }
    }

    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<LawSeveritySetting> for Severity {
    fn from(s: LawSeveritySetting) -> Self {
        match s {
            LawSeveritySetting::Error => Self::Error,
            LawSeveritySetting::Warning => Self::Warning,
            LawSeveritySetting::Info => Self::Info,
        }
    }
}

/// Law category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// The value survives a JSON round trip through any observer.
    Serializability,
    /// Key naming conventions.
    Naming,
    /// A lifecycle field is present.
    Lifecycle,
    /// Size bounds.
    Size,
    /// A metadata block is present.
    Metadata,
    /// User-defined.
    Custom,
}

/// Result of one law's check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LawOutcome {
    /// Whether the value satisfies the law.
    pub valid: bool,
    /// Explanation when invalid.
    pub message: String,
    /// Remediation hint.
    pub suggestion: Option<String>,
}

impl LawOutcome {
    /// A passing outcome.
    #[must_use]
    pub fn pass() -> Self {
        Self {
            valid: true,
            message: String::new(),
            suggestion: None,
        }
    }

    /// A failing outcome.
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
            suggestion: None,
        }
    }

    /// Attach a remediation hint.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// A failed law check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// Law that failed.
    pub rule_id: String,
    /// Law category.
    pub category: Category,
    /// Law severity.
    pub severity: Severity,
    /// What is wrong.
    pub message: String,
    /// How to fix it, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Output of [`LawEngine::evaluate`](crate::LawEngine::evaluate).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    /// Violations in law-id order.
    pub violations: Vec<Violation>,
    /// Compliance score in `[0, 100]`.
    pub score: u8,
    /// Laws that ran, in id order.
    pub evaluated_laws: Vec<String>,
}

/// Catalog listing entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LawInfo {
    /// Law ID.
    pub id: String,
    /// Category.
    pub category: Category,
    /// Severity.
    pub severity: Severity,
    /// Description.
    pub description: String,
}

/// Which laws apply to a store.
///
/// On the wire this is either the string `"all"` or a list of law IDs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SelectionRepr", into = "SelectionRepr")]
pub enum LawSelection {
    /// Every law in the catalog at evaluation time.
    #[default]
    All,
    /// Exactly these laws.
    Ids(Vec<String>),
}

impl LawSelection {
    /// Build a selection from a configured ID list; an `"all"` entry selects
    /// the whole catalog.
    #[must_use]
    pub fn from_ids(ids: &[String]) -> Self {
        if ids.iter().any(|id| id == "all") {
            Self::All
        } else {
            Self::Ids(ids.to_vec())
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SelectionRepr {
    Keyword(String),
    Ids(Vec<String>),
}

impl TryFrom<SelectionRepr> for LawSelection {
    type Error = String;

    fn try_from(repr: SelectionRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            SelectionRepr::Keyword(k) if k == "all" => Ok(Self::All),
            SelectionRepr::Keyword(k) => Err(format!(
                "expected \"all\" or a list of law ids, got \"{k}\""
            )),
            SelectionRepr::Ids(ids) => Ok(Self::from_ids(&ids)),
        }
    }
}

impl From<LawSelection> for SelectionRepr {
    fn from(sel: LawSelection) -> Self {
        match sel {
            LawSelection::All => Self::Keyword("all".into()),
            LawSelection::Ids(ids) => Self::Ids(ids),
        }
    }
}

/// Compliance score: `100 − Σ penalty`, floored at 0.
#[must_use]
pub fn score(violations: &[Violation]) -> u8 {
    let penalty = violations
        .iter()
        .fold(0u32, |acc, v| acc.saturating_add(v.severity.penalty()));
    u8::try_from(u32::from(MAX_SCORE).saturating_sub(penalty)).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(severity: Severity) -> Violation {
        Violation {
            rule_id: "x".into(),
            category: Category::Custom,
            severity,
            message: String::new(),
            suggestion: None,
        }
    }

    #[test]
    fn score_weights() {
        assert_eq!(score(&[]), 100);
        assert_eq!(score(&[violation(Severity::Error)]), 80);
        assert_eq!(score(&[violation(Severity::Warning)]), 92);
        assert_eq!(score(&[violation(Severity::Info)]), 98);
        assert_eq!(
            score(&[violation(Severity::Error), violation(Severity::Warning), violation(Severity::Info)]),
            70
        );
    }

    #[test]
    fn score_floors_at_zero() {
        let many = vec![violation(Severity::Error); 6];
        assert_eq!(score(&many), 0);
    }

    #[test]
    fn selection_wire_forms() {
        let all: LawSelection = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(all, LawSelection::All);
        let ids: LawSelection = serde_json::from_str(r#"["size.bounded"]"#).unwrap();
        assert_eq!(ids, LawSelection::Ids(vec!["size.bounded".into()]));
        assert!(serde_json::from_str::<LawSelection>("\"some\"").is_err());
        assert_eq!(serde_json::to_value(LawSelection::All).unwrap(), "all");
    }

    #[test]
    fn from_ids_recognizes_all() {
        assert_eq!(LawSelection::from_ids(&["all".into()]), LawSelection::All);
        assert_eq!(LawSelection::from_ids(&[]), LawSelection::Ids(vec![]));
    }

    #[test]
    fn violation_wire_shape() {
        let json = serde_json::to_value(violation(Severity::Warning)).unwrap();
        assert_eq!(json["ruleId"], "x");
        assert_eq!(json["severity"], "warning");
        assert!(json.get("suggestion").is_none());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn severity() -> impl Strategy<Value = Severity> {
            prop_oneof![Just(Severity::Error), Just(Severity::Warning), Just(Severity::Info)]
        }

        proptest! {
            #[test]
            fn score_in_bounds(sevs in proptest::collection::vec(severity(), 0..40)) {
                let violations: Vec<_> = sevs.into_iter().map(violation).collect();
                let s = score(&violations);
                prop_assert!(s <= 100);
                prop_assert_eq!(s == 100, violations.is_empty());
            }
        }
    }
}
