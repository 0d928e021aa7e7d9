//! Store-key subscription patterns.

use std::fmt;
use std::str::FromStr;

/// Which store keys a subscription covers.
///
/// Parsed from `*` (every key), `prefix*` (keys starting with `prefix`), or
/// an exact key. A `*` anywhere but the end is rejected, matching the
/// registry's rule that keys never contain `*`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPattern {
    /// Every key.
    All,
    /// Keys starting with the prefix.
    Prefix(String),
    /// Exactly this key.
    Exact(String),
}

impl KeyPattern {
    /// Whether `key` is covered.
    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::All => true,
            Self::Prefix(prefix) => key.starts_with(prefix.as_str()),
            Self::Exact(exact) => exact == key,
        }
    }
}

/// Returned for an empty pattern or a misplaced `*`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid key pattern: {0:?}")]
pub struct InvalidPattern(pub String);

impl FromStr for KeyPattern {
    type Err = InvalidPattern;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            return Ok(Self::All);
        }
        match s.strip_suffix('*') {
            Some(prefix) if !prefix.is_empty() && !prefix.contains('*') => {
                Ok(Self::Prefix(prefix.to_owned()))
            }
            None if !s.is_empty() && !s.contains('*') => Ok(Self::Exact(s.to_owned())),
            _ => Err(InvalidPattern(s.to_owned())),
        }
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Prefix(prefix) => write!(f, "{prefix}*"),
            Self::Exact(key) => f.write_str(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parse_forms() {
        assert_eq!("*".parse::<KeyPattern>().unwrap(), KeyPattern::All);
        assert_eq!(
            "cart.*".parse::<KeyPattern>().unwrap(),
            KeyPattern::Prefix("cart.".into())
        );
        assert_eq!(
            "cart".parse::<KeyPattern>().unwrap(),
            KeyPattern::Exact("cart".into())
        );
    }

    #[test]
    fn parse_rejects_bad_patterns() {
        assert_matches!("".parse::<KeyPattern>(), Err(InvalidPattern(_)));
        assert_matches!("a*b".parse::<KeyPattern>(), Err(InvalidPattern(_)));
        assert_matches!("**".parse::<KeyPattern>(), Err(InvalidPattern(_)));
        assert_matches!("*cart".parse::<KeyPattern>(), Err(InvalidPattern(_)));
    }

    #[test]
    fn matching() {
        let prefix = KeyPattern::Prefix("user.".into());
        assert!(prefix.matches("user.profile"));
        assert!(prefix.matches("user."));
        assert!(!prefix.matches("users"));
        assert!(KeyPattern::All.matches("anything"));
        assert!(KeyPattern::Exact("cart".into()).matches("cart"));
        assert!(!KeyPattern::Exact("cart".into()).matches("cart2"));
    }

    #[test]
    fn display_round_trips() {
        for raw in ["*", "cart", "ui.*"] {
            assert_eq!(raw.parse::<KeyPattern>().unwrap().to_string(), raw);
        }
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prefix_pattern_matches_its_extensions(prefix in "[a-z.]{1,8}", rest in "[a-z0-9.]{0,8}") {
                let pattern: KeyPattern = format!("{prefix}*").parse().unwrap();
                let key = format!("{prefix}{rest}");
                prop_assert!(pattern.matches(&key));
            }

            #[test]
            fn exact_pattern_matches_only_itself(key in "[a-z]{1,8}", other in "[a-z]{1,8}") {
                let pattern: KeyPattern = key.parse().unwrap();
                prop_assert_eq!(pattern.matches(&other), key == other);
            }
        }
    }
}
