use crate::error::{EngineError, Result};
use crate::types::Comparator;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fact key → fact value, as reported by a node's discovery agent.
pub type FactMap = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// TagMatcher
// ---------------------------------------------------------------------------

/// One condition evaluated against a node's fact set.
///
/// A rule set must pass [`TagMatcher::validate`] before being placed into
/// service; malformed patterns and non-numeric comparison values are
/// configuration errors at load time, never evaluation-time failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagMatcher {
    pub key: String,
    pub compare: Comparator,
    #[serde(default)]
    pub value: String,
    /// Negates the comparator's result.
    #[serde(default)]
    pub inverse: bool,
}

impl TagMatcher {
    pub fn new(
        key: impl Into<String>,
        compare: Comparator,
        value: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            compare,
            value: value.into(),
            inverse: false,
        }
    }

    pub fn inverted(mut self) -> Self {
        self.inverse = true;
        self
    }

    // -----------------------------------------------------------------------
    // Load-time validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Result<()> {
        if self.key.trim().is_empty() {
            return Err(EngineError::Configuration(
                "tag matcher has an empty key".to_string(),
            ));
        }
        match self.compare {
            Comparator::Like => {
                Regex::new(&self.value).map_err(|e| {
                    EngineError::Configuration(format!(
                        "matcher on '{}': invalid pattern: {e}",
                        self.key
                    ))
                })?;
            }
            c if c.is_numeric() => {
                self.value.parse::<f64>().map_err(|_| {
                    EngineError::Configuration(format!(
                        "matcher on '{}': '{}' is not numeric",
                        self.key, self.value
                    ))
                })?;
            }
            _ => {}
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Evaluation
    // -----------------------------------------------------------------------

    /// Evaluate this condition against a fact set.
    ///
    /// A missing key yields false for every comparator, including `exists`;
    /// the result is then XORed with the `inverse` flag. Facts are runtime
    /// data, so a non-numeric fact under a numeric comparator is simply a
    /// non-match, not an error.
    pub fn evaluate(&self, facts: &FactMap) -> bool {
        let outcome = match facts.get(&self.key) {
            None => false,
            Some(actual) => match self.compare {
                Comparator::Exists => true,
                Comparator::Equal => actual == &self.value,
                Comparator::NotEqual => actual != &self.value,
                Comparator::Like => Regex::new(&self.value)
                    .map(|re| re.is_match(actual))
                    .unwrap_or(false),
                Comparator::GreaterThan => {
                    numeric_pair(actual, &self.value).is_some_and(|(a, b)| a > b)
                }
                Comparator::LessThan => {
                    numeric_pair(actual, &self.value).is_some_and(|(a, b)| a < b)
                }
            },
        };
        outcome != self.inverse
    }
}

fn numeric_pair(fact: &str, value: &str) -> Option<(f64, f64)> {
    Some((fact.parse().ok()?, value.parse().ok()?))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(pairs: &[(&str, &str)]) -> FactMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn equal_and_inverse() {
        let f = facts(&[("os", "linux")]);
        let m = TagMatcher::new("os", Comparator::Equal, "linux");
        assert!(m.evaluate(&f));
        assert!(!m.clone().inverted().evaluate(&f));
    }

    #[test]
    fn missing_key_is_false_even_for_exists() {
        let f = facts(&[("os", "linux")]);
        let exists = TagMatcher::new("arch", Comparator::Exists, "");
        assert!(!exists.evaluate(&f));
        // ...and inverse flips that into a match
        assert!(exists.inverted().evaluate(&f));

        let eq = TagMatcher::new("arch", Comparator::Equal, "x86_64");
        assert!(!eq.evaluate(&f));
    }

    #[test]
    fn exists_present_key() {
        let f = facts(&[("mac", "00:0c:29:aa:bb:cc")]);
        assert!(TagMatcher::new("mac", Comparator::Exists, "").evaluate(&f));
    }

    #[test]
    fn numeric_comparisons() {
        let f = facts(&[("memory_mb", "8192")]);
        assert!(TagMatcher::new("memory_mb", Comparator::GreaterThan, "4096").evaluate(&f));
        assert!(!TagMatcher::new("memory_mb", Comparator::LessThan, "4096").evaluate(&f));
    }

    #[test]
    fn non_numeric_fact_never_matches() {
        let f = facts(&[("memory_mb", "lots")]);
        assert!(!TagMatcher::new("memory_mb", Comparator::GreaterThan, "1").evaluate(&f));
    }

    #[test]
    fn like_pattern() {
        let f = facts(&[("hostname", "rack07-node12")]);
        assert!(TagMatcher::new("hostname", Comparator::Like, "^rack07-").evaluate(&f));
        assert!(!TagMatcher::new("hostname", Comparator::Like, "^rack08-").evaluate(&f));
    }

    #[test]
    fn validate_rejects_bad_pattern() {
        let m = TagMatcher::new("hostname", Comparator::Like, "rack[");
        assert!(matches!(m.validate(), Err(EngineError::Configuration(_))));
    }

    #[test]
    fn validate_rejects_non_numeric_value() {
        let m = TagMatcher::new("memory_mb", Comparator::GreaterThan, "plenty");
        assert!(matches!(m.validate(), Err(EngineError::Configuration(_))));
    }

    #[test]
    fn validate_rejects_empty_key() {
        let m = TagMatcher::new("  ", Comparator::Exists, "");
        assert!(m.validate().is_err());
    }

    #[test]
    fn matcher_yaml_roundtrip() {
        let m = TagMatcher::new("arch", Comparator::NotEqual, "aarch64").inverted();
        let yaml = serde_yaml::to_string(&m).unwrap();
        let parsed: TagMatcher = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, m);
    }
}
