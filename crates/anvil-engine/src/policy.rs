use crate::error::{EngineError, Result};
use crate::tag::{FactMap, TagMatcher};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// PolicyRule
// ---------------------------------------------------------------------------

/// One deployment policy: a set of tag conditions (AND semantics) tied to a
/// model template, evaluated at its position in the rule order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Ordering key. Unique across the rule set; rules are evaluated in
    /// ascending order and the first full match wins.
    pub line_number: u32,
    pub label: String,
    pub policy_type: String,
    /// Name of the model template instantiated when this rule binds.
    pub model_template: String,
    #[serde(default)]
    pub matchers: Vec<TagMatcher>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl PolicyRule {
    pub fn new(
        line_number: u32,
        label: impl Into<String>,
        policy_type: impl Into<String>,
        model_template: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            line_number,
            label: label.into(),
            policy_type: policy_type.into(),
            model_template: model_template.into(),
            matchers: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_matcher(mut self, matcher: TagMatcher) -> Self {
        self.matchers.push(matcher);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Short-circuit AND over all matchers. A rule with no matchers is a
    /// catch-all; a disabled rule never matches.
    pub fn matches(&self, facts: &FactMap) -> bool {
        self.enabled && self.matchers.iter().all(|m| m.evaluate(facts))
    }
}

// ---------------------------------------------------------------------------
// RuleSet
// ---------------------------------------------------------------------------

/// The full ordered set of deployment policies.
///
/// Structural edits never happen in place: a new `RuleSet` is validated and
/// swapped in whole via [`crate::binder::PolicyBinder::replace_rules`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self { rules }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Fatal to activation on duplicate ordering keys or malformed matchers.
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.line_number) {
                return Err(EngineError::Configuration(format!(
                    "duplicate rule order {} (rule '{}')",
                    rule.line_number, rule.label
                )));
            }
            for matcher in &rule.matchers {
                matcher.validate()?;
            }
        }
        Ok(())
    }

    /// Enabled rules, ascending by `line_number`.
    pub fn rules_in_order(&self) -> Vec<&PolicyRule> {
        let mut ordered: Vec<&PolicyRule> =
            self.rules.iter().filter(|r| r.enabled).collect();
        ordered.sort_by_key(|r| r.line_number);
        ordered
    }

    pub fn find(&self, id: Uuid) -> Option<&PolicyRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let set: RuleSet = serde_yaml::from_str(&data)?;
        set.validate()?;
        Ok(set)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
