use crate::error::{EngineError, Result};
use crate::types::{BrokerKind, HookKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

/// One edge of a template's transition table: the target state plus the
/// broker hook the action fires on its way there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub to: String,
    #[serde(default)]
    pub hook: HookKind,
}

impl Transition {
    pub fn to(state: impl Into<String>) -> Self {
        Self {
            to: state.into(),
            hook: HookKind::default(),
        }
    }

    pub fn with_hook(mut self, hook: HookKind) -> Self {
        self.hook = hook;
        self
    }
}

// ---------------------------------------------------------------------------
// ModelTemplate
// ---------------------------------------------------------------------------

/// Static descriptor of one provisioning pipeline kind.
///
/// States are data: one record type covers every OS/hypervisor flavor, and
/// behavior is selected by table lookup rather than subclass dispatch. The
/// table is a directed graph; revisits (retry loops) are legal if declared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTemplate {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub broker_plugin: BrokerKind,
    pub initial_state: String,
    pub final_state: String,
    /// state → action → transition.
    #[serde(default)]
    pub transitions: BTreeMap<String, BTreeMap<String, Transition>>,
}

impl ModelTemplate {
    pub fn new(
        name: impl Into<String>,
        initial_state: impl Into<String>,
        final_state: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            broker_plugin: BrokerKind::default(),
            initial_state: initial_state.into(),
            final_state: final_state.into(),
            transitions: BTreeMap::new(),
        }
    }

    pub fn with_broker(mut self, kind: BrokerKind) -> Self {
        self.broker_plugin = kind;
        self
    }

    pub fn with_transition(
        mut self,
        from: impl Into<String>,
        action: impl Into<String>,
        transition: Transition,
    ) -> Self {
        self.transitions
            .entry(from.into())
            .or_default()
            .insert(action.into(), transition);
        self
    }

    /// Table lookup for one (state, action) pair.
    pub fn transition(&self, state: &str, action: &str) -> Option<&Transition> {
        self.transitions.get(state)?.get(action)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// A row keyed by the final state is tolerated but never consulted:
    /// the final state is a true terminal regardless of the table.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(EngineError::Configuration(
                "model template has an empty name".to_string(),
            ));
        }
        if self.initial_state.trim().is_empty() || self.final_state.trim().is_empty() {
            return Err(EngineError::Configuration(format!(
                "template '{}': initial and final states are required",
                self.name
            )));
        }
        if self.initial_state != self.final_state
            && !self.transitions.contains_key(&self.initial_state)
        {
            return Err(EngineError::Configuration(format!(
                "template '{}': initial state '{}' has no transitions",
                self.name, self.initial_state
            )));
        }
        for (state, actions) in &self.transitions {
            for (action, transition) in actions {
                if transition.to.trim().is_empty() {
                    return Err(EngineError::Configuration(format!(
                        "template '{}': action '{}' from '{}' has an empty target",
                        self.name, action, state
                    )));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TemplateSet
// ---------------------------------------------------------------------------

/// The name-keyed table of model templates, effectively immutable after load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateSet {
    #[serde(default)]
    pub templates: Vec<ModelTemplate>,
}

impl TemplateSet {
    pub fn new(templates: Vec<ModelTemplate>) -> Self {
        Self { templates }
    }

    pub fn get(&self, name: &str) -> Option<&ModelTemplate> {
        self.templates.iter().find(|t| t.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelTemplate> {
        self.templates.iter()
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for template in &self.templates {
            template.validate()?;
            if !seen.insert(template.name.as_str()) {
                return Err(EngineError::Configuration(format!(
                    "duplicate model template name '{}'",
                    template.name
                )));
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let set: TemplateSet = serde_yaml::from_str(&data)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ubuntu() -> ModelTemplate {
        ModelTemplate::new("ubuntu", "init", "os_complete")
            .with_broker(BrokerKind::Agent)
            .with_transition("init", "start", Transition::to("booting"))
            .with_transition(
                "booting",
                "complete",
                Transition::to("os_complete").with_hook(HookKind::BootCall),
            )
    }

    #[test]
    fn lookup_hits_and_misses() {
        let tpl = ubuntu();
        assert_eq!(tpl.transition("init", "start").unwrap().to, "booting");
        assert_eq!(
            tpl.transition("booting", "complete").unwrap().hook,
            HookKind::BootCall
        );
        assert!(tpl.transition("init", "complete").is_none());
        assert!(tpl.transition("nowhere", "start").is_none());
    }

    #[test]
    fn validate_accepts_retry_loops() {
        let tpl = ModelTemplate::new("retry", "init", "done")
            .with_transition("init", "attempt", Transition::to("installing"))
            .with_transition("installing", "fail", Transition::to("init"))
            .with_transition("installing", "ok", Transition::to("done"));
        assert!(tpl.validate().is_ok());
    }

    #[test]
    fn validate_requires_initial_row() {
        let tpl = ModelTemplate::new("broken", "init", "done");
        assert!(matches!(
            tpl.validate(),
            Err(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn validate_rejects_empty_target() {
        let tpl = ModelTemplate::new("broken", "init", "done")
            .with_transition("init", "start", Transition::to(""));
        assert!(tpl.validate().is_err());
    }

    #[test]
    fn final_state_row_tolerated() {
        let tpl = ubuntu().with_transition(
            "os_complete",
            "restart",
            Transition::to("init"),
        );
        // Tolerated by validation; `advance` will still treat os_complete
        // as terminal.
        assert!(tpl.validate().is_ok());
    }

    #[test]
    fn template_set_rejects_duplicates() {
        let set = TemplateSet::new(vec![ubuntu(), ubuntu()]);
        assert!(set.validate().is_err());
    }

    #[test]
    fn template_set_yaml_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("templates.yaml");

        let set = TemplateSet::new(vec![ubuntu()]);
        set.save(&path).unwrap();
        let reloaded = TemplateSet::load(&path).unwrap();

        let tpl = reloaded.get("ubuntu").unwrap();
        assert_eq!(tpl.initial_state, "init");
        assert_eq!(tpl.broker_plugin, BrokerKind::Agent);
        assert_eq!(
            tpl.transition("booting", "complete").unwrap().hook,
            HookKind::BootCall
        );
    }

    #[test]
    fn hook_defaults_in_yaml() {
        let yaml = "to: booting\n";
        let t: Transition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(t.hook, HookKind::MkCall);
    }
}
