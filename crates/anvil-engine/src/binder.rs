use crate::error::{EngineError, Result};
use crate::machine::ModelStateMachine;
use crate::model::Model;
use crate::node::Node;
use crate::policy::RuleSet;
use crate::store::RecordStore;
use crate::tag::FactMap;
use crate::template::TemplateSet;
use crate::types::CollectionKind;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// BoundPolicy
// ---------------------------------------------------------------------------

/// The single policy governing one node, owning the node's model instance.
///
/// The model sits behind its own lock so concurrent `advance` events for one
/// node serialize while other nodes' models run in parallel.
#[derive(Debug)]
pub struct BoundPolicy {
    pub node_id: Uuid,
    pub policy_id: Uuid,
    pub model: Mutex<Model>,
}

impl BoundPolicy {
    pub async fn model_id(&self) -> Uuid {
        self.model.lock().await.id
    }

    pub async fn current_state(&self) -> String {
        self.model.lock().await.current_state.clone()
    }
}

// ---------------------------------------------------------------------------
// PolicyBinder
// ---------------------------------------------------------------------------

struct NodeSlot {
    node: Node,
    binding: Option<Arc<BoundPolicy>>,
}

/// Matches nodes against the ordered rule set and owns their bindings.
///
/// Per-node work is serialized through a slot lock, so concurrent `bind`
/// and `unbind` calls for one node cannot race; the rule set itself is
/// read-mostly and replaced whole, never mutated in place.
pub struct PolicyBinder {
    rules: RwLock<Arc<RuleSet>>,
    templates: Arc<TemplateSet>,
    store: Arc<dyn RecordStore>,
    slots: Mutex<HashMap<Uuid, Arc<Mutex<NodeSlot>>>>,
}

impl std::fmt::Debug for PolicyBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyBinder").finish_non_exhaustive()
    }
}

impl PolicyBinder {
    /// Validates the rule set and its template references up front;
    /// configuration errors are fatal to activation.
    pub fn new(
        rules: RuleSet,
        templates: Arc<TemplateSet>,
        store: Arc<dyn RecordStore>,
    ) -> Result<Self> {
        templates.validate()?;
        Self::check_rules(&rules, &templates)?;
        Ok(Self {
            rules: RwLock::new(Arc::new(rules)),
            templates,
            store,
            slots: Mutex::new(HashMap::new()),
        })
    }

    /// Persist the active rule set and template table through the record
    /// store, keeping the external catalog in step with what is in service.
    pub async fn persist_catalog(&self) -> Result<()> {
        for template in self.templates.iter() {
            self.store
                .persist(
                    CollectionKind::Templates,
                    template.id,
                    serde_json::to_value(template)?,
                )
                .await?;
        }
        let rules = self.rules.read().await.clone();
        for rule in &rules.rules {
            self.store
                .persist(CollectionKind::Policies, rule.id, serde_json::to_value(rule)?)
                .await?;
        }
        Ok(())
    }

    fn check_rules(rules: &RuleSet, templates: &TemplateSet) -> Result<()> {
        rules.validate()?;
        for rule in rules.rules_in_order() {
            if templates.get(&rule.model_template).is_none() {
                return Err(EngineError::Configuration(format!(
                    "rule '{}' references unknown model template '{}'",
                    rule.label, rule.model_template
                )));
            }
        }
        Ok(())
    }

    /// Swap in a new rule set atomically. Already-bound nodes keep their
    /// bindings; only subsequent `bind` calls see the new rules.
    pub async fn replace_rules(&self, rules: RuleSet) -> Result<()> {
        Self::check_rules(&rules, &self.templates)?;
        *self.rules.write().await = Arc::new(rules);
        info!("rule set replaced");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Node fact ingestion
    // -----------------------------------------------------------------------

    /// Record a fact report, creating the node on first contact.
    pub async fn checkin(&self, node_id: Uuid, facts: FactMap) -> Result<()> {
        let slot = self.slot(node_id).await;
        let mut slot = slot.lock().await;
        slot.node.checkin(facts);
        self.persist_node(&slot.node).await
    }

    async fn slot(&self, node_id: Uuid) -> Arc<Mutex<NodeSlot>> {
        let mut slots = self.slots.lock().await;
        slots
            .entry(node_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(NodeSlot {
                    node: Node::new(node_id, FactMap::new()),
                    binding: None,
                }))
            })
            .clone()
    }

    // -----------------------------------------------------------------------
    // Binding
    // -----------------------------------------------------------------------

    /// Select the governing policy for a node and create its binding.
    ///
    /// Rules are walked in ascending order and the first rule whose matchers
    /// all succeed wins. Re-binding an already-bound node with unchanged
    /// facts is idempotent and returns the existing binding; changed facts
    /// are a conflict until the caller unbinds explicitly.
    pub async fn bind(&self, node_id: Uuid, facts: FactMap) -> Result<Arc<BoundPolicy>> {
        let slot = self.slot(node_id).await;
        let mut slot = slot.lock().await;

        if let Some(existing) = &slot.binding {
            if slot.node.facts == facts {
                debug!(node = %node_id, policy = %existing.policy_id, "bind is idempotent");
                return Ok(existing.clone());
            }
            return Err(EngineError::BindConflict { node: node_id });
        }

        slot.node.checkin(facts);

        let rules = self.rules.read().await.clone();
        for rule in rules.rules_in_order() {
            if !rule.matches(&slot.node.facts) {
                continue;
            }
            let template = self
                .templates
                .get(&rule.model_template)
                .ok_or_else(|| EngineError::TemplateNotFound(rule.model_template.clone()))?;
            let model = Model::new(template);
            info!(
                node = %node_id,
                policy = %rule.id,
                order = rule.line_number,
                label = %rule.label,
                model = %model.id,
                template = %template.name,
                "policy bound"
            );
            self.persist_model(&model).await?;

            let bound = Arc::new(BoundPolicy {
                node_id,
                policy_id: rule.id,
                model: Mutex::new(model),
            });
            slot.node.bound_policy = Some(rule.id);
            self.persist_node(&slot.node).await?;
            slot.binding = Some(bound.clone());
            return Ok(bound);
        }

        self.persist_node(&slot.node).await?;
        debug!(node = %node_id, "no policy matched");
        Err(EngineError::NoPolicyMatched { node: node_id })
    }

    /// Clear a node's binding and discard its model record.
    ///
    /// Store writes happen first; on a storage error the binding and the
    /// node record both stay as they were, so the two never disagree.
    pub async fn unbind(&self, node_id: Uuid) -> Result<()> {
        let slot = {
            let slots = self.slots.lock().await;
            slots
                .get(&node_id)
                .cloned()
                .ok_or(EngineError::NodeNotFound(node_id))?
        };
        let mut slot = slot.lock().await;

        let bound = slot
            .binding
            .clone()
            .ok_or(EngineError::NodeUnbound(node_id))?;
        let model_id = bound.model.lock().await.id;
        self.store
            .delete_by_id(CollectionKind::Models, model_id)
            .await?;
        let mut node = slot.node.clone();
        node.bound_policy = None;
        self.persist_node(&node).await?;
        slot.node = node;
        slot.binding = None;
        info!(node = %node_id, policy = %bound.policy_id, "policy unbound");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Driving
    // -----------------------------------------------------------------------

    /// Advance a node's bound model one step and mirror the reached state
    /// onto the node record, keeping `last_state` current for listings and
    /// the boot path.
    pub async fn advance(
        &self,
        machine: &ModelStateMachine,
        node_id: Uuid,
        action: &str,
    ) -> Result<()> {
        let slot = {
            let slots = self.slots.lock().await;
            slots
                .get(&node_id)
                .cloned()
                .ok_or(EngineError::NodeNotFound(node_id))?
        };
        let mut slot = slot.lock().await;
        let bound = slot
            .binding
            .clone()
            .ok_or(EngineError::NodeUnbound(node_id))?;
        machine.advance_bound(&bound, action).await?;
        let state = bound.current_state().await;
        slot.node.observe_state(state);
        self.persist_node(&slot.node).await
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    pub async fn binding(&self, node_id: Uuid) -> Option<Arc<BoundPolicy>> {
        let slot = self.slots.lock().await.get(&node_id).cloned()?;
        let slot = slot.lock().await;
        slot.binding.clone()
    }

    pub async fn node(&self, node_id: Uuid) -> Option<Node> {
        let slot = self.slots.lock().await.get(&node_id).cloned()?;
        let slot = slot.lock().await;
        Some(slot.node.clone())
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    async fn persist_node(&self, node: &Node) -> Result<()> {
        self.store
            .persist(CollectionKind::Nodes, node.id, serde_json::to_value(node)?)
            .await
    }

    async fn persist_model(&self, model: &Model) -> Result<()> {
        self.store
            .persist(CollectionKind::Models, model.id, serde_json::to_value(model)?)
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
