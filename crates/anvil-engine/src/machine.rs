use crate::binder::BoundPolicy;
use crate::broker::BrokerRegistry;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::model::Model;
use crate::store::RecordStore;
use crate::template::TemplateSet;
use crate::types::{BrokerKind, CollectionKind};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ModelStateMachine
// ---------------------------------------------------------------------------

/// Advances model instances through their template's transition table in
/// response to external agent events.
///
/// The broker hook call inside `advance` is the engine's sole suspension
/// point; everything else is table lookup and in-memory mutation. A failed
/// or timed-out hook leaves state and log untouched, and the engine never
/// retries; that belongs to the orchestration layer driving it.
pub struct ModelStateMachine {
    templates: Arc<TemplateSet>,
    brokers: BrokerRegistry,
    store: Arc<dyn RecordStore>,
    timeout: Duration,
}

impl std::fmt::Debug for ModelStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelStateMachine")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ModelStateMachine {
    /// Fails with a configuration error if any template names a broker
    /// plugin the registry does not cover, so a missing broker surfaces at
    /// activation rather than mid-provisioning.
    pub fn new(
        templates: Arc<TemplateSet>,
        brokers: BrokerRegistry,
        store: Arc<dyn RecordStore>,
        config: &EngineConfig,
    ) -> Result<Self> {
        templates.validate()?;
        for template in templates.iter() {
            if !brokers.covers(template.broker_plugin) {
                return Err(EngineError::Configuration(format!(
                    "no broker registered for plugin '{}' (template '{}')",
                    template.broker_plugin, template.name
                )));
            }
        }
        Ok(Self {
            templates,
            brokers,
            store,
            timeout: config.broker_timeout(),
        })
    }

    // -----------------------------------------------------------------------
    // Advance
    // -----------------------------------------------------------------------

    pub async fn advance(&self, node_id: Uuid, model: &mut Model, action: &str) -> Result<()> {
        self.advance_with_timeout(node_id, model, action, self.timeout)
            .await
    }

    /// Advance one model by one action, bounding the broker hook by a
    /// caller-supplied timeout.
    pub async fn advance_with_timeout(
        &self,
        node_id: Uuid,
        model: &mut Model,
        action: &str,
        timeout: Duration,
    ) -> Result<()> {
        let template = self
            .templates
            .get(&model.template)
            .ok_or_else(|| EngineError::TemplateNotFound(model.template.clone()))?;

        // The final state is a true terminal: checked before the table, so
        // an outgoing row declared on it is never consulted.
        if model.current_state == template.final_state {
            return Err(EngineError::AlreadyComplete {
                state: model.current_state.clone(),
            });
        }

        let transition = template
            .transition(&model.current_state, action)
            .ok_or_else(|| EngineError::InvalidTransition {
                state: model.current_state.clone(),
                action: action.to_string(),
            })?
            .clone();

        if template.broker_plugin != BrokerKind::None {
            let broker = self.brokers.get(template.broker_plugin).ok_or_else(|| {
                EngineError::Configuration(format!(
                    "no broker registered for plugin '{}'",
                    template.broker_plugin
                ))
            })?;

            // Sole suspension point: the external agent hook. On expiry the
            // call is cancelled and no partial mutation is visible.
            match tokio::time::timeout(timeout, broker.call(transition.hook, node_id, model.id))
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(
                        node = %node_id,
                        model = %model.id,
                        action,
                        hook = %transition.hook,
                        "broker hook failed: {e}"
                    );
                    return Err(EngineError::BrokerFailure {
                        action: action.to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(_) => {
                    warn!(
                        node = %node_id,
                        model = %model.id,
                        action,
                        hook = %transition.hook,
                        timeout_ms = timeout.as_millis() as u64,
                        "broker hook timed out"
                    );
                    return Err(EngineError::BrokerTimeout {
                        action: action.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
            }
        }

        model.log.append(action, &model.current_state, &transition.to);
        info!(
            node = %node_id,
            model = %model.id,
            action,
            from = %model.current_state,
            to = %transition.to,
            "state transition"
        );
        model.current_state = transition.to;
        self.store
            .persist(CollectionKind::Models, model.id, serde_json::to_value(&*model)?)
            .await?;
        Ok(())
    }

    /// Advance a bound model under its own lock, serializing concurrent
    /// events for one model while different models proceed in parallel.
    pub async fn advance_bound(&self, bound: &BoundPolicy, action: &str) -> Result<()> {
        let mut model = bound.model.lock().await;
        self.advance(bound.node_id, &mut model, action).await
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
