//! Agent-broker contract.
//!
//! The broker is the external runtime on or near the node that executes
//! boot/install actions. The engine only needs an awaitable call contract;
//! transport, retries, and the broker's own protocol live outside.

use crate::types::{BrokerKind, HookKind};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Failure reported by an external agent broker.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct BrokerError(pub String);

pub type BrokerResult = std::result::Result<(), BrokerError>;

// ---------------------------------------------------------------------------
// AgentBroker
// ---------------------------------------------------------------------------

/// Hook contract driving one external agent protocol.
#[async_trait]
pub trait AgentBroker: Send + Sync {
    /// Microkernel-phase hook: the node is still in the discovery
    /// microkernel when this fires.
    async fn mk_call(&self, node_id: Uuid, model_id: Uuid) -> BrokerResult;

    /// Boot-phase hook: the node is asking for its next boot target.
    async fn boot_call(&self, node_id: Uuid, model_id: Uuid) -> BrokerResult;

    /// Dispatch by hook kind; used by the state machine.
    async fn call(&self, hook: HookKind, node_id: Uuid, model_id: Uuid) -> BrokerResult {
        match hook {
            HookKind::MkCall => self.mk_call(node_id, model_id).await,
            HookKind::BootCall => self.boot_call(node_id, model_id).await,
        }
    }
}

// ---------------------------------------------------------------------------
// BrokerRegistry
// ---------------------------------------------------------------------------

/// Maps each broker-plugin kind to its implementation.
#[derive(Clone, Default)]
pub struct BrokerRegistry {
    brokers: HashMap<BrokerKind, Arc<dyn AgentBroker>>,
}

impl BrokerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_broker(mut self, kind: BrokerKind, broker: Arc<dyn AgentBroker>) -> Self {
        self.brokers.insert(kind, broker);
        self
    }

    pub fn get(&self, kind: BrokerKind) -> Option<&Arc<dyn AgentBroker>> {
        self.brokers.get(&kind)
    }

    /// `BrokerKind::None` needs no implementation; anything else must be
    /// registered before a template naming it can be activated.
    pub fn covers(&self, kind: BrokerKind) -> bool {
        kind == BrokerKind::None || self.brokers.contains_key(&kind)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
