use crate::tag::FactMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A machine under provisioning. Created on first contact, updated on each
/// fact report, never implicitly deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: Uuid,
    #[serde(default)]
    pub facts: FactMap,
    /// Last state the node itself reported over the boot channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_state: Option<String>,
    /// Id of the governing policy rule, when bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_policy: Option<Uuid>,
    pub first_seen: DateTime<Utc>,
    pub last_checkin: DateTime<Utc>,
}

impl Node {
    pub fn new(id: Uuid, facts: FactMap) -> Self {
        let now = Utc::now();
        Self {
            id,
            facts,
            last_state: None,
            bound_policy: None,
            first_seen: now,
            last_checkin: now,
        }
    }

    /// Replace the fact set wholesale with a fresh discovery report.
    pub fn checkin(&mut self, facts: FactMap) {
        self.facts = facts;
        self.last_checkin = Utc::now();
    }

    pub fn observe_state(&mut self, state: impl Into<String>) {
        self.last_state = Some(state.into());
        self.last_checkin = Utc::now();
    }

    pub fn is_bound(&self) -> bool {
        self.bound_policy.is_some()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
