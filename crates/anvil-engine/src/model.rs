use crate::template::ModelTemplate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// LogEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub action: String,
    pub from: String,
    pub to: String,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// TransitionLog
// ---------------------------------------------------------------------------

/// Append-only audit trail of one model's state changes.
///
/// The entry vector is private and the append path is crate-private, so the
/// only writer is `advance`'s internal append; consumers get read-only views.
/// Timestamps are non-decreasing within one log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionLog {
    entries: Vec<LogEntry>,
}

impl TransitionLog {
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn append(&mut self, action: &str, from: &str, to: &str) {
        let mut timestamp = Utc::now();
        if let Some(prev) = self.entries.last() {
            // Clamp against clock steps so the log stays monotone.
            if timestamp < prev.timestamp {
                timestamp = prev.timestamp;
            }
        }
        self.entries.push(LogEntry {
            action: action.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            timestamp,
        });
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// One provisioning pipeline instance, owned by its node's bound policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: Uuid,
    /// Name of the [`ModelTemplate`] this instance runs.
    pub template: String,
    pub current_state: String,
    #[serde(default)]
    pub log: TransitionLog,
}

impl Model {
    pub fn new(template: &ModelTemplate) -> Self {
        Self {
            id: Uuid::new_v4(),
            template: template.name.clone(),
            current_state: template.initial_state.clone(),
            log: TransitionLog::default(),
        }
    }

    pub fn is_complete(&self, template: &ModelTemplate) -> bool {
        self.current_state == template.final_state
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
