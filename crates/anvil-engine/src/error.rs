use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no policy matched node {node}")]
    NoPolicyMatched { node: Uuid },

    #[error("bind conflict on node {node}: facts diverge from the existing binding")]
    BindConflict { node: Uuid },

    #[error("invalid transition: no action '{action}' from state '{state}'")]
    InvalidTransition { state: String, action: String },

    #[error("model is already complete in state '{state}'")]
    AlreadyComplete { state: String },

    #[error("broker hook for '{action}' timed out after {timeout_ms}ms")]
    BrokerTimeout { action: String, timeout_ms: u64 },

    #[error("broker hook for '{action}' failed: {reason}")]
    BrokerFailure { action: String, reason: String },

    #[error("node not found: {0}")]
    NodeNotFound(Uuid),

    #[error("node {0} has no bound policy")]
    NodeUnbound(Uuid),

    #[error("model template not found: {0}")]
    TemplateNotFound(String),

    #[error("invalid comparator: {0}")]
    InvalidComparator(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
