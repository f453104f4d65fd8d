use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Comparator
// ---------------------------------------------------------------------------

/// How a tag matcher compares a node fact against its stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Equal,
    NotEqual,
    /// Regex match of the fact value against the stored pattern.
    Like,
    GreaterThan,
    LessThan,
    /// The fact key is present, regardless of value.
    Exists,
}

impl Comparator {
    pub fn as_str(self) -> &'static str {
        match self {
            Comparator::Equal => "equal",
            Comparator::NotEqual => "not_equal",
            Comparator::Like => "like",
            Comparator::GreaterThan => "greater_than",
            Comparator::LessThan => "less_than",
            Comparator::Exists => "exists",
        }
    }

    /// True for comparators whose stored value must parse as a number.
    pub fn is_numeric(self) -> bool {
        matches!(self, Comparator::GreaterThan | Comparator::LessThan)
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Comparator {
    type Err = crate::error::EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equal" => Ok(Comparator::Equal),
            "not_equal" => Ok(Comparator::NotEqual),
            "like" => Ok(Comparator::Like),
            "greater_than" => Ok(Comparator::GreaterThan),
            "less_than" => Ok(Comparator::LessThan),
            "exists" => Ok(Comparator::Exists),
            _ => Err(crate::error::EngineError::InvalidComparator(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// HookKind
// ---------------------------------------------------------------------------

/// Which broker hook a transition fires when its action arrives.
///
/// `MkCall` runs while the node still sits in the discovery microkernel;
/// `BootCall` runs when the node asks for its next boot target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    #[default]
    MkCall,
    BootCall,
}

impl HookKind {
    pub fn as_str(self) -> &'static str {
        match self {
            HookKind::MkCall => "mk_call",
            HookKind::BootCall => "boot_call",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// BrokerKind
// ---------------------------------------------------------------------------

/// Which external agent protocol drives a model template.
///
/// `None` declares a template that completes without any broker involvement;
/// its transitions skip the hook call entirely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerKind {
    Agent,
    #[default]
    None,
}

impl BrokerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BrokerKind::Agent => "agent",
            BrokerKind::None => "none",
        }
    }
}

impl fmt::Display for BrokerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CollectionKind
// ---------------------------------------------------------------------------

/// The record-store collections the engine persists into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Nodes,
    Policies,
    Templates,
    Models,
}

impl CollectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CollectionKind::Nodes => "nodes",
            CollectionKind::Policies => "policies",
            CollectionKind::Templates => "templates",
            CollectionKind::Models => "models",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
