use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Explicit engine configuration, passed into constructors.
///
/// There is no ambient/global config and no invented timing default: the
/// broker timeout is a required value the operator must state, either here
/// or per call via `advance_with_timeout`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on a single broker hook call, in milliseconds.
    pub broker_timeout_ms: u64,
}

impl EngineConfig {
    pub fn new(broker_timeout: Duration) -> Self {
        Self {
            broker_timeout_ms: broker_timeout.as_millis() as u64,
        }
    }

    pub fn broker_timeout(&self) -> Duration {
        Duration::from_millis(self.broker_timeout_ms)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: EngineConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
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

    #[test]
    fn config_yaml_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("engine.yaml");

        let cfg = EngineConfig::new(Duration::from_secs(30));
        cfg.save(&path).unwrap();
        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.broker_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn timeout_is_required() {
        // No default silently fills in a timing value the operator never chose.
        let parsed: std::result::Result<EngineConfig, _> = serde_yaml::from_str("{}");
        assert!(parsed.is_err());
    }
}
