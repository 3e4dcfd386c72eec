//! Engine options, loadable from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::search::Depth;
use crate::threads::MAX_THREADS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub threads: usize,
    pub hash_mb: usize,
    /// Shallowest depth at which a node may be shared. 0 picks a value from
    /// the thread count.
    pub min_split_depth: Depth,
    /// Create split points without recruiting anyone. The master searches
    /// them alone; used to check the split machinery against serial search.
    pub fake_split: bool,
}

impl Default for EngineConfig {
    fn default() -> Self { Self { threads: 1, hash_mb: 16, min_split_depth: 0, fake_split: false } }
}

impl EngineConfig {
    pub fn from_json(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 || self.threads > MAX_THREADS {
            return Err(EngineError::InvalidThreadCount(self.threads));
        }
        if self.hash_mb == 0 {
            return Err(EngineError::InvalidHashSize(0));
        }
        Ok(())
    }

    pub fn effective_min_split_depth(&self) -> Depth {
        match self.min_split_depth {
            d if d > 0 => d,
            _ if self.threads < 8 => 4,
            _ => 7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg = EngineConfig::from_json(r#"{ "threads": 4 }"#).unwrap();
        assert_eq!(cfg.threads, 4);
        assert_eq!(cfg.hash_mb, 16);
        assert!(!cfg.fake_split);
        assert_eq!(cfg.effective_min_split_depth(), 4);
    }

    #[test]
    fn automatic_split_depth_follows_thread_count() {
        let cfg = EngineConfig { threads: 12, ..EngineConfig::default() };
        assert_eq!(cfg.effective_min_split_depth(), 7);
        let cfg = EngineConfig { threads: 12, min_split_depth: 2, ..EngineConfig::default() };
        assert_eq!(cfg.effective_min_split_depth(), 2);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(matches!(EngineConfig::from_json(r#"{ "threads": 0 }"#), Err(EngineError::InvalidThreadCount(0))));
        assert!(matches!(EngineConfig::from_json(r#"{ "threads": 65 }"#), Err(EngineError::InvalidThreadCount(65))));
        assert!(matches!(EngineConfig::from_json(r#"{ "hash_mb": 0 }"#), Err(EngineError::InvalidHashSize(0))));
        assert!(matches!(EngineConfig::from_json("{ not json"), Err(EngineError::Config(_))));
    }
}
