//! Backend configuration
//!
//! Read from a TOML table such as:
//!
//! ```toml
//! mem_load_latency = 3
//! mem_store_latency = 2
//! verify = true
//! dump_stgs = false
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use hlsc_stg::StgConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Cycles a RAM read occupies
    pub mem_load_latency: u32,
    /// Cycles a RAM write occupies
    pub mem_store_latency: u32,
    /// Validate SSA form and STGs after each phase
    pub verify: bool,
    /// Log the text listing of every built STG
    pub dump_stgs: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        let stg = StgConfig::default();
        Self {
            mem_load_latency: stg.mem_load_latency,
            mem_store_latency: stg.mem_store_latency,
            verify: true,
            dump_stgs: false,
        }
    }
}

impl BackendConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("Failed to parse backend configuration")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&contents).with_context(|| format!("in {}", path.display()))
    }

    pub fn stg_config(&self) -> StgConfig {
        StgConfig {
            mem_load_latency: self.mem_load_latency,
            mem_store_latency: self.mem_store_latency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_keys_take_defaults() {
        let config = BackendConfig::from_toml_str("mem_load_latency = 5").unwrap();
        assert_eq!(config.mem_load_latency, 5);
        assert_eq!(config.mem_store_latency, 2);
        assert!(config.verify);
        assert!(!config.dump_stgs);
        assert_eq!(config.stg_config().mem_load_latency, 5);
    }

    #[test]
    fn test_unknown_value_type_is_an_error() {
        let err = BackendConfig::from_toml_str("verify = \"yes\"").unwrap_err();
        assert!(err.to_string().contains("backend configuration"));
    }
}
