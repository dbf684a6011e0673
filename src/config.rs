//! Engine configuration, layered from `config.toml` + environment
//! variables over struct defaults, following `Config::load` in the
//! teacher's `src/config.rs`.
//!
//! ```toml
//! [cache]
//! max_memory_bytes = 536870912
//!
//! [optimizer]
//! max_iterations = 1
//! ```
//!
//! ```bash
//! CRATEQL_CACHE__MAX_MEMORY_BYTES=1073741824
//! ```

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_max_memory_bytes")]
    pub max_memory_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig { max_memory_bytes: default_max_memory_bytes() }
    }
}

fn default_max_memory_bytes() -> usize {
    512 * 1024 * 1024
}

/// The spec's optimiser is a single backward pass (spec.md §4.3) — this
/// knob exists for the ambient config surface, not because the core
/// supports iterating it more than once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig { max_iterations: default_max_iterations() }
    }
}

fn default_max_iterations() -> usize {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub verbose: bool,
}

impl EngineConfig {
    /// Merges `config.toml` (if present), `config.local.toml` (if present),
    /// then `CRATEQL_`-prefixed environment variables over the struct
    /// defaults above.
    pub fn from_env() -> Result<EngineConfig, ConfigError> {
        Ok(Figment::from(figment::providers::Serialized::defaults(EngineConfig::default()))
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("CRATEQL_").split("__"))
            .extract()?)
    }

    pub fn from_file(path: &str) -> Result<EngineConfig, ConfigError> {
        Ok(Figment::from(figment::providers::Serialized::defaults(EngineConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("CRATEQL_").split("__"))
            .extract()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.cache.max_memory_bytes, 512 * 1024 * 1024);
        assert_eq!(config.optimizer.max_iterations, 1);
        assert!(!config.verbose);
    }

    #[test]
    fn env_override_applies_prefix() {
        std::env::set_var("CRATEQL_CACHE__MAX_MEMORY_BYTES", "1024");
        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.cache.max_memory_bytes, 1024);
        std::env::remove_var("CRATEQL_CACHE__MAX_MEMORY_BYTES");
    }
}
