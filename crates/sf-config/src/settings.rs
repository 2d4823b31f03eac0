use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::logging::LoggingConfig;
use crate::types::HumanDuration;

// ---------------------------------------------------------------------------
// EngineSettings
// ---------------------------------------------------------------------------

/// Engine tuning knobs. Every field has a default so the whole file (or any
/// section of it) may be omitted.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Capacity of the compiled-formula LRU.
    pub compilation_cache_capacity: usize,
    /// Capacity of the pure-numeric fast-path LRU.
    pub numeric_cache_capacity: usize,
    /// Upper bound on memoized binding plans before the AST cache is
    /// flushed wholesale.
    pub ast_cache_capacity: usize,
    /// Budget for one integration data-provider callback.
    pub data_provider_timeout: HumanDuration,
    /// How long the coordinator waits to absorb further change
    /// notifications into the pending cycle.
    pub update_debounce: HumanDuration,
    pub logging: LoggingConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            compilation_cache_capacity: 512,
            numeric_cache_capacity: 256,
            ast_cache_capacity: 1024,
            data_provider_timeout: Duration::from_secs(5).into(),
            update_debounce: Duration::from_millis(0).into(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineSettings {
    /// Read and parse a settings TOML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.as_ref().display()))?;
        content.parse()
    }
}

impl FromStr for EngineSettings {
    type Err = anyhow::Error;

    fn from_str(toml_str: &str) -> anyhow::Result<Self> {
        let settings: EngineSettings = toml::from_str(toml_str)?;
        if settings.compilation_cache_capacity == 0 {
            anyhow::bail!("compilation_cache_capacity must be non-zero");
        }
        if settings.numeric_cache_capacity == 0 {
            anyhow::bail!("numeric_cache_capacity must be non-zero");
        }
        Ok(settings)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
