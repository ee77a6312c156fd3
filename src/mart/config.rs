//! Intensity cache configuration
//!
//! Settings can be built in code or loaded from a TOML file:
//!
//! ```toml
//! # Values held by the shared window across all chip columns
//! cache_budget = 2000000
//! temp_dir = "/scratch/apt"
//! temp_prefix = "tempcel."
//! store_all_intensities = false
//! overlay_duplicates = true
//! ephemeral = true
//! ```

use crate::core::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

/// Default window budget, in values (4 MiB of floats)
pub const DEFAULT_CACHE_BUDGET: u64 = 1 << 20;

pub const DEFAULT_TEMP_PREFIX: &str = "tempcel.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct IntensityCacheConfig {
    /// Values held by the shared window, summed over all chip columns
    #[validate(range(min = 1))]
    pub cache_budget: u64,

    /// Directory for the backing store; created when missing
    pub temp_dir: PathBuf,

    /// File name prefix of the backing store
    #[validate(length(min = 1, max = 64))]
    pub temp_prefix: String,

    /// Also store probes absent from the layout order, after the ordered ones
    pub store_all_intensities: bool,

    /// Serve repeated layout probes from memory
    pub overlay_duplicates: bool,

    /// Delete the backing store when the cache closes
    pub ephemeral: bool,
}

impl Default for IntensityCacheConfig {
    fn default() -> Self {
        IntensityCacheConfig {
            cache_budget: DEFAULT_CACHE_BUDGET,
            temp_dir: std::env::temp_dir(),
            temp_prefix: DEFAULT_TEMP_PREFIX.to_string(),
            store_all_intensities: false,
            overlay_duplicates: true,
            ephemeral: true,
        }
    }
}

impl IntensityCacheConfig {
    /// Parse and validate a TOML document; missing keys take defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: IntensityCacheConfig =
            toml::from_str(text).map_err(|e| StoreError::InvalidConfig(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Validate field rules and the prefix shape
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| StoreError::InvalidConfig(e.to_string()))?;
        if self.temp_prefix.contains(['/', '\\']) {
            return Err(StoreError::InvalidConfig(format!(
                "temp_prefix '{}' must not contain a path separator",
                self.temp_prefix
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = IntensityCacheConfig::default();
        assert!(config.check().is_ok());
        assert_eq!(config.temp_prefix, "tempcel.");
        assert!(config.overlay_duplicates);
    }

    #[test]
    fn test_toml_partial_document() {
        let config = IntensityCacheConfig::from_toml_str(
            r#"
            cache_budget = 4096
            store_all_intensities = true
            "#,
        )
        .unwrap();
        assert_eq!(config.cache_budget, 4096);
        assert!(config.store_all_intensities);
        assert!(config.ephemeral);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            IntensityCacheConfig::from_toml_str("cache_budget = 0"),
            Err(StoreError::InvalidConfig(_))
        ));
        assert!(matches!(
            IntensityCacheConfig::from_toml_str("temp_prefix = \"a/b\""),
            Err(StoreError::InvalidConfig(_))
        ));
        assert!(matches!(
            IntensityCacheConfig::from_toml_str("cache_budget = \"lots\""),
            Err(StoreError::InvalidConfig(_))
        ));
    }
}
