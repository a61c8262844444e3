//! Query limits and behavior switches
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `SIFT_*` environment variables (`SIFT_MAX_PAGE_SIZE=100`).

use crate::error::Result;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Page size used when the caller does not supply one.
    pub default_page_size: usize,
    /// Larger requested page sizes are rejected as too costly.
    pub max_page_size: usize,
    /// Maximum nesting depth of a fetch plan.
    pub max_fetch_depth: usize,
    /// Maximum number of fetch entries in one plan.
    pub max_fetches: usize,
    /// Issue the count query unless the pager disables it.
    pub count_by_default: bool,
    /// Interpret page numbers as starting at 0.
    pub zero_based_pages: bool,
    /// Property `eq` treats two NULLs as equal.
    pub null_safe_property_eq: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 500,
            max_fetch_depth: 4,
            max_fetches: 16,
            count_by_default: true,
            zero_based_pages: false,
            null_safe_property_eq: true,
        }
    }
}

impl QueryConfig {
    /// Load configuration from defaults, an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("default_page_size", defaults.default_page_size as i64)?
            .set_default("max_page_size", defaults.max_page_size as i64)?
            .set_default("max_fetch_depth", defaults.max_fetch_depth as i64)?
            .set_default("max_fetches", defaults.max_fetches as i64)?
            .set_default("count_by_default", defaults.count_by_default)?
            .set_default("zero_based_pages", defaults.zero_based_pages)?
            .set_default("null_safe_property_eq", defaults.null_safe_property_eq)?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let config: Self = builder
            .add_source(Environment::with_prefix("SIFT").try_parsing(true))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_page_size == 0 {
            return Err(ConfigError::Message("default_page_size must be at least 1".into()).into());
        }
        if self.default_page_size > self.max_page_size {
            return Err(ConfigError::Message(format!(
                "default_page_size ({}) exceeds max_page_size ({})",
                self.default_page_size, self.max_page_size
            ))
            .into());
        }
        if self.max_fetch_depth == 0 {
            return Err(ConfigError::Message("max_fetch_depth must be at least 1".into()).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = QueryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_page_size, 20);
        assert!(config.null_safe_property_eq);
    }

    #[test]
    fn file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("sift-config-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "max_page_size = 50\ncount_by_default = false").unwrap();

        let config = QueryConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.max_page_size, 50);
        assert!(!config.count_by_default);
        assert_eq!(config.default_page_size, 20);
    }

    #[test]
    fn inconsistent_sizes_are_rejected() {
        let config = QueryConfig {
            default_page_size: 100,
            max_page_size: 10,
            ..QueryConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
