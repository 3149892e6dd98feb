//! Options loader with environment variable expansion

use super::{expand_env_vars, ConfigError, UploaderOptions};
use std::path::Path;

/// Options file loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load uploader options from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<UploaderOptions, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse uploader options from YAML text, expanding `${VAR}` references first
    pub fn parse(content: &str) -> Result<UploaderOptions, ConfigError> {
        let expanded = expand_env_vars(content);
        // An empty document means "all defaults"
        if expanded.trim().is_empty() {
            return Ok(UploaderOptions::default());
        }
        let options: UploaderOptions = serde_yaml::from_str(&expanded)?;
        Ok(options)
    }
}
