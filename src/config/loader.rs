//! Configuration Loader
//!
//! Environment-aware YAML loading: a base `pipeline.yaml` merged with an
//! optional `pipeline.{environment}.yaml` overlay. Missing files fall back
//! to defaults so the crate runs unconfigured in embedded and test setups.

use super::PipelineConfig;
use crate::error::{PipelineError, Result};
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Loaded configuration plus the environment it was resolved for
pub struct ConfigManager {
    config: PipelineConfig,
    environment: String,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection from the default
    /// `config/` directory
    pub fn load() -> Result<ConfigManager> {
        Self::load_from_directory(Path::new("config"))
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: &Path) -> Result<ConfigManager> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load with an explicit environment; useful in tests
    pub fn load_from_directory_with_env(
        config_dir: &Path,
        environment: &str,
    ) -> Result<ConfigManager> {
        debug!(
            environment = environment,
            directory = %config_dir.display(),
            "loading pipeline configuration"
        );

        let base_path = config_dir.join("pipeline.yaml");
        let overlay_path = config_dir.join(format!("pipeline.{environment}.yaml"));

        let config = match Self::read_yaml(&base_path)? {
            Some(mut base) => {
                if let Some(overlay) = Self::read_yaml(&overlay_path)? {
                    merge_yaml(&mut base, overlay);
                }
                serde_yaml::from_value(base).map_err(|e| {
                    PipelineError::Configuration(format!(
                        "failed to deserialize {}: {e}",
                        base_path.display()
                    ))
                })?
            }
            None => {
                warn!(
                    path = %base_path.display(),
                    "no configuration file found, using defaults"
                );
                PipelineConfig::default()
            }
        };

        config.validate()?;

        Ok(ConfigManager {
            config,
            environment: environment.to_string(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Detect the runtime environment from environment variables
    fn detect_environment() -> String {
        env::var("PIPELINE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn read_yaml(path: &PathBuf) -> Result<Option<YamlValue>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        let value = serde_yaml::from_str(&content).map_err(|e| {
            PipelineError::Configuration(format!("failed to parse {}: {e}", path.display()))
        })?;
        Ok(Some(value))
    }
}

/// Recursively merge `overlay` into `base`; overlay scalars win
fn merge_yaml(base: &mut YamlValue, overlay: YamlValue) {
    match (base, overlay) {
        (YamlValue::Mapping(base_map), YamlValue::Mapping(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(base_value) => merge_yaml(base_value, overlay_value),
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value,
    }
}
