//! Scoring configuration, persisted as TOML.
//!
//! Every field has a default, so a config file only needs the keys it changes. An
//! absent file is equivalent to `ScoringConfig::default()`, which reproduces the
//! canonical TC.

use crate::types::ScoringOptions;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("Failed to serialize configuration to TOML: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Column names of a scoring table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub era: String,
    pub target: String,
    pub meta_model: String,
    /// Every column whose name starts with this prefix is scored as a model.
    pub prediction_prefix: String,
    /// Every column whose name starts with this prefix is a neutralization feature.
    pub feature_prefix: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            era: "era".to_string(),
            target: "target".to_string(),
            meta_model: "meta_model".to_string(),
            prediction_prefix: "prediction".to_string(),
            feature_prefix: "feature".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScoringConfig {
    pub scoring: ScoringOptions,
    pub columns: ColumnNames,
}

impl ScoringConfig {
    /// Serializes the configuration to a human-readable TOML file.
    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    /// Loads and validates a configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        Self::from_toml_str(&toml_string)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: ScoringConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let clip = self.scoring.percentile_clip;
        if !(clip > 0.0 && clip < 0.5) {
            return Err(ConfigError::InvalidValue {
                field: "scoring.percentile_clip",
                reason: format!("must lie strictly between 0 and 0.5, got {clip}"),
            });
        }
        let proportion = self.scoring.neutralization_proportion;
        if !(0.0..=1.0).contains(&proportion) {
            return Err(ConfigError::InvalidValue {
                field: "scoring.neutralization_proportion",
                reason: format!("must lie in [0, 1], got {proportion}"),
            });
        }
        let columns = &self.columns;
        let names = [
            ("columns.era", &columns.era),
            ("columns.target", &columns.target),
            ("columns.meta_model", &columns.meta_model),
            ("columns.prediction_prefix", &columns.prediction_prefix),
            ("columns.feature_prefix", &columns.feature_prefix),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must not be empty".to_string(),
                });
            }
        }
        if columns.prediction_prefix == columns.feature_prefix {
            return Err(ConfigError::InvalidValue {
                field: "columns.feature_prefix",
                reason: "must differ from columns.prediction_prefix".to_string(),
            });
        }
        Ok(())
    }
}
