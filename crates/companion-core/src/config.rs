//! # Training Configuration
//!
//! Hyperparameters read from the YAML file that sits next to the training
//! data (`/mnt/data/config.yml` in the service container).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{CompanionError, Result};

/// Default location of the training configuration.
pub const DEFAULT_CONFIG_PATH: &str = "/mnt/data/config.yml";

/// Upper bound on `n_iter`.
pub const MAX_ITERATIONS: usize = 100_000;

/// Hyperparameters for one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Path of the JSON training-data file.
    #[serde(rename = "trainingsData")]
    pub training_data: PathBuf,

    /// Number of passes over the training data.
    pub n_iter: usize,

    /// Language code of the blank model (e.g. `en`).
    #[serde(rename = "modelLanguage")]
    pub model_language: String,

    /// Probability of dropping a feature during an update.
    pub drop: f32,

    /// Version stamped onto the persisted model directory.
    #[serde(rename = "currentVersion", deserialize_with = "version_string")]
    pub current_version: String,
}

impl TrainingConfig {
    /// Read and parse a configuration file.
    ///
    /// A relative `trainingsData` path is resolved against the directory of
    /// the configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| CompanionError::io(path, e))?;
        let mut config = Self::from_yaml(&raw)?;

        if config.training_data.is_relative() {
            if let Some(dir) = path.parent() {
                config.training_data = dir.join(&config.training_data);
            }
        }

        tracing::debug!(path = %path.display(), ?config, "loaded training config");
        Ok(config)
    }

    /// Parse a configuration from YAML text.
    pub fn from_yaml(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Reject values the trainer cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_ITERATIONS).contains(&self.n_iter) {
            return Err(CompanionError::Config(format!(
                "n_iter must be in 1..={MAX_ITERATIONS}, got {}",
                self.n_iter
            )));
        }
        if !(0.0..1.0).contains(&self.drop) {
            return Err(CompanionError::Config(format!(
                "drop must be in [0, 1), got {}",
                self.drop
            )));
        }
        if self.model_language.trim().is_empty() {
            return Err(CompanionError::Config("modelLanguage is empty".into()));
        }
        if self.current_version.trim().is_empty() {
            return Err(CompanionError::Config("currentVersion is empty".into()));
        }
        Ok(())
    }

    /// Directory the trained model is written to under `model_root`.
    pub fn output_dir(&self, model_root: impl AsRef<Path>) -> PathBuf {
        model_dir(model_root, &self.current_version)
    }
}

/// Versioned model directory: `<root>/model-<version>`.
pub fn model_dir(model_root: impl AsRef<Path>, version: &str) -> PathBuf {
    model_root.as_ref().join(format!("model-{version}"))
}

/// `currentVersion` is often written as a bare YAML integer.
fn version_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Version {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Version::deserialize(deserializer)? {
        Version::Text(s) => s,
        Version::Int(n) => n.to_string(),
        Version::Float(f) => f.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
trainingsData: data.json
n_iter: 2
modelLanguage: en
drop: 0.2
currentVersion: \"1\"
";

    #[test]
    fn parses_all_fields() {
        let config = TrainingConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.training_data, PathBuf::from("data.json"));
        assert_eq!(config.n_iter, 2);
        assert_eq!(config.model_language, "en");
        assert!((config.drop - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.current_version, "1");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn integer_version_is_stringified() {
        let raw = SAMPLE.replace("currentVersion: \"1\"", "currentVersion: 7");
        let config = TrainingConfig::from_yaml(&raw).unwrap();
        assert_eq!(config.current_version, "7");
    }

    #[test]
    fn missing_key_fails_to_parse() {
        let raw = SAMPLE.replace("n_iter: 2\n", "");
        assert!(matches!(
            TrainingConfig::from_yaml(&raw),
            Err(CompanionError::Yaml(_))
        ));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = TrainingConfig::from_yaml(SAMPLE).unwrap();
        config.drop = 1.0;
        assert!(config.validate().is_err());

        config.drop = 0.0;
        config.n_iter = 0;
        assert!(config.validate().is_err());

        config.n_iter = MAX_ITERATIONS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_huge_iteration_counts() {
        let raw = SAMPLE.replace("n_iter: 2", "n_iter: 4611686018427387904");
        let config = TrainingConfig::from_yaml(&raw).unwrap();
        assert!(matches!(config.validate(), Err(CompanionError::Config(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = TrainingConfig::from_file("/definitely/not/here.yml").unwrap_err();
        assert!(matches!(err, CompanionError::Io { .. }));
    }

    #[test]
    fn relative_data_path_follows_config_dir() {
        let dir = std::env::temp_dir().join(format!("companion-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = TrainingConfig::from_file(&path).unwrap();
        assert_eq!(config.training_data, dir.join("data.json"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn output_dir_is_versioned() {
        let config = TrainingConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.output_dir("/mnt"), PathBuf::from("/mnt/model-1"));
    }
}
