//! Configuration for training and serving.
//!
//! Loaded from an optional TOML file layered with `STROKE_*` environment
//! variables, e.g. `STROKE_SERVING__THRESHOLD=0.25`.

use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::forest::ForestParams;
use crate::table::IngestOptions;

pub const DEFAULT_CONFIG_PATH: &str = "config/stroke-risk.toml";

/// Decision threshold for the High verdict. Below the 0.5 midpoint on purpose:
/// a missed stroke risk costs more than a false alarm.
pub const DEFAULT_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub training: TrainingConfig,
    pub serving: ServingConfig,
    pub artifacts: ArtifactConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Labeled training table
    pub training_csv: PathBuf,
    pub null_values: Vec<String>,
    pub ignored_columns: Vec<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        let ingest = IngestOptions::default();
        DataConfig {
            training_csv: PathBuf::from("data/processed.csv"),
            null_values: ingest.null_values,
            ignored_columns: ingest.ignored_columns,
        }
    }
}

impl DataConfig {
    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            null_values: self.null_values.clone(),
            ignored_columns: self.ignored_columns.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Seeds the split, the oversampler and the forest.
    pub seed: u64,
    pub test_fraction: f64,
    pub smote_neighbors: usize,
    pub forest: ForestParams,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            seed: 42,
            test_fraction: 0.2,
            smote_neighbors: 5,
            forest: ForestParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServingConfig {
    pub threshold: f64,
}

impl Default for ServingConfig {
    fn default() -> Self {
        ServingConfig {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub dir: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        ArtifactConfig {
            dir: PathBuf::from("artifacts"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// The file is optional; every key falls back to its default.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("STROKE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let threshold = self.serving.threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::Config(format!(
                "serving.threshold must be within [0, 1], got {threshold}"
            )));
        }
        let fraction = self.training.test_fraction;
        if !(0.0..1.0).contains(&fraction) {
            return Err(Error::Config(format!(
                "training.test_fraction must be within [0, 1), got {fraction}"
            )));
        }
        if self.training.forest.n_trees == 0 {
            return Err(Error::Config("training.forest.n_trees must be positive".to_string()));
        }
        if self.training.smote_neighbors == 0 {
            return Err(Error::Config("training.smote_neighbors must be positive".to_string()));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(Error::Config(format!(
                "logging.format must be `pretty` or `json`, got {:?}",
                self.logging.format
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::MaxFeatures;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.serving.threshold, 0.3);
        assert_eq!(config.training.seed, 42);
        assert_eq!(config.training.test_fraction, 0.2);
        assert_eq!(config.training.forest.n_trees, 100);
        assert_eq!(config.training.forest.max_depth, Some(10));
        assert_eq!(config.artifacts.dir, PathBuf::from("artifacts"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from_path(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.serving, ServingConfig::default());
        assert_eq!(config.training, TrainingConfig::default());
    }

    #[test]
    fn test_file_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[serving]
threshold = 0.45

[training]
seed = 7

[training.forest]
n_trees = 10
max_features = "all"

[data]
ignored_columns = ["id"]
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.serving.threshold, 0.45);
        assert_eq!(config.training.seed, 7);
        assert_eq!(config.training.forest.n_trees, 10);
        assert_eq!(config.training.forest.max_features, MaxFeatures::All);
        assert_eq!(config.training.forest.max_depth, Some(10));
        assert_eq!(config.data.ignored_columns, vec!["id".to_string()]);
    }

    #[test]
    fn test_forest_seed_key_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[training.forest]\nn_trees = 10\nseed = 7").unwrap();
        file.flush().unwrap();

        let err = AppConfig::load_from_path(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("seed")));
    }

    #[test]
    fn test_invalid_threshold_is_rejected() {
        let mut config = AppConfig::default();
        config.serving.threshold = 1.5;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_test_fraction_is_rejected() {
        let mut config = AppConfig::default();
        config.training.test_fraction = 1.0;
        assert!(config.validate().is_err());
    }
}
