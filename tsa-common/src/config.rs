//! Configuration loading and root folder resolution
//!
//! A single [`TomlConfig`] is built at process start and its sections are handed
//! by value to the components that need them. Nothing reads settings from a
//! global after startup.
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable `TSA_ROOT_FOLDER`
//! 3. `root_folder` key in the TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "TSA_ROOT_FOLDER";

/// Environment variable pointing at an explicit config file
pub const CONFIG_FILE_ENV: &str = "TSA_CONFIG";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "tsa.db";

/// Directory (inside the root folder) holding trained model files
pub const MODELS_DIR: &str = "models";

/// Full configuration file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub retrain: RetrainConfig,
    pub trainer: TrainerConfig,
    pub scheduler: SchedulerConfig,
    pub server: ServerConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Retraining policy and dataset preparation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrainConfig {
    /// Unused samples that trigger a retrain on their own
    pub min_samples_for_retrain: u64,
    /// Hours after the last registered model that trigger a retrain
    pub retrain_interval_hours: f64,
    /// Smallest pool a cycle will train on
    pub min_pool_size: usize,
    /// Upper bound on the snapshot fetched per cycle
    pub max_pool_samples: usize,
    pub test_fraction: f64,
    pub val_fraction: f64,
    /// Seed shared by the splitter and the trainer
    pub seed: u64,
    pub promotion: PromotionMode,
}

impl Default for RetrainConfig {
    fn default() -> Self {
        Self {
            min_samples_for_retrain: 1000,
            retrain_interval_hours: 24.0,
            min_pool_size: 30,
            max_pool_samples: 100_000,
            test_fraction: 0.2,
            val_fraction: 0.1,
            seed: 42,
            promotion: PromotionMode::Always,
        }
    }
}

/// How a freshly registered model is promoted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PromotionMode {
    /// Every successfully trained model is deployed
    #[default]
    Always,
    /// Deploy only when the candidate beats the deployed model
    IfImproved {
        metric: PromotionMetric,
        #[serde(default)]
        min_delta: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionMetric {
    F1,
    Accuracy,
}

/// Trainer hyperparameters (opaque to the orchestrator)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Tokens kept per text
    pub max_length: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub num_epochs: usize,
    /// Hashed feature space size
    pub feature_dim: usize,
    pub l2: f32,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_length: 128,
            batch_size: 32,
            learning_rate: 0.5,
            num_epochs: 3,
            feature_dim: 4096,
            l2: 1e-4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub check_interval_secs: u64,
    pub max_retries: u32,
    /// First retry delay; doubles on each further attempt
    pub retry_backoff_secs: u64,
    /// Wall-clock budget for one cycle
    pub cycle_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_secs: 3600,
            max_retries: 3,
            retry_backoff_secs: 300,
            cycle_timeout_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Posts per flush
    pub batch_size: usize,
    /// Maximum time a partial batch waits before flushing
    pub flush_interval_ms: u64,
    /// Bound of the channel between stream reader and batcher
    pub channel_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval_ms: 5000,
            channel_capacity: 1000,
        }
    }
}

impl TomlConfig {
    /// Load configuration
    ///
    /// An explicit path (argument or `TSA_CONFIG`) must exist and parse.
    /// Otherwise the platform config locations are tried and a missing file
    /// falls back to defaults with a warning.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let explicit = explicit_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from));

        let config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None => match default_config_file() {
                Some(path) => Self::from_file(&path)?,
                None => {
                    warn!("No config file found, using compiled defaults");
                    Self::default()
                }
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Reject values the services cannot run with
    pub fn validate(&self) -> Result<()> {
        let r = &self.retrain;
        if r.min_samples_for_retrain < 1 {
            return Err(Error::Config("min_samples_for_retrain must be >= 1".to_string()));
        }
        if !(r.retrain_interval_hours.is_finite() && r.retrain_interval_hours > 0.0) {
            return Err(Error::Config("retrain_interval_hours must be > 0".to_string()));
        }
        validate_fractions(r.test_fraction, r.val_fraction)?;
        if r.min_pool_size < 1 {
            return Err(Error::Config("min_pool_size must be >= 1".to_string()));
        }
        if r.max_pool_samples < r.min_pool_size {
            return Err(Error::Config(format!(
                "max_pool_samples ({}) must be >= min_pool_size ({})",
                r.max_pool_samples, r.min_pool_size
            )));
        }
        if let PromotionMode::IfImproved { min_delta, .. } = r.promotion {
            if !min_delta.is_finite() {
                return Err(Error::Config("promotion.min_delta must be finite".to_string()));
            }
        }

        let t = &self.trainer;
        if t.max_length == 0 || t.batch_size == 0 || t.num_epochs == 0 || t.feature_dim == 0 {
            return Err(Error::Config(
                "trainer max_length, batch_size, num_epochs and feature_dim must be > 0".to_string(),
            ));
        }
        if !(t.learning_rate.is_finite() && t.learning_rate > 0.0) {
            return Err(Error::Config("trainer.learning_rate must be > 0".to_string()));
        }
        if !(t.l2.is_finite() && t.l2 >= 0.0) {
            return Err(Error::Config("trainer.l2 must be >= 0".to_string()));
        }

        let s = &self.scheduler;
        if s.check_interval_secs == 0 || s.cycle_timeout_secs == 0 {
            return Err(Error::Config(
                "scheduler check_interval_secs and cycle_timeout_secs must be > 0".to_string(),
            ));
        }

        let i = &self.ingest;
        if i.batch_size == 0 || i.channel_capacity == 0 || i.flush_interval_ms == 0 {
            return Err(Error::Config(
                "ingest batch_size, channel_capacity and flush_interval_ms must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Validate split fractions: both in (0, 1), sum below 1
pub fn validate_fractions(test_fraction: f64, val_fraction: f64) -> Result<()> {
    let in_range = |f: f64| f.is_finite() && f > 0.0 && f < 1.0;
    if !in_range(test_fraction) || !in_range(val_fraction) {
        return Err(Error::Config(format!(
            "test_fraction ({}) and val_fraction ({}) must be in (0, 1)",
            test_fraction, val_fraction
        )));
    }
    if test_fraction + val_fraction >= 1.0 {
        return Err(Error::Config(format!(
            "test_fraction + val_fraction must be < 1 (got {})",
            test_fraction + val_fraction
        )));
    }
    Ok(())
}

/// Root folder resolver
pub struct RootFolderResolver<'a> {
    cli_arg: Option<&'a Path>,
    toml_root: Option<&'a Path>,
}

impl<'a> RootFolderResolver<'a> {
    pub fn new(cli_arg: Option<&'a Path>, config: &'a TomlConfig) -> Self {
        Self {
            cli_arg,
            toml_root: config.root_folder.as_deref(),
        }
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = self.cli_arg {
            return path.to_path_buf();
        }
        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }
        if let Some(path) = self.toml_root {
            return path.to_path_buf();
        }
        default_root_folder()
    }
}

/// Creates the root folder layout and hands out well-known paths
pub struct RootFolderInitializer {
    root: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(self.models_dir())?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE)
    }

    pub fn models_dir(&self) -> PathBuf {
        self.root.join(MODELS_DIR)
    }
}

fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("tsa").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }
    let system_config = PathBuf::from("/etc/tsa/config.toml");
    system_config.exists().then_some(system_config)
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("tsa"))
        .unwrap_or_else(|| PathBuf::from("./tsa_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = TomlConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retrain.min_samples_for_retrain, 1000);
        assert_eq!(config.retrain.retrain_interval_hours, 24.0);
        assert_eq!(config.scheduler.max_retries, 3);
        assert_eq!(config.retrain.promotion, PromotionMode::Always);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            [retrain]
            min_samples_for_retrain = 50

            [retrain.promotion]
            mode = "if_improved"
            metric = "f1"
            min_delta = 0.01
            "#,
        )
        .unwrap();

        assert_eq!(config.retrain.min_samples_for_retrain, 50);
        assert_eq!(config.retrain.test_fraction, 0.2);
        assert_eq!(config.trainer.max_length, 128);
        assert_eq!(
            config.retrain.promotion,
            PromotionMode::IfImproved {
                metric: PromotionMetric::F1,
                min_delta: 0.01
            }
        );
    }

    #[test]
    fn fractions_must_leave_room_for_training() {
        assert!(validate_fractions(0.2, 0.1).is_ok());
        assert!(validate_fractions(0.5, 0.5).is_err());
        assert!(validate_fractions(0.0, 0.1).is_err());
        assert!(validate_fractions(0.2, 1.0).is_err());
        assert!(validate_fractions(f64::NAN, 0.1).is_err());
    }

    #[test]
    fn zero_min_samples_rejected() {
        let mut config = TomlConfig::default();
        config.retrain.min_samples_for_retrain = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn cli_argument_wins() {
        let config = TomlConfig {
            root_folder: Some(PathBuf::from("/from/toml")),
            ..Default::default()
        };
        let cli = PathBuf::from("/from/cli");
        let resolved = RootFolderResolver::new(Some(&cli), &config).resolve();
        assert_eq!(resolved, PathBuf::from("/from/cli"));
    }
}
