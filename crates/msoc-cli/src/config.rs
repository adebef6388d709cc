//! Layered application configuration
//!
//! Defaults, then an optional TOML file, then `MSOC__SECTION__KEY`
//! environment variables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{ConfigBuilder, Environment, File};
use msoc_core::{SimulationConfig, WorldConfig};
use msoc_rl::{EngineConfig, OfflineConfig, TrainingConfig};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "msoc.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub world: WorldConfig,
    pub simulation: SimulationConfig,
    pub data: DataConfig,
    pub rl: RlConfig,
    /// File the values were read from, if any
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub output_dir: PathBuf,
    pub max_per_file: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("training_data"),
            max_per_file: msoc_data::DEFAULT_MAX_PER_FILE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RlConfig {
    pub algorithm: String,
    /// Experiences between online train calls during simulation
    pub train_interval: usize,
    pub engine: EngineConfig,
    pub training: TrainingConfig,
    pub offline: OfflineConfig,
}

impl Default for RlConfig {
    fn default() -> Self {
        Self {
            algorithm: "q_learning".to_string(),
            train_interval: 10,
            engine: EngineConfig::default(),
            training: TrainingConfig::default(),
            offline: OfflineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration; `explicit` must exist when given
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = match explicit {
            Some(path) => {
                anyhow::ensure!(path.exists(), "config file {} not found", path.display());
                Some(path.to_path_buf())
            }
            None => Self::find_config_file(),
        };

        let mut builder = ConfigBuilder::<config::builder::DefaultState>::default();
        if let Some(path) = &config_path {
            builder = builder.add_source(File::from(path.clone()).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix("MSOC")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: AppConfig = builder
            .build()?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.source = config_path;
        Ok(config)
    }

    /// Check in order: MSOC_CONFIG env, ./msoc.toml, ~/.config/msoc/msoc.toml
    pub fn find_config_file() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("MSOC_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".config").join("msoc").join(CONFIG_FILE_NAME);
            if user_config.exists() {
                return Some(user_config);
            }
        }

        None
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip_through_toml() {
        let config = AppConfig::default();
        let text = config.to_toml().unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.world, config.world);
        assert_eq!(parsed.rl.engine, config.rl.engine);
        assert_eq!(parsed.logging.level, "info");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[world]\nnpc_count = 4\n\n[rl]\nalgorithm = \"dqn\"\n\n[rl.engine]\nbatch_size = 16\n",
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.world.npc_count, 4);
        assert_eq!(config.world.map_width, 25);
        assert_eq!(config.rl.algorithm, "dqn");
        assert_eq!(config.rl.engine.batch_size, 16);
        assert_eq!(config.rl.engine.buffer_capacity, 10_000);
        assert_eq!(config.source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(AppConfig::load(Some(Path::new("/nonexistent/msoc.toml"))).is_err());
    }
}
