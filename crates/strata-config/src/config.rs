//! Scheduler, world and debug settings with RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.ron";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Worker pool sizing and dispatch limits.
    pub meshing: MeshingConfig,
    /// World extent and view distance.
    pub world: WorldConfig,
    /// Logging and headless-run settings.
    pub debug: DebugConfig,
}

/// Meshing scheduler limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MeshingConfig {
    /// Worker threads for section preparation; `0` picks one per CPU.
    pub worker_threads: usize,
    /// Threads held back from preparation for other pool users.
    pub reserved_threads: usize,
    /// Memory the process may use, in bytes. Selects the finished-mesh cap.
    pub memory_budget_bytes: u64,
    /// Budgets strictly above this use `max_meshes_to_load_high`.
    pub high_memory_threshold_bytes: u64,
    /// Finished-mesh backlog cap for large memory budgets.
    pub max_meshes_to_load_high: usize,
    /// Finished-mesh backlog cap for small memory budgets.
    pub max_meshes_to_load_low: usize,
}

/// World extent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorldConfig {
    /// Radius, in chunks, around the camera that counts as visible.
    pub view_distance: u32,
    /// Lowest section height of every column.
    pub min_section: i32,
    /// Highest section height of every column (inclusive).
    pub max_section: i32,
    /// Seed for the synthetic terrain of the headless app.
    pub seed: u64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g. "debug", "info", "strata_mesh=trace").
    pub log_level: String,
    /// Directory for the JSON log file; `None` uses the working directory.
    pub log_dir: Option<PathBuf>,
    /// Frames the headless app simulates before exiting.
    pub frames: u32,
}

impl Default for MeshingConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            reserved_threads: 2,
            memory_budget_bytes: 2 * 1024 * 1024 * 1024,
            high_memory_threshold_bytes: 1_000_000_000,
            max_meshes_to_load_high: 150,
            max_meshes_to_load_low: 80,
        }
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            view_distance: 8,
            min_section: -4,
            max_section: 19,
            seed: 0,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
            frames: 600,
        }
    }
}

impl Config {
    /// Loads `config.ron` from `config_dir`, writing a default one first if
    /// none exists.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, written or parsed.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Writes the config to `config_dir/config.ron`, creating the directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::WriteError`] or [`ConfigError::SerializeError`].
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(2)
            .enumerate_arrays(false);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(config_dir.join(CONFIG_FILE), serialized).map_err(ConfigError::WriteError)
    }

    /// Re-reads the file and returns the new config only if it differs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ReadError`] or [`ConfigError::ParseError`].
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join(CONFIG_FILE))?;
        if &new_config == self {
            return Ok(None);
        }
        log::info!("Config reloaded with changes");
        Ok(Some(new_config))
    }

    /// Checks the values the scheduler cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.world.min_section > self.world.max_section {
            return Err(ConfigError::Invalid(format!(
                "world.min_section ({}) is above world.max_section ({})",
                self.world.min_section, self.world.max_section
            )));
        }
        if self.meshing.max_meshes_to_load_high == 0 || self.meshing.max_meshes_to_load_low == 0 {
            return Err(ConfigError::Invalid(
                "finished-mesh caps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        ron::from_str(&contents).map_err(ConfigError::ParseError)
    }
}
