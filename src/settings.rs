//! Demo settings with persistence
//!
//! Settings are read from `~/.config/kindred/settings.toml`

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use kindred_ecs::WorldConfig;
use serde::{Deserialize, Serialize};
use tracing::Level;

/// All demo settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub world: WorldConfig,
    pub simulation: SimulationSettings,
}

impl Settings {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("kindred"))
    }

    /// Get the settings file path
    fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.toml"))
    }

    /// Load settings from disk, or return defaults if there is no file.
    ///
    /// Runs before logging is set up, so failures are returned rather than logged.
    pub fn load() -> Result<Self> {
        let Some(path) = Self::settings_path() else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// One of `error`, `warn`, `info`, `debug`, `trace`
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingSettings {
    /// Parsed log level, falling back to INFO for unknown names
    pub fn max_level(&self) -> Level {
        self.level.parse().unwrap_or(Level::INFO)
    }
}

/// Simulation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Entities spawned at startup
    pub entity_count: u32,
    /// Number of ticks to run
    pub ticks: u32,
    /// Seconds of simulated time per tick
    pub time_step: f32,
    /// Upper bound for a spawned entity's lifetime, in ticks
    pub max_lifetime: u32,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            entity_count: 64,
            ticks: 120,
            time_step: 1.0 / 60.0,
            max_lifetime: 90,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [simulation]
            ticks = 10

            [world]
            initial_capacity = 32
            "#,
        )
        .unwrap();
        assert_eq!(settings.simulation.ticks, 10);
        assert_eq!(settings.simulation.entity_count, 64);
        assert_eq!(settings.world.initial_capacity, 32);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn log_level_parsing() {
        let mut logging = LoggingSettings::default();
        assert_eq!(logging.max_level(), Level::INFO);
        logging.level = "debug".into();
        assert_eq!(logging.max_level(), Level::DEBUG);
        logging.level = "chatty".into();
        assert_eq!(logging.max_level(), Level::INFO);
    }
}
