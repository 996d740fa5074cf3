// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Configuration module

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::devices::{SensorConfig, SystemMode};
use crate::error::{StationError, StationResult};
use crate::store::ConfigStore;

/// Highest number of systems a station can drive
pub const MAX_SYSTEMS: usize = 4;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level
    pub log_level: String,

    /// Run against simulated I/O and a simulated plant
    pub demo_mode: bool,

    /// Software mode every system starts in
    pub initial_mode: SystemMode,

    /// Control settings (seed values; the config store wins once written)
    pub settings: AppSettings,

    /// Channel-to-role mapping
    pub io: IoMap,

    /// Defaults for sensors without a stored configuration
    pub sensor: SensorConfig,

    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            demo_mode: false,
            initial_mode: SystemMode::Auto,
            settings: AppSettings::default(),
            io: IoMap::default(),
            sensor: SensorConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("liftstation"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Cross-check settings against the wiring
    pub fn validate(&self) -> StationResult<()> {
        self.settings.validate()?;
        if self.settings.system_count > self.io.systems.len() {
            return Err(StationError::InvalidSettings(format!(
                "{} systems configured but only {} wired",
                self.settings.system_count,
                self.io.systems.len()
            )));
        }
        Ok(())
    }
}

/// Control settings, editable at runtime
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Target process value, engineering units
    pub set_point: f64,

    /// Half-width of the deadband around the set-point
    pub offset: f64,

    /// Seconds below the deadband before a pump is started
    pub start_pump_delay: f64,

    /// Seconds above the deadband before a pump is stopped
    pub stop_pump_delay: f64,

    pub system_count: usize,

    /// Seconds without run feedback before a called system alarms; 0 disables
    pub fail_to_start_delay: f64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            set_point: 50.0,
            offset: 20.0,
            start_pump_delay: 5.0,
            stop_pump_delay: 5.0,
            system_count: 3,
            fail_to_start_delay: 10.0,
        }
    }
}

const SETTINGS_NS: &str = "application";

impl AppSettings {
    pub fn validate(&self) -> StationResult<()> {
        let invalid = |msg: String| Err(StationError::InvalidSettings(msg));

        if !self.set_point.is_finite() {
            return invalid(format!("set_point {} is not finite", self.set_point));
        }
        if !self.offset.is_finite() || self.offset < 0.0 {
            return invalid(format!("offset {} must be finite and >= 0", self.offset));
        }
        for (name, value) in [
            ("start_pump_delay", self.start_pump_delay),
            ("stop_pump_delay", self.stop_pump_delay),
            ("fail_to_start_delay", self.fail_to_start_delay),
        ] {
            if !value.is_finite() || value < 0.0 {
                return invalid(format!("{} {} must be finite and >= 0", name, value));
            }
        }
        if self.system_count == 0 || self.system_count > MAX_SYSTEMS {
            return invalid(format!(
                "system_count {} must be between 1 and {}",
                self.system_count, MAX_SYSTEMS
            ));
        }
        Ok(())
    }

    /// Stored settings over `defaults`, seeding missing keys
    pub fn from_store(store: &dyn ConfigStore, defaults: &AppSettings) -> Self {
        let key = |field: &str| format!("{}.{}", SETTINGS_NS, field);
        let loaded = Self {
            set_point: store.get_f64(&key("level_set_point"), defaults.set_point),
            offset: store.get_f64(&key("level_offset"), defaults.offset),
            start_pump_delay: store.get_f64(&key("start_pump_delay"), defaults.start_pump_delay),
            stop_pump_delay: store.get_f64(&key("stop_pump_delay"), defaults.stop_pump_delay),
            system_count: store
                .get_i64(&key("system_count"), defaults.system_count as i64)
                .clamp(0, MAX_SYSTEMS as i64) as usize,
            fail_to_start_delay: store
                .get_f64(&key("system_fail_to_start_delay"), defaults.fail_to_start_delay),
        };

        let settings = if loaded.validate().is_ok() { loaded } else { *defaults };
        settings.persist(store);
        settings
    }

    pub fn persist(&self, store: &dyn ConfigStore) {
        let key = |field: &str| format!("{}.{}", SETTINGS_NS, field);
        store.put(&key("level_set_point"), &self.set_point);
        store.put(&key("level_offset"), &self.offset);
        store.put(&key("start_pump_delay"), &self.start_pump_delay);
        store.put(&key("stop_pump_delay"), &self.stop_pump_delay);
        store.put(&key("system_count"), &self.system_count);
        store.put(&key("system_fail_to_start_delay"), &self.fail_to_start_delay);
    }
}

/// I/O channels of one system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemWiring {
    pub di_running: usize,
    pub do_run: usize,
    pub di_hand: usize,
    pub di_auto: usize,
}

/// Digital/analog channel-to-role mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoMap {
    pub di_emergency_stop: usize,
    pub ai_primary_sensor: usize,
    pub ai_secondary_sensor: Option<usize>,
    pub systems: Vec<SystemWiring>,
}

impl Default for IoMap {
    fn default() -> Self {
        let selectors = [(3, 4), (5, 6), (7, 8)];
        Self {
            di_emergency_stop: 9,
            ai_primary_sensor: 0,
            ai_secondary_sensor: None,
            systems: selectors
                .iter()
                .enumerate()
                .map(|(i, &(di_hand, di_auto))| SystemWiring {
                    di_running: i,
                    do_run: i,
                    di_hand,
                    di_auto,
                })
                .collect(),
        }
    }
}

/// Config store location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
    /// Keep everything in memory; nothing survives a restart
    pub in_memory: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: Config::config_dir().join("liftstation.db"),
            in_memory: false,
        }
    }
}
