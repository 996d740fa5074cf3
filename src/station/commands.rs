// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Inbound operator commands

use serde::{Deserialize, Serialize};

use crate::config::AppSettings;
use crate::devices::{Priority, SensorConfig, SystemMode};
use crate::error::{StationError, StationResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum StationCommand {
    SetSystemMode { device_id: u32, mode: SystemMode },
    SetSystemHandPriority { device_id: u32, priority: Priority },
    SetSensorConfig { device_id: u32, config: SensorConfig },
    SetSettings { settings: AppSettings },
    ResetAlarms,
    ResetRunTime { device_id: u32 },
}

impl StationCommand {
    /// Parse and validate a command payload
    pub fn from_json(text: &str) -> StationResult<Self> {
        let command: StationCommand =
            serde_json::from_str(text).map_err(|e| StationError::InvalidCommand(e.to_string()))?;
        command.validate()?;
        Ok(command)
    }

    pub fn validate(&self) -> StationResult<()> {
        match self {
            StationCommand::SetSettings { settings } => settings.validate(),
            StationCommand::SetSensorConfig { config, .. } => {
                let a = &config.alarms;
                let values = [
                    config.value_scaled_min,
                    config.value_scaled_max,
                    a.start_delay,
                    a.stop_delay,
                    a.high.start,
                    a.high.stop,
                    a.high_high.start,
                    a.high_high.stop,
                    a.low.start,
                    a.low.stop,
                    a.low_low.start,
                    a.low_low.stop,
                ];
                if values.iter().any(|v| !v.is_finite()) {
                    return Err(StationError::InvalidCommand(
                        "sensor config values must be finite".to_string(),
                    ));
                }
                if a.start_delay < 0.0 || a.stop_delay < 0.0 {
                    return Err(StationError::InvalidCommand(
                        "alarm delays must be >= 0".to_string(),
                    ));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Commands that move or re-rank systems
    pub fn acts_on_system(&self) -> bool {
        matches!(
            self,
            StationCommand::SetSystemMode { .. }
                | StationCommand::SetSystemHandPriority { .. }
                | StationCommand::ResetRunTime { .. }
        )
    }
}
