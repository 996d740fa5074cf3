// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Events the station publishes for external consumers

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::AppSettings;
use crate::devices::{SensorStatus, SystemStatus};
use crate::io::IoSnapshot;

/// Full station state at one tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationStatus {
    pub timestamp: DateTime<Utc>,
    pub systems: Vec<SystemStatus>,
    pub primary_sensor: SensorStatus,
    pub secondary_sensor: Option<SensorStatus>,
    pub io: IoSnapshot,
    pub settings: AppSettings,
    pub emergency_stop: bool,
}

impl StationStatus {
    /// Systems currently answering with run feedback
    pub fn running_count(&self) -> usize {
        self.systems
            .iter()
            .filter(|s| s.status == crate::devices::DeviceStatus::Running)
            .count()
    }

    pub fn has_alarm(&self) -> bool {
        self.primary_sensor.has_alarm
            || self.secondary_sensor.as_ref().is_some_and(|s| s.has_alarm)
            || self.systems.iter().any(|s| s.has_alarm)
    }
}

/// Published once per tick
#[derive(Debug, Clone)]
pub struct StationUpdate(pub Arc<StationStatus>);

/// A benign condition worth telling the operator about
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationWarning {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl StationWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
        }
    }
}
