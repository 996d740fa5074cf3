// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Device module - contactors, pumps, sensors and the systems that group them

mod contactor;
mod pump;
mod runtime;
mod sensor;
mod system;

pub use contactor::*;
pub use pump::*;
pub use runtime::*;
pub use sensor::*;
pub use system::*;

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::alarm::AlarmSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Contactor,
    Pump,
    Sensor,
    System,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceKind::Contactor => "contactor",
            DeviceKind::Pump => "pump",
            DeviceKind::Sensor => "sensor",
            DeviceKind::System => "system",
        };
        f.write_str(name)
    }
}

/// Identity of a device. The name doubles as its config store namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: u32,
    pub kind: DeviceKind,
}

impl DeviceInfo {
    pub fn new(kind: DeviceKind, id: u32) -> Self {
        Self { id, kind }
    }

    pub fn name(&self) -> String {
        format!("{}_{}", self.kind, self.id)
    }

    /// Store key for one of this device's fields
    pub fn key(&self, field: &str) -> String {
        format!("{}.{}", self.name(), field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub is_runnable: bool,
    pub has_alarm_source: bool,
}

/// Common surface of every device
pub trait Device: AlarmSource {
    fn info(&self) -> DeviceInfo;

    fn capabilities(&self) -> Capabilities;

    fn name(&self) -> String {
        self.info().name()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceStatus {
    #[default]
    Stopped,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemMode {
    #[default]
    Off,
    Hand,
    Auto,
}

/// Run priority rank. Lower runs first; `Out` means not eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Lead = 0,
    #[serde(rename = "LAG_1")]
    Lag1 = 1,
    #[serde(rename = "LAG_2")]
    Lag2 = 2,
    #[serde(rename = "LAG_3")]
    Lag3 = 3,
    #[default]
    Out = 4,
}

impl Priority {
    /// Rank in the sorted run order; anything past the last lag is `Out`
    pub fn from_rank(rank: usize) -> Self {
        match rank {
            0 => Priority::Lead,
            1 => Priority::Lag1,
            2 => Priority::Lag2,
            3 => Priority::Lag3,
            _ => Priority::Out,
        }
    }

    pub fn rank(self) -> u8 {
        self as u8
    }
}

/// Something that drives a motor: run command, run feedback and run hours
pub trait Runnable: Device {
    fn status(&self) -> DeviceStatus;

    fn can_run(&self, now: Instant) -> bool;

    fn can_run_auto(&self, now: Instant) -> bool {
        self.can_run(now)
    }

    fn call_to_run(&mut self, now: Instant);

    fn stop(&mut self);

    fn set_emergency_stop(&mut self, value: bool);

    fn alarm_fail_to_start(&self, now: Instant) -> bool;

    /// Seconds into the current run, 0 when stopped
    fn run_time_current(&self, now: Instant) -> f64;

    fn run_time_last(&self) -> f64;

    fn run_time_total(&self, now: Instant) -> f64;

    fn reset_run_time(&mut self, now: Instant);
}

/// Linear map from `[in_min, in_max]` onto `[out_min, out_max]`.
///
/// A degenerate input range maps to 0. With `clamp` the result is held
/// inside the output range whichever way round it is given.
pub fn scale_value(
    value: f64,
    in_min: f64,
    in_max: f64,
    out_min: f64,
    out_max: f64,
    clamp: bool,
) -> f64 {
    if in_max == in_min {
        return 0.0;
    }

    let scaled = out_min + (value - in_min) * (out_max - out_min) / (in_max - in_min);
    if clamp {
        scaled.clamp(out_min.min(out_max), out_min.max(out_max))
    } else {
        scaled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_value() {
        assert_eq!(scale_value(50.0, 0.0, 100.0, 4.0, 20.0, false), 12.0);
        assert_eq!(scale_value(150.0, 0.0, 100.0, 0.0, 10.0, true), 10.0);
        assert_eq!(scale_value(150.0, 0.0, 100.0, 0.0, 10.0, false), 15.0);
        assert_eq!(scale_value(-5.0, 0.0, 100.0, 100.0, 0.0, true), 100.0);
        assert_eq!(scale_value(7.0, 3.0, 3.0, 0.0, 10.0, true), 0.0);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Lead < Priority::Lag1);
        assert!(Priority::Lag3 < Priority::Out);
        assert_eq!(Priority::from_rank(2), Priority::Lag2);
        assert_eq!(Priority::from_rank(9), Priority::Out);
        assert_eq!(Priority::Out.rank(), 4);
    }

    #[test]
    fn test_device_names_and_keys() {
        let info = DeviceInfo::new(DeviceKind::Contactor, 2);
        assert_eq!(info.name(), "contactor_2");
        assert_eq!(info.key("total_run_time"), "contactor_2.total_run_time");
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(serde_json::to_string(&Priority::Lag1).unwrap(), "\"LAG_1\"");
        assert_eq!(serde_json::to_string(&SystemMode::Auto).unwrap(), "\"AUTO\"");
        let status: DeviceStatus = serde_json::from_str("\"RUNNING\"").unwrap();
        assert_eq!(status, DeviceStatus::Running);
    }
}
