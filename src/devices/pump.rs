// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::{Capabilities, Device, DeviceInfo, DeviceKind};
use crate::alarm::AlarmSource;

/// The hydraulic end of a system. Carries no I/O of its own yet.
#[derive(Debug, Clone)]
pub struct Pump {
    info: DeviceInfo,
}

impl Pump {
    pub fn new(id: u32) -> Self {
        Self {
            info: DeviceInfo::new(DeviceKind::Pump, id),
        }
    }

    pub fn status_report(&self, now: Instant) -> PumpStatus {
        PumpStatus {
            device_id: self.info.id,
            device_name: self.info.name(),
            has_alarm: self.has_alarm(now),
            has_critical_alarm: self.has_critical_alarm(now),
        }
    }
}

impl AlarmSource for Pump {
    fn has_alarm(&self, now: Instant) -> bool {
        self.has_critical_alarm(now)
    }

    fn has_critical_alarm(&self, _now: Instant) -> bool {
        false
    }
}

impl Device for Pump {
    fn info(&self) -> DeviceInfo {
        self.info
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PumpStatus {
    pub device_id: u32,
    pub device_name: String,
    pub has_alarm: bool,
    pub has_critical_alarm: bool,
}
