// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Motor contactor: one run-command output, one run-feedback input

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Capabilities, Device, DeviceInfo, DeviceKind, DeviceStatus, RunTracker, Runnable};
use crate::alarm::AlarmSource;
use crate::io::{DigitalInputChanged, IoCache};
use crate::store::ConfigStore;

pub struct Contactor {
    info: DeviceInfo,
    io: Arc<IoCache>,
    di_running: usize,
    do_run: usize,
    run: RunTracker,
}

impl Contactor {
    pub fn new(
        id: u32,
        io: Arc<IoCache>,
        store: Arc<dyn ConfigStore>,
        di_running: usize,
        do_run: usize,
    ) -> Self {
        let info = DeviceInfo::new(DeviceKind::Contactor, id);
        Self {
            info,
            io,
            di_running,
            do_run,
            run: RunTracker::new(info, store),
        }
    }

    pub fn di_running(&self) -> usize {
        self.di_running
    }

    pub fn do_run(&self) -> usize {
        self.do_run
    }

    /// Run feedback. Returns true when the event was ours.
    pub fn handle_di(&mut self, event: &DigitalInputChanged, now: Instant) -> bool {
        if event.channel != self.di_running {
            return false;
        }
        let status = if event.new {
            DeviceStatus::Running
        } else {
            DeviceStatus::Stopped
        };
        self.run.set_status(status, now);
        true
    }

    pub fn is_called_to_run(&self) -> bool {
        self.io.digital_output(self.do_run)
    }

    pub fn emergency_stop(&self) -> bool {
        self.run.emergency_stop()
    }

    pub fn fail_to_start_delay(&self) -> f64 {
        self.run.fail_to_start_delay()
    }

    pub fn set_fail_to_start_delay(&mut self, secs: f64) {
        self.run.set_fail_to_start_delay(secs);
    }

    fn write_run(&self, value: bool) {
        if let Err(e) = self.io.set_digital_output_value(self.do_run, value) {
            warn!("{} run command not written: {}", self.info.name(), e);
        }
    }

    pub fn status_report(&self, now: Instant) -> ContactorStatus {
        ContactorStatus {
            device_id: self.info.id,
            device_name: self.info.name(),
            has_alarm: self.has_alarm(now),
            has_critical_alarm: self.has_critical_alarm(now),
            status: self.status(),
            can_run: self.can_run(now),
            can_run_auto: self.can_run_auto(now),
            call_to_run: self.is_called_to_run(),
            alarm_fail_to_start: self.alarm_fail_to_start(now),
            emergency_stop: self.emergency_stop(),
            run_time_current: self.run_time_current(now),
            run_time_last: self.run_time_last(),
            run_time_total: self.run_time_total(now),
        }
    }
}

impl AlarmSource for Contactor {
    fn has_alarm(&self, now: Instant) -> bool {
        self.has_critical_alarm(now) || self.alarm_fail_to_start(now)
    }

    fn has_critical_alarm(&self, _now: Instant) -> bool {
        false
    }
}

impl Device for Contactor {
    fn info(&self) -> DeviceInfo {
        self.info
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            is_runnable: true,
            has_alarm_source: true,
        }
    }
}

impl Runnable for Contactor {
    fn status(&self) -> DeviceStatus {
        self.run.status()
    }

    fn can_run(&self, now: Instant) -> bool {
        !self.has_critical_alarm(now) && !self.run.emergency_stop()
    }

    /// Ignored while blocked, unless already running so the command is kept
    fn call_to_run(&mut self, now: Instant) {
        if !self.can_run(now) && self.status() != DeviceStatus::Running {
            return;
        }
        self.write_run(true);
        self.run.call_to_run(now);
    }

    fn stop(&mut self) {
        self.run.stop();
        self.write_run(false);
    }

    fn set_emergency_stop(&mut self, value: bool) {
        if self.run.set_emergency_stop(value) && value {
            self.stop();
        }
    }

    fn alarm_fail_to_start(&self, now: Instant) -> bool {
        self.run.alarm_fail_to_start(now)
    }

    fn run_time_current(&self, now: Instant) -> f64 {
        self.run.run_time_current(now)
    }

    fn run_time_last(&self) -> f64 {
        self.run.run_time_last()
    }

    fn run_time_total(&self, now: Instant) -> f64 {
        self.run.run_time_total(now)
    }

    fn reset_run_time(&mut self, now: Instant) {
        self.run.reset_run_time(now);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactorStatus {
    pub device_id: u32,
    pub device_name: String,
    pub has_alarm: bool,
    pub has_critical_alarm: bool,
    pub status: DeviceStatus,
    pub can_run: bool,
    pub can_run_auto: bool,
    pub call_to_run: bool,
    pub alarm_fail_to_start: bool,
    pub emergency_stop: bool,
    pub run_time_current: f64,
    pub run_time_last: f64,
    pub run_time_total: f64,
}
