// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! A pumping system: one contactor, an optional pump, a mode and two ranks

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    Capabilities, Contactor, ContactorStatus, Device, DeviceInfo, DeviceKind, DeviceStatus,
    Priority, Pump, PumpStatus, Runnable, SystemMode,
};
use crate::alarm::AlarmSource;
use crate::io::DigitalInputChanged;

/// Shared handle; the station, alternator and I/O handlers all reach the same system
pub type SystemHandle = Arc<Mutex<System>>;

pub struct System {
    info: DeviceInfo,
    contactor: Contactor,
    pump: Option<Pump>,
    di_hand: usize,
    di_auto: usize,
    mode: SystemMode,
    physical_mode: SystemMode,
    priority_auto: Priority,
    priority_hand: Priority,
}

impl System {
    pub fn new(id: u32, contactor: Contactor, pump: Option<Pump>, di_hand: usize, di_auto: usize) -> Self {
        Self {
            info: DeviceInfo::new(DeviceKind::System, id),
            contactor,
            pump,
            di_hand,
            di_auto,
            mode: SystemMode::Off,
            physical_mode: SystemMode::Off,
            priority_auto: Priority::Out,
            priority_hand: Priority::Out,
        }
    }

    pub fn into_handle(self) -> SystemHandle {
        Arc::new(Mutex::new(self))
    }

    pub fn id(&self) -> u32 {
        self.info.id
    }

    pub fn contactor(&self) -> &Contactor {
        &self.contactor
    }

    pub fn contactor_mut(&mut self) -> &mut Contactor {
        &mut self.contactor
    }

    pub fn pump(&self) -> Option<&Pump> {
        self.pump.as_ref()
    }

    /// The pump, when it reports alarms at all
    fn alarming_pump(&self) -> Option<&Pump> {
        self.pump.as_ref().filter(|p| p.capabilities().has_alarm_source)
    }

    pub fn mode(&self) -> SystemMode {
        self.mode
    }

    /// Set the software mode and act on it: OFF stops, HAND runs, AUTO waits
    /// for the starter.
    pub fn set_mode(&mut self, mode: SystemMode, now: Instant) {
        if self.mode != mode {
            info!("{} mode {:?} -> {:?}", self.info.name(), self.mode, mode);
        }
        self.mode = mode;

        match mode {
            SystemMode::Off => self.stop(),
            SystemMode::Hand => self.call_to_run(now),
            SystemMode::Auto => {}
        }
    }

    /// Mode selected on the panel switch. Reported only.
    pub fn physical_mode(&self) -> SystemMode {
        self.physical_mode
    }

    pub fn handle_di(&mut self, event: &DigitalInputChanged, now: Instant) {
        if self.contactor.handle_di(event, now) {
            return;
        }
        if event.channel != self.di_hand && event.channel != self.di_auto {
            return;
        }

        self.physical_mode = if event.channel == self.di_hand && event.new {
            SystemMode::Hand
        } else if event.channel == self.di_auto && event.new {
            SystemMode::Auto
        } else {
            SystemMode::Off
        };
        debug!("{} selector at {:?}", self.info.name(), self.physical_mode);
    }

    pub fn priority(&self, now: Instant) -> Priority {
        if self.can_run_auto(now) {
            self.priority_auto
        } else if self.can_run(now) {
            self.priority_hand
        } else {
            Priority::Out
        }
    }

    pub fn priority_auto(&self, now: Instant) -> Priority {
        if self.can_run_auto(now) {
            self.priority_auto
        } else {
            Priority::Out
        }
    }

    pub fn set_priority_auto(&mut self, priority: Priority) {
        self.priority_auto = priority;
    }

    pub fn priority_hand(&self, now: Instant) -> Priority {
        if self.can_run(now) {
            self.priority_hand
        } else {
            Priority::Out
        }
    }

    pub fn set_priority_hand(&mut self, priority: Priority) {
        self.priority_hand = priority;
    }

    pub fn is_called_to_run(&self) -> bool {
        self.contactor.is_called_to_run()
    }

    pub fn set_fail_to_start_delay(&mut self, secs: f64) {
        self.contactor.set_fail_to_start_delay(secs);
    }

    pub fn status_report(&self, now: Instant) -> SystemStatus {
        SystemStatus {
            device_id: self.info.id,
            device_name: self.info.name(),
            has_alarm: self.has_alarm(now),
            has_critical_alarm: self.has_critical_alarm(now),
            status: self.status(),
            can_run: self.can_run(now),
            can_run_auto: self.can_run_auto(now),
            call_to_run: self.is_called_to_run(),
            alarm_fail_to_start: self.alarm_fail_to_start(now),
            mode: self.mode,
            physical_mode: self.physical_mode,
            priority: self.priority(now),
            priority_auto: self.priority_auto(now),
            priority_hand: self.priority_hand(now),
            run_time_current: self.run_time_current(now),
            run_time_last: self.run_time_last(),
            run_time_total: self.run_time_total(now),
            contactor: self.contactor.status_report(now),
            pump: self.pump.as_ref().map(|p| p.status_report(now)),
        }
    }
}

impl AlarmSource for System {
    fn has_alarm(&self, now: Instant) -> bool {
        self.contactor.has_alarm(now) || self.alarming_pump().is_some_and(|p| p.has_alarm(now))
    }

    fn has_critical_alarm(&self, now: Instant) -> bool {
        self.contactor.has_critical_alarm(now)
            || self.alarming_pump().is_some_and(|p| p.has_critical_alarm(now))
    }
}

impl Device for System {
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

impl Runnable for System {
    fn status(&self) -> DeviceStatus {
        self.contactor.status()
    }

    fn can_run(&self, now: Instant) -> bool {
        self.mode != SystemMode::Off && !self.has_critical_alarm(now) && self.contactor.can_run(now)
    }

    fn can_run_auto(&self, now: Instant) -> bool {
        self.can_run(now) && self.mode == SystemMode::Auto && self.contactor.can_run_auto(now)
    }

    fn call_to_run(&mut self, now: Instant) {
        let allowed = match self.mode {
            SystemMode::Auto => self.can_run_auto(now),
            SystemMode::Hand => self.can_run(now),
            SystemMode::Off => false,
        };
        if allowed {
            self.contactor.call_to_run(now);
        }
    }

    fn stop(&mut self) {
        self.contactor.stop();
    }

    fn set_emergency_stop(&mut self, value: bool) {
        self.contactor.set_emergency_stop(value);
    }

    fn alarm_fail_to_start(&self, now: Instant) -> bool {
        self.contactor.alarm_fail_to_start(now)
    }

    fn run_time_current(&self, now: Instant) -> f64 {
        self.contactor.run_time_current(now)
    }

    fn run_time_last(&self) -> f64 {
        self.contactor.run_time_last()
    }

    fn run_time_total(&self, now: Instant) -> f64 {
        self.contactor.run_time_total(now)
    }

    fn reset_run_time(&mut self, now: Instant) {
        self.contactor.reset_run_time(now);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub device_id: u32,
    pub device_name: String,
    pub has_alarm: bool,
    pub has_critical_alarm: bool,
    pub status: DeviceStatus,
    pub can_run: bool,
    pub can_run_auto: bool,
    pub call_to_run: bool,
    pub alarm_fail_to_start: bool,
    pub mode: SystemMode,
    pub physical_mode: SystemMode,
    pub priority: Priority,
    pub priority_auto: Priority,
    pub priority_hand: Priority,
    pub run_time_current: f64,
    pub run_time_last: f64,
    pub run_time_total: f64,
    pub contactor: ContactorStatus,
    pub pump: Option<PumpStatus>,
}
