// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Station module - the periodic control loop tying I/O, devices,
//! alternation and starting together

mod alternator;
mod assembly;
mod commands;
mod starter;
mod status;

pub use alternator::*;
pub use assembly::*;
pub use commands::*;
pub use starter::*;
pub use status::*;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::AppSettings;
use crate::core::EventDispatcher;
use crate::devices::{Runnable, SensorHandle, SystemHandle};
use crate::error::{StationError, StationResult};
use crate::io::{DigitalInputChanged, IoCache};
use crate::store::ConfigStore;

/// Control loop period
pub const TICK_PERIOD: Duration = Duration::from_millis(500);

/// Everything a tick touches. Shared between the station handle, its
/// worker task and its emergency-stop subscription.
struct StationCore {
    dispatcher: Arc<EventDispatcher>,
    io: Arc<IoCache>,
    store: Arc<dyn ConfigStore>,
    systems: Vec<SystemHandle>,
    primary: SensorHandle,
    secondary: Option<SensorHandle>,
    settings: RwLock<AppSettings>,
    /// Systems the I/O map provides wiring for
    wired_systems: usize,
    emergency_stop: AtomicBool,
    alternator: Mutex<Box<dyn Alternator>>,
    starter: Mutex<Box<dyn Starter>>,
    ticks: AtomicU64,
}

struct Worker {
    abort: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// The pump station. One per process.
pub struct Station {
    core: Arc<StationCore>,
    worker: Mutex<Option<Worker>>,
    period: Duration,
}

/// Parts handed to [`Station::new`] by the assembly
pub struct StationParts {
    pub dispatcher: Arc<EventDispatcher>,
    pub io: Arc<IoCache>,
    pub store: Arc<dyn ConfigStore>,
    pub systems: Vec<SystemHandle>,
    pub primary: SensorHandle,
    pub secondary: Option<SensorHandle>,
    pub settings: AppSettings,
    pub wired_systems: usize,
    pub di_emergency_stop: usize,
    pub alternator: Box<dyn Alternator>,
    pub starter: Box<dyn Starter>,
}

impl Station {
    pub fn new(parts: StationParts) -> Self {
        let core = Arc::new(StationCore {
            dispatcher: parts.dispatcher,
            io: parts.io,
            store: parts.store,
            systems: parts.systems,
            primary: parts.primary,
            secondary: parts.secondary,
            settings: RwLock::new(parts.settings),
            wired_systems: parts.wired_systems,
            emergency_stop: AtomicBool::new(false),
            alternator: Mutex::new(parts.alternator),
            starter: Mutex::new(parts.starter),
            ticks: AtomicU64::new(0),
        });

        let weak: Weak<StationCore> = Arc::downgrade(&core);
        let channel = parts.di_emergency_stop;
        core.dispatcher.subscribe(move |event: &DigitalInputChanged| {
            if event.channel == channel {
                if let Some(core) = weak.upgrade() {
                    core.set_emergency_stop(event.new);
                }
            }
            Ok(())
        });

        Self {
            core,
            worker: Mutex::new(None),
            period: TICK_PERIOD,
        }
    }

    /// Override the loop period (tests and simulation speed-up)
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.core.dispatcher
    }

    pub fn io(&self) -> &Arc<IoCache> {
        &self.core.io
    }

    pub fn systems(&self) -> &[SystemHandle] {
        &self.core.systems
    }

    pub fn system(&self, device_id: u32) -> Option<&SystemHandle> {
        self.core.system(device_id)
    }

    pub fn primary_sensor(&self) -> &SensorHandle {
        &self.core.primary
    }

    pub fn secondary_sensor(&self) -> Option<&SensorHandle> {
        self.core.secondary.as_ref()
    }

    pub fn settings(&self) -> AppSettings {
        *self.core.settings.read()
    }

    pub fn emergency_stop(&self) -> bool {
        self.core.emergency_stop.load(Ordering::SeqCst)
    }

    /// Number of ticks run so far
    pub fn tick_count(&self) -> u64 {
        self.core.ticks.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Launch the control loop on the ambient tokio runtime. No-op when
    /// already running.
    pub fn start(&self) -> StationResult<()> {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| StationError::NoRuntime)?;
        let (abort, abort_rx) = watch::channel(false);
        let core = Arc::clone(&self.core);
        let handle = runtime.spawn(run_loop(core, self.period, abort_rx));

        *worker = Some(Worker { abort, handle });
        info!("Station started, {} systems, period {:?}", self.core.systems.len(), self.period);
        Ok(())
    }

    /// Signal the loop to exit after its current wait. No-op when stopped.
    pub fn stop(&self) {
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.abort.send(true);
            info!("Station stopping");
        }
    }

    /// Stop and wait for the loop task to finish
    pub async fn shutdown(&self) {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.abort.send(true);
            if let Err(e) = worker.handle.await {
                error!("Station loop ended abnormally: {}", e);
            }
            info!("Station stopped");
        }
    }

    /// Run one control cycle at `now`
    pub fn tick(&self, now: Instant) {
        self.core.tick(now);
    }

    /// Current status snapshot
    pub fn status(&self, now: Instant) -> StationStatus {
        self.core.status(now)
    }

    /// Execute one operator command
    pub fn apply(&self, command: StationCommand) -> StationResult<()> {
        self.core.apply(command, Instant::now())
    }

    pub fn apply_at(&self, command: StationCommand, now: Instant) -> StationResult<()> {
        self.core.apply(command, now)
    }
}

impl Drop for Station {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(core: Arc<StationCore>, period: Duration, mut abort: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if *abort.borrow() {
                    break;
                }
                core.tick(Instant::now());
            }
            changed = abort.changed() => {
                if changed.is_err() || *abort.borrow() {
                    break;
                }
            }
        }
    }

    debug!("Station loop exited after {} ticks", core.ticks.load(Ordering::Relaxed));
}

/// Run one tick step, logging instead of unwinding out of the loop
fn guarded<T>(step: &str, f: impl FnOnce() -> T) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("Tick step '{}' panicked: {}", step, reason);
            None
        }
    }
}

impl StationCore {
    fn system(&self, device_id: u32) -> Option<&SystemHandle> {
        self.systems.iter().find(|s| s.lock().id() == device_id)
    }

    fn sensor(&self, device_id: u32) -> Option<&SensorHandle> {
        match device_id {
            PRIMARY_SENSOR_ID => Some(&self.primary),
            SECONDARY_SENSOR_ID => self.secondary.as_ref(),
            _ => None,
        }
    }

    fn set_emergency_stop(&self, value: bool) {
        if self.emergency_stop.swap(value, Ordering::SeqCst) == value {
            return;
        }
        if value {
            warn!("Emergency stop asserted, stopping all systems");
            self.starter.lock().reset();
        } else {
            warn!("Emergency stop cleared");
        }
        for system in &self.systems {
            system.lock().set_emergency_stop(value);
        }
    }

    fn warn(&self, message: String) {
        warn!("{}", message);
        self.dispatcher.emit_async(StationWarning::new(message));
    }

    fn tick(&self, now: Instant) {
        guarded("scan", || self.io.scan());

        guarded("sensors", || {
            self.primary.lock().refresh(now);
            if let Some(secondary) = &self.secondary {
                secondary.lock().refresh(now);
            }
        });

        if !self.emergency_stop.load(Ordering::SeqCst) {
            guarded("alternate", || self.alternator.lock().alternate(&self.systems, now));

            let value = self.primary.lock().value_scaled();
            let settings = *self.settings.read();
            let actions = guarded("start", || {
                self.starter.lock().execute(value, &settings, &self.systems, now)
            })
            .unwrap_or_default();

            for action in actions {
                match action {
                    StarterAction::NoneToStart => {
                        self.warn(format!("Start demanded at {:.1} but no system is available", value))
                    }
                    StarterAction::NoneToStop => {
                        self.warn(format!("Stop demanded at {:.1} but no system is running", value))
                    }
                    StarterAction::Started(_) | StarterAction::Stopped(_) => {}
                }
            }
        }

        if let Some(status) = guarded("status", || self.status(now)) {
            self.dispatcher.emit_async(StationUpdate(Arc::new(status)));
        }
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    fn status(&self, now: Instant) -> StationStatus {
        StationStatus {
            timestamp: Utc::now(),
            systems: self.systems.iter().map(|s| s.lock().status_report(now)).collect(),
            primary_sensor: self.primary.lock().status_report(now),
            secondary_sensor: self.secondary.as_ref().map(|s| s.lock().status_report(now)),
            io: self.io.snapshot(),
            settings: *self.settings.read(),
            emergency_stop: self.emergency_stop.load(Ordering::SeqCst),
        }
    }

    fn apply(&self, command: StationCommand, now: Instant) -> StationResult<()> {
        if command.acts_on_system() && self.emergency_stop.load(Ordering::SeqCst) {
            self.warn(format!("Rejected {:?} during emergency stop", command));
            return Err(StationError::EmergencyStop);
        }
        debug!("Applying {:?}", command);

        match command {
            StationCommand::SetSystemMode { device_id, mode } => {
                let system = self.system(device_id).ok_or(StationError::UnknownSystem(device_id))?;
                system.lock().set_mode(mode, now);
            }
            StationCommand::SetSystemHandPriority { device_id, priority } => {
                let system = self.system(device_id).ok_or(StationError::UnknownSystem(device_id))?;
                system.lock().set_priority_hand(priority);
            }
            StationCommand::SetSensorConfig { device_id, config } => {
                let sensor = self.sensor(device_id).ok_or(StationError::UnknownSensor(device_id))?;
                sensor.lock().set_config(config, now);
            }
            StationCommand::SetSettings { settings } => {
                settings.validate()?;
                if settings.system_count > self.wired_systems {
                    return Err(StationError::InvalidSettings(format!(
                        "system_count {} exceeds the {} wired systems",
                        settings.system_count, self.wired_systems
                    )));
                }
                settings.persist(self.store.as_ref());
                for system in &self.systems {
                    system.lock().set_fail_to_start_delay(settings.fail_to_start_delay);
                }
                let previous = std::mem::replace(&mut *self.settings.write(), settings);
                if settings.system_count != previous.system_count {
                    self.warn(format!(
                        "System count {} applies after restart, {} systems running now",
                        settings.system_count,
                        self.systems.len()
                    ));
                }
                info!("Settings updated: {:?}", settings);
            }
            StationCommand::ResetAlarms => {
                self.primary.lock().reset(now);
                if let Some(secondary) = &self.secondary {
                    secondary.lock().reset(now);
                }
            }
            StationCommand::ResetRunTime { device_id } => {
                let system = self.system(device_id).ok_or(StationError::UnknownSystem(device_id))?;
                system.lock().reset_run_time(now);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::devices::{DeviceStatus, SystemMode};
    use crate::io::{AnalogBank, DigitalBank, Delivery, IoModules};
    use crate::store::MemoryStore;
    use std::sync::mpsc;

    struct Rig {
        station: Station,
        di: DigitalBank,
        dout: DigitalBank,
        ai: AnalogBank,
    }

    fn rig() -> Rig {
        let di = DigitalBank::new("di", 0, 10);
        let dout = DigitalBank::new("do", 0, 3);
        let ai = AnalogBank::new("ai", 0, 1, 1000);
        let modules = IoModules {
            digital_inputs: vec![Box::new(di.clone())],
            digital_outputs: vec![Box::new(dout.clone())],
            analog_inputs: vec![Box::new(ai.clone())],
            analog_outputs: vec![],
        };

        let mut config = Config::default();
        config.sensor.ai_max = 1000;
        let station = assemble_with(&config, Arc::new(MemoryStore::new()), modules, Delivery::Inline)
            .unwrap();
        Rig { station, di, dout, ai }
    }

    #[test]
    fn test_tick_publishes_status() {
        let rig = rig();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        rig.station.dispatcher().subscribe(move |update: &StationUpdate| {
            let _ = tx.lock().send(update.0.systems.len());
            Ok(())
        });

        rig.station.tick(Instant::now());
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 3);
        assert_eq!(rig.station.tick_count(), 1);
    }

    #[test]
    fn test_emergency_stop_input_stops_everything() {
        let rig = rig();
        let t0 = Instant::now();
        for id in 1..=3 {
            rig.station
                .apply_at(StationCommand::SetSystemMode { device_id: id, mode: SystemMode::Hand }, t0)
                .unwrap();
        }
        assert!((0..3).all(|i| rig.dout.get(i)));

        rig.di.set(9, true);
        rig.station.tick(t0);
        assert!(rig.station.emergency_stop());
        assert!((0..3).all(|i| !rig.dout.get(i)));

        let rejected = rig.station.apply_at(
            StationCommand::SetSystemMode { device_id: 1, mode: SystemMode::Hand },
            t0,
        );
        assert!(matches!(rejected, Err(StationError::EmergencyStop)));
        assert!(rig.station.apply_at(StationCommand::ResetAlarms, t0).is_ok());

        rig.di.set(9, false);
        rig.station.tick(t0);
        assert!(!rig.station.emergency_stop());
        assert!(rig
            .station
            .apply_at(StationCommand::SetSystemMode { device_id: 1, mode: SystemMode::Hand }, t0)
            .is_ok());
        assert!(rig.dout.get(0));
    }

    #[test]
    fn test_feedback_reaches_systems_through_scan() {
        let rig = rig();
        let t0 = Instant::now();
        rig.di.set(1, true);
        rig.station.tick(t0);
        assert_eq!(rig.station.systems()[1].lock().status(), DeviceStatus::Running);
    }

    #[test]
    fn test_unknown_devices_are_reported() {
        let rig = rig();
        assert!(matches!(
            rig.station.apply(StationCommand::ResetRunTime { device_id: 7 }),
            Err(StationError::UnknownSystem(7))
        ));
        let config = *rig.station.primary_sensor().lock().config();
        assert!(matches!(
            rig.station.apply(StationCommand::SetSensorConfig { device_id: 2, config }),
            Err(StationError::UnknownSensor(2))
        ));
    }

    #[test]
    fn test_set_settings_pushes_fail_to_start_delay() {
        let rig = rig();
        let settings = AppSettings {
            set_point: 60.0,
            fail_to_start_delay: 2.5,
            ..rig.station.settings()
        };
        rig.station.apply(StationCommand::SetSettings { settings }).unwrap();
        assert_eq!(rig.station.settings().set_point, 60.0);
        for system in rig.station.systems() {
            assert_eq!(system.lock().contactor().fail_to_start_delay(), 2.5);
        }

        let bad = AppSettings { offset: -1.0, ..settings };
        assert!(rig.station.apply(StationCommand::SetSettings { settings: bad }).is_err());
        assert_eq!(rig.station.settings().offset, settings.offset);
    }

    #[test]
    fn test_sensor_follows_analog_input() {
        let rig = rig();
        rig.ai.set(0, 250);
        rig.station.tick(Instant::now());
        assert_eq!(rig.station.primary_sensor().lock().value_scaled(), 25.0);
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let rig = rig();
        let station = rig.station.with_period(Duration::from_millis(10));

        station.start().unwrap();
        station.start().unwrap();
        assert!(station.is_running());

        for _ in 0..100 {
            if station.tick_count() >= 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(station.tick_count() >= 3);

        station.shutdown().await;
        station.stop();
        assert!(!station.is_running());
    }

    #[test]
    fn test_start_without_runtime_fails() {
        let rig = rig();
        assert!(matches!(rig.station.start(), Err(StationError::NoRuntime)));
    }
}
