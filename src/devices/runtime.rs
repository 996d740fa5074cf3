// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Run state, fail-to-start timer and run hour accounting of one motor

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use super::{DeviceInfo, DeviceStatus};
use crate::alarm::seconds;
use crate::store::ConfigStore;

const TOTAL_RUN_TIME: &str = "total_run_time";
const LAST_RUN_TIME: &str = "last_run_time";

pub struct RunTracker {
    info: DeviceInfo,
    store: Arc<dyn ConfigStore>,
    status: DeviceStatus,
    emergency_stop: bool,
    /// Seconds; 0 disables fail-to-start supervision
    fail_to_start_delay: f64,
    fail_to_start_since: Option<Instant>,
    session_start: Option<Instant>,
    /// Last known persisted total; flushes add to this, not to a fresh read
    total_run_time: f64,
}

impl RunTracker {
    pub fn new(info: DeviceInfo, store: Arc<dyn ConfigStore>) -> Self {
        let total_run_time = store.get_f64(&info.key(TOTAL_RUN_TIME), 0.0);
        Self {
            info,
            store,
            status: DeviceStatus::Stopped,
            emergency_stop: false,
            fail_to_start_delay: 0.0,
            fail_to_start_since: None,
            session_start: None,
            total_run_time,
        }
    }

    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    /// Apply run feedback. Returns whether the status changed.
    pub fn set_status(&mut self, status: DeviceStatus, now: Instant) -> bool {
        if self.status == status {
            return false;
        }
        self.status = status;

        match status {
            DeviceStatus::Running => {
                self.fail_to_start_since = None;
                self.session_start = Some(now);
            }
            DeviceStatus::Stopped => {
                let session = round2(self.run_time_current(now));
                self.total_run_time = round2(self.total_run_time + session);
                self.store.put(&self.info.key(TOTAL_RUN_TIME), &self.total_run_time);
                self.store.put(&self.info.key(LAST_RUN_TIME), &session);
                self.session_start = None;
            }
        }

        info!("{} {:?}", self.info.name(), status);
        true
    }

    pub fn emergency_stop(&self) -> bool {
        self.emergency_stop
    }

    /// Returns true when the flag changed
    pub fn set_emergency_stop(&mut self, value: bool) -> bool {
        if self.emergency_stop == value {
            return false;
        }
        self.emergency_stop = value;
        true
    }

    pub fn fail_to_start_delay(&self) -> f64 {
        self.fail_to_start_delay
    }

    pub fn set_fail_to_start_delay(&mut self, secs: f64) {
        self.fail_to_start_delay = if secs.is_finite() { secs.max(0.0) } else { 0.0 };
    }

    /// Arm the fail-to-start timer unless it is disabled or already running
    pub fn call_to_run(&mut self, now: Instant) {
        if self.fail_to_start_delay > 0.0 && self.fail_to_start_since.is_none() {
            self.fail_to_start_since = Some(now);
        }
    }

    pub fn stop(&mut self) {
        self.fail_to_start_since = None;
    }

    pub fn alarm_fail_to_start(&self, now: Instant) -> bool {
        if self.fail_to_start_delay <= 0.0 {
            return false;
        }
        self.fail_to_start_since.is_some_and(|since| {
            now.saturating_duration_since(since) > seconds(self.fail_to_start_delay)
        })
    }

    pub fn run_time_current(&self, now: Instant) -> f64 {
        self.session_start
            .map_or(0.0, |start| now.saturating_duration_since(start).as_secs_f64())
    }

    pub fn run_time_last(&self) -> f64 {
        self.store.get_f64(&self.info.key(LAST_RUN_TIME), 0.0)
    }

    pub fn run_time_total(&self, now: Instant) -> f64 {
        self.total_run_time + self.run_time_current(now)
    }

    /// Forget every run hour, including the open session
    pub fn reset_run_time(&mut self, now: Instant) {
        if self.session_start.is_some() {
            self.session_start = Some(now);
        }
        self.total_run_time = 0.0;
        self.store.put(&self.info.key(TOTAL_RUN_TIME), &0.0);
        self.store.put(&self.info.key(LAST_RUN_TIME), &0.0);
        info!("{} run time cleared", self.info.name());
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::DeviceKind;
    use crate::error::StoreError;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn tracker() -> (RunTracker, Arc<MemoryStore>) {
        tracker_with_total(None)
    }

    fn tracker_with_total(total: Option<f64>) -> (RunTracker, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        if let Some(total) = total {
            store.put("contactor_1.total_run_time", &total);
        }
        let info = DeviceInfo::new(DeviceKind::Contactor, 1);
        (RunTracker::new(info, store.clone()), store)
    }

    /// Reads fail once `broken` is set, writes keep working
    #[derive(Default)]
    struct UnreadableStore {
        inner: MemoryStore,
        broken: AtomicBool,
    }

    impl ConfigStore for UnreadableStore {
        fn get(&self, key: &str) -> Option<String> {
            if self.broken.load(Ordering::SeqCst) {
                None
            } else {
                self.inner.get(key)
            }
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_session_is_flushed_on_stop() {
        let (mut run, store) = tracker();
        let t0 = Instant::now();

        assert!(run.set_status(DeviceStatus::Running, t0));
        assert!(!run.set_status(DeviceStatus::Running, t0));
        assert_eq!(run.run_time_current(t0 + Duration::from_secs(30)), 30.0);

        run.set_status(DeviceStatus::Stopped, t0 + Duration::from_secs(30));
        assert_eq!(run.run_time_current(t0 + Duration::from_secs(40)), 0.0);
        assert_eq!(run.run_time_last(), 30.0);
        assert_eq!(store.get_f64("contactor_1.total_run_time", 0.0), 30.0);

        run.set_status(DeviceStatus::Running, t0 + Duration::from_secs(50));
        run.set_status(DeviceStatus::Stopped, t0 + Duration::from_secs(60));
        assert_eq!(run.run_time_total(t0 + Duration::from_secs(60)), 40.0);
        assert_eq!(run.run_time_last(), 10.0);
    }

    #[test]
    fn test_total_includes_open_session() {
        let (mut run, _store) = tracker_with_total(Some(100.0));
        let t0 = Instant::now();
        run.set_status(DeviceStatus::Running, t0);
        assert_eq!(run.run_time_total(t0 + Duration::from_secs(5)), 105.0);
    }

    #[test]
    fn test_fail_to_start_timer() {
        let (mut run, _) = tracker();
        let t0 = Instant::now();

        run.call_to_run(t0);
        assert!(!run.alarm_fail_to_start(t0 + Duration::from_secs(60)));

        run.set_fail_to_start_delay(10.0);
        run.call_to_run(t0);
        run.call_to_run(t0 + Duration::from_secs(5));
        assert!(!run.alarm_fail_to_start(t0 + Duration::from_secs(10)));
        assert!(run.alarm_fail_to_start(t0 + Duration::from_secs(11)));

        run.set_status(DeviceStatus::Running, t0 + Duration::from_secs(12));
        assert!(!run.alarm_fail_to_start(t0 + Duration::from_secs(30)));
    }

    #[test]
    fn test_stop_clears_fail_to_start() {
        let (mut run, _) = tracker();
        let t0 = Instant::now();
        run.set_fail_to_start_delay(1.0);
        run.call_to_run(t0);
        run.stop();
        assert!(!run.alarm_fail_to_start(t0 + Duration::from_secs(5)));
    }

    #[test]
    fn test_reset_run_time() {
        let (mut run, store) = tracker_with_total(Some(500.0));
        let t0 = Instant::now();
        run.reset_run_time(t0);
        assert_eq!(run.run_time_total(t0), 0.0);
        assert_eq!(store.get_f64("contactor_1.total_run_time", -1.0), 0.0);
    }

    #[test]
    fn test_lost_read_does_not_wipe_total() {
        let store = Arc::new(UnreadableStore::default());
        store.put("contactor_1.total_run_time", &100.0);
        let mut run = RunTracker::new(DeviceInfo::new(DeviceKind::Contactor, 1), store.clone());

        store.broken.store(true, Ordering::SeqCst);
        let t0 = Instant::now();
        run.set_status(DeviceStatus::Running, t0);
        run.set_status(DeviceStatus::Stopped, t0 + Duration::from_secs(5));

        assert_eq!(store.inner.get_f64("contactor_1.total_run_time", 0.0), 105.0);
        assert_eq!(run.run_time_total(t0 + Duration::from_secs(6)), 105.0);
    }
}
