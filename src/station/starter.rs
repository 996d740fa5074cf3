// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Demand starter: brings systems on and off line around the set-point

use std::time::Instant;

use tracing::info;

use crate::alarm::seconds;
use crate::config::AppSettings;
use crate::devices::{DeviceStatus, Priority, Runnable, SystemHandle};

/// What the starter did on one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StarterAction {
    Started(u32),
    Stopped(u32),
    /// Start demanded but no stopped system is eligible
    NoneToStart,
    /// Stop demanded but no eligible system is running
    NoneToStop,
}

pub trait Starter: Send {
    fn execute(
        &mut self,
        value: f64,
        settings: &AppSettings,
        systems: &[SystemHandle],
        now: Instant,
    ) -> Vec<StarterAction>;

    /// Forget any pending debounce
    fn reset(&mut self);
}

/// Debounced deadband starter: below `set_point - offset` starts the lead
/// stopped system, above `set_point + offset` stops the last running one.
#[derive(Debug, Default)]
pub struct DemandStarter {
    start_since: Option<Instant>,
    stop_since: Option<Instant>,
}

impl DemandStarter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_start(&mut self, value: f64, settings: &AppSettings, now: Instant) -> bool {
        debounce(
            &mut self.start_since,
            value < settings.set_point - settings.offset,
            settings.start_pump_delay,
            now,
        )
    }

    pub fn should_stop(&mut self, value: f64, settings: &AppSettings, now: Instant) -> bool {
        debounce(
            &mut self.stop_since,
            value > settings.set_point + settings.offset,
            settings.stop_pump_delay,
            now,
        )
    }
}

fn debounce(since: &mut Option<Instant>, condition: bool, delay: f64, now: Instant) -> bool {
    if !condition {
        *since = None;
        return false;
    }
    let started = *since.get_or_insert(now);
    now.saturating_duration_since(started) >= seconds(delay)
}

/// Eligible systems in `status`, with their auto rank, in collection order
fn candidates(systems: &[SystemHandle], status: DeviceStatus, now: Instant) -> Vec<(usize, u32, Priority)> {
    systems
        .iter()
        .enumerate()
        .filter_map(|(i, handle)| {
            let sys = handle.lock();
            (sys.can_run_auto(now) && sys.status() == status)
                .then(|| (i, sys.id(), sys.priority_auto(now)))
        })
        .collect()
}

/// Lowest rank; the first seen wins ties
fn next_stopped(systems: &[SystemHandle], now: Instant) -> Option<(usize, u32)> {
    let mut best: Option<(usize, u32, Priority)> = None;
    for c in candidates(systems, DeviceStatus::Stopped, now) {
        if best.map_or(true, |b| c.2 < b.2) {
            best = Some(c);
        }
    }
    best.map(|(i, id, _)| (i, id))
}

/// Highest rank; the first seen wins ties
fn last_running(systems: &[SystemHandle], now: Instant) -> Option<(usize, u32)> {
    let mut best: Option<(usize, u32, Priority)> = None;
    for c in candidates(systems, DeviceStatus::Running, now) {
        if best.map_or(true, |b| c.2 > b.2) {
            best = Some(c);
        }
    }
    best.map(|(i, id, _)| (i, id))
}

impl Starter for DemandStarter {
    fn execute(
        &mut self,
        value: f64,
        settings: &AppSettings,
        systems: &[SystemHandle],
        now: Instant,
    ) -> Vec<StarterAction> {
        let mut actions = Vec::new();

        if self.should_start(value, settings, now) {
            match next_stopped(systems, now) {
                Some((i, id)) => {
                    info!("Demand low ({:.1}), calling system_{} to run", value, id);
                    systems[i].lock().call_to_run(now);
                    actions.push(StarterAction::Started(id));
                }
                None => actions.push(StarterAction::NoneToStart),
            }
            self.start_since = None;
        }

        if self.should_stop(value, settings, now) {
            match last_running(systems, now) {
                Some((i, id)) => {
                    info!("Demand high ({:.1}), stopping system_{}", value, id);
                    systems[i].lock().stop();
                    actions.push(StarterAction::Stopped(id));
                }
                None => actions.push(StarterAction::NoneToStop),
            }
            self.stop_since = None;
        }

        actions
    }

    fn reset(&mut self) {
        self.start_since = None;
        self.stop_since = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EventDispatcher;
    use crate::devices::{Contactor, System, SystemMode};
    use crate::io::{DigitalBank, DigitalInputChanged, IoCache, IoModules};
    use crate::store::MemoryStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn settings() -> AppSettings {
        AppSettings {
            set_point: 50.0,
            offset: 20.0,
            start_pump_delay: 5.0,
            stop_pump_delay: 5.0,
            ..AppSettings::default()
        }
    }

    fn systems(ranks: &[Priority]) -> (Vec<SystemHandle>, DigitalBank) {
        let dout = DigitalBank::new("do", 0, ranks.len());
        let modules = IoModules {
            digital_outputs: vec![Box::new(dout.clone())],
            ..IoModules::default()
        };
        let io = Arc::new(IoCache::new(Arc::new(EventDispatcher::new()), modules));
        let store = Arc::new(MemoryStore::new());
        let now = Instant::now();

        let handles = ranks
            .iter()
            .enumerate()
            .map(|(i, &rank)| {
                let id = i as u32 + 1;
                let contactor = Contactor::new(id, io.clone(), store.clone(), i, i);
                let mut sys = System::new(id, contactor, None, 10 + i, 20 + i);
                sys.set_mode(SystemMode::Auto, now);
                sys.set_priority_auto(rank);
                sys.into_handle()
            })
            .collect();
        (handles, dout)
    }

    #[test]
    fn test_short_dip_never_starts() {
        let mut starter = DemandStarter::new();
        let s = settings();
        let t0 = Instant::now();
        for sec in 0..=3 {
            assert!(!starter.should_start(25.0, &s, t0 + Duration::from_secs(sec)));
        }
        assert!(!starter.should_start(45.0, &s, t0 + Duration::from_secs(4)));
        for sec in 5..=9 {
            assert!(!starter.should_start(25.0, &s, t0 + Duration::from_secs(sec)));
        }
    }

    #[test]
    fn test_sustained_dip_starts() {
        let mut starter = DemandStarter::new();
        let s = settings();
        let t0 = Instant::now();
        assert!(!starter.should_start(25.0, &s, t0));
        assert!(!starter.should_start(25.0, &s, t0 + Duration::from_secs(3)));
        assert!(starter.should_start(25.0, &s, t0 + Duration::from_secs(6)));
    }

    #[test]
    fn test_reset_restarts_debounce() {
        let mut starter = DemandStarter::new();
        let s = settings();
        let t0 = Instant::now();
        assert!(!starter.should_start(25.0, &s, t0));
        assert!(!starter.should_stop(90.0, &s, t0));

        starter.reset();
        assert!(!starter.should_start(25.0, &s, t0 + Duration::from_secs(40)));
        assert!(!starter.should_stop(90.0, &s, t0 + Duration::from_secs(40)));
        assert!(starter.should_start(25.0, &s, t0 + Duration::from_secs(45)));
    }

    #[test]
    fn test_deadband_edges_do_nothing() {
        let mut starter = DemandStarter::new();
        let s = settings();
        let t0 = Instant::now();
        starter.should_start(30.0, &s, t0);
        starter.should_stop(70.0, &s, t0);
        assert!(!starter.should_start(30.0, &s, t0 + Duration::from_secs(60)));
        assert!(!starter.should_stop(70.0, &s, t0 + Duration::from_secs(60)));
    }

    #[test]
    fn test_start_calls_lowest_rank() {
        let (systems, dout) = systems(&[Priority::Lag2, Priority::Lead, Priority::Lag1]);
        let mut starter = DemandStarter::new();
        let t0 = Instant::now();

        starter.execute(25.0, &settings(), &systems, t0);
        let actions = starter.execute(25.0, &settings(), &systems, t0 + Duration::from_secs(5));
        assert_eq!(actions, vec![StarterAction::Started(2)]);
        assert!(dout.get(1));
        assert!(!dout.get(0));

        // the debounce restarts after acting
        let actions = starter.execute(25.0, &settings(), &systems, t0 + Duration::from_secs(6));
        assert!(actions.is_empty());
    }

    #[test]
    fn test_stop_picks_highest_running_rank() {
        let (systems, dout) = systems(&[Priority::Lead, Priority::Lag1, Priority::Lag2]);
        let t0 = Instant::now();
        for (i, handle) in systems.iter().enumerate() {
            let mut sys = handle.lock();
            sys.call_to_run(t0);
            sys.handle_di(&DigitalInputChanged::new(i, Some(false), true), t0);
        }

        let mut starter = DemandStarter::new();
        starter.execute(80.0, &settings(), &systems, t0);
        let actions = starter.execute(80.0, &settings(), &systems, t0 + Duration::from_secs(5));
        assert_eq!(actions, vec![StarterAction::Stopped(3)]);
        assert!(!dout.get(2));
        assert!(dout.get(0));
    }

    #[test]
    fn test_no_candidate_is_reported() {
        let (systems, _) = systems(&[Priority::Lead]);
        systems[0].lock().set_mode(SystemMode::Off, Instant::now());
        let mut starter = DemandStarter::new();
        let t0 = Instant::now();
        starter.execute(10.0, &settings(), &systems, t0);
        let actions = starter.execute(10.0, &settings(), &systems, t0 + Duration::from_secs(5));
        assert_eq!(actions, vec![StarterAction::NoneToStart]);
    }
}
