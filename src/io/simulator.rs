// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Simulated I/O modules and a booster plant model for demo/testing

use std::sync::Arc;

use parking_lot::Mutex;

use super::{AnalogModule, AnalogOutputModule, DigitalModule, DigitalOutputModule, IoModule};
use crate::error::IoError;

/// A bank of digital channels backed by shared memory.
///
/// Clones share the same values, so a test can keep one handle while the
/// I/O cache owns another.
#[derive(Clone)]
pub struct DigitalBank {
    name: String,
    base: usize,
    values: Arc<Mutex<Vec<bool>>>,
    fail_init: bool,
}

impl DigitalBank {
    pub fn new(name: &str, base: usize, count: usize) -> Self {
        Self {
            name: name.to_string(),
            base,
            values: Arc::new(Mutex::new(vec![false; count])),
            fail_init: false,
        }
    }

    /// Make `initialize()` fail, as a missing expander board would
    pub fn failing(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn set(&self, pos: usize, value: bool) {
        if let Some(i) = pos.checked_sub(self.base) {
            if let Some(v) = self.values.lock().get_mut(i) {
                *v = value;
            }
        }
    }

    pub fn get(&self, pos: usize) -> bool {
        pos.checked_sub(self.base)
            .and_then(|i| self.values.lock().get(i).copied())
            .unwrap_or(false)
    }
}

impl IoModule for DigitalBank {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self) -> Result<(), IoError> {
        if self.fail_init {
            return Err(IoError::Init {
                module: self.name.clone(),
                reason: "device not responding".to_string(),
            });
        }
        Ok(())
    }

    fn channel_count(&self) -> usize {
        self.values.lock().len()
    }

    fn is_managed_pos(&self, pos: usize) -> bool {
        pos >= self.base && pos < self.base + self.channel_count()
    }
}

impl DigitalModule for DigitalBank {
    fn get_all_values(&self) -> Vec<bool> {
        self.values.lock().clone()
    }
}

impl DigitalOutputModule for DigitalBank {
    fn set_value(&mut self, pos: usize, value: bool) -> Result<(), IoError> {
        if !self.is_managed_pos(pos) {
            return Err(IoError::Unmanaged { family: "DO", pos });
        }
        self.set(pos, value);
        Ok(())
    }
}

/// A bank of analog channels in raw ADC counts
#[derive(Clone)]
pub struct AnalogBank {
    name: String,
    base: usize,
    max_value: i32,
    values: Arc<Mutex<Vec<i32>>>,
    fail_init: bool,
}

impl AnalogBank {
    pub fn new(name: &str, base: usize, count: usize, max_value: i32) -> Self {
        Self {
            name: name.to_string(),
            base,
            max_value,
            values: Arc::new(Mutex::new(vec![0; count])),
            fail_init: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn set(&self, pos: usize, raw: i32) {
        if let Some(i) = pos.checked_sub(self.base) {
            if let Some(v) = self.values.lock().get_mut(i) {
                *v = raw.clamp(0, self.max_value);
            }
        }
    }

    pub fn get(&self, pos: usize) -> i32 {
        pos.checked_sub(self.base)
            .and_then(|i| self.values.lock().get(i).copied())
            .unwrap_or(0)
    }
}

impl IoModule for AnalogBank {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self) -> Result<(), IoError> {
        if self.fail_init {
            return Err(IoError::Init {
                module: self.name.clone(),
                reason: "ADC not found on bus".to_string(),
            });
        }
        Ok(())
    }

    fn channel_count(&self) -> usize {
        self.values.lock().len()
    }

    fn is_managed_pos(&self, pos: usize) -> bool {
        pos >= self.base && pos < self.base + self.channel_count()
    }
}

impl AnalogModule for AnalogBank {
    fn get_all_values(&self) -> Vec<i32> {
        self.values.lock().clone()
    }

    fn get_max_value(&self) -> i32 {
        self.max_value
    }
}

impl AnalogOutputModule for AnalogBank {
    fn set_value(&mut self, pos: usize, value: i32) -> Result<(), IoError> {
        if !self.is_managed_pos(pos) {
            return Err(IoError::Unmanaged { family: "AO", pos });
        }
        self.set(pos, value);
        Ok(())
    }
}

#[cfg(feature = "simulator")]
pub use plant::{PlantConfig, PlantSimulator};

#[cfg(feature = "simulator")]
mod plant {
    use std::time::Duration;

    use rand::prelude::*;
    use rand_distr::Normal;
    use tokio::sync::watch;
    use tracing::{debug, info};

    use super::{AnalogBank, DigitalBank};

    /// Wiring and dynamics of the simulated booster plant
    #[derive(Debug, Clone)]
    pub struct PlantConfig {
        /// `(run command DO, run feedback DI)` per pump
        pub pumps: Vec<(usize, usize)>,
        pub pressure_ai: usize,
        /// Raw counts lost per second from consumer demand
        pub demand_per_sec: f64,
        /// Raw counts gained per second per running pump
        pub boost_per_pump_sec: f64,
        /// Standard deviation of the measurement noise, in raw counts
        pub noise: f64,
        /// Pumps that never answer their run command
        pub dead_pumps: Vec<usize>,
    }

    /// Simulates a pressure header fed by the station's pumps
    pub struct PlantSimulator {
        config: PlantConfig,
        di: DigitalBank,
        dout: DigitalBank,
        ai: AnalogBank,
        rng: StdRng,
        level: f64,
    }

    impl PlantSimulator {
        pub fn new(config: PlantConfig, di: DigitalBank, dout: DigitalBank, ai: AnalogBank) -> Self {
            let level = ai.get(config.pressure_ai) as f64;
            Self {
                config,
                di,
                dout,
                ai,
                rng: StdRng::from_entropy(),
                level,
            }
        }

        /// Advance the plant by `dt`
        pub fn step(&mut self, dt: Duration) {
            let mut running = 0usize;
            for (idx, &(do_run, di_running)) in self.config.pumps.iter().enumerate() {
                let commanded = self.dout.get(do_run);
                let answers = commanded && !self.config.dead_pumps.contains(&idx);
                if self.di.get(di_running) != answers {
                    debug!("Pump {} feedback -> {}", idx + 1, answers);
                }
                self.di.set(di_running, answers);
                if answers {
                    running += 1;
                }
            }

            let secs = dt.as_secs_f64();
            self.level += (running as f64 * self.config.boost_per_pump_sec
                - self.config.demand_per_sec)
                * secs;
            self.level = self.level.max(0.0);

            let noise = Normal::new(0.0, self.config.noise.max(f64::EPSILON))
                .map(|n| n.sample(&mut self.rng))
                .unwrap_or(0.0);
            self.ai
                .set(self.config.pressure_ai, (self.level + noise).round() as i32);
        }

        /// Step the plant every `period` until `shutdown` flips to true
        pub async fn run(mut self, period: Duration, mut shutdown: watch::Receiver<bool>) {
            info!("Plant simulator running with {} pumps", self.config.pumps.len());
            let mut ticker = tokio::time::interval(period);

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.step(period),
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Plant simulator stopped");
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn plant(dead: Vec<usize>) -> (PlantSimulator, DigitalBank, DigitalBank, AnalogBank) {
            let di = DigitalBank::new("di", 0, 4);
            let dout = DigitalBank::new("do", 0, 2);
            let ai = AnalogBank::new("ai", 0, 1, 10_000);
            ai.set(0, 5_000);
            let config = PlantConfig {
                pumps: vec![(0, 0), (1, 1)],
                pressure_ai: 0,
                demand_per_sec: 100.0,
                boost_per_pump_sec: 300.0,
                noise: 0.0,
                dead_pumps: dead,
            };
            let sim = PlantSimulator::new(config, di.clone(), dout.clone(), ai.clone());
            (sim, di, dout, ai)
        }

        #[test]
        fn test_pressure_falls_without_pumps() {
            let (mut sim, _di, _dout, ai) = plant(vec![]);
            sim.step(Duration::from_secs(10));
            assert!(ai.get(0) < 5_000);
        }

        #[test]
        fn test_run_command_is_mirrored_to_feedback() {
            let (mut sim, di, dout, ai) = plant(vec![]);
            dout.set(1, true);
            sim.step(Duration::from_secs(1));
            assert!(di.get(1));
            assert!(!di.get(0));
            assert!(ai.get(0) > 5_000);
        }

        #[test]
        fn test_dead_pump_never_answers() {
            let (mut sim, di, dout, _ai) = plant(vec![0]);
            dout.set(0, true);
            sim.step(Duration::from_secs(1));
            assert!(!di.get(0));
        }
    }
}
