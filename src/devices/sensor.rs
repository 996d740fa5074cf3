// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Process sensor on one analog input

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{scale_value, Capabilities, Device, DeviceInfo, DeviceKind};
use crate::alarm::{AlarmSource, Band, ThresholdConfig, ThresholdEngine};
use crate::io::AnalogInputChanged;
use crate::store::ConfigStore;

/// Scaling and alarm configuration of a sensor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub ai_min: i32,
    pub ai_max: i32,
    pub value_scaled_min: f64,
    pub value_scaled_max: f64,
    pub alarms: ThresholdConfig,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            ai_min: 0,
            ai_max: 24_729,
            value_scaled_min: 0.0,
            value_scaled_max: 100.0,
            alarms: ThresholdConfig::default(),
        }
    }
}

fn band_key(prefix: &str, band: Band) -> String {
    format!("{}_{}", prefix, band)
}

impl SensorConfig {
    /// Flatten into `(field, value)` pairs for a key/value store
    pub fn to_entries(&self) -> Vec<(String, String)> {
        let a = &self.alarms;
        let mut entries = vec![
            ("ai_min".to_string(), self.ai_min.to_string()),
            ("ai_max".to_string(), self.ai_max.to_string()),
            ("value_scaled_min".to_string(), self.value_scaled_min.to_string()),
            ("value_scaled_max".to_string(), self.value_scaled_max.to_string()),
            ("alarm_start_delay".to_string(), a.start_delay.to_string()),
            ("alarm_stop_delay".to_string(), a.stop_delay.to_string()),
            ("alarm_critical_high_high".to_string(), a.high_high_critical.to_string()),
            ("alarm_critical_low_low".to_string(), a.low_low_critical.to_string()),
        ];
        for band in Band::ALL {
            let cfg = a.band(band);
            entries.push((band_key("alarm_start", band), cfg.start.to_string()));
            entries.push((band_key("alarm_stop", band), cfg.stop.to_string()));
            entries.push((band_key("alarm_reset", band), cfg.need_reset.to_string()));
        }
        entries
    }

    /// Read a sensor's config, falling back field by field to `defaults`.
    ///
    /// The merged result is written back so missing keys get seeded.
    pub fn from_store(store: &dyn ConfigStore, name: &str, defaults: &SensorConfig) -> Self {
        let key = |field: &str| format!("{}.{}", name, field);
        let d = &defaults.alarms;

        let mut alarms = ThresholdConfig {
            start_delay: store.get_f64(&key("alarm_start_delay"), d.start_delay),
            stop_delay: store.get_f64(&key("alarm_stop_delay"), d.stop_delay),
            high_high_critical: store.get_bool(&key("alarm_critical_high_high"), d.high_high_critical),
            low_low_critical: store.get_bool(&key("alarm_critical_low_low"), d.low_low_critical),
            ..*d
        };
        for band in Band::ALL {
            let fallback = *d.band(band);
            let cfg = alarms.band_mut(band);
            cfg.start = store.get_f64(&key(&band_key("alarm_start", band)), fallback.start);
            cfg.stop = store.get_f64(&key(&band_key("alarm_stop", band)), fallback.stop);
            cfg.need_reset = store.get_bool(&key(&band_key("alarm_reset", band)), fallback.need_reset);
        }

        let config = Self {
            ai_min: store.get_i64(&key("ai_min"), defaults.ai_min as i64) as i32,
            ai_max: store.get_i64(&key("ai_max"), defaults.ai_max as i64) as i32,
            value_scaled_min: store.get_f64(&key("value_scaled_min"), defaults.value_scaled_min),
            value_scaled_max: store.get_f64(&key("value_scaled_max"), defaults.value_scaled_max),
            alarms,
        };
        config.persist(store, name);
        config
    }

    pub fn persist(&self, store: &dyn ConfigStore, name: &str) {
        for (field, value) in self.to_entries() {
            store.put(&format!("{}.{}", name, field), &value);
        }
    }
}

pub type SensorHandle = Arc<Mutex<Sensor>>;

pub struct Sensor {
    info: DeviceInfo,
    store: Arc<dyn ConfigStore>,
    ai_channel: usize,
    config: SensorConfig,
    raw: i32,
    engine: ThresholdEngine,
}

impl Sensor {
    /// Load the sensor's persisted config, seeding it from `defaults`
    pub fn new(id: u32, ai_channel: usize, store: Arc<dyn ConfigStore>, defaults: &SensorConfig) -> Self {
        let info = DeviceInfo::new(DeviceKind::Sensor, id);
        let config = SensorConfig::from_store(store.as_ref(), &info.name(), defaults);
        Self {
            info,
            store,
            ai_channel,
            config,
            raw: 0,
            engine: ThresholdEngine::new(config.alarms),
        }
    }

    pub fn into_handle(self) -> SensorHandle {
        Arc::new(Mutex::new(self))
    }

    pub fn ai_channel(&self) -> usize {
        self.ai_channel
    }

    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    /// Apply and persist a new configuration. Armed alarm bands keep their timers.
    pub fn set_config(&mut self, config: SensorConfig, now: Instant) {
        self.config = config;
        self.engine.set_config(config.alarms);
        config.persist(self.store.as_ref(), &self.info.name());
        self.engine.update(self.value_scaled(), now);
        debug!("{} reconfigured", self.info.name());
    }

    pub fn handle_ai(&mut self, event: &AnalogInputChanged, now: Instant) -> bool {
        if event.channel != self.ai_channel {
            return false;
        }
        self.set_raw(event.new, now);
        true
    }

    pub fn set_raw(&mut self, raw: i32, now: Instant) {
        self.raw = raw;
        self.engine.update(self.value_scaled(), now);
    }

    pub fn raw(&self) -> i32 {
        self.raw
    }

    pub fn value_scaled(&self) -> f64 {
        scale_value(
            self.raw as f64,
            self.config.ai_min as f64,
            self.config.ai_max as f64,
            self.config.value_scaled_min,
            self.config.value_scaled_max,
            true,
        )
    }

    pub fn value_ma(&self) -> f64 {
        scale_value(
            self.raw as f64,
            self.config.ai_min as f64,
            self.config.ai_max as f64,
            4.0,
            20.0,
            true,
        )
    }

    /// Re-run the alarm bands on the current value
    pub fn refresh(&mut self, now: Instant) {
        self.engine.update(self.value_scaled(), now);
    }

    pub fn reset(&mut self, now: Instant) {
        self.engine.reset(now);
    }

    pub fn is_band_active(&self, band: Band, now: Instant) -> bool {
        self.engine.is_active(band, now)
    }

    pub fn status_report(&self, now: Instant) -> SensorStatus {
        SensorStatus {
            device_id: self.info.id,
            device_name: self.info.name(),
            has_alarm: self.has_alarm(now),
            has_critical_alarm: self.has_critical_alarm(now),
            value_ai: self.raw,
            value_scaled: round1(self.value_scaled()),
            value_ma: round1(self.value_ma()),
            alarm_high: self.is_band_active(Band::High, now),
            alarm_high_high: self.is_band_active(Band::HighHigh, now),
            alarm_low: self.is_band_active(Band::Low, now),
            alarm_low_low: self.is_band_active(Band::LowLow, now),
            config: self.config,
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl AlarmSource for Sensor {
    fn has_alarm(&self, now: Instant) -> bool {
        self.engine.has_alarm(now)
    }

    fn has_critical_alarm(&self, now: Instant) -> bool {
        self.engine.has_critical_alarm(now)
    }
}

impl Device for Sensor {
    fn info(&self) -> DeviceInfo {
        self.info
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            is_runnable: false,
            has_alarm_source: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorStatus {
    pub device_id: u32,
    pub device_name: String,
    pub has_alarm: bool,
    pub has_critical_alarm: bool,
    pub value_ai: i32,
    pub value_scaled: f64,
    pub value_ma: f64,
    pub alarm_high: bool,
    pub alarm_high_high: bool,
    pub alarm_low: bool,
    pub alarm_low_low: bool,
    pub config: SensorConfig,
}
