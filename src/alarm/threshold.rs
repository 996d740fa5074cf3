// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Four-band hysteresis alarm engine
//!
//! Every band keeps two timestamps. The start timestamp is set when the value
//! enters the band and the band raises its alarm once it is older than the
//! start delay. The stop timestamp is set when the value leaves past the stop
//! threshold and the band disarms once it is older than the stop delay, unless
//! the band needs a manual reset.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::AlarmSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    High,
    HighHigh,
    Low,
    LowLow,
}

impl Band {
    pub const ALL: [Band; 4] = [Band::High, Band::HighHigh, Band::Low, Band::LowLow];

    /// High bands alarm on rising values, low bands on falling values
    pub fn is_high(self) -> bool {
        matches!(self, Band::High | Band::HighHigh)
    }

    fn index(self) -> usize {
        match self {
            Band::High => 0,
            Band::HighHigh => 1,
            Band::Low => 2,
            Band::LowLow => 3,
        }
    }

    /// Has the value crossed into the alarm region?
    fn entered(self, start: f64, value: f64) -> bool {
        start > 0.0 && if self.is_high() { value >= start } else { value < start }
    }

    /// Has the value crossed back past the stop threshold?
    fn left(self, stop: f64, value: f64) -> bool {
        stop > 0.0 && if self.is_high() { value <= stop } else { value > stop }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Band::High => "high",
            Band::HighHigh => "high_high",
            Band::Low => "low",
            Band::LowLow => "low_low",
        };
        f.write_str(name)
    }
}

/// Start/stop pair of one band. A threshold `<= 0` disables that edge.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BandConfig {
    pub start: f64,
    pub stop: f64,
    /// Stay armed after clearing until `reset()` is called
    pub need_reset: bool,
}

impl BandConfig {
    pub fn new(start: f64, stop: f64) -> Self {
        Self {
            start,
            stop,
            need_reset: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Seconds a band must stay entered before it alarms
    pub start_delay: f64,
    /// Seconds a band must stay cleared before it disarms
    pub stop_delay: f64,
    pub high: BandConfig,
    pub high_high: BandConfig,
    pub low: BandConfig,
    pub low_low: BandConfig,
    pub high_high_critical: bool,
    pub low_low_critical: bool,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            start_delay: 5.0,
            stop_delay: 5.0,
            high: BandConfig::default(),
            high_high: BandConfig::default(),
            low: BandConfig::default(),
            low_low: BandConfig::default(),
            high_high_critical: true,
            low_low_critical: true,
        }
    }
}

impl ThresholdConfig {
    pub fn band(&self, band: Band) -> &BandConfig {
        match band {
            Band::High => &self.high,
            Band::HighHigh => &self.high_high,
            Band::Low => &self.low,
            Band::LowLow => &self.low_low,
        }
    }

    pub fn band_mut(&mut self, band: Band) -> &mut BandConfig {
        match band {
            Band::High => &mut self.high,
            Band::HighHigh => &mut self.high_high,
            Band::Low => &mut self.low,
            Band::LowLow => &mut self.low_low,
        }
    }

    pub fn start_delay(&self) -> Duration {
        seconds(self.start_delay)
    }

    pub fn stop_delay(&self) -> Duration {
        seconds(self.stop_delay)
    }
}

/// Non-negative seconds to a `Duration`; NaN reads as zero
pub(crate) fn seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}

#[derive(Debug, Clone, Copy, Default)]
struct BandTimers {
    started: Option<Instant>,
    stopped: Option<Instant>,
}

impl BandTimers {
    fn disarm(&mut self) {
        self.started = None;
        self.stopped = None;
    }
}

/// Evaluates the four alarm bands of one sensor
#[derive(Debug, Clone)]
pub struct ThresholdEngine {
    config: ThresholdConfig,
    timers: [BandTimers; 4],
    value: Option<f64>,
}

impl ThresholdEngine {
    pub fn new(config: ThresholdConfig) -> Self {
        Self {
            config,
            timers: [BandTimers::default(); 4],
            value: None,
        }
    }

    pub fn config(&self) -> &ThresholdConfig {
        &self.config
    }

    /// Replace the thresholds. Armed bands keep their timers.
    pub fn set_config(&mut self, config: ThresholdConfig) {
        self.config = config;
    }

    /// Last value fed to the engine
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// Feed a new scaled value and advance every band
    pub fn update(&mut self, value: f64, now: Instant) {
        self.value = Some(value);

        for band in Band::ALL {
            let cfg = *self.config.band(band);
            let stop_delay = self.config.stop_delay();
            let timers = &mut self.timers[band.index()];

            if band.entered(cfg.start, value) {
                if timers.started.is_none() {
                    debug!("Band {} armed at {}", band, value);
                    timers.started = Some(now);
                }
                timers.stopped = None;
            } else if timers.started.is_some()
                && timers.stopped.is_none()
                && band.left(cfg.stop, value)
            {
                timers.stopped = Some(now);
            }

            if let Some(stopped) = timers.stopped {
                if !cfg.need_reset && now.saturating_duration_since(stopped) > stop_delay {
                    debug!("Band {} cleared", band);
                    timers.disarm();
                }
            }
        }
    }

    /// Re-evaluate with the last value so delays elapse while the input is steady
    pub fn refresh(&mut self, now: Instant) {
        if let Some(value) = self.value {
            self.update(value, now);
        }
    }

    pub fn is_active(&self, band: Band, now: Instant) -> bool {
        self.timers[band.index()]
            .started
            .is_some_and(|t| now.saturating_duration_since(t) > self.config.start_delay())
    }

    /// Whether a band has been entered, active or not yet
    pub fn is_armed(&self, band: Band) -> bool {
        self.timers[band.index()].started.is_some()
    }

    /// Manual reset. Disarms only bands whose stop delay has elapsed.
    pub fn reset(&mut self, now: Instant) {
        let stop_delay = self.config.stop_delay();
        for band in Band::ALL {
            let timers = &mut self.timers[band.index()];
            if let Some(stopped) = timers.stopped {
                if now.saturating_duration_since(stopped) > stop_delay {
                    debug!("Band {} reset", band);
                    timers.disarm();
                }
            }
        }
    }
}

impl Default for ThresholdEngine {
    fn default() -> Self {
        Self::new(ThresholdConfig::default())
    }
}

impl AlarmSource for ThresholdEngine {
    fn has_alarm(&self, now: Instant) -> bool {
        Band::ALL.iter().any(|&band| self.is_active(band, now))
    }

    fn has_critical_alarm(&self, now: Instant) -> bool {
        (self.config.high_high_critical && self.is_active(Band::HighHigh, now))
            || (self.config.low_low_critical && self.is_active(Band::LowLow, now))
    }
}
