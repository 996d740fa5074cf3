//! Alarm module - threshold/hysteresis alarm evaluation

mod threshold;

pub use threshold::*;
pub(crate) use threshold::seconds;

use std::time::Instant;

/// Anything that can raise alarms.
///
/// Alarm state is time-dependent (start/stop delays), so every query takes
/// the instant it is evaluated at.
pub trait AlarmSource {
    fn has_alarm(&self, now: Instant) -> bool;

    fn has_critical_alarm(&self, now: Instant) -> bool;
}
