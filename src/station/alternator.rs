// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Lead-lag alternation by accumulated run time

use std::time::Instant;

use tracing::debug;

use crate::alarm::AlarmSource;
use crate::devices::{DeviceStatus, Priority, Runnable, SystemHandle};

/// Assigns auto-priority ranks across the station's systems
pub trait Alternator: Send {
    fn alternate(&mut self, systems: &[SystemHandle], now: Instant);
}

/// The discrete state alternation reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlternatorSnapshot {
    pub critical_count: usize,
    pub auto_count: usize,
    pub all_stopped: bool,
    /// Bit `i` set while system `i` is alarmed for failing to start
    pub fail_to_start_mask: u32,
}

impl AlternatorSnapshot {
    pub fn capture(systems: &[SystemHandle], now: Instant) -> Self {
        let mut snapshot = Self {
            all_stopped: true,
            ..Self::default()
        };

        for (i, handle) in systems.iter().enumerate() {
            let sys = handle.lock();
            if sys.has_critical_alarm(now) {
                snapshot.critical_count += 1;
            }
            if sys.can_run_auto(now) {
                snapshot.auto_count += 1;
            }
            if sys.status() != DeviceStatus::Stopped {
                snapshot.all_stopped = false;
            }
            if sys.alarm_fail_to_start(now) {
                snapshot.fail_to_start_mask |= 1 << i;
            }
        }

        snapshot
    }
}

/// Least run time leads. Recomputed only when the snapshot changes.
#[derive(Debug, Default)]
pub struct RuntimeAlternator {
    last: Option<AlternatorSnapshot>,
    /// System ids in run order, lead first
    order: Vec<u32>,
}

impl RuntimeAlternator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order(&self) -> &[u32] {
        &self.order
    }
}

impl Alternator for RuntimeAlternator {
    fn alternate(&mut self, systems: &[SystemHandle], now: Instant) {
        let snapshot = AlternatorSnapshot::capture(systems, now);
        if !self.order.is_empty() && self.last == Some(snapshot) {
            return;
        }

        let mut candidates: Vec<(usize, u32, f64)> = systems
            .iter()
            .enumerate()
            .filter_map(|(i, handle)| {
                let sys = handle.lock();
                (sys.can_run_auto(now) && !sys.alarm_fail_to_start(now))
                    .then(|| (i, sys.id(), sys.run_time_total(now)))
            })
            .collect();
        candidates.sort_by(|a, b| a.2.total_cmp(&b.2));

        let mut ranks = vec![Priority::Out; systems.len()];
        for (rank, &(i, _, _)) in candidates.iter().enumerate() {
            ranks[i] = Priority::from_rank(rank);
        }
        for (handle, rank) in systems.iter().zip(ranks) {
            handle.lock().set_priority_auto(rank);
        }

        self.order = candidates.iter().map(|&(_, id, _)| id).collect();
        self.last = Some(snapshot);
        debug!("Alternator order {:?} after {:?}", self.order, snapshot);
    }
}
