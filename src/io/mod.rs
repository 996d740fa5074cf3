// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! I/O layer - module interfaces, value cache and change detection
//!
//! Modules are polled in a fixed family order (DI, DO, AI, AO). Channel ids
//! are assigned by concatenating the modules of a family in registration
//! order, so a module registered after a 10-channel module starts at 10.

mod events;
mod simulator;

pub use events::*;
pub use simulator::{AnalogBank, DigitalBank};
#[cfg(feature = "simulator")]
pub use simulator::{PlantConfig, PlantSimulator};

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::core::EventDispatcher;
use crate::devices::scale_value;
use crate::error::IoError;

/// Behaviour shared by every physical I/O module
pub trait IoModule: Send + Sync {
    fn name(&self) -> &str;

    /// Bring the hardware up. Called once when the cache is built.
    fn initialize(&mut self) -> Result<(), IoError>;

    fn channel_count(&self) -> usize;

    fn is_managed_pos(&self, pos: usize) -> bool;
}

pub trait DigitalModule: IoModule {
    /// Current values in fixed position order
    fn get_all_values(&self) -> Vec<bool>;
}

pub trait DigitalOutputModule: DigitalModule {
    fn set_value(&mut self, pos: usize, value: bool) -> Result<(), IoError>;
}

pub trait AnalogModule: IoModule {
    /// Current raw counts in fixed position order
    fn get_all_values(&self) -> Vec<i32>;

    /// Full-scale raw count
    fn get_max_value(&self) -> i32;
}

pub trait AnalogOutputModule: AnalogModule {
    fn set_value(&mut self, pos: usize, value: i32) -> Result<(), IoError>;
}

/// The modules handed to [`IoCache::new`], grouped by family
#[derive(Default)]
pub struct IoModules {
    pub digital_inputs: Vec<Box<dyn DigitalModule>>,
    pub digital_outputs: Vec<Box<dyn DigitalOutputModule>>,
    pub analog_inputs: Vec<Box<dyn AnalogModule>>,
    pub analog_outputs: Vec<Box<dyn AnalogOutputModule>>,
}

/// How change events leave the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// One task per subscriber per event
    #[default]
    Async,
    /// Inline on the scanning thread, after the family lock is released
    Inline,
}

struct Slot<M: ?Sized> {
    module: Box<M>,
    online: bool,
}

struct Family<T, M: ?Sized> {
    slots: Vec<Slot<M>>,
    cache: BTreeMap<usize, T>,
}

impl<T: Copy + PartialEq, M: IoModule + ?Sized> Family<T, M> {
    fn new(modules: Vec<Box<M>>, family: &'static str) -> Self {
        let slots = modules
            .into_iter()
            .map(|mut module| {
                let online = match module.initialize() {
                    Ok(()) => {
                        debug!("{} module '{}' online", family, module.name());
                        true
                    }
                    Err(e) => {
                        error!("{} module '{}' offline: {}", family, module.name(), e);
                        false
                    }
                };
                Slot { module, online }
            })
            .collect();

        Self {
            slots,
            cache: BTreeMap::new(),
        }
    }

    /// Diff current module values against the cache, returning changes
    fn diff(&mut self, read: impl Fn(&M) -> Vec<T>, neutral: T) -> Vec<(usize, Option<T>, T)> {
        let mut changes = Vec::new();
        let mut pos = 0;

        for slot in &self.slots {
            let count = slot.module.channel_count();
            let mut values = if slot.online {
                read(slot.module.as_ref())
            } else {
                Vec::new()
            };
            values.resize(count, neutral);

            for value in values {
                let old = self.cache.get(&pos).copied();
                if old != Some(value) {
                    self.cache.insert(pos, value);
                    changes.push((pos, old, value));
                }
                pos += 1;
            }
        }

        changes
    }

    fn owner_mut(&mut self, pos: usize) -> Option<&mut Slot<M>> {
        self.slots.iter_mut().find(|s| s.module.is_managed_pos(pos))
    }

    fn owner(&self, pos: usize) -> Option<&Slot<M>> {
        self.slots.iter().find(|s| s.module.is_managed_pos(pos))
    }

    fn channel_count(&self) -> usize {
        self.slots.iter().map(|s| s.module.channel_count()).sum()
    }
}

/// Thread-safe cache of the last scanned value of every channel
pub struct IoCache {
    dispatcher: Arc<EventDispatcher>,
    delivery: Delivery,
    di: Mutex<Family<bool, dyn DigitalModule>>,
    dout: Mutex<Family<bool, dyn DigitalOutputModule>>,
    ai: Mutex<Family<i32, dyn AnalogModule>>,
    ao: Mutex<Family<i32, dyn AnalogOutputModule>>,
}

impl IoCache {
    /// Initialize every module and build the cache.
    ///
    /// A module that fails to initialize is logged and kept offline: its
    /// channels read as `false`/`0` for the lifetime of the cache.
    pub fn new(dispatcher: Arc<EventDispatcher>, modules: IoModules) -> Self {
        Self {
            dispatcher,
            delivery: Delivery::default(),
            di: Mutex::new(Family::new(modules.digital_inputs, DigitalIn::NAME)),
            dout: Mutex::new(Family::new(modules.digital_outputs, DigitalOut::NAME)),
            ai: Mutex::new(Family::new(modules.analog_inputs, AnalogIn::NAME)),
            ao: Mutex::new(Family::new(modules.analog_outputs, AnalogOut::NAME)),
        }
    }

    pub fn with_delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// Poll all modules and publish one event per changed channel
    pub fn scan(&self) {
        let changes = self.di.lock().diff(|m| m.get_all_values(), false);
        self.publish::<DigitalIn>(changes);

        let changes = self.dout.lock().diff(|m| m.get_all_values(), false);
        self.publish::<DigitalOut>(changes);

        let changes = self.ai.lock().diff(|m| m.get_all_values(), 0);
        self.publish::<AnalogIn>(changes);

        let changes = self.ao.lock().diff(|m| m.get_all_values(), 0);
        self.publish::<AnalogOut>(changes);
    }

    fn publish<K: ChannelKind>(&self, changes: Vec<(usize, Option<K::Value>, K::Value)>) {
        for (channel, old, new) in changes {
            debug!("{}{} {:?} -> {:?}", K::NAME, channel, old, new);
            let event = ChannelEvent::<K>::new(channel, old, new);
            match self.delivery {
                Delivery::Async => self.dispatcher.emit_async(event),
                Delivery::Inline => self.dispatcher.emit(event),
            }
        }
    }

    pub fn digital_input(&self, pos: usize) -> bool {
        self.di.lock().cache.get(&pos).copied().unwrap_or(false)
    }

    pub fn digital_output(&self, pos: usize) -> bool {
        self.dout.lock().cache.get(&pos).copied().unwrap_or(false)
    }

    pub fn analog_input(&self, pos: usize) -> i32 {
        self.ai.lock().cache.get(&pos).copied().unwrap_or(0)
    }

    pub fn analog_output(&self, pos: usize) -> i32 {
        self.ao.lock().cache.get(&pos).copied().unwrap_or(0)
    }

    /// Full-scale raw count of the module owning analog input `pos`, or 0
    pub fn analog_input_max(&self, pos: usize) -> i32 {
        self.ai
            .lock()
            .owner(pos)
            .map_or(0, |slot| slot.module.get_max_value())
    }

    /// Command a digital output. The cache picks the change up on the next scan.
    pub fn set_digital_output_value(&self, pos: usize, value: bool) -> Result<(), IoError> {
        let mut family = self.dout.lock();
        let slot = family.owner_mut(pos).ok_or(IoError::Unmanaged {
            family: DigitalOut::NAME,
            pos,
        })?;

        if !slot.online {
            return Err(IoError::Write {
                module: slot.module.name().to_string(),
                pos,
                reason: "module offline".to_string(),
            });
        }

        debug!("DO{} <- {}", pos, value);
        slot.module.set_value(pos, value)
    }

    pub fn set_analog_output_value(&self, pos: usize, value: i32) -> Result<(), IoError> {
        let mut family = self.ao.lock();
        let slot = family.owner_mut(pos).ok_or(IoError::Unmanaged {
            family: AnalogOut::NAME,
            pos,
        })?;

        if !slot.online {
            warn!("AO{} write dropped, module '{}' offline", pos, slot.module.name());
            return Err(IoError::Write {
                module: slot.module.name().to_string(),
                pos,
                reason: "module offline".to_string(),
            });
        }

        slot.module.set_value(pos, value)
    }

    pub fn digital_input_count(&self) -> usize {
        self.di.lock().channel_count()
    }

    pub fn digital_output_count(&self) -> usize {
        self.dout.lock().channel_count()
    }

    pub fn analog_input_count(&self) -> usize {
        self.ai.lock().channel_count()
    }

    pub fn analog_output_count(&self) -> usize {
        self.ao.lock().channel_count()
    }

    /// Raw view of every cached channel, for the status snapshot
    pub fn snapshot(&self) -> IoSnapshot {
        let digital = |cache: &BTreeMap<usize, bool>| {
            cache
                .iter()
                .map(|(&channel, &value)| DigitalChannel { channel, value })
                .collect::<Vec<_>>()
        };

        let di = digital(&self.di.lock().cache);
        let dout = digital(&self.dout.lock().cache);

        let ai = {
            let family = self.ai.lock();
            analog_channels(
                &family.cache,
                family.slots.iter().map(|s| (s.module.channel_count(), s.module.get_max_value())),
            )
        };
        let ao = {
            let family = self.ao.lock();
            analog_channels(
                &family.cache,
                family.slots.iter().map(|s| (s.module.channel_count(), s.module.get_max_value())),
            )
        };

        IoSnapshot { di, dout, ai, ao }
    }
}

fn analog_channels(
    cache: &BTreeMap<usize, i32>,
    modules: impl Iterator<Item = (usize, i32)>,
) -> Vec<AnalogChannel> {
    let mut channels = Vec::new();
    let mut pos = 0;
    for (count, max) in modules {
        for _ in 0..count {
            if let Some(&raw) = cache.get(&pos) {
                channels.push(AnalogChannel {
                    channel: pos,
                    raw,
                    ma: scale_value(raw as f64, 0.0, max as f64, 4.0, 20.0, true),
                });
            }
            pos += 1;
        }
    }
    channels
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DigitalChannel {
    pub channel: usize,
    pub value: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalogChannel {
    pub channel: usize,
    pub raw: i32,
    /// 4-20 mA equivalent of the raw count
    pub ma: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IoSnapshot {
    pub di: Vec<DigitalChannel>,
    #[serde(rename = "do")]
    pub dout: Vec<DigitalChannel>,
    pub ai: Vec<AnalogChannel>,
    pub ao: Vec<AnalogChannel>,
}
