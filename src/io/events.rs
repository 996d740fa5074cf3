// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Channel change events published by the I/O cache

use std::fmt::Debug;

/// A channel family. Each family is a distinct dispatcher topic.
pub trait ChannelKind: Debug + Clone + Copy + Send + Sync + 'static {
    type Value: Debug + Clone + Copy + PartialEq + Send + Sync + 'static;

    const NAME: &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigitalIn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigitalOut;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalogIn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalogOut;

impl ChannelKind for DigitalIn {
    type Value = bool;
    const NAME: &'static str = "DI";
}

impl ChannelKind for DigitalOut {
    type Value = bool;
    const NAME: &'static str = "DO";
}

impl ChannelKind for AnalogIn {
    type Value = i32;
    const NAME: &'static str = "AI";
}

impl ChannelKind for AnalogOut {
    type Value = i32;
    const NAME: &'static str = "AO";
}

/// A channel changed value. `old` is `None` on the first read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelEvent<K: ChannelKind> {
    pub channel: usize,
    pub old: Option<K::Value>,
    pub new: K::Value,
}

impl<K: ChannelKind> ChannelEvent<K> {
    pub fn new(channel: usize, old: Option<K::Value>, new: K::Value) -> Self {
        Self { channel, old, new }
    }
}

pub type DigitalInputChanged = ChannelEvent<DigitalIn>;
pub type DigitalOutputChanged = ChannelEvent<DigitalOut>;
pub type AnalogInputChanged = ChannelEvent<AnalogIn>;
pub type AnalogOutputChanged = ChannelEvent<AnalogOut>;
