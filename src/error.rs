// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Error types shared across the controller

use thiserror::Error;

/// Faults raised by I/O modules and the I/O cache
#[derive(Debug, Error)]
pub enum IoError {
    #[error("module '{module}' failed to initialize: {reason}")]
    Init { module: String, reason: String },

    #[error("no module manages {family} channel {pos}")]
    Unmanaged { family: &'static str, pos: usize },

    #[error("module '{module}' rejected write to channel {pos}: {reason}")]
    Write {
        module: String,
        pos: usize,
        reason: String,
    },
}

/// Faults raised by a configuration store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("filesystem: {0}")]
    Fs(#[from] std::io::Error),
}

/// Errors surfaced to callers of station commands
#[derive(Debug, Error)]
pub enum StationError {
    #[error("unknown system {0}")]
    UnknownSystem(u32),

    #[error("unknown sensor {0}")]
    UnknownSensor(u32),

    #[error("command rejected: station is in emergency stop")]
    EmergencyStop,

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("no tokio runtime to run the control loop on")]
    NoRuntime,

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type StationResult<T> = std::result::Result<T, StationError>;
