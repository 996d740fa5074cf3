// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Liftstation - supervisory controller for multi-pump lift/booster stations
//!
//! Reads a process sensor, keeps it inside a deadband by starting and
//! stopping pumps, rotates duty among identical pump systems by run time,
//! and raises alarms from four-band hysteresis thresholds with
//! fail-to-start and emergency-stop supervision.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Station loop (0.5 s)                │
//! │   scan ──→ alternate ──→ start/stop ──→ publish status │
//! ├────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   change events   ┌────────────────────┐ │
//! │  │ I/O cache│ ────────────────→ │ Event dispatcher   │ │
//! │  └──────────┘                   └────────────────────┘ │
//! │       ↑                          ↓         ↓           │
//! │  ┌──────────┐            ┌──────────┐ ┌─────────────┐  │
//! │  │I/O module│            │ Systems  │ │  Sensors    │  │
//! │  └──────────┘            │ contactor│ │ thresholds  │  │
//! │                          └──────────┘ └─────────────┘  │
//! │                               ↓                        │
//! │                         ┌──────────────┐               │
//! │                         │ Config store │               │
//! │                         └──────────────┘               │
//! └────────────────────────────────────────────────────────┘
//! ```

pub mod alarm;
pub mod config;
pub mod core;
pub mod devices;
pub mod error;
pub mod io;
pub mod station;
pub mod store;

// Re-exports for convenience
pub use config::{AppSettings, Config};
pub use core::EventDispatcher;
pub use error::{IoError, StationError, StationResult, StoreError};
pub use station::{assemble, Station, StationCommand, StationStatus, StationUpdate, StationWarning};
pub use store::{ConfigStore, MemoryStore, SqliteStore};

/// Liftstation version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Liftstation name
pub const NAME: &str = "Liftstation";
