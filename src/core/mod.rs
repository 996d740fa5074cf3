//! Core plumbing - typed pub/sub used by every other component

mod event_bus;

pub use event_bus::{Event, EventDispatcher, SubscriptionId};
