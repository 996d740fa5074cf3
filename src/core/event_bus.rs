// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Event dispatcher for inter-component communication
//!
//! Topics are keyed by the Rust type of the event. Handlers are plain
//! closures returning `anyhow::Result<()>`; a handler that errors or panics
//! is logged and skipped without affecting the other subscribers.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::{error, trace};

/// Marker for types that can travel through the dispatcher
pub trait Event: Any + Send + Sync + 'static {}

impl<T: Any + Send + Sync + 'static> Event for T {}

/// Handle returned by [`EventDispatcher::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type ErasedHandler = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Result<()> + Send + Sync>;

#[derive(Clone)]
struct Subscriber {
    id: SubscriptionId,
    topic: &'static str,
    handler: ErasedHandler,
}

/// Central pub/sub dispatcher
pub struct EventDispatcher {
    topics: Mutex<HashMap<TypeId, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `handler` for every event of type `E`
    pub fn subscribe<E, F>(&self, handler: F) -> SubscriptionId
    where
        E: Event,
        F: Fn(&E) -> Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handler: ErasedHandler = Arc::new(move |event: &(dyn Any + Send + Sync)| {
            match event.downcast_ref::<E>() {
                Some(event) => handler(event),
                None => Ok(()),
            }
        });

        self.topics
            .lock()
            .entry(TypeId::of::<E>())
            .or_default()
            .push(Subscriber {
                id,
                topic: std::any::type_name::<E>(),
                handler,
            });

        trace!("Subscribed {:?} to {}", id, std::any::type_name::<E>());
        id
    }

    /// Remove a subscription. Unknown ids are ignored.
    pub fn unsubscribe<E: Event>(&self, id: SubscriptionId) {
        let mut topics = self.topics.lock();
        if let Some(subscribers) = topics.get_mut(&TypeId::of::<E>()) {
            subscribers.retain(|s| s.id != id);
        }
    }

    /// Number of live subscriptions for `E`
    pub fn subscriber_count<E: Event>(&self) -> usize {
        self.topics
            .lock()
            .get(&TypeId::of::<E>())
            .map_or(0, Vec::len)
    }

    fn snapshot<E: Event>(&self) -> Vec<Subscriber> {
        self.topics
            .lock()
            .get(&TypeId::of::<E>())
            .cloned()
            .unwrap_or_default()
    }

    /// Deliver `event` inline, in subscription order
    pub fn emit<E: Event>(&self, event: E) {
        for subscriber in self.snapshot::<E>() {
            run_isolated(&subscriber, &event);
        }
    }

    /// Deliver `event` to every subscriber on its own task
    ///
    /// Uses the ambient tokio runtime when there is one, otherwise a
    /// detached OS thread per subscriber.
    pub fn emit_async<E: Event>(&self, event: E) {
        let subscribers = self.snapshot::<E>();
        if subscribers.is_empty() {
            return;
        }

        let event = Arc::new(event);
        let runtime = tokio::runtime::Handle::try_current().ok();

        for subscriber in subscribers {
            let event = Arc::clone(&event);
            match &runtime {
                Some(handle) => {
                    handle.spawn(async move {
                        run_isolated(&subscriber, event.as_ref());
                    });
                }
                None => {
                    std::thread::spawn(move || run_isolated(&subscriber, event.as_ref()));
                }
            }
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn run_isolated(subscriber: &Subscriber, event: &(dyn Any + Send + Sync)) {
    match catch_unwind(AssertUnwindSafe(|| (subscriber.handler)(event))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(
            "Subscriber {:?} failed handling {}: {:#}",
            subscriber.id, subscriber.topic, e
        ),
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(
                "Subscriber {:?} panicked handling {}: {}",
                subscriber.id, subscriber.topic, reason
            );
        }
    }
}
