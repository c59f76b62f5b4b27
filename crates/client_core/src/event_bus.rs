//! In-process publish/subscribe keyed by event name.

use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, PoisonError, RwLock},
};

use serde_json::Value;
use shared::protocol::{decode_payload, BusEvent, Frame};
use tracing::{debug, error, warn};

type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Subscribers are append-only and run in subscription order.
///
/// Delivery is best-effort per subscriber: a subscriber that panics is logged
/// and skipped, and the remaining subscribers still receive the payload.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<String, Vec<Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, event: impl Into<String>, callback: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let event = event.into();
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        debug!(event = %event, "bus: subscriber added");
        subscribers
            .entry(event)
            .or_default()
            .push(Arc::new(callback));
    }

    /// Subscribes to a known event and receives its decoded payload.
    ///
    /// Payloads that do not match `E::Payload` are logged and not delivered to
    /// this subscriber.
    pub fn subscribe_typed<E, F>(&self, callback: F)
    where
        E: BusEvent,
        F: Fn(E::Payload) + Send + Sync + 'static,
    {
        self.subscribe(E::NAME, move |payload| match decode_payload::<E>(payload) {
            Ok(decoded) => callback(decoded),
            Err(err) => warn!(event = E::NAME, %err, "bus: payload has unexpected shape"),
        });
    }

    /// Delivers `payload` to every current subscriber of `event` and returns
    /// how many completed without panicking. Unknown events are a no-op.
    pub fn publish(&self, event: &str, payload: &Value) -> usize {
        let handlers = {
            let subscribers = self
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            match subscribers.get(event) {
                Some(handlers) => handlers.clone(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for (index, handler) in handlers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| handler(payload))) {
                Ok(()) => delivered += 1,
                Err(_) => error!(event, index, "bus: subscriber panicked; continuing dispatch"),
            }
        }
        delivered
    }

    pub fn publish_typed<E: BusEvent>(&self, payload: &E::Payload) -> usize {
        match serde_json::to_value(payload) {
            Ok(value) => self.publish(E::NAME, &value),
            Err(err) => {
                warn!(event = E::NAME, %err, "bus: failed to encode payload");
                0
            }
        }
    }

    /// Dispatches every event of `frame` in wire order.
    pub fn dispatch_frame(&self, frame: &Frame) {
        for (event, payload) in frame.events() {
            self.publish(event, payload);
        }
    }

    pub fn subscriber_count(&self, event: &str) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
#[path = "tests/event_bus_tests.rs"]
mod tests;
