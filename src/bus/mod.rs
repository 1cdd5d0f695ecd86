//! In-process publish/subscribe event bus.
//!
//! [`EventBus::publish`] runs every handler registered for the event's topic,
//! in registration order, on the publishing task. The first handler error
//! stops delivery and is returned to the publisher. There is no retry and no
//! persistence.
//!
//! [`QueuedDispatcher`] is an optional front that moves delivery onto one
//! consumer task per topic behind a bounded queue.
//!
//! # Example
//!
//! ```ignore
//! use agentbench::bus::{Event, EventBus, Topic};
//!
//! let bus = EventBus::new();
//! bus.subscribe(Topic::ScoreCalculated, scoring.clone());
//! bus.publish(Event::ScoreCalculated(submission)).await?;
//! ```

pub mod event;
pub mod queue;

pub use event::{Event, Topic};
pub use queue::QueuedDispatcher;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{BusError, HandlerError};
use crate::metrics::Metrics;

/// A subscriber callback.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Handles one event. Returning an error halts delivery for this publish.
    async fn handle(&self, event: &Event) -> Result<(), HandlerError>;
}

/// Anything services can publish through.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, event: Event) -> Result<(), BusError>;
}

/// Synchronous fan-out bus.
pub struct EventBus {
    subscribers: RwLock<HashMap<Topic, Vec<Arc<dyn EventHandler>>>>,
    metrics: Option<Arc<Metrics>>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            metrics: None,
        }
    }

    /// Creates an empty bus that records publish metrics.
    pub fn with_metrics(metrics: Arc<Metrics>) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            metrics: Some(metrics),
        }
    }

    /// Registers `handler` after any existing handlers for `topic`.
    pub fn subscribe(&self, topic: Topic, handler: Arc<dyn EventHandler>) {
        debug!(topic = %topic, handler = handler.name(), "Subscribed");
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(topic)
            .or_default()
            .push(handler);
    }

    /// Number of handlers registered for `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&topic)
            .map_or(0, Vec::len)
    }

    /// Delivers `event` to every handler of its topic, in order.
    ///
    /// Handlers registered while a publish is in flight do not see that
    /// event. With no subscribers this is a no-op.
    pub async fn publish(&self, event: Event) -> Result<(), BusError> {
        let topic = event.topic();
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&topic)
            .cloned()
            .unwrap_or_default();

        let start = Instant::now();
        debug!(
            topic = %topic,
            submission_id = event.submission_id(),
            subscribers = handlers.len(),
            "Publishing event"
        );

        let mut result = Ok(());
        for handler in &handlers {
            if let Err(source) = handler.handle(&event).await {
                warn!(
                    topic = %topic,
                    handler = handler.name(),
                    error = %source,
                    "Handler failed, stopping delivery"
                );
                result = Err(BusError::handler(topic.as_str(), source));
                break;
            }
        }

        if let Some(metrics) = &self.metrics {
            let label = if result.is_ok() { "ok" } else { "error" };
            metrics.record_publish(topic.as_str(), label, start.elapsed().as_secs_f64());
        }

        result
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for EventBus {
    async fn publish(&self, event: Event) -> Result<(), BusError> {
        EventBus::publish(self, event).await
    }
}
