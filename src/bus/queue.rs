//! Asynchronous dispatch in front of the synchronous bus.
//!
//! Each topic gets a bounded queue and exactly one consumer task, so events
//! on one topic still reach handlers in publish order and registration
//! order. `enqueue` waits for room when a queue is full.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{Event, EventBus, Publisher, Topic};
use crate::error::BusError;

/// Bounded per-topic work queues drained by one consumer each.
pub struct QueuedDispatcher {
    senders: HashMap<Topic, mpsc::Sender<Event>>,
    consumers: Vec<JoinHandle<()>>,
}

impl QueuedDispatcher {
    /// Spawns one consumer per topic delivering into `bus`.
    ///
    /// `capacity` is the queue depth per topic and must be non-zero.
    pub fn start(bus: Arc<EventBus>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut senders = HashMap::new();
        let mut consumers = Vec::new();

        for topic in Topic::ALL {
            let (tx, rx) = mpsc::channel(capacity);
            senders.insert(topic, tx);
            consumers.push(tokio::spawn(consume(topic, Arc::clone(&bus), rx)));
        }

        info!(capacity = capacity, "Queued dispatcher started");
        Self { senders, consumers }
    }

    /// Queues `event` on its topic.
    pub async fn enqueue(&self, event: Event) -> Result<(), BusError> {
        let topic = event.topic();
        let sender = self
            .senders
            .get(&topic)
            .ok_or_else(|| BusError::QueueClosed(topic.as_str().to_string()))?;

        sender
            .send(event)
            .await
            .map_err(|_| BusError::QueueClosed(topic.as_str().to_string()))
    }

    /// Closes every queue and waits for consumers to drain them.
    pub async fn shutdown(mut self) {
        self.senders.clear();
        for handle in self.consumers.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "Dispatch consumer panicked");
            }
        }
        info!("Queued dispatcher stopped");
    }
}

#[async_trait]
impl Publisher for QueuedDispatcher {
    async fn publish(&self, event: Event) -> Result<(), BusError> {
        self.enqueue(event).await
    }
}

async fn consume(topic: Topic, bus: Arc<EventBus>, mut rx: mpsc::Receiver<Event>) {
    debug!(topic = %topic, "Dispatch consumer running");
    while let Some(event) = rx.recv().await {
        let submission_id = event.submission_id().to_string();
        if let Err(e) = bus.publish(event).await {
            warn!(
                topic = %topic,
                submission_id = %submission_id,
                error = %e,
                "Queued delivery failed"
            );
        }
    }
    debug!(topic = %topic, "Dispatch consumer exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventHandler;
    use crate::error::HandlerError;
    use crate::models::{Submission, SubmissionRequest};
    use std::sync::Mutex;

    struct Collect {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventHandler for Collect {
        fn name(&self) -> &str {
            "collect"
        }

        async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
            self.seen
                .lock()
                .unwrap()
                .push(event.submission_id().to_string());
            Ok(())
        }
    }

    fn created(id: &str) -> Event {
        Event::SubmissionCreated(Submission::new(id, SubmissionRequest::new("b", "a", "")))
    }

    #[tokio::test]
    async fn test_queue_preserves_per_topic_order() {
        let bus = Arc::new(EventBus::new());
        let collect = Arc::new(Collect {
            seen: Mutex::new(Vec::new()),
        });
        bus.subscribe(Topic::SubmissionCreated, collect.clone());

        let dispatcher = QueuedDispatcher::start(bus, 2);
        for i in 0..5 {
            dispatcher.enqueue(created(&format!("sub-{i}"))).await.unwrap();
        }
        dispatcher.shutdown().await;

        assert_eq!(
            *collect.seen.lock().unwrap(),
            vec!["sub-0", "sub-1", "sub-2", "sub-3", "sub-4"]
        );
    }

    #[tokio::test]
    async fn test_queued_publish_does_not_surface_handler_errors() {
        struct Failing;

        #[async_trait]
        impl EventHandler for Failing {
            fn name(&self) -> &str {
                "failing"
            }

            async fn handle(&self, _event: &Event) -> Result<(), HandlerError> {
                Err("nope".into())
            }
        }

        let bus = Arc::new(EventBus::new());
        bus.subscribe(Topic::SubmissionCreated, Arc::new(Failing));
        let dispatcher = QueuedDispatcher::start(bus, 4);

        assert!(Publisher::publish(&dispatcher, created("sub-1")).await.is_ok());
        dispatcher.shutdown().await;
    }
}
