//! Pass-through feeds for externally sourced streams.
//!
//! Manifests and validations arrive already shaped from the consensus node;
//! the feed serializes the object once and fans it out verbatim.

use std::sync::Arc;

use serde_json::Value;

use crate::executor::FeedExecutor;
use crate::metrics;
use crate::session::{Session, SessionId};
use crate::subscription::Subscribers;

/// A feed that forwards upstream JSON objects unchanged.
pub(crate) struct ForwardFeed {
    feed: &'static str,
    subscribers: Subscribers,
    executor: FeedExecutor,
}

impl ForwardFeed {
    pub fn new(feed: &'static str) -> Self {
        Self { feed, subscribers: Subscribers::new(), executor: FeedExecutor::new(feed) }
    }

    pub fn sub(&self, session: &Arc<dyn Session>) {
        self.subscribers.subscribe(session);
    }

    pub fn unsub(&self, session_id: SessionId) {
        self.subscribers.unsubscribe(session_id);
    }

    pub fn count(&self) -> usize {
        self.subscribers.count()
    }

    /// Serializes once and enqueues delivery to every subscriber.
    pub fn forward(&self, object: &Value) {
        let message = Arc::new(object.to_string());
        let subscribers = self.subscribers.clone();
        let feed = self.feed;

        metrics::record_event_published(feed);
        self.executor.enqueue(move || {
            for session in subscribers.live() {
                if session.send(Arc::clone(&message)).is_err() {
                    metrics::record_send_failure(feed);
                }
            }
        });
    }
}
