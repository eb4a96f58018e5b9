//! Feed metrics exposed through the `metrics` facade.
//!
//! Names follow `scribe_{subsystem}_{name}_{unit}`: counters end in
//! `_total`, gauges carry no suffix.

use metrics::{counter, gauge};

const EVENTS_PUBLISHED: &str = "scribe_feed_events_published_total";
const QUEUE_DEPTH: &str = "scribe_feed_queue_depth";
const SEND_FAILURES: &str = "scribe_feed_send_failures_total";

/// Records one published event on a feed.
pub(crate) fn record_event_published(feed: &'static str) {
    counter!(EVENTS_PUBLISHED, "feed" => feed).increment(1);
}

/// Updates the pending-job depth of a feed's executor queue.
pub(crate) fn set_queue_depth(feed: &'static str, depth: usize) {
    gauge!(QUEUE_DEPTH, "feed" => feed).set(depth as f64);
}

/// Records a failed send to a session.
pub(crate) fn record_send_failure(feed: &'static str) {
    counter!(SEND_FAILURES, "feed" => feed).increment(1);
}
