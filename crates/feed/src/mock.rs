//! Controllable [`Session`] implementation for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use crate::session::{SendError, Session, SessionId};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A mock session that records every message sent to it.
///
/// Supports settable API version, failure injection, and awaiting a message
/// count with a timeout so tests can synchronize with the feed workers.
pub struct MockSession {
    id: SessionId,
    api_version: AtomicU32,
    fail_sends: AtomicBool,
    sent: Mutex<Vec<Arc<String>>>,
}

impl MockSession {
    /// Creates a session with API version 1.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            api_version: AtomicU32::new(1),
            fail_sends: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Sets the API version reported to the feeds.
    pub fn set_api_version(&self, version: u32) {
        self.api_version.store(version, Ordering::Relaxed);
    }

    /// Makes every subsequent `send` fail.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::Relaxed);
    }

    /// Number of messages delivered so far.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Delivered messages, parsed as JSON.
    #[allow(clippy::expect_used)]
    pub fn sent_json(&self) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .map(|msg| serde_json::from_str(msg.as_str()).expect("feed messages are JSON"))
            .collect()
    }

    /// Waits until at least `count` messages arrived, up to one second.
    ///
    /// Returns true if the count was reached.
    pub async fn wait_for(&self, count: usize) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while tokio::time::Instant::now() < deadline {
            if self.sent_count() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        self.sent_count() >= count
    }

    /// Waits out any in-flight deliveries, then returns the message count.
    ///
    /// Used for exactly-N assertions: wait for N first, then confirm no
    /// extra message trails in.
    pub async fn settled_count(&self) -> usize {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.sent_count()
    }
}

impl Session for MockSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn api_version(&self) -> u32 {
        self.api_version.load(Ordering::Relaxed)
    }

    fn send(&self, message: Arc<String>) -> Result<(), SendError> {
        if self.fail_sends.load(Ordering::Relaxed) {
            return Err(SendError::Closed);
        }
        self.sent.lock().push(message);
        Ok(())
    }
}
