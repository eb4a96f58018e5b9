//! Scriptable [`Connection`] implementation for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use scribe_feed::Session;
use tokio::sync::mpsc;

use crate::connection::{Connection, Request, Response};
use crate::error::{Error, Result};

/// A mock connection fed from a scripted request queue.
///
/// `receive` blocks until a request (or injected error) is pushed;
/// [`MockConnection::finish`] makes it return EOF once the queue drains.
/// Responses are recorded for assertions.
pub struct MockConnection {
    incoming_tx: Mutex<Option<mpsc::UnboundedSender<Result<Request>>>>,
    incoming_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<Request>>>,
    sent: Mutex<Vec<Response>>,
    closed: AtomicBool,
    session: Option<Arc<dyn Session>>,
    api_version: u32,
}

impl MockConnection {
    /// Creates a connection with no session identity (HTTP-like).
    pub fn new() -> Arc<Self> {
        Self::with_session(None, 1)
    }

    /// Creates a connection carrying a feed session (WebSocket-like).
    pub fn with_session(session: Option<Arc<dyn Session>>, api_version: u32) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            incoming_tx: Mutex::new(Some(tx)),
            incoming_rx: tokio::sync::Mutex::new(rx),
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            session,
            api_version,
        })
    }

    /// Queues a request for `receive`.
    pub fn push_request(&self, request: Request) {
        if let Some(tx) = self.incoming_tx.lock().as_ref() {
            let _ = tx.send(Ok(request));
        }
    }

    /// Queues an error for `receive` (e.g. a transport failure).
    pub fn push_error(&self, error: Error) {
        if let Some(tx) = self.incoming_tx.lock().as_ref() {
            let _ = tx.send(Err(error));
        }
    }

    /// Ends the script: once the queue drains, `receive` returns EOF.
    pub fn finish(&self) {
        self.incoming_tx.lock().take();
    }

    /// Responses recorded so far.
    pub fn sent(&self) -> Vec<Response> {
        self.sent.lock().clone()
    }

    /// Waits until at least `count` responses arrived, up to one second.
    pub async fn wait_for_responses(&self, count: usize) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while tokio::time::Instant::now() < deadline {
            if self.sent.lock().len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        self.sent.lock().len() >= count
    }

    /// True once the handler closed the connection.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn receive(&self) -> Result<Request> {
        let mut rx = self.incoming_rx.lock().await;
        match rx.recv().await {
            Some(scripted) => scripted,
            None => Err(Error::Eof),
        }
    }

    async fn send(&self, response: Response) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Transport { message: "connection closed".to_owned() });
        }
        self.sent.lock().push(response);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn session(&self) -> Option<Arc<dyn Session>> {
        self.session.clone()
    }

    fn api_version(&self) -> u32 {
        self.api_version
    }
}
