//! The request/response engine driving one client connection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::WebConfig;
use crate::connection::{Connection, ConnectionContext, Method, Request, Response, Status};
use crate::error::{Error, Result};
use crate::metrics;

/// How requests on one connection are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingPolicy {
    /// Strictly one in-flight request; the next read does not begin until
    /// the previous response is written. Used for HTTP and for clients
    /// requiring strict ordering.
    #[default]
    Sequential,
    /// Multiple concurrent requests, bounded by `max_parallel_requests`;
    /// responses may be written out of request order.
    Parallel,
}

/// A registered request handler.
pub type MessageHandler = Arc<
    dyn Fn(Request, ConnectionContext) -> BoxFuture<'static, Result<Response>> + Send + Sync,
>;

/// Drives connections from handshake to close: reads framed requests,
/// dispatches them to registered handlers under the processing policy, and
/// writes responses. `stop()` cancels every connection cooperatively.
///
/// Handler maps are immutable once `process_connection` starts; register
/// everything first.
pub struct ConnectionHandler {
    policy: ProcessingPolicy,
    max_parallel_requests: Option<usize>,
    grace_period: Duration,
    get_handlers: HashMap<String, MessageHandler>,
    post_handlers: HashMap<String, MessageHandler>,
    ws_handler: Option<MessageHandler>,
    stop: CancellationToken,
}

impl ConnectionHandler {
    /// Creates a handler with the given policy and parallel bound
    /// (`None` = unbounded).
    pub fn new(policy: ProcessingPolicy, max_parallel_requests: Option<usize>) -> Self {
        Self {
            policy,
            max_parallel_requests,
            grace_period: Duration::from_millis(500),
            get_handlers: HashMap::new(),
            post_handlers: HashMap::new(),
            ws_handler: None,
            stop: CancellationToken::new(),
        }
    }

    /// Creates a handler from configuration.
    pub fn from_config(config: &WebConfig) -> Self {
        let mut handler = Self::new(config.processing_policy, config.max_parallel_requests);
        handler.grace_period = Duration::from_millis(config.grace_period_ms);
        handler
    }

    /// Overrides the shutdown grace period.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Registers a handler for GET requests to `target`.
    pub fn on_get(&mut self, target: impl Into<String>, handler: MessageHandler) {
        self.get_handlers.insert(target.into(), handler);
    }

    /// Registers a handler for POST requests to `target`.
    pub fn on_post(&mut self, target: impl Into<String>, handler: MessageHandler) {
        self.post_handlers.insert(target.into(), handler);
    }

    /// Registers the WebSocket message handler.
    pub fn on_ws(&mut self, handler: MessageHandler) {
        self.ws_handler = Some(handler);
    }

    /// Fires the one-shot stop signal: every in-flight suspension point
    /// observes it and unwinds with a cancellation error.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Drives one connection until client EOF, a fatal error, or `stop()`.
    pub async fn process_connection(&self, connection: Arc<dyn Connection>) {
        metrics::connection_opened();
        match self.policy {
            ProcessingPolicy::Sequential => self.sequential_loop(&connection).await,
            ProcessingPolicy::Parallel => self.parallel_loop(&connection).await,
        }
        connection.close().await;
        metrics::connection_closed();
    }

    /// Decides whether an error closes the connection, sending an error
    /// response where the classification calls for one.
    ///
    /// Returns true if the connection should be closed.
    pub async fn handle_error(&self, error: &Error, connection: &dyn Connection) -> bool {
        match error {
            Error::Validation { .. } | Error::NotFound { .. } => {
                let status = if matches!(error, Error::NotFound { .. }) {
                    Status::NotFound
                } else {
                    Status::BadRequest
                };
                let _ = connection.send(Response::error(status, &error.to_string())).await;
                false
            },
            Error::Internal { .. } => {
                error!(%error, "request failed with internal error");
                let _ = connection
                    .send(Response::error(Status::InternalServerError, "Internal error."))
                    .await;
                false
            },
            Error::Protocol { .. } => {
                debug!(%error, "protocol violation, closing connection");
                let _ = connection
                    .send(Response::error(Status::BadRequest, &error.to_string()))
                    .await;
                true
            },
            Error::Transport { .. } | Error::Eof => {
                debug!(%error, "connection finished");
                true
            },
            Error::Cancelled => true,
        }
    }

    async fn sequential_loop(&self, connection: &Arc<dyn Connection>) {
        loop {
            let request = tokio::select! {
                _ = self.stop.cancelled() => break,
                received = connection.receive() => match received {
                    Ok(request) => request,
                    Err(error) => {
                        if self.handle_error(&error, connection.as_ref()).await {
                            break;
                        }
                        continue;
                    },
                },
            };

            // Strict interleaving: the response is written before the next
            // read begins.
            match self.dispatch(connection, request).await {
                Ok(response) => {
                    if let Err(error) = connection.send(response).await {
                        if self.handle_error(&error, connection.as_ref()).await {
                            break;
                        }
                    }
                },
                Err(error) => {
                    if self.handle_error(&error, connection.as_ref()).await {
                        break;
                    }
                },
            }
        }
    }

    async fn parallel_loop(&self, connection: &Arc<dyn Connection>) {
        let permits = self.max_parallel_requests.unwrap_or(Semaphore::MAX_PERMITS);
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut in_flight: JoinSet<()> = JoinSet::new();

        loop {
            // Admission control: past the bound, the reader suspends here
            // until an in-flight request completes.
            let permit = tokio::select! {
                _ = self.stop.cancelled() => break,
                acquired = Arc::clone(&semaphore).acquire_owned() => match acquired {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let request = tokio::select! {
                _ = self.stop.cancelled() => break,
                received = connection.receive() => match received {
                    Ok(request) => request,
                    Err(error) => {
                        if self.handle_error(&error, connection.as_ref()).await {
                            break;
                        }
                        continue;
                    },
                },
            };

            let handler = match self.lookup(&request) {
                Ok(handler) => handler,
                Err(error) => {
                    // NotFound keeps the connection; anything else fatal
                    // cannot come out of a map probe.
                    let _ = self.handle_error(&error, connection.as_ref()).await;
                    continue;
                },
            };

            let context = self.context_for(connection);
            let task_connection = Arc::clone(connection);
            in_flight.spawn(async move {
                let _permit = permit;
                match handler(request, context).await {
                    Ok(response) => {
                        // A failed write surfaces as a transport error on
                        // the reader; nothing to do here.
                        metrics::request_finished(true);
                        let _ = task_connection.send(response).await;
                    },
                    Err(error) => {
                        send_error_response(&error, task_connection.as_ref()).await;
                    },
                }
            });

            while in_flight.try_join_next().is_some() {}
        }

        // In-flight handlers get a grace period to produce their final
        // responses; stragglers are abandoned and the socket closed anyway.
        let drained = tokio::time::timeout(self.grace_period, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(abandoned = in_flight.len(), "grace period expired, abandoning handlers");
            in_flight.abort_all();
        }
    }

    /// Runs the matched handler, racing it against `stop()` plus the grace
    /// period.
    async fn dispatch(
        &self,
        connection: &Arc<dyn Connection>,
        request: Request,
    ) -> Result<Response> {
        let handler = self.lookup(&request)?;
        let context = self.context_for(connection);
        let stop = self.stop.clone();
        let grace_period = self.grace_period;

        let outcome = tokio::select! {
            response = handler(request, context) => response,
            _ = async {
                stop.cancelled().await;
                tokio::time::sleep(grace_period).await;
            } => Err(Error::Cancelled),
        };
        metrics::request_finished(outcome.is_ok());
        outcome
    }

    /// Probes the handler maps. String maps are keyed by `String` but probed
    /// with `&str` — no allocation on the hot path.
    fn lookup(&self, request: &Request) -> Result<MessageHandler> {
        let handler = match request.method {
            Method::Get => self.get_handlers.get(request.target.as_str()),
            Method::Post => self.post_handlers.get(request.target.as_str()),
            Method::WsMessage => self.ws_handler.as_ref(),
        };
        handler.cloned().ok_or_else(|| Error::NotFound { target: request.target.clone() })
    }

    fn context_for(&self, connection: &Arc<dyn Connection>) -> ConnectionContext {
        ConnectionContext {
            session: connection.session(),
            api_version: connection.api_version(),
            cancellation: self.stop.child_token(),
        }
    }
}

/// Sends the error response a failed in-flight request calls for, if any.
async fn send_error_response(error: &Error, connection: &dyn Connection) {
    let response = match error {
        Error::Validation { .. } => Response::error(Status::BadRequest, &error.to_string()),
        Error::NotFound { .. } => Response::error(Status::NotFound, &error.to_string()),
        Error::Internal { .. } => {
            error!(%error, "request failed with internal error");
            Response::error(Status::InternalServerError, "Internal error.")
        },
        Error::Protocol { .. } => Response::error(Status::BadRequest, &error.to_string()),
        Error::Transport { .. } | Error::Eof | Error::Cancelled => return,
    };
    metrics::request_finished(false);
    let _ = connection.send(response).await;
}
