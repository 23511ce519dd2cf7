//! Stream session: one streaming connection and its pump task.
//!
//! The pump reads the transport's event stream on a spawned task and
//! forwards each event, tagged with the session's request token, into the
//! orchestrator's inbox. It enforces the per-session contract:
//!
//! - events are forwarded in arrival order;
//! - at most one terminal event is forwarded;
//! - a connection failure, a stream that fails to open and a stream that
//!   ends without a terminal event all become [`StreamEvent::TransportFailed`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;
use metascout_model::{FetchResponse, StreamEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::token::RequestToken;
use crate::transport::Transport;

/// Message delivered to an orchestrator, tagged with the token it was
/// dispatched under.
#[derive(Debug)]
pub struct Envelope {
    pub token: RequestToken,
    pub message: InboxMessage,
}

#[derive(Debug)]
pub enum InboxMessage {
    Stream(StreamEvent),
    /// Response to the one-shot fallback request.
    Fallback(Result<FetchResponse>),
    /// Response to a `load_more` page request.
    Page {
        offset: usize,
        response: Result<FetchResponse>,
    },
}

pub type InboxSender = mpsc::UnboundedSender<Envelope>;

pub struct StreamSession {
    token: RequestToken,
    closed: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("token", &self.token)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl StreamSession {
    /// Open a streaming search for `query` and start pumping its events.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(
        transport: Arc<dyn Transport>,
        query: String,
        token: RequestToken,
        inbox: InboxSender,
    ) -> Self {
        let closed = Arc::new(AtomicBool::new(false));
        let pump = Pump {
            token,
            inbox,
            closed: Arc::clone(&closed),
        };
        let task = tokio::spawn(pump.run(transport, query));

        Self {
            token,
            closed,
            task: Some(task),
        }
    }

    pub fn token(&self) -> RequestToken {
        self.token
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop forwarding events and tear down the connection. Idempotent.
    pub fn close(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(token = %self.token, "stream session closed");
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.close();
    }
}

struct Pump {
    token: RequestToken,
    inbox: InboxSender,
    closed: Arc<AtomicBool>,
}

impl Pump {
    async fn run(self, transport: Arc<dyn Transport>, query: String) {
        let mut events = match transport.open_stream(&query).await {
            Ok(events) => events,
            Err(err) => {
                warn!(token = %self.token, error = %err, "failed to open search stream");
                self.forward(StreamEvent::TransportFailed(err.to_string()));
                return;
            }
        };

        while let Some(item) = events.next().await {
            let event = match item {
                Ok(event) => event,
                Err(err) => {
                    warn!(token = %self.token, error = %err, "search stream failed");
                    StreamEvent::TransportFailed(err.to_string())
                }
            };
            let terminal = event.is_terminal();
            if !self.forward(event) || terminal {
                return;
            }
        }

        self.forward(StreamEvent::TransportFailed(
            "stream ended before a result was delivered".to_string(),
        ));
    }

    /// Returns false once the session is closed or the inbox is gone.
    fn forward(&self, event: StreamEvent) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        debug!(token = %self.token, kind = event.kind(), "stream event");
        self.inbox
            .send(Envelope {
                token: self.token,
                message: InboxMessage::Stream(event),
            })
            .is_ok()
    }
}
