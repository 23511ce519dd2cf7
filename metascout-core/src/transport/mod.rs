//! Network seam of the engine.
//!
//! The orchestrator never talks to the network directly: it goes through a
//! [`Transport`], which owns the wire format. [`HttpTransport`] is the
//! production implementation; tests provide scripted ones.

pub mod codec;
pub mod http;

use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use metascout_model::{
    ApplyRequest, ApplyResponse, FetchRequest, FetchResponse, StreamEvent,
};

use crate::error::Result;

pub use http::HttpTransport;

/// Decoded events of one streaming search.
///
/// An `Err` item signals a connection-level failure; the stream session
/// turns it into [`StreamEvent::TransportFailed`].
pub type EventStream = BoxStream<'static, Result<StreamEvent>>;

#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Open a server-push search for `query`.
    async fn open_stream(&self, query: &str) -> Result<EventStream>;

    /// Single request/response search, used for fallback and pagination.
    async fn fetch_once(&self, request: FetchRequest) -> Result<FetchResponse>;

    /// Apply a chosen record to a work item (scrape).
    async fn apply(&self, request: ApplyRequest) -> Result<ApplyResponse>;
}
