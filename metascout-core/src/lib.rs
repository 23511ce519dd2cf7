//! Search and batch orchestration engine for metascout.
//!
//! The engine turns "find metadata for this item" into a race-free async
//! workflow: a streamed search with a one-shot fallback, cancellation with
//! rollback, incremental pagination, and a bounded-concurrency batch
//! pipeline with pause, resume and retry. Renderers observe a single
//! [`ViewState`](metascout_model::ViewState) published by the
//! [`ResultSink`]; network I/O and persistence sit behind the
//! [`Transport`] and [`Persistence`] traits.
#![allow(missing_docs)]

pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod persistence;
pub mod query;
pub mod scrape;
pub mod session;
pub mod sink;
pub mod snapshot;
pub mod telemetry;
pub mod token;
pub mod transport;

pub use batch::{BatchRunner, StartOutcome};
pub use config::{ConfigLoader, ScoutConfig};
pub use engine::Engine;
pub use error::{Result, ScoutError};
pub use orchestrator::{SearchOrchestrator, SearchOutcome, SessionMode, Step};
pub use persistence::{CachePersistence, MemoryPersistence, Persistence};
pub use scrape::{GroupScrape, ScrapeReport};
pub use session::{Envelope, InboxMessage, StreamSession};
pub use sink::{ResultSink, ResultsGeneration};
pub use snapshot::{Snapshot, SnapshotStore};
pub use token::{RequestToken, TokenClock};
pub use transport::{HttpTransport, Transport};

pub use metascout_model as model;
