//! Core data model definitions shared across metascout crates.
//!
//! Everything here is plain data: the orchestration engine in
//! `metascout-core` owns all behaviour. Enable the `serde` feature to make
//! the types (de)serializable for transports and persistence.
#![allow(missing_docs)]

pub mod events;
pub mod ids;
pub mod record;
pub mod view;
pub mod work;

pub use events::{
    ApplyRequest, ApplyResponse, FetchRequest, FetchResponse, StreamEvent,
    StreamResult,
};
pub use ids::WorkItemId;
pub use record::{Extra, MetadataRecord, ResultSet};
pub use view::{
    BatchView, EditState, ErrorProjection, ItemView, ListCursor, ListMode,
    ViewState, ViewStatus,
};
pub use work::{BatchCounters, BatchState, ItemStatus, WorkItem};
