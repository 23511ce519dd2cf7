use crate::ids::WorkItemId;
use crate::record::{Extra, MetadataRecord};

/// Typed event decoded from a streaming search connection.
///
/// `Result`, `Error` and `TransportFailed` are terminal: a stream session
/// delivers at most one of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The server picked a search strategy (e.g. `exact`, `fuzzy`).
    Mode(String),
    /// Progress report from one upstream source.
    Status { source: String, code: String },
    /// Final answer from the server.
    Result(StreamResult),
    /// The server explicitly rejected the search.
    Error(String),
    /// The connection failed before any terminal event arrived.
    ///
    /// Never sent by a server; synthesized by the stream session so the
    /// orchestrator can tell "server said no" from "could not reach server".
    TransportFailed(String),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::Result(_)
                | StreamEvent::Error(_)
                | StreamEvent::TransportFailed(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Mode(_) => "mode",
            StreamEvent::Status { .. } => "status",
            StreamEvent::Result(_) => "result",
            StreamEvent::Error(_) => "error",
            StreamEvent::TransportFailed(_) => "transport_failed",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StreamResult {
    pub success: bool,
    #[cfg_attr(feature = "serde", serde(default, alias = "data"))]
    pub records: Vec<MetadataRecord>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub has_more: bool,
    /// Auxiliary profile data that accompanies the records.
    #[cfg_attr(feature = "serde", serde(default))]
    pub extra: Extra,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub message: Option<String>,
}

impl StreamResult {
    pub fn found(records: Vec<MetadataRecord>, has_more: bool) -> Self {
        Self {
            success: true,
            records,
            has_more,
            ..Self::default()
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// One-shot search request used for the fallback path and pagination.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FetchRequest {
    pub query: String,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub offset: Option<usize>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub limit: Option<usize>,
}

impl FetchRequest {
    pub fn query(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            offset: None,
            limit: None,
        }
    }

    pub fn page(query: impl Into<String>, offset: usize, limit: usize) -> Self {
        Self {
            query: query.into(),
            offset: Some(offset),
            limit: Some(limit),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FetchResponse {
    pub success: bool,
    #[cfg_attr(feature = "serde", serde(default, alias = "data"))]
    pub records: Vec<MetadataRecord>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub has_more: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub extra: Extra,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub error: Option<String>,
}

impl FetchResponse {
    pub fn found(records: Vec<MetadataRecord>, has_more: bool) -> Self {
        Self {
            success: true,
            records,
            has_more,
            ..Self::default()
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

impl From<FetchResponse> for StreamResult {
    fn from(response: FetchResponse) -> Self {
        StreamResult {
            success: response.success,
            records: response.records,
            has_more: response.has_more,
            extra: response.extra,
            message: response.error,
        }
    }
}

/// Request to apply (scrape) a chosen record onto one work item.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ApplyRequest {
    pub item_id: WorkItemId,
    pub label: String,
    pub record: MetadataRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ApplyResponse {
    pub success: bool,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub message: Option<String>,
}
