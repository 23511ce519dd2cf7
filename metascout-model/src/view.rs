//! Renderer-facing projection of the engine state.
//!
//! The renderer only ever reads a [`ViewState`]; the engine publishes a new
//! value after every mutation.

use std::collections::BTreeSet;

use crate::ids::WorkItemId;
use crate::record::{Extra, ResultSet};
use crate::work::{BatchCounters, ItemStatus, WorkItem};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ViewStatus {
    #[default]
    Idle,
    Loading,
    Result,
    Error,
}

/// Single user-visible failure projection.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ErrorProjection {
    pub message: String,
    /// Whether retrying the same action may succeed.
    pub recoverable: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ListMode {
    #[default]
    Single,
    Batch,
}

/// Position within the file list and the active result list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ListCursor {
    /// Work item whose results are currently displayed.
    pub active_item: Option<WorkItemId>,
    /// Highlighted index into the active result list.
    pub current_index: Option<usize>,
    pub list_mode: ListMode,
    /// Page offset of the file list.
    pub page_offset: usize,
}

/// Transient per-result edits made by the user.
///
/// Reset whenever a new result list is applied so edits made against one
/// item are never shown against another item's data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EditState {
    pub title_edit: Option<String>,
    pub tag_edit: Option<String>,
    pub cover_load_errors: BTreeSet<usize>,
}

impl EditState {
    pub fn is_clean(&self) -> bool {
        self.title_edit.is_none()
            && self.tag_edit.is_none()
            && self.cover_load_errors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ItemView {
    pub id: WorkItemId,
    pub label: String,
    pub status: ItemStatus,
    pub result_count: usize,
}

impl From<&WorkItem> for ItemView {
    fn from(item: &WorkItem) -> Self {
        Self {
            id: item.id,
            label: item.label.clone(),
            status: item.status,
            result_count: item.result.as_ref().map_or(0, ResultSet::len),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatchView {
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub paused: bool,
    pub running: bool,
}

impl BatchView {
    pub fn from_counters(
        counters: BatchCounters,
        running: bool,
        paused: bool,
    ) -> Self {
        Self {
            total: counters.total,
            processed: counters.processed,
            succeeded: counters.succeeded,
            failed: counters.failed,
            paused,
            running,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ViewState {
    pub status: ViewStatus,
    /// Query behind the displayed results, if any.
    pub query: Option<String>,
    pub results: ResultSet,
    pub progress_text: String,
    /// Progress of a group scrape, kept apart from the search's own text.
    #[cfg_attr(feature = "serde", serde(default))]
    pub scrape_progress: String,
    pub error: Option<ErrorProjection>,
    pub cursor: ListCursor,
    /// Auxiliary profile data delivered alongside the results.
    pub profile: Extra,
    pub edits: EditState,
    pub items: Vec<ItemView>,
    pub batch: BatchView,
}

impl ViewState {
    pub fn is_loading(&self) -> bool {
        self.status == ViewStatus::Loading
    }

    pub fn item(&self, id: WorkItemId) -> Option<&ItemView> {
        self.items.iter().find(|item| item.id == id)
    }
}
