//! Single-slot rollback storage for cancellable searches.

use metascout_model::{
    EditState, ErrorProjection, Extra, ListCursor, ResultSet, ViewState,
    ViewStatus,
};

/// Search-facing part of the visible state, captured right before a search
/// begins.
///
/// The batch item list and counters are deliberately not part of it: a
/// rollback must never rewind batch progress made in the meantime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub status: ViewStatus,
    pub query: Option<String>,
    pub results: ResultSet,
    pub progress_text: String,
    pub error: Option<ErrorProjection>,
    pub cursor: ListCursor,
    pub profile: Extra,
    pub edits: EditState,
}

impl Snapshot {
    pub fn capture(view: &ViewState) -> Self {
        Self {
            status: view.status,
            query: view.query.clone(),
            results: view.results.clone(),
            progress_text: view.progress_text.clone(),
            error: view.error.clone(),
            cursor: view.cursor.clone(),
            profile: view.profile.clone(),
            edits: view.edits.clone(),
        }
    }

    /// Write the captured fields back, leaving batch fields untouched.
    pub fn apply_to(self, view: &mut ViewState) {
        view.status = self.status;
        view.query = self.query;
        view.results = self.results;
        view.progress_text = self.progress_text;
        view.error = self.error;
        view.cursor = self.cursor;
        view.profile = self.profile;
        view.edits = self.edits;
    }
}

/// Holds at most one live snapshot; a new push overwrites the old one.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    slot: Option<Snapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, snapshot: Snapshot) {
        self.slot = Some(snapshot);
    }

    pub fn pop(&mut self) -> Option<Snapshot> {
        self.slot.take()
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }

    pub fn is_live(&self) -> bool {
        self.slot.is_some()
    }
}
