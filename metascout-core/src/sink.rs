//! The single writer of renderer-visible state.
//!
//! Every mutation of [`ViewState`] goes through a [`ResultSink`] method, which
//! publishes the new value on a `watch` channel. Renderers hold receivers
//! and never write back.
//!
//! The sink also tracks a results generation: every call that replaces the
//! active result list wholesale moves it forward, while appending a page
//! does not. A page can only be appended to the list it was requested for.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use metascout_model::{
    BatchView, EditState, ErrorProjection, Extra, ItemStatus, ItemView,
    MetadataRecord, ResultSet, ViewState, ViewStatus, WorkItem, WorkItemId,
};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::snapshot::Snapshot;

/// Identifies one occupant of the active result list.
pub type ResultsGeneration = u64;

/// Shared handle to the renderer-visible state. Clones write to the same
/// state.
#[derive(Debug, Clone)]
pub struct ResultSink {
    state: Arc<watch::Sender<ViewState>>,
    generation: Arc<AtomicU64>,
}

impl Default for ResultSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultSink {
    /// A sink over the default, idle state.
    pub fn new() -> Self {
        Self::with_state(ViewState::default())
    }

    pub fn with_state(initial: ViewState) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            state: Arc::new(state),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Generation of the result list currently on display.
    pub fn results_generation(&self) -> ResultsGeneration {
        self.generation.load(Ordering::SeqCst)
    }

    /// Called from inside a `send_*` closure so the bump is ordered with the
    /// state change it describes.
    fn bump_generation(&self) -> ResultsGeneration {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.state.subscribe()
    }

    /// Stream of states, starting with the current one.
    pub fn updates(&self) -> WatchStream<ViewState> {
        WatchStream::new(self.state.subscribe())
    }

    pub fn current(&self) -> ViewState {
        self.state.borrow().clone()
    }

    /// Read part of the state without cloning all of it.
    pub fn read<R>(&self, f: impl FnOnce(&ViewState) -> R) -> R {
        f(&self.state.borrow())
    }

    // ---- single-item search ----

    /// Switch to the loading projection for a new search.
    pub fn begin_loading(&self, query: &str) {
        self.state.send_modify(|view| {
            self.bump_generation();
            view.status = ViewStatus::Loading;
            view.query = Some(query.to_string());
            view.results = ResultSet::empty();
            view.error = None;
            view.profile.clear();
            view.edits = EditState::default();
            view.cursor.current_index = None;
            view.progress_text = format!("Searching for {query}");
        });
    }

    pub fn set_progress(&self, text: impl Into<String>) {
        let text = text.into();
        self.state.send_if_modified(|view| {
            if view.progress_text == text {
                return false;
            }
            view.progress_text = text;
            true
        });
    }

    /// Progress of a group scrape. Never touches the search's progress.
    pub fn set_scrape_progress(&self, text: impl Into<String>) {
        let text = text.into();
        self.state.send_if_modified(|view| {
            if view.scrape_progress == text {
                return false;
            }
            view.scrape_progress = text;
            true
        });
    }

    /// Replace the active result list with a resolved outcome and return
    /// the generation that now owns it.
    pub fn apply_outcome(
        &self,
        results: ResultSet,
        profile: Extra,
        progress_text: impl Into<String>,
    ) -> ResultsGeneration {
        let progress_text = progress_text.into();
        let mut generation = 0;
        self.state.send_modify(|view| {
            generation = self.bump_generation();
            view.status = ViewStatus::Result;
            view.cursor.current_index = (!results.is_empty()).then_some(0);
            view.results = results;
            view.profile = profile;
            view.error = None;
            view.edits = EditState::default();
            view.progress_text = progress_text;
        });
        generation
    }

    pub fn set_error(&self, error: ErrorProjection) {
        self.state.send_modify(|view| {
            view.status = ViewStatus::Error;
            view.progress_text.clear();
            view.error = Some(error);
        });
    }

    /// Append a page of records to the active result list.
    ///
    /// The page is dropped, and `false` returned, when the list has been
    /// replaced since `generation` or no longer ends at `offset`.
    pub fn append_page(
        &self,
        generation: ResultsGeneration,
        offset: usize,
        records: Vec<MetadataRecord>,
        has_more: bool,
    ) -> bool {
        self.state.send_if_modified(|view| {
            if self.results_generation() != generation
                || view.results.next_offset() != offset
            {
                return false;
            }
            view.results.append_page(records, has_more);
            true
        })
    }

    /// Roll the search-facing state back to a snapshot.
    pub fn restore(&self, snapshot: Snapshot) {
        self.state.send_modify(|view| {
            self.bump_generation();
            snapshot.apply_to(view);
        });
    }

    /// Replace the whole state, e.g. after loading it from persistence, and
    /// return the generation that owns the restored result list.
    pub fn replace(&self, view: ViewState) -> ResultsGeneration {
        let mut generation = 0;
        self.state.send_modify(|current| {
            generation = self.bump_generation();
            *current = view;
        });
        generation
    }

    // ---- batch ----

    /// Republish the batch item list and counters from the runner's queue.
    pub fn sync_items(&self, items: Vec<ItemView>, batch: BatchView) {
        self.state.send_if_modified(|view| {
            if view.items == items && view.batch == batch {
                return false;
            }
            view.items = items;
            view.batch = batch;
            true
        });
    }

    pub fn set_batch(&self, batch: BatchView) {
        self.state.send_if_modified(|view| {
            if view.batch == batch {
                return false;
            }
            view.batch = batch;
            true
        });
    }

    /// Record a settled batch item.
    ///
    /// The item list is always updated. The active results are replaced
    /// only when the item is the cursor's active item and no single-item
    /// search is loading.
    pub fn apply_item_outcome(&self, item: &WorkItem) {
        self.state.send_modify(|view| {
            let item_view = ItemView::from(item);
            match view.items.iter_mut().find(|existing| existing.id == item.id) {
                Some(existing) => *existing = item_view,
                None => view.items.push(item_view),
            }

            if view.cursor.active_item != Some(item.id) || view.is_loading() {
                return;
            }
            self.bump_generation();
            let results = item.result.clone().unwrap_or_default();
            view.cursor.current_index = (!results.is_empty()).then_some(0);
            view.results = results;
            view.edits = EditState::default();
            view.query = item.query.clone();
            match (item.status, &item.error) {
                (ItemStatus::Failed, Some(message)) if !item.has_result() => {
                    view.status = ViewStatus::Error;
                    view.error = Some(ErrorProjection {
                        message: message.clone(),
                        recoverable: true,
                    });
                }
                _ => {
                    view.status = ViewStatus::Result;
                    view.error = None;
                }
            }
        });
    }

    // ---- cursor and edits ----

    /// Point the cursor at a work item whose results should be displayed.
    pub fn focus_item(&self, id: Option<WorkItemId>) {
        self.state.send_modify(|view| view.cursor.active_item = id);
    }

    pub fn select_index(&self, index: usize) {
        self.state.send_if_modified(|view| {
            if index >= view.results.len() {
                return false;
            }
            view.cursor.current_index = Some(index);
            true
        });
    }

    pub fn set_page_offset(&self, offset: usize) {
        self.state.send_modify(|view| view.cursor.page_offset = offset);
    }

    pub fn set_title_edit(&self, title: Option<String>) {
        self.state.send_modify(|view| view.edits.title_edit = title);
    }

    pub fn set_tag_edit(&self, tags: Option<String>) {
        self.state.send_modify(|view| view.edits.tag_edit = tags);
    }

    pub fn mark_cover_error(&self, index: usize) {
        self.state.send_if_modified(|view| view.edits.cover_load_errors.insert(index));
    }
}
