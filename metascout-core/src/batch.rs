//! Bounded-concurrency batch search over a queue of work items.
//!
//! A round takes the pending items (or, when none are pending, the failed
//! ones) and searches them in chunks of `concurrency_limit`. Every search
//! of a chunk is started before any is awaited, and the next chunk waits
//! for the whole previous chunk to settle. Pausing takes effect between
//! chunks.
//!
//! The runner owns the queue. The item list and counters in the shared view
//! are projections of it, republished after every change, and the queue is
//! persisted after every chunk when a store is attached.

use std::sync::Arc;

use futures::future::join_all;
use once_cell::sync::OnceCell;
use metascout_model::{
    BatchCounters, BatchState, BatchView, ItemStatus, ItemView, ResultSet,
    WorkItem, WorkItemId,
};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::config::{BatchConfig, SearchConfig};
use crate::error::Result;
use crate::orchestrator::{SearchOrchestrator, SearchOutcome};
use crate::persistence::Persistence;
use crate::query;
use crate::scrape::{GroupScrape, ScrapeReport};
use crate::sink::ResultSink;
use crate::transport::Transport;

/// What a call to [`BatchRunner::start`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A round ran to the end.
    Completed(BatchCounters),
    /// The batch was paused and has been resumed by this call.
    Resumed,
    /// Another call is already driving a round.
    AlreadyRunning,
    /// Nothing pending and nothing failed.
    NothingToDo,
}

#[derive(Debug)]
enum ItemOutcome {
    Succeeded(ResultSet),
    Failed {
        message: String,
        result: Option<ResultSet>,
    },
}

impl ItemOutcome {
    fn failed(message: impl Into<String>) -> Self {
        ItemOutcome::Failed {
            message: message.into(),
            result: None,
        }
    }
}

#[derive(Debug, Default)]
struct BatchJob {
    items: Vec<WorkItem>,
    state: BatchState,
    counters: BatchCounters,
}

impl BatchJob {
    /// Rebuild a job around a restored queue, recounting its settled items.
    fn restored(mut items: Vec<WorkItem>) -> Self {
        for item in items
            .iter_mut()
            .filter(|item| item.status == ItemStatus::Searching)
        {
            item.reset();
        }
        let mut counters = BatchCounters {
            total: items.len(),
            ..BatchCounters::default()
        };
        for item in items.iter().filter(|item| item.status.is_settled()) {
            counters.record(item.has_result());
        }
        Self {
            items,
            state: BatchState::Idle,
            counters,
        }
    }

    fn view(&self) -> BatchView {
        BatchView::from_counters(
            self.counters,
            self.state != BatchState::Idle,
            self.state == BatchState::Paused,
        )
    }

    /// Pick the items of the next round, resetting failed items when the
    /// round is a retry.
    fn select_round(&mut self, round_size: usize) -> Vec<WorkItemId> {
        let pending: Vec<WorkItemId> = self
            .items
            .iter()
            .filter(|item| item.status == ItemStatus::Pending)
            .map(|item| item.id)
            .take(round_size)
            .collect();
        if !pending.is_empty() {
            return pending;
        }

        let mut retried = Vec::new();
        for item in self
            .items
            .iter_mut()
            .filter(|item| item.status == ItemStatus::Failed)
            .take(round_size)
        {
            self.counters.withdraw(item.status);
            item.reset();
            retried.push(item.id);
        }
        if !retried.is_empty() {
            debug!(count = retried.len(), "retrying failed items");
        }
        retried
    }

    /// Mark the chunk's remaining items as searching and hand back their
    /// queries. Items removed since the round began are skipped.
    fn begin_chunk(
        &mut self,
        chunk: &[WorkItemId],
    ) -> Vec<(WorkItemId, Option<String>)> {
        chunk
            .iter()
            .filter_map(|id| {
                let item = self.items.iter_mut().find(|item| item.id == *id)?;
                item.status = ItemStatus::Searching;
                Some((item.id, item.query.clone()))
            })
            .collect()
    }

    fn settle(&mut self, id: WorkItemId, outcome: ItemOutcome) -> Option<WorkItem> {
        let Some(item) = self.items.iter_mut().find(|item| item.id == id) else {
            debug!(item = %id, "dropping outcome of a removed item");
            return None;
        };

        match outcome {
            ItemOutcome::Succeeded(result) => {
                item.status = ItemStatus::Success;
                item.result = Some(result);
                item.error = None;
            }
            ItemOutcome::Failed { message, result } => {
                item.status = ItemStatus::Failed;
                item.result = result;
                item.error = Some(message);
            }
        }
        let succeeded = item.has_result();
        let settled = item.clone();
        self.counters.record(succeeded);
        Some(settled)
    }
}

#[derive(Debug)]
struct Inner {
    transport: Arc<dyn Transport>,
    sink: ResultSink,
    search: SearchConfig,
    config: BatchConfig,
    job: Mutex<BatchJob>,
    paused: watch::Sender<bool>,
    persistence: OnceCell<Arc<dyn Persistence>>,
}

/// Shared handle to one batch job. Clones drive the same job.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    inner: Arc<Inner>,
}

impl BatchRunner {
    /// Create an idle runner with an empty queue.
    pub fn new(
        transport: Arc<dyn Transport>,
        sink: ResultSink,
        search: SearchConfig,
        config: BatchConfig,
    ) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                transport,
                sink,
                search,
                config,
                job: Mutex::new(BatchJob::default()),
                paused,
                persistence: OnceCell::new(),
            }),
        }
    }

    /// Persist the queue after every chunk. The first store attached wins.
    pub fn with_persistence(self, persistence: Arc<dyn Persistence>) -> Self {
        if self.inner.persistence.set(persistence).is_err() {
            warn!("batch runner already has a persistence store");
        }
        self
    }

    /// Append items to the queue. They run on the next `start()`.
    pub fn enqueue(&self, items: impl IntoIterator<Item = WorkItem>) -> Vec<WorkItemId> {
        let ids = {
            let mut job = self.inner.job.lock();
            let before = job.items.len();
            job.items.extend(items);
            let added = job.items.len() - before;
            job.counters.total += added;
            let ids: Vec<WorkItemId> =
                job.items[before..].iter().map(|item| item.id).collect();
            ids
        };
        debug!(count = ids.len(), "items enqueued");
        self.publish();
        ids
    }

    /// Enqueue one work item per file name, deriving queries from labels.
    pub fn enqueue_labels<I, S>(&self, labels: I) -> Vec<WorkItemId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enqueue(labels.into_iter().map(query::work_item_from_label))
    }

    /// Replace the queue with previously saved items.
    ///
    /// Refused while a round is running or paused. Items caught mid-search
    /// go back to pending.
    pub fn restore(&self, items: Vec<WorkItem>) -> bool {
        {
            let mut job = self.inner.job.lock();
            if job.state != BatchState::Idle {
                return false;
            }
            *job = BatchJob::restored(items);
        }
        self.publish();
        true
    }

    /// Reload the queue saved by [`checkpoint`](Self::checkpoint) and
    /// republish it. Returns whether a saved queue was found.
    pub async fn restore_persisted(&self) -> Result<bool> {
        let Some(store) = self.inner.persistence.get() else {
            return Ok(false);
        };
        let restored = match store.load_items(&self.items_key()).await? {
            Some(items) => {
                let count = items.len();
                let restored = self.restore(items);
                if restored {
                    info!(items = count, "restored persisted batch queue");
                }
                restored
            }
            None => false,
        };
        // The shared view may hold a stale projection from a saved view.
        self.publish();
        Ok(restored)
    }

    /// Save the queue now.
    pub async fn checkpoint(&self) -> Result<()> {
        let Some(store) = self.inner.persistence.get() else {
            return Ok(());
        };
        let items = self.items();
        store.save_items(&self.items_key(), &items).await
    }

    /// Snapshot of the queue in order.
    pub fn items(&self) -> Vec<WorkItem> {
        self.inner.job.lock().items.clone()
    }

    pub fn item(&self, id: WorkItemId) -> Option<WorkItem> {
        self.inner
            .job
            .lock()
            .items
            .iter()
            .find(|item| item.id == id)
            .cloned()
    }

    /// Current tally, including items restored from persistence.
    pub fn counters(&self) -> BatchCounters {
        self.inner.job.lock().counters
    }

    pub fn state(&self) -> BatchState {
        self.inner.job.lock().state
    }

    /// Run one round, or resume a paused one.
    ///
    /// Resuming returns immediately; the call that started the round keeps
    /// driving it and returns once the round completes.
    #[instrument(skip(self))]
    pub async fn start(&self) -> StartOutcome {
        let round = {
            let mut job = self.inner.job.lock();
            let state = job.state;
            match state {
                BatchState::Running => return StartOutcome::AlreadyRunning,
                BatchState::Paused => {
                    job.state = BatchState::Running;
                    drop(job);
                    self.inner.paused.send_replace(false);
                    info!("batch resumed");
                    self.publish();
                    return StartOutcome::Resumed;
                }
                BatchState::Idle => {}
            }
            let round = job.select_round(self.inner.config.round_size());
            if round.is_empty() {
                return StartOutcome::NothingToDo;
            }
            job.state = BatchState::Running;
            round
        };
        self.inner.paused.send_replace(false);
        info!(items = round.len(), "batch round started");
        self.publish();

        for chunk in round.chunks(self.inner.config.concurrency_limit()) {
            self.wait_while_paused().await;

            let work = self.inner.job.lock().begin_chunk(chunk);
            if work.is_empty() {
                continue;
            }
            self.publish();

            let searches = work
                .into_iter()
                .map(|(id, query)| self.search_item(id, query));
            let outcomes = join_all(searches).await;

            let settled: Vec<WorkItem> = {
                let mut job = self.inner.job.lock();
                outcomes
                    .into_iter()
                    .filter_map(|(id, outcome)| job.settle(id, outcome))
                    .collect()
            };
            for item in &settled {
                self.inner.sink.apply_item_outcome(item);
            }
            self.publish();
            self.persist().await;
        }

        let counters = {
            let mut job = self.inner.job.lock();
            job.state = BatchState::Idle;
            job.counters
        };
        self.inner.paused.send_replace(false);
        self.publish();
        self.persist().await;
        info!(
            processed = counters.processed,
            succeeded = counters.succeeded,
            failed = counters.failed,
            "batch round finished"
        );
        StartOutcome::Completed(counters)
    }

    /// Flip between running and paused. No-op when idle.
    pub fn toggle_pause(&self) -> BatchState {
        let state = {
            let mut job = self.inner.job.lock();
            job.state = match job.state {
                BatchState::Running => BatchState::Paused,
                BatchState::Paused => BatchState::Running,
                BatchState::Idle => return BatchState::Idle,
            };
            job.state
        };
        self.inner
            .paused
            .send_replace(state == BatchState::Paused);
        info!(?state, "batch pause toggled");
        self.publish();
        state
    }

    /// Remove an item and its contribution to the counters. The outcome of
    /// a search already in flight for it is dropped.
    pub fn remove_item(&self, id: WorkItemId) -> bool {
        let removed = {
            let mut job = self.inner.job.lock();
            match job.items.iter().position(|item| item.id == id) {
                Some(index) => {
                    let item = job.items.remove(index);
                    job.counters.withdraw(item.status);
                    job.counters.total = job.counters.total.saturating_sub(1);
                    true
                }
                None => false,
            }
        };
        if removed {
            debug!(item = %id, "item removed");
            self.publish();
        }
        removed
    }

    /// Apply the first record of every successful item.
    pub async fn scrape_succeeded(&self) -> ScrapeReport {
        let items: Vec<WorkItem> = self
            .items()
            .into_iter()
            .filter(|item| item.status == ItemStatus::Success)
            .collect();
        GroupScrape::new(
            Arc::clone(&self.inner.transport),
            self.inner.sink.clone(),
            &self.inner.config,
        )
        .run(&items)
        .await
    }

    fn items_key(&self) -> String {
        format!("{}.items", self.inner.search.persist_key)
    }

    async fn persist(&self) {
        if let Err(err) = self.checkpoint().await {
            warn!(error = %err, "failed to persist batch queue");
        }
    }

    async fn wait_while_paused(&self) {
        let mut paused = self.inner.paused.subscribe();
        let is_paused = *paused.borrow();
        if is_paused {
            debug!("batch waiting for resume");
        }
        // The sender lives as long as `inner`, so this only ends on resume.
        let _ = paused.wait_for(|paused| !*paused).await;
    }

    async fn search_item(
        &self,
        id: WorkItemId,
        query: Option<String>,
    ) -> (WorkItemId, ItemOutcome) {
        let Some(query) = query else {
            return (id, ItemOutcome::failed("no searchable identifier"));
        };

        let mut orchestrator = SearchOrchestrator::new(
            Arc::clone(&self.inner.transport),
            ResultSink::new(),
            self.inner.search.clone(),
        );
        let outcome = match orchestrator.search(query).await {
            SearchOutcome::Found(result) => ItemOutcome::Succeeded(result),
            SearchOutcome::NotFound => ItemOutcome::Failed {
                message: "no results".to_string(),
                result: Some(ResultSet::empty()),
            },
            SearchOutcome::Failed(error) => ItemOutcome::failed(error.message),
            SearchOutcome::Cancelled => ItemOutcome::failed("cancelled"),
        };
        (id, outcome)
    }

    fn publish(&self) {
        let (items, batch) = {
            let job = self.inner.job.lock();
            let items: Vec<ItemView> = job.items.iter().map(ItemView::from).collect();
            (items, job.view())
        };
        self.inner.sink.sync_items(items, batch);
    }
}
