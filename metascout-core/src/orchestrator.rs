//! Single-search orchestration.
//!
//! A [`SearchOrchestrator`] turns one logical search into a stream session,
//! an optional one-shot fallback and any number of page loads. All of them
//! report back through one inbox as [`Envelope`]s tagged with the request
//! token they were dispatched under; [`SearchOrchestrator::reduce`] drops
//! anything whose token is no longer current before it can touch the sink.
//!
//! ```text
//! Idle -> Streaming -> Resolved | Failed | Cancelled
//!                   -> Fallback -> Resolved | Failed | Cancelled
//! ```

use std::sync::Arc;

use metascout_model::{
    ErrorProjection, FetchRequest, FetchResponse, ResultSet, StreamEvent,
    StreamResult, ViewStatus,
};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::config::SearchConfig;
use crate::error::{Result, ScoutError};
use crate::persistence::Persistence;
use crate::session::{Envelope, InboxMessage, InboxSender, StreamSession};
use crate::sink::{ResultSink, ResultsGeneration};
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::token::{RequestToken, TokenClock};
use crate::transport::Transport;

/// Where the current search is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SessionMode {
    #[default]
    Idle,
    Streaming,
    Fallback,
    Resolved,
    Failed,
    Cancelled,
}

impl SessionMode {
    /// Whether a terminal answer is still outstanding.
    pub fn is_in_flight(self) -> bool {
        matches!(self, SessionMode::Streaming | SessionMode::Fallback)
    }
}

/// How a search ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Found(ResultSet),
    /// The server answered successfully with zero records.
    NotFound,
    Failed(ErrorProjection),
    /// Superseded or cancelled before an answer arrived.
    Cancelled,
}

impl SearchOutcome {
    /// Whether the search produced at least one record.
    pub fn is_found(&self) -> bool {
        matches!(self, SearchOutcome::Found(_))
    }
}

/// Effect of reducing one inbox message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Progress-only update.
    Progress,
    /// The stream failed and the one-shot fallback was dispatched.
    FallingBack,
    /// A page load finished, successfully or not.
    Paged,
    Settled(SearchOutcome),
    /// The message belonged to a superseded request and was dropped.
    Stale,
}

#[derive(Debug)]
struct SearchSession {
    query: String,
    token: RequestToken,
    mode: SessionMode,
    stream: Option<StreamSession>,
    /// Set once the session's results are on display.
    results: Option<ResultsGeneration>,
}

impl SearchSession {
    fn close_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.close();
        }
    }
}

/// Drives single searches against one [`ResultSink`].
///
/// Owns at most one search session at a time. Callers pump it with
/// [`next`](Self::next) or [`run_until_idle`](Self::run_until_idle).
#[derive(Debug)]
pub struct SearchOrchestrator {
    transport: Arc<dyn Transport>,
    sink: ResultSink,
    clock: TokenClock,
    snapshots: SnapshotStore,
    session: Option<SearchSession>,
    inbox_tx: InboxSender,
    inbox_rx: mpsc::UnboundedReceiver<Envelope>,
    loading_more: bool,
    persistence: Option<Arc<dyn Persistence>>,
    config: SearchConfig,
}

impl SearchOrchestrator {
    /// Create an orchestrator writing to `sink`.
    pub fn new(
        transport: Arc<dyn Transport>,
        sink: ResultSink,
        config: SearchConfig,
    ) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            sink,
            clock: TokenClock::new(),
            snapshots: SnapshotStore::new(),
            session: None,
            inbox_tx,
            inbox_rx,
            loading_more: false,
            persistence: None,
            config,
        }
    }

    /// Save the visible state after every resolution and page.
    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn sink(&self) -> &ResultSink {
        &self.sink
    }

    /// Mode of the current session; `Idle` before the first search.
    pub fn mode(&self) -> SessionMode {
        self.session
            .as_ref()
            .map_or(SessionMode::Idle, |session| session.mode)
    }

    /// The current request token.
    pub fn token(&self) -> RequestToken {
        self.clock.current()
    }

    pub fn is_loading_more(&self) -> bool {
        self.loading_more
    }

    /// Whether a cancel would roll the view back.
    pub fn has_live_snapshot(&self) -> bool {
        self.snapshots.is_live()
    }

    /// Whether a search answer or a page is still outstanding.
    pub fn is_busy(&self) -> bool {
        self.loading_more || self.mode().is_in_flight()
    }

    /// Begin a streaming search for `query`, superseding any search in
    /// flight.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, query: impl Into<String>) -> RequestToken {
        let query = query.into();
        if self.mode().is_in_flight() {
            self.cancel();
        }

        self.snapshots.push(Snapshot::capture(&self.sink.current()));
        let token = self.clock.next();
        self.loading_more = false;
        self.sink.begin_loading(&query);

        let stream = StreamSession::open(
            Arc::clone(&self.transport),
            query.clone(),
            token,
            self.inbox_tx.clone(),
        );
        info!(%token, query = %query, "search started");
        self.session = Some(SearchSession {
            query,
            token,
            mode: SessionMode::Streaming,
            stream: Some(stream),
            results: None,
        });
        token
    }

    /// Abandon whatever is in flight.
    ///
    /// Restores the visible state captured by the matching `start()` when a
    /// snapshot is still live; otherwise the visible state is untouched.
    /// Returns `true` when an in-flight search was cancelled.
    pub fn cancel(&mut self) -> bool {
        let token = self.clock.next();
        self.loading_more = false;

        let mut cancelled = false;
        if let Some(session) = self.session.as_mut() {
            session.close_stream();
            if session.mode.is_in_flight() {
                session.mode = SessionMode::Cancelled;
                cancelled = true;
            }
        }

        if let Some(snapshot) = self.snapshots.pop() {
            self.sink.restore(snapshot);
            info!(%token, "search cancelled; previous state restored");
        } else {
            debug!(%token, "cancel without a live snapshot");
        }
        cancelled
    }

    /// Request the next page of the resolved result list.
    ///
    /// Returns `false` when there is nothing to load or a page load is
    /// already outstanding.
    pub fn load_more(&mut self) -> bool {
        if self.loading_more {
            return false;
        }
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        if session.mode != SessionMode::Resolved {
            return false;
        }
        if session.results != Some(self.sink.results_generation()) {
            debug!(query = %session.query, "result list replaced since the search resolved");
            return false;
        }
        let (has_more, offset) = self
            .sink
            .read(|view| (view.results.has_more, view.results.next_offset()));
        if !has_more {
            return false;
        }

        let token = self.clock.current();
        let request =
            FetchRequest::page(session.query.clone(), offset, self.config.page_size);
        self.loading_more = true;
        debug!(%token, offset, limit = self.config.page_size, "loading next page");

        let transport = Arc::clone(&self.transport);
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            let response = transport.fetch_once(request).await;
            let _ = inbox.send(Envelope {
                token,
                message: InboxMessage::Page { offset, response },
            });
        });
        true
    }

    /// Await and reduce the next inbox message.
    ///
    /// Returns `None` immediately when nothing is outstanding.
    pub async fn next(&mut self) -> Option<Step> {
        if !self.is_busy() {
            return None;
        }
        let envelope = self.inbox_rx.recv().await?;
        Some(self.reduce(envelope).await)
    }

    /// Reduce inbox messages until nothing is outstanding and return the
    /// last settled outcome, if any.
    pub async fn run_until_idle(&mut self) -> Option<SearchOutcome> {
        let mut outcome = None;
        while let Some(step) = self.next().await {
            if let Step::Settled(settled) = step {
                outcome = Some(settled);
            }
        }
        outcome
    }

    /// Run a search to completion.
    #[instrument(skip(self, query), fields(query = tracing::field::Empty))]
    pub async fn search(&mut self, query: impl Into<String>) -> SearchOutcome {
        let query = query.into();
        tracing::Span::current().record("query", query.as_str());
        self.start(query);
        self.run_until_idle()
            .await
            .unwrap_or(SearchOutcome::Cancelled)
    }

    /// Apply one inbox message if its token is still current.
    pub async fn reduce(&mut self, envelope: Envelope) -> Step {
        let Envelope { token, message } = envelope;
        if !self.clock.is_current(token) {
            debug!(%token, current = %self.clock.current(), "dropping stale message");
            return Step::Stale;
        }

        match message {
            InboxMessage::Stream(event) => self.on_stream_event(token, event).await,
            InboxMessage::Fallback(response) => self.on_fallback(token, response).await,
            InboxMessage::Page { offset, response } => {
                self.on_page(offset, response).await
            }
        }
    }

    /// Save the visible state, e.g. before the embedding shell navigates
    /// away.
    pub async fn checkpoint(&self) -> Result<()> {
        match &self.persistence {
            Some(store) => store.save(&self.config.persist_key, &self.sink.current()).await,
            None => Ok(()),
        }
    }

    /// Replace the visible state with the persisted one. Returns whether a
    /// state was found.
    ///
    /// A restored result list is adopted as a resolved search for its query,
    /// so it can keep paging.
    pub async fn restore_persisted(&mut self) -> Result<bool> {
        let Some(store) = &self.persistence else {
            return Ok(false);
        };
        let Some(view) = store.load(&self.config.persist_key).await? else {
            return Ok(false);
        };

        let token = self.clock.next();
        self.loading_more = false;
        self.snapshots.clear();
        let resolved = (view.status == ViewStatus::Result)
            .then(|| view.query.clone())
            .flatten();
        let generation = self.sink.replace(view);

        self.session = resolved.map(|query| SearchSession {
            query,
            token,
            mode: SessionMode::Resolved,
            stream: None,
            results: Some(generation),
        });
        info!(
            key = %self.config.persist_key,
            resolved = self.session.is_some(),
            "restored persisted view"
        );
        Ok(true)
    }

    async fn on_stream_event(&mut self, token: RequestToken, event: StreamEvent) -> Step {
        let Some(session) = self.session.as_mut() else {
            return Step::Stale;
        };
        if session.token != token || session.mode != SessionMode::Streaming {
            debug!(%token, kind = event.kind(), "ignoring event outside streaming mode");
            return Step::Stale;
        }

        match event {
            StreamEvent::Mode(name) => {
                self.sink.set_progress(format!("Search mode: {name}"));
                Step::Progress
            }
            StreamEvent::Status { source, code } => {
                self.sink.set_progress(format!("{source}: {code}"));
                Step::Progress
            }
            StreamEvent::Result(result) => {
                session.close_stream();
                self.settle(result).await
            }
            StreamEvent::Error(message) => {
                session.close_stream();
                self.fail(ScoutError::Server(message).projection())
            }
            StreamEvent::TransportFailed(reason) => {
                session.close_stream();
                session.mode = SessionMode::Fallback;
                warn!(%token, reason = %reason, "stream failed; falling back to one-shot search");
                self.sink.set_progress("Stream unavailable, retrying");

                let request = FetchRequest::query(session.query.clone());
                let transport = Arc::clone(&self.transport);
                let inbox = self.inbox_tx.clone();
                tokio::spawn(async move {
                    let response = transport.fetch_once(request).await;
                    let _ = inbox.send(Envelope {
                        token,
                        message: InboxMessage::Fallback(response),
                    });
                });
                Step::FallingBack
            }
        }
    }

    async fn on_fallback(
        &mut self,
        token: RequestToken,
        response: Result<FetchResponse>,
    ) -> Step {
        let in_fallback = self
            .session
            .as_ref()
            .is_some_and(|s| s.token == token && s.mode == SessionMode::Fallback);
        if !in_fallback {
            return Step::Stale;
        }

        match response {
            Ok(response) => self.settle(StreamResult::from(response)).await,
            Err(err) => {
                warn!(%token, error = %err, "fallback search failed");
                self.fail(ErrorProjection {
                    message: err.to_string(),
                    recoverable: true,
                })
            }
        }
    }

    async fn on_page(
        &mut self,
        offset: usize,
        response: Result<FetchResponse>,
    ) -> Step {
        self.loading_more = false;
        let Some(generation) = self.session.as_ref().and_then(|s| s.results) else {
            return Step::Stale;
        };
        match response {
            Ok(page) if page.success => {
                let records = page.records.len();
                if !self.sink.append_page(generation, offset, page.records, page.has_more) {
                    debug!(offset, "dropping page for a result list that has moved on");
                    return Step::Stale;
                }
                debug!(offset, records, "page appended");
                self.persist().await;
            }
            Ok(page) => {
                warn!(
                    offset,
                    error = page.error.as_deref().unwrap_or("unknown"),
                    "page request rejected"
                );
            }
            Err(err) => {
                warn!(offset, error = %err, "page request failed");
            }
        }
        Step::Paged
    }

    async fn settle(&mut self, result: StreamResult) -> Step {
        if !result.success {
            let message = result
                .message
                .unwrap_or_else(|| "search failed".to_string());
            return self.fail(ScoutError::Server(message).projection());
        }

        let query = self.session.as_ref().map(|s| s.query.clone()).unwrap_or_default();
        let results = ResultSet::new(result.records, result.has_more);
        let (outcome, generation) = if results.is_empty() {
            let generation = self.sink.apply_outcome(
                results,
                result.extra,
                format!("No results for {query}"),
            );
            (SearchOutcome::NotFound, generation)
        } else {
            let text = match results.len() {
                1 => "1 result".to_string(),
                n => format!("{n} results"),
            };
            let generation = self.sink.apply_outcome(results.clone(), result.extra, text);
            (SearchOutcome::Found(results), generation)
        };

        self.snapshots.clear();
        if let Some(session) = self.session.as_mut() {
            session.mode = SessionMode::Resolved;
            session.results = Some(generation);
            info!(token = %session.token, found = outcome.is_found(), "search resolved");
        }
        self.persist().await;
        Step::Settled(outcome)
    }

    fn fail(&mut self, error: ErrorProjection) -> Step {
        self.sink.set_error(error.clone());
        self.snapshots.clear();
        if let Some(session) = self.session.as_mut() {
            session.mode = SessionMode::Failed;
            info!(token = %session.token, error = %error.message, "search failed");
        }
        Step::Settled(SearchOutcome::Failed(error))
    }

    async fn persist(&self) {
        if let Err(err) = self.checkpoint().await {
            warn!(error = %err, "failed to persist search view");
        }
    }
}
