#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use metascout_core::{
    ScoutError, Transport,
    config::{BatchConfig, SearchConfig},
    transport::EventStream,
};
use metascout_model::{
    ApplyRequest, ApplyResponse, FetchRequest, FetchResponse, MetadataRecord,
    StreamEvent, StreamResult,
};
use parking_lot::Mutex;
use tokio::sync::watch;

/// One-way latch that holds scripted streams back until opened.
#[derive(Debug)]
pub struct Gate(watch::Sender<bool>);

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(watch::channel(false).0))
    }

    pub fn open(&self) {
        self.0.send_replace(true);
    }

    async fn wait(&self) {
        let mut rx = self.0.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreamScript {
    pub events: Vec<StreamEvent>,
    /// Connection error emitted after `events`.
    pub error_after: Option<String>,
    pub fail_open: Option<String>,
    pub gate: Option<Arc<Gate>>,
    pub delay: Option<Duration>,
}

impl StreamScript {
    pub fn events(events: Vec<StreamEvent>) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    pub fn found(numbers: &[&str]) -> Self {
        Self::events(vec![
            StreamEvent::Mode("exact".into()),
            StreamEvent::Result(StreamResult::found(records(numbers), false)),
        ])
    }

    pub fn found_paged(numbers: &[&str]) -> Self {
        Self::events(vec![StreamEvent::Result(StreamResult::found(
            records(numbers),
            true,
        ))])
    }

    pub fn empty() -> Self {
        Self::events(vec![StreamEvent::Result(StreamResult::found(
            Vec::new(),
            false,
        ))])
    }

    pub fn server_error(message: &str) -> Self {
        Self::events(vec![
            StreamEvent::Mode("exact".into()),
            StreamEvent::Error(message.into()),
        ])
    }

    /// Progress, then the connection ends without a terminal event.
    pub fn truncated() -> Self {
        Self::events(vec![StreamEvent::Mode("exact".into())])
    }

    pub fn connection_error(reason: &str) -> Self {
        Self {
            events: vec![StreamEvent::Mode("exact".into())],
            error_after: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn refused(reason: &str) -> Self {
        Self {
            fail_open: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn gated(mut self, gate: &Arc<Gate>) -> Self {
        self.gate = Some(Arc::clone(gate));
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[derive(Debug, Clone)]
pub enum FetchScript {
    Respond(FetchResponse),
    Fail(String),
}

#[derive(Debug, Default, Clone)]
pub struct Calls {
    pub opened: Vec<String>,
    pub fetches: Vec<FetchRequest>,
    pub applies: Vec<ApplyRequest>,
}

/// In-memory transport driven by per-query scripts.
///
/// Queries without a stream script resolve to a single record whose number
/// is the query; queries without a fetch script answer the same way.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    streams: Mutex<HashMap<String, StreamScript>>,
    default_delay: Mutex<Option<Duration>>,
    fetches: Mutex<HashMap<String, FetchScript>>,
    rejected_applies: Mutex<HashSet<String>>,
    calls: Mutex<Calls>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn transport(self: &Arc<Self>) -> Arc<dyn Transport> {
        Arc::clone(self) as Arc<dyn Transport>
    }

    pub fn script(&self, query: &str, script: StreamScript) {
        self.streams.lock().insert(query.to_string(), script);
    }

    /// Delay applied to unscripted streams so searches overlap.
    pub fn delay_all(&self, delay: Duration) {
        *self.default_delay.lock() = Some(delay);
    }

    pub fn fetch(&self, query: &str, script: FetchScript) {
        self.fetches.lock().insert(query.to_string(), script);
    }

    pub fn reject_apply(&self, label: &str) {
        self.rejected_applies.lock().insert(label.to_string());
    }

    pub fn calls(&self) -> Calls {
        self.calls.lock().clone()
    }

    pub fn opened(&self) -> Vec<String> {
        self.calls.lock().opened.clone()
    }

    pub fn opened_count(&self, query: &str) -> usize {
        self.calls.lock().opened.iter().filter(|q| *q == query).count()
    }

    pub fn fetch_calls(&self) -> Vec<FetchRequest> {
        self.calls.lock().fetches.clone()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(current: &Arc<AtomicUsize>, max: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self(Arc::clone(current))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open_stream(&self, query: &str) -> metascout_core::Result<EventStream> {
        self.calls.lock().opened.push(query.to_string());
        let script = self.streams.lock().get(query).cloned();
        let script = match script {
            Some(script) => script,
            None => StreamScript {
                delay: *self.default_delay.lock(),
                ..StreamScript::found(&[query])
            },
        };
        if let Some(reason) = script.fail_open {
            return Err(ScoutError::TransportFailure(reason));
        }

        let guard = InFlight::enter(&self.in_flight, &self.max_in_flight);
        let StreamScript {
            events,
            error_after,
            gate,
            delay,
            ..
        } = script;

        let mut items: Vec<metascout_core::Result<StreamEvent>> =
            events.into_iter().map(Ok).collect();
        if let Some(reason) = error_after {
            items.push(Err(ScoutError::TransportFailure(reason)));
        }

        let body = stream::once(async move {
            if let Some(gate) = gate {
                gate.wait().await;
            }
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            stream::iter(items)
        })
        .flatten()
        .map(move |item| {
            let _held = &guard;
            item
        });
        Ok(body.boxed())
    }

    async fn fetch_once(
        &self,
        request: FetchRequest,
    ) -> metascout_core::Result<FetchResponse> {
        self.calls.lock().fetches.push(request.clone());
        let script = self.fetches.lock().get(&request.query).cloned();
        match script {
            Some(FetchScript::Respond(response)) => Ok(response),
            Some(FetchScript::Fail(reason)) => Err(ScoutError::TransportFailure(reason)),
            None => Ok(FetchResponse::found(records(&[&request.query]), false)),
        }
    }

    async fn apply(&self, request: ApplyRequest) -> metascout_core::Result<ApplyResponse> {
        let rejected = self.rejected_applies.lock().contains(&request.label);
        self.calls.lock().applies.push(request);
        Ok(if rejected {
            ApplyResponse {
                success: false,
                message: Some("rejected".into()),
            }
        } else {
            ApplyResponse {
                success: true,
                message: None,
            }
        })
    }
}

pub fn records(numbers: &[&str]) -> Vec<MetadataRecord> {
    numbers.iter().map(|n| MetadataRecord::new(*n)).collect()
}

pub fn search_config() -> SearchConfig {
    SearchConfig::default()
}

pub fn batch_config(concurrency_limit: usize) -> BatchConfig {
    BatchConfig {
        concurrency_limit,
        ..BatchConfig::default()
    }
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Let spawned tasks run for a short while.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}
