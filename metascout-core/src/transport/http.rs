use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt, stream};
use metascout_model::{
    ApplyRequest, ApplyResponse, FetchRequest, FetchResponse, StreamEvent,
};
use reqwest::{Client, header};
use reqwest_eventsource::{Event as SseEvent, EventSource};
use tracing::{debug, instrument};
use url::Url;

use super::{EventStream, Transport, codec};
use crate::config::{StreamFormat, TransportConfig};
use crate::error::{Result, ScoutError};

/// HTTP transport: SSE or NDJSON streaming plus JSON one-shot requests.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    config: TransportConfig,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|err| {
            ScoutError::Config(format!(
                "invalid base url {}: {err}",
                config.base_url
            ))
        })?;
        // No overall client timeout: it would cut long-running streams.
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|err| {
                ScoutError::Internal(format!("failed to build HTTP client: {err}"))
            })?;

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(|err| {
            ScoutError::Config(format!("invalid endpoint path {path}: {err}"))
        })
    }

    fn stream_url(&self, query: &str) -> Result<Url> {
        let mut url = self.endpoint(&self.config.stream_path)?;
        url.query_pairs_mut().append_pair("query", query);
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self), fields(format = ?self.config.stream_format))]
    async fn open_stream(&self, query: &str) -> Result<EventStream> {
        let url = self.stream_url(query)?;
        match self.config.stream_format {
            StreamFormat::Sse => {
                let request = self
                    .client
                    .get(url)
                    .header(header::ACCEPT, "text/event-stream");
                let source = EventSource::new(request).map_err(|err| {
                    ScoutError::TransportFailure(err.to_string())
                })?;
                Ok(sse_events(source))
            }
            StreamFormat::Ndjson => {
                let response = self
                    .client
                    .get(url)
                    .header(header::ACCEPT, "application/x-ndjson")
                    .send()
                    .await?
                    .error_for_status()?;
                Ok(ndjson_events(response.bytes_stream()))
            }
        }
    }

    #[instrument(skip(self, request), fields(query = %request.query, offset = ?request.offset))]
    async fn fetch_once(&self, request: FetchRequest) -> Result<FetchResponse> {
        let url = self.endpoint(&self.config.search_path)?;
        let mut params = vec![("query", request.query.clone())];
        if let Some(offset) = request.offset {
            params.push(("offset", offset.to_string()));
        }
        if let Some(limit) = request.limit {
            params.push(("limit", limit.to_string()));
        }

        let response = self
            .client
            .get(url)
            .query(&params)
            .timeout(self.config.request_timeout())
            .send()
            .await?
            .error_for_status()?;
        let body: FetchResponse = response.json().await?;
        debug!(records = body.records.len(), success = body.success, "fetch_once completed");
        Ok(body)
    }

    #[instrument(skip(self, request), fields(item = %request.item_id))]
    async fn apply(&self, request: ApplyRequest) -> Result<ApplyResponse> {
        let url = self.endpoint(&self.config.apply_path)?;
        let response = self
            .client
            .post(url)
            .json(&request)
            .timeout(self.config.request_timeout())
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

/// Adapt an `EventSource` into decoded events.
///
/// The source is closed on the first error so it never auto-reconnects; a
/// reconnect would replay the search behind the orchestrator's back.
fn sse_events(source: EventSource) -> EventStream {
    stream::unfold(Some(source), |state| async move {
        let mut source = state?;
        loop {
            match source.next().await {
                Some(Ok(SseEvent::Open)) => continue,
                Some(Ok(SseEvent::Message(message))) => {
                    match codec::decode_message(&message) {
                        Ok(Some(event)) => return Some((Ok(event), Some(source))),
                        Ok(None) => continue,
                        Err(err) => {
                            source.close();
                            return Some((Err(err), None));
                        }
                    }
                }
                Some(Err(reqwest_eventsource::Error::StreamEnded)) | None => {
                    source.close();
                    return None;
                }
                Some(Err(err)) => {
                    source.close();
                    return Some((
                        Err(ScoutError::TransportFailure(err.to_string())),
                        None,
                    ));
                }
            }
        }
    })
    .boxed()
}

struct NdjsonState<S> {
    body: Pin<Box<S>>,
    lines: codec::LineDecoder,
    pending: VecDeque<Result<StreamEvent>>,
    done: bool,
}

impl<S> NdjsonState<S> {
    fn queue_line(&mut self, line: &str) {
        match codec::decode_line(line) {
            Ok(Some(event)) => self.pending.push_back(Ok(event)),
            Ok(None) => {}
            Err(err) => {
                self.pending.push_back(Err(err));
                self.done = true;
            }
        }
    }
}

fn ndjson_events<S, B>(body: S) -> EventStream
where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = NdjsonState {
        body: Box::pin(body),
        lines: codec::LineDecoder::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.pending.clear();
                }
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    for line in state.lines.push(chunk.as_ref()) {
                        state.queue_line(&line);
                        if state.done {
                            break;
                        }
                    }
                }
                Some(Err(err)) => {
                    state.done = true;
                    state.pending.push_back(Err(err.into()));
                }
                None => {
                    state.done = true;
                    if let Some(line) = state.lines.finish() {
                        state.queue_line(&line);
                    }
                }
            }
        }
    })
    .boxed()
}
