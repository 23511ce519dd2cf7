//! Group scrape: apply resolved records to many work items at once.

use std::sync::Arc;

use futures::future::join_all;
use metascout_model::{ApplyRequest, ResultSet, WorkItem, WorkItemId};
use tracing::{info, instrument, warn};

use crate::config::BatchConfig;
use crate::sink::ResultSink;
use crate::transport::Transport;

/// Per-item result of one group scrape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeReport {
    pub applied: Vec<WorkItemId>,
    /// Items without a resolved record to apply.
    pub skipped: Vec<WorkItemId>,
    /// Items the server refused or that failed in transit, with the reason.
    pub failed: Vec<(WorkItemId, String)>,
}

impl ScrapeReport {
    /// One-line summary for the status bar.
    pub fn summary(&self) -> String {
        format!(
            "Scraped {} item(s), {} failed, {} skipped",
            self.applied.len(),
            self.failed.len(),
            self.skipped.len()
        )
    }
}

/// Applies each item's chosen record (the first of its result list) under
/// the batch concurrency limit.
///
/// Only the sink's scrape progress is written, so a group scrape can run
/// while a single-item search owns the active result list and its progress
/// text.
#[derive(Debug, Clone)]
pub struct GroupScrape {
    transport: Arc<dyn Transport>,
    sink: ResultSink,
    concurrency_limit: usize,
}

impl GroupScrape {
    /// Create a scrape bounded by the batch concurrency limit.
    pub fn new(
        transport: Arc<dyn Transport>,
        sink: ResultSink,
        config: &BatchConfig,
    ) -> Self {
        Self {
            transport,
            sink,
            concurrency_limit: config.concurrency_limit(),
        }
    }

    /// Apply every item that has a record and report the outcome per item.
    #[instrument(skip_all, fields(items = items.len()))]
    pub async fn run(&self, items: &[WorkItem]) -> ScrapeReport {
        let mut report = ScrapeReport::default();
        let mut requests = Vec::new();
        for item in items {
            match item.result.as_ref().and_then(ResultSet::first) {
                Some(record) => requests.push(ApplyRequest {
                    item_id: item.id,
                    label: item.label.clone(),
                    record: record.clone(),
                }),
                None => report.skipped.push(item.id),
            }
        }

        let total = requests.len();
        let mut done = 0;
        self.sink.set_scrape_progress(format!("Scraping 0/{total}"));

        for chunk in requests.chunks(self.concurrency_limit) {
            let applies = chunk.iter().cloned().map(|request| {
                let transport = Arc::clone(&self.transport);
                async move {
                    let id = request.item_id;
                    (id, transport.apply(request).await)
                }
            });

            for (id, result) in join_all(applies).await {
                match result {
                    Ok(response) if response.success => report.applied.push(id),
                    Ok(response) => {
                        let message = response
                            .message
                            .unwrap_or_else(|| "rejected by server".to_string());
                        warn!(item = %id, %message, "scrape rejected");
                        report.failed.push((id, message));
                    }
                    Err(err) => {
                        warn!(item = %id, error = %err, "scrape failed");
                        report.failed.push((id, err.to_string()));
                    }
                }
            }

            done += chunk.len();
            self.sink.set_scrape_progress(format!("Scraping {done}/{total}"));
        }

        let summary = report.summary();
        info!(%summary, "group scrape finished");
        self.sink.set_scrape_progress(summary);
        report
    }
}
