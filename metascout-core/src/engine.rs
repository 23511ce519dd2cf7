use std::sync::Arc;

use tracing::info;

use crate::batch::BatchRunner;
use crate::config::ScoutConfig;
use crate::error::Result;
use crate::orchestrator::SearchOrchestrator;
use crate::persistence::{self, Persistence};
use crate::scrape::GroupScrape;
use crate::sink::ResultSink;
use crate::transport::{HttpTransport, Transport};

/// Every engine component wired to one shared [`ResultSink`].
#[derive(Debug)]
pub struct Engine {
    pub sink: ResultSink,
    pub search: SearchOrchestrator,
    pub batch: BatchRunner,
    pub scrape: GroupScrape,
    pub persistence: Arc<dyn Persistence>,
}

impl Engine {
    /// Build an engine that talks HTTP to the configured server.
    pub fn from_config(config: &ScoutConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.transport.clone())?;
        info!(base_url = %transport.base_url(), "metascout engine configured");
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    /// Build an engine over any transport.
    pub fn with_transport(transport: Arc<dyn Transport>, config: &ScoutConfig) -> Self {
        let sink = ResultSink::new();
        let persistence = persistence::from_config(&config.persistence);
        let search = SearchOrchestrator::new(
            Arc::clone(&transport),
            sink.clone(),
            config.search.clone(),
        )
        .with_persistence(Arc::clone(&persistence));
        let batch = BatchRunner::new(
            Arc::clone(&transport),
            sink.clone(),
            config.search.clone(),
            config.batch,
        )
        .with_persistence(Arc::clone(&persistence));
        let scrape = GroupScrape::new(transport, sink.clone(), &config.batch);

        Self {
            sink,
            search,
            batch,
            scrape,
            persistence,
        }
    }

    /// Restore the persisted view and batch queue, if any. Call once at
    /// startup. Returns whether anything was restored.
    ///
    /// The view goes first; the batch runner then republishes the item list
    /// it actually owns over whatever the saved view carried.
    pub async fn restore(&mut self) -> Result<bool> {
        let view = self.search.restore_persisted().await?;
        let queue = self.batch.restore_persisted().await?;
        Ok(view || queue)
    }

    /// Save the visible state and the batch queue now.
    pub async fn checkpoint(&self) -> Result<()> {
        self.search.checkpoint().await?;
        self.batch.checkpoint().await
    }
}
