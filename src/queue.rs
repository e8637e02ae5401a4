//! Bounded work queues between the crawl stages
//!
//! Two queues connect the pipeline: discovered URLs flow into the frontier
//! queue, fetched pages flow into the document queue. Both are bounded, so a
//! slow downstream stage applies backpressure instead of letting memory grow.

use crate::fetcher::PageDocument;
use crate::session::CrawlSession;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// A unit of work tagged with its session and crawl depth
pub struct QueueItem<T> {
    pub payload: T,
    pub session: Arc<CrawlSession>,
    pub depth: u32,
}

type SharedReceiver<T> = Arc<tokio::sync::Mutex<mpsc::Receiver<QueueItem<T>>>>;

/// The frontier and document queues for the crawl pipeline
///
/// Receivers sit behind async mutexes so a pool of workers can pull from the
/// same queue.
pub struct CrawlQueues {
    frontier_tx: mpsc::Sender<QueueItem<String>>,
    frontier_rx: SharedReceiver<String>,
    document_tx: mpsc::Sender<QueueItem<PageDocument>>,
    document_rx: SharedReceiver<PageDocument>,
}

impl CrawlQueues {
    pub fn new(capacity: usize) -> Self {
        let (frontier_tx, frontier_rx) = mpsc::channel(capacity);
        let (document_tx, document_rx) = mpsc::channel(capacity);
        Self {
            frontier_tx,
            frontier_rx: Arc::new(tokio::sync::Mutex::new(frontier_rx)),
            document_tx,
            document_rx: Arc::new(tokio::sync::Mutex::new(document_rx)),
        }
    }

    /// Enqueues a discovered URL for fetching
    ///
    /// Dropped silently when the session is already canceled. The session's
    /// pending-work counter is bumped before the send so the session cannot
    /// appear drained while the item is in flight.
    pub async fn push_url(&self, url: String, session: Arc<CrawlSession>, depth: u32) {
        if session.is_canceled() {
            return;
        }
        session.task_started();
        let item = QueueItem {
            payload: url,
            session: Arc::clone(&session),
            depth,
        };
        if let Err(e) = self.frontier_tx.send(item).await {
            warn!(error = %e, "Frontier queue closed, dropping URL");
            session.task_finished();
        }
    }

    /// Enqueues a fetched page for link and image extraction
    pub async fn push_document(&self, doc: PageDocument, session: Arc<CrawlSession>, depth: u32) {
        if session.is_canceled() {
            return;
        }
        session.task_started();
        let item = QueueItem {
            payload: doc,
            session: Arc::clone(&session),
            depth,
        };
        if let Err(e) = self.document_tx.send(item).await {
            warn!(error = %e, "Document queue closed, dropping page");
            session.task_finished();
        }
    }

    /// Next URL to fetch; None when the queue is closed
    pub async fn next_url(&self) -> Option<QueueItem<String>> {
        self.frontier_rx.lock().await.recv().await
    }

    /// Next page to process; None when the queue is closed
    pub async fn next_document(&self) -> Option<QueueItem<PageDocument>> {
        self.document_rx.lock().await.recv().await
    }
}
