//! The crawl engine: worker pools over the frontier and document queues
//!
//! A fetch worker pops a URL, runs it through the admission gates (depth,
//! domain, robots, dedup), waits for a politeness slot and fetches the page.
//! A process worker pops a fetched page, extracts links and images, feeds
//! links back into the frontier and hands images to the pipeline. The engine
//! finishes when the session's pending-work counter drains to zero or the
//! session is canceled.

use crate::config::CrawlerConfig;
use crate::extract::extract_content;
use crate::fetcher::{fetch_document, PageDocument, RetryPolicy};
use crate::image::ImagePipeline;
use crate::queue::{CrawlQueues, QueueItem};
use crate::session::CrawlSession;
use crate::url::{is_same_domain, normalize_url};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct CrawlEngine {
    session: Arc<CrawlSession>,
    queues: Arc<CrawlQueues>,
    pipeline: Arc<ImagePipeline>,
    retry: RetryPolicy,
    fetch_workers: usize,
    process_workers: usize,
}

impl CrawlEngine {
    pub fn new(
        session: Arc<CrawlSession>,
        pipeline: Arc<ImagePipeline>,
        retry: RetryPolicy,
        config: &CrawlerConfig,
    ) -> Self {
        Self {
            session,
            queues: Arc::new(CrawlQueues::new(config.queue_capacity)),
            pipeline,
            retry,
            fetch_workers: config.fetch_workers,
            process_workers: config.process_workers,
        }
    }

    /// Runs the crawl to completion or cancellation
    pub async fn run(&self) {
        info!(
            session = %self.session.id(),
            seed = %self.session.seed(),
            max_depth = self.session.max_depth(),
            delay_ms = self.session.delay_ms(),
            "Starting crawl"
        );

        let mut handles = Vec::new();
        for _ in 0..self.fetch_workers {
            let queues = Arc::clone(&self.queues);
            let retry = self.retry.clone();
            handles.push(tokio::spawn(async move {
                fetch_worker_loop(queues, retry).await;
            }));
        }
        for _ in 0..self.process_workers {
            let queues = Arc::clone(&self.queues);
            let pipeline = Arc::clone(&self.pipeline);
            handles.push(tokio::spawn(async move {
                process_worker_loop(queues, pipeline).await;
            }));
        }

        self.queues
            .push_url(
                self.session.seed().to_string(),
                Arc::clone(&self.session),
                0,
            )
            .await;

        self.session.wait_until_drained().await;

        for handle in &handles {
            handle.abort();
        }

        info!(
            session = %self.session.id(),
            visited = self.session.visited_link_count(),
            canceled = self.session.is_canceled(),
            "Crawl finished"
        );
    }
}

async fn fetch_worker_loop(queues: Arc<CrawlQueues>, retry: RetryPolicy) {
    while let Some(item) = queues.next_url().await {
        let session = Arc::clone(&item.session);
        handle_frontier_item(item, &queues, &retry).await;
        session.task_finished();
    }
}

async fn process_worker_loop(queues: Arc<CrawlQueues>, pipeline: Arc<ImagePipeline>) {
    while let Some(item) = queues.next_document().await {
        let session = Arc::clone(&item.session);
        handle_document_item(item, &queues, &pipeline).await;
        session.task_finished();
    }
}

/// Admission gates plus the fetch for one frontier URL
///
/// Dedup runs last among the gates so a URL rejected for depth or robots
/// today is not blocked from a deeper or later crawl of the same session.
async fn handle_frontier_item(
    item: QueueItem<String>,
    queues: &CrawlQueues,
    retry: &RetryPolicy,
) {
    let session = &item.session;
    if session.is_canceled() {
        return;
    }

    let url = match normalize_url(&item.payload) {
        Ok(Some(url)) => url,
        Ok(None) => return,
        Err(e) => {
            debug!(url = %item.payload, error = %e, "Rejected URL");
            return;
        }
    };

    if item.depth > session.max_depth() {
        debug!(url = %url, depth = item.depth, "Beyond max depth");
        return;
    }
    if !is_same_domain(url.as_str(), session.domain()) {
        debug!(url = %url, "Outside crawl domain");
        return;
    }
    if !session.robots_allows(url.as_str()) {
        debug!(url = %url, "Disallowed by robots.txt");
        return;
    }
    if !session.mark_visited_link(url.as_str()) {
        return;
    }

    session.acquire_permit().await;
    if session.is_canceled() {
        return;
    }

    if let Some(doc) = fetch_document(&url, session.proxies(), retry).await {
        queues
            .push_document(doc, Arc::clone(session), item.depth)
            .await;
    }
}

/// Extraction and fan-out for one fetched page
async fn handle_document_item(
    item: QueueItem<PageDocument>,
    queues: &CrawlQueues,
    pipeline: &Arc<ImagePipeline>,
) {
    let session = &item.session;
    if session.is_canceled() {
        return;
    }

    let (links, images) = extract_content(&item.payload);

    for link in links {
        queues
            .push_url(link, Arc::clone(session), item.depth + 1)
            .await;
    }

    for image in images {
        if !session.mark_visited_image(&image) {
            continue;
        }
        session.task_started();
        let session = Arc::clone(session);
        let pipeline = Arc::clone(pipeline);
        tokio::spawn(async move {
            if !session.is_canceled() {
                if let Err(e) = pipeline.process_image(&image, session.domain()).await {
                    warn!(url = %image, error = %e, "Image processing failed");
                }
            }
            session.task_finished();
        });
    }
}
