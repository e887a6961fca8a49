//! Bulk indexer sessions.
//!
//! A session buffers NDJSON documents and hands full chunks to a small pool
//! of workers over a bounded channel. The channel holds at most one chunk per
//! worker, so `add` waits when every worker is busy and memory stays bounded
//! by roughly `2 * workers + 1` chunks.

mod buffer;
mod ledger;

use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::IndexerSettings;
use crate::domain::{BulkAction, SpanDocument};
use crate::error::{ExportError, IndexError, JoinedError};
use crate::port::BulkClient;

use buffer::{BulkBuffer, Chunk};
use ledger::OutcomeLedger;

/// Document counts for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexSummary {
    /// Documents handed to the buffer.
    pub submitted: usize,
    pub accepted: usize,
    /// Documents that failed for any reason, including ones recorded with
    /// [`IndexerSession::record_failure`].
    pub failed: usize,
}

/// Factory for single-use indexer sessions bound to one index and action.
#[derive(Debug, Clone)]
pub struct BulkIndexer {
    index: String,
    action: BulkAction,
    settings: IndexerSettings,
}

impl BulkIndexer {
    pub fn new(index: impl Into<String>, action: BulkAction, settings: IndexerSettings) -> Self {
        Self {
            index: index.into(),
            action,
            settings,
        }
    }

    /// Check the backend and spawn the worker pool.
    pub async fn start(&self, client: Arc<dyn BulkClient>) -> Result<IndexerSession, ExportError> {
        client
            .health_check()
            .await
            .map_err(|e| ExportError::Connection(e.to_string()))?;

        let workers = self.settings.workers.max(1);
        let (sender, receiver) = mpsc::channel::<Chunk>(workers);
        let receiver = Arc::new(Mutex::new(receiver));
        let ledger = Arc::new(OutcomeLedger::default());

        let mut pool = JoinSet::new();
        for worker_id in 0..workers {
            pool.spawn(run_worker(
                worker_id,
                Arc::clone(&client),
                Arc::clone(&receiver),
                Arc::clone(&ledger),
            ));
        }

        debug!(index = %self.index, action = %self.action, workers, "Indexer session started");

        Ok(IndexerSession {
            index: self.index.clone(),
            action: self.action,
            settings: self.settings,
            buffer: BulkBuffer::default(),
            next_seq: 0,
            deadline_hit: false,
            held_back: 0,
            sender: Some(sender),
            workers: pool,
            ledger,
        })
    }
}

/// One push worth of bulk indexing. Created by [`BulkIndexer::start`], fed
/// with [`add`](Self::add) and drained with [`close`](Self::close).
pub struct IndexerSession {
    index: String,
    action: BulkAction,
    settings: IndexerSettings,
    buffer: BulkBuffer,
    next_seq: u64,
    /// Set once a dispatch could not finish before the push deadline.
    deadline_hit: bool,
    /// Documents added after the deadline was hit, never buffered.
    held_back: usize,
    /// `None` once the session is closed.
    sender: Option<mpsc::Sender<Chunk>>,
    workers: JoinSet<()>,
    ledger: Arc<OutcomeLedger>,
}

impl IndexerSession {
    /// Buffer a document, dispatching a chunk when a flush threshold is hit.
    ///
    /// Waits for a free worker slot when the channel is full, but never past
    /// `deadline`. Once the deadline has been hit nothing more is dispatched;
    /// later documents are held back and failed as timed out by `close`.
    pub async fn add(&mut self, document: SpanDocument, deadline: Instant) {
        if self.sender.is_none() {
            self.ledger.record_failure(IndexError::Transport {
                documents: 1,
                reason: "indexer session is closed".to_string(),
            });
            return;
        }
        if self.deadline_hit {
            self.held_back += 1;
            return;
        }

        self.buffer.push(self.action, &self.index, document);

        if self.buffer.documents() >= self.settings.flush_documents
            || self.buffer.bytes() >= self.settings.flush_bytes
        {
            self.dispatch(deadline).await;
        }
    }

    /// Record a document that never reached the buffer.
    pub fn record_failure(&self, error: IndexError) {
        self.ledger.record_failure(error);
    }

    /// Flush the remaining buffer and wait for every worker, up to `deadline`.
    ///
    /// On expiry the workers are aborted, every undelivered document is
    /// recorded as failed and `IndexError::Timeout` is returned. An expired
    /// deadline always yields `Timeout`, with `documents: 0` when nothing was
    /// outstanding. Closing twice is a no-op.
    pub async fn close(&mut self, deadline: Instant) -> Result<(), IndexError> {
        if self.sender.is_none() {
            return Ok(());
        }

        if self.deadline_hit || Instant::now() >= deadline {
            return self.abandon();
        }

        let drained = tokio::time::timeout_at(deadline, async {
            self.dispatch(deadline).await;
            self.sender = None;
            while let Some(joined) = self.workers.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "Bulk worker stopped unexpectedly");
                }
            }
        })
        .await;

        match drained {
            Ok(()) if !self.deadline_hit => {
                // Chunks held by a worker that panicked are never settled.
                self.ledger
                    .fail_in_flight("bulk worker stopped before completing the request");
                let summary = self.ledger.summary();
                info!(
                    index = %self.index,
                    submitted = summary.submitted,
                    accepted = summary.accepted,
                    failed = summary.failed,
                    "Indexer session closed"
                );
                Ok(())
            }
            _ => self.abandon(),
        }
    }

    /// `Ok(())` when every document was accepted.
    pub fn joined_error(&self) -> Result<(), JoinedError> {
        self.ledger.joined_error()
    }

    pub fn summary(&self) -> IndexSummary {
        self.ledger.summary()
    }

    /// Hand the buffer to the workers. A chunk that cannot be sent before
    /// `deadline` stays registered as in flight and is expired by `abandon`.
    async fn dispatch(&mut self, deadline: Instant) {
        if self.buffer.is_empty() {
            return;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let chunk = self.buffer.take(seq);
        self.ledger.register(seq, chunk.ids.len());

        let Some(sender) = &self.sender else {
            return;
        };
        if Instant::now() >= deadline {
            self.deadline_hit = true;
            return;
        }
        match tokio::time::timeout_at(deadline, sender.send(chunk)).await {
            Ok(Ok(())) => {}
            Ok(Err(mpsc::error::SendError(chunk))) => {
                self.ledger
                    .settle_transport(chunk.seq, "bulk workers are not running".to_string());
            }
            Err(_) => {
                debug!(seq, "Deadline reached while waiting for a bulk worker");
                self.deadline_hit = true;
            }
        }
    }

    /// Stop all work and fail whatever is still outstanding as timed out.
    fn abandon(&mut self) -> Result<(), IndexError> {
        if !self.buffer.is_empty() {
            let seq = self.next_seq;
            self.next_seq += 1;
            let chunk = self.buffer.take(seq);
            self.ledger.register(seq, chunk.ids.len());
        }
        if self.held_back > 0 {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.ledger.register(seq, std::mem::take(&mut self.held_back));
        }
        self.sender = None;
        self.workers.abort_all();

        let documents = self.ledger.expire_in_flight();
        if documents > 0 {
            warn!(index = %self.index, documents, "Indexer close deadline exceeded");
        }
        Err(IndexError::Timeout { documents })
    }
}

async fn run_worker(
    worker_id: usize,
    client: Arc<dyn BulkClient>,
    receiver: Arc<Mutex<mpsc::Receiver<Chunk>>>,
    ledger: Arc<OutcomeLedger>,
) {
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(chunk) = next else {
            break;
        };

        let documents = chunk.ids.len();
        debug!(worker_id, seq = chunk.seq, documents, "Sending bulk request");

        match client.bulk(chunk.body).await {
            Ok(response) => ledger.settle_response(chunk.seq, &chunk.ids, &response),
            Err(e) => {
                warn!(worker_id, seq = chunk.seq, documents, error = %e, "Bulk request failed");
                ledger.settle_transport(chunk.seq, e.to_string());
            }
        }
    }
}
