//! Bulk Sink: a background task that accumulates wire documents into
//! batches, flushing on document count, byte size, or a timer, and submits
//! them through a [`Transport`] with bounded concurrency and bounded retry.
//!
//! Producers push through a bounded channel; when submission falls behind,
//! `push` awaits instead of dropping, so backpressure propagates to the
//! generation loop.

pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

pub use transport::{HttpTransport, MemoryTransport, StdoutTransport, SubmitOutcome, Transport};

use crate::config::SinkConfig;
use crate::render::WireDocument;

enum SinkMessage {
    Document(WireDocument),
    /// Flush the current batch and ack once every in-flight submission has
    /// settled.
    Flush(oneshot::Sender<()>),
}

/// Handle to the sink task. Cloneable so multiple producers can share it.
#[derive(Clone)]
pub struct BulkSink {
    tx: mpsc::Sender<SinkMessage>,
}

pub struct BulkSinkTask {
    handle: tokio::task::JoinHandle<()>,
}

impl BulkSink {
    /// Spawns the batching task and returns the producer handle plus the
    /// task handle to join on shutdown.
    pub fn spawn(cfg: SinkConfig, transport: Arc<Transport>) -> (Self, BulkSinkTask) {
        let (tx, rx) = mpsc::channel(cfg.max_queue_size);
        let handle = tokio::spawn(batcher_loop(cfg, transport, rx));
        (Self { tx }, BulkSinkTask { handle })
    }

    /// Enqueues one document. Awaits when the queue is full so producers
    /// slow down instead of losing data.
    pub async fn push(&self, document: WireDocument) -> Result<()> {
        self.tx
            .send(SinkMessage::Document(document))
            .await
            .map_err(|_| anyhow!("bulk sink is no longer running"))
    }

    /// Flushes the current batch and waits for all in-flight submissions,
    /// including their retries, to settle.
    pub async fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(SinkMessage::Flush(ack_tx))
            .await
            .map_err(|_| anyhow!("bulk sink is no longer running"))?;
        ack_rx
            .await
            .map_err(|_| anyhow!("bulk sink exited before acking flush"))
    }
}

impl BulkSinkTask {
    /// Waits for the sink task to drain and exit. The task ends once every
    /// producer handle has been dropped.
    pub async fn join(self) -> Result<()> {
        self.handle.await.context("joining bulk sink task")
    }
}

async fn batcher_loop(
    cfg: SinkConfig,
    transport: Arc<Transport>,
    mut rx: mpsc::Receiver<SinkMessage>,
) {
    let semaphore = Arc::new(Semaphore::new(cfg.workers.max(1)));
    let mut in_flight: JoinSet<()> = JoinSet::new();
    let mut batch: Vec<WireDocument> = Vec::with_capacity(cfg.batch_max_docs);
    let mut batch_bytes = 0usize;

    let mut flush_timer = tokio::time::interval(cfg.flush_interval.max(Duration::from_millis(10)));
    flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    debug!(
        transport = transport.name(),
        max_docs = cfg.batch_max_docs,
        max_bytes = cfg.batch_max_bytes,
        workers = cfg.workers,
        "bulk sink started",
    );

    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some(SinkMessage::Document(doc)) => {
                    batch_bytes += approximate_size(&doc);
                    batch.push(doc);
                    if batch.len() >= cfg.batch_max_docs || batch_bytes >= cfg.batch_max_bytes {
                        dispatch(&mut in_flight, &cfg, &transport, &semaphore, &mut batch, &mut batch_bytes).await;
                    }
                }
                Some(SinkMessage::Flush(ack)) => {
                    dispatch(&mut in_flight, &cfg, &transport, &semaphore, &mut batch, &mut batch_bytes).await;
                    while in_flight.join_next().await.is_some() {}
                    let _ = ack.send(());
                }
                // All producer handles dropped: final flush, then exit.
                None => {
                    dispatch(&mut in_flight, &cfg, &transport, &semaphore, &mut batch, &mut batch_bytes).await;
                    while in_flight.join_next().await.is_some() {}
                    debug!("bulk sink drained and stopped");
                    return;
                }
            },
            _ = flush_timer.tick() => {
                if !batch.is_empty() {
                    dispatch(&mut in_flight, &cfg, &transport, &semaphore, &mut batch, &mut batch_bytes).await;
                }
            }
            // Reap finished submissions so the JoinSet does not grow.
            Some(result) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(err) = result {
                    error!(error = %err, "bulk submission task panicked");
                }
            }
        }
    }
}

/// Moves the accumulated batch into a spawned submission task. The worker
/// permit is acquired here, before spawning: when every worker is busy this
/// await parks the whole accumulator loop, the bounded channel fills, and
/// producers' `push` blocks. That chain is the backpressure path; acquiring
/// the permit inside the task would let batches pile up without bound.
async fn dispatch(
    in_flight: &mut JoinSet<()>,
    cfg: &SinkConfig,
    transport: &Arc<Transport>,
    semaphore: &Arc<Semaphore>,
    batch: &mut Vec<WireDocument>,
    batch_bytes: &mut usize,
) {
    if batch.is_empty() {
        return;
    }
    let documents = std::mem::take(batch);
    *batch_bytes = 0;

    let permit = match Arc::clone(semaphore).acquire_owned().await {
        Ok(permit) => permit,
        // Semaphore lives as long as the loop; closed only at teardown.
        Err(_) => return,
    };

    let transport = Arc::clone(transport);
    let retries = cfg.retries;
    let backoff = cfg.retry_backoff;

    in_flight.spawn(async move {
        let _permit = permit;
        submit_with_retry(&transport, documents, retries, backoff).await;
    });
}

/// Submits one batch with exponential backoff. Transport errors are retried
/// up to `retries` times; after exhaustion the batch is dropped with one
/// log line per document so lost data stays traceable.
async fn submit_with_retry(
    transport: &Transport,
    documents: Vec<WireDocument>,
    retries: u32,
    backoff: Duration,
) {
    let mut attempt = 0u32;
    loop {
        match transport.submit(&documents).await {
            Ok(outcome) => {
                if outcome.failure_count > 0 {
                    for dropped in &outcome.dropped {
                        warn!(doc = %dropped, "document rejected by endpoint");
                    }
                }
                debug!(
                    docs = documents.len(),
                    success = outcome.success_count,
                    failed = outcome.failure_count,
                    "batch submitted",
                );
                return;
            }
            Err(err) if attempt < retries => {
                let delay = backoff * 2u32.saturating_pow(attempt);
                warn!(
                    error = %err,
                    attempt = attempt + 1,
                    max_attempts = retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    "batch submission failed, retrying",
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                error!(
                    error = %err,
                    docs = documents.len(),
                    "batch dropped after exhausting retries",
                );
                for doc in &documents {
                    warn!(
                        index = %doc.index,
                        timestamp = doc.timestamp().unwrap_or("<none>"),
                        "dropping document",
                    );
                }
                return;
            }
        }
    }
}

/// Size estimate used for the byte threshold: the serialized body plus a
/// fixed allowance for the bulk action line.
fn approximate_size(doc: &WireDocument) -> usize {
    let body_len = serde_json::to_vec(&doc.body).map(|v| v.len()).unwrap_or(256);
    body_len + doc.index.len() + 32
}
