//! Write-behind persistence of issued token metadata.
//!
//! [`TokenBatchWriter::add`] appends a record to an in-memory buffer and
//! returns at once. A single worker task drains the buffer into storage when
//! it reaches `max_batch` records and on every `flush_interval` tick. Each
//! drain is one all-or-nothing `insert_tokens` call.
//!
//! A failed drain is logged and its records are dropped: the tokens they
//! describe were already handed to callers and stay valid until they expire.
//! Records still buffered when the process dies are lost the same way.
//! `Durability::WriteThrough` avoids that window at the cost of latency.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::BatchConfig;
use crate::storage::DeadlineStore;
use crate::types::TokenRecord;
use crate::{AuthError, AuthResult};

/// Batch writer counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    /// Records waiting in the buffer.
    pub pending: usize,
    /// Records written by successful drains.
    pub flushed: u64,
    /// Records lost to failed drains.
    pub dropped: u64,
}

enum Command {
    Drain,
    Shutdown(oneshot::Sender<()>),
}

struct BatchInner {
    buffer: Mutex<Vec<TokenRecord>>,
    stopped: AtomicBool,
    store: DeadlineStore,
    flushed: AtomicU64,
    dropped: AtomicU64,
}

impl BatchInner {
    async fn flush(&self) -> usize {
        let batch = std::mem::take(&mut *self.buffer.lock());
        if batch.is_empty() {
            return 0;
        }

        let count = batch.len();
        match self.store.insert_tokens(&batch).await {
            Ok(()) => {
                self.flushed.fetch_add(count as u64, Ordering::Relaxed);
                tracing::debug!(count, "Flushed token batch");
                count
            }
            Err(e) => {
                self.dropped.fetch_add(count as u64, Ordering::Relaxed);
                tracing::error!(
                    count,
                    error = %e,
                    cause = e.cause().unwrap_or_default(),
                    "Failed to persist token batch, records dropped"
                );
                0
            }
        }
    }
}

/// Buffers token records and persists them in batches.
///
/// Creating a writer spawns its flush worker on the current tokio runtime;
/// call [`TokenBatchWriter::stop`] exactly once to flush and end it.
pub struct TokenBatchWriter {
    inner: Arc<BatchInner>,
    max_batch: usize,
    commands: mpsc::Sender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TokenBatchWriter {
    /// Creates a writer and starts its flush worker.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn new(config: &BatchConfig, store: DeadlineStore) -> Self {
        let inner = Arc::new(BatchInner {
            buffer: Mutex::new(Vec::with_capacity(config.max_batch)),
            stopped: AtomicBool::new(false),
            store,
            flushed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let worker = spawn_worker(Arc::clone(&inner), config.flush_interval, rx);

        Self {
            inner,
            max_batch: config.max_batch.max(1),
            commands: tx,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Buffers one record without waiting for storage.
    ///
    /// Records missing a token or client identifier are ignored. Reaching
    /// `max_batch` buffered records schedules a drain on the worker.
    pub fn add(&self, record: TokenRecord) {
        if record.is_incomplete() {
            tracing::debug!(
                token_id = %record.token_id,
                client_id = %record.client_id,
                "Ignoring incomplete token record"
            );
            return;
        }

        let len = {
            let mut buffer = self.inner.buffer.lock();
            if self.inner.stopped.load(Ordering::Acquire) {
                drop(buffer);
                tracing::warn!(token_id = %record.token_id, "Batch writer stopped, token record dropped");
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
            buffer.push(record);
            buffer.len()
        };

        if len >= self.max_batch {
            // A full queue already holds a pending drain.
            let _ = self.commands.try_send(Command::Drain);
        }
    }

    /// Drains the buffer into storage now. Returns how many records were written.
    ///
    /// The buffer is swapped out under its lock and written after the lock is
    /// released, so concurrent [`TokenBatchWriter::add`] calls never wait on
    /// storage. Failures are logged, not returned.
    pub async fn flush(&self) -> usize {
        self.inner.flush().await
    }

    /// Number of buffered records.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    /// Returns a counter snapshot.
    #[must_use]
    pub fn stats(&self) -> BatchStats {
        BatchStats {
            pending: self.pending_count(),
            flushed: self.inner.flushed.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
        }
    }

    /// Stops the periodic flush and writes whatever is still buffered.
    ///
    /// Returns once the final drain has completed or failed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::AlreadyStopped`] on a second call.
    pub async fn stop(&self) -> AuthResult<usize> {
        {
            let _buffer = self.inner.buffer.lock();
            if self.inner.stopped.swap(true, Ordering::AcqRel) {
                return Err(AuthError::AlreadyStopped {
                    component: "token batch writer",
                });
            }
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
        let handle = self.worker.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::warn!(error = %e, "Batch writer worker ended abnormally");
        }

        let written = self.inner.flush().await;
        tracing::info!(written, "Token batch writer stopped");
        Ok(written)
    }
}

impl std::fmt::Debug for TokenBatchWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBatchWriter")
            .field("max_batch", &self.max_batch)
            .field("stats", &self.stats())
            .finish()
    }
}

fn spawn_worker(
    inner: Arc<BatchInner>,
    period: Duration,
    mut commands: mpsc::Receiver<Command>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    inner.flush().await;
                }
                command = commands.recv() => match command {
                    Some(Command::Drain) => {
                        inner.flush().await;
                    }
                    Some(Command::Shutdown(ack)) => {
                        let _ = ack.send(());
                        break;
                    }
                    None => break,
                },
            }
        }
    })
}
