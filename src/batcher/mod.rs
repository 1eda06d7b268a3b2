//! Write-back batching of status updates.
//!
//! Consumers mark rows as used by handing an [`UpdateTask`] to
//! [`UpdateBatcher::add`] instead of writing to the database. Tasks are
//! flushed as one transaction with a single `UPDATE ... WHERE id IN (...)`
//! per table, either when `max_batch` tasks are pending or on the flush
//! interval. A failed flush keeps every task for the next attempt.

mod config;
mod task;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use metrics::{counter, histogram};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::repos::{RepoError, StatusStore};
use crate::util::lock;

pub use config::BatcherConfig;
pub use task::UpdateTask;

const SOURCE: &str = "batcher";
const METRIC_FLUSH_MS: &str = "pagepool_batcher_flush_ms";
const METRIC_FLUSHED: &str = "pagepool_batcher_flushed_total";
const METRIC_SKIPPED: &str = "pagepool_batcher_skipped_total";
const METRIC_FLUSH_ERRORS: &str = "pagepool_batcher_flush_error_total";

#[derive(Debug, Error)]
pub enum FlushError {
    #[error("failed to open transaction: {0}")]
    Begin(#[source] RepoError),
    #[error("update of `{table}` failed: {source}")]
    Exec {
        table: String,
        #[source]
        source: RepoError,
    },
    #[error("failed to commit transaction: {0}")]
    Commit(#[source] RepoError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatcherStats {
    pub flushed_tasks: u64,
    pub skipped_tasks: u64,
    pub flush_errors: u64,
}

struct Shared {
    store: Arc<dyn StatusStore>,
    config: BatcherConfig,
    pending: AsyncMutex<Vec<UpdateTask>>,
    flushed: AtomicU64,
    skipped: AtomicU64,
    errors: AtomicU64,
}

impl Shared {
    async fn flush(&self, reason: &'static str) -> Result<usize, FlushError> {
        let mut pending = self.pending.lock().await;
        self.flush_locked(&mut pending, reason).await
    }

    /// Flush and log instead of returning the error; the queue is kept.
    async fn flush_logged(&self, reason: &'static str) {
        if let Err(error) = self.flush(reason).await {
            warn!(reason, error = %error, "Status flush failed; tasks retained");
        }
    }

    async fn flush_locked(
        &self,
        pending: &mut Vec<UpdateTask>,
        reason: &'static str,
    ) -> Result<usize, FlushError> {
        if pending.is_empty() {
            return Ok(0);
        }
        let started_at = Instant::now();

        let mut by_table: BTreeMap<&str, BTreeSet<i64>> = BTreeMap::new();
        for task in pending.iter() {
            by_table.entry(task.table.as_str()).or_default().insert(task.id);
        }

        let mut skipped = 0usize;
        by_table.retain(|table, _| {
            let allowed = self.config.allows(table);
            if !allowed {
                let count = pending.iter().filter(|task| task.table == *table).count();
                skipped += count;
                warn!(table, count, "Skipping status updates for unknown table");
            }
            allowed
        });

        if !by_table.is_empty() {
            let mut tx = self.store.begin().await.map_err(|source| {
                self.errors.fetch_add(1, Ordering::Relaxed);
                counter!(METRIC_FLUSH_ERRORS).increment(1);
                FlushError::Begin(source)
            })?;

            for (table, ids) in &by_table {
                let ids: Vec<i64> = ids.iter().copied().collect();
                if let Err(source) = tx.clear_pending(table, &ids).await {
                    if let Err(rollback) = tx.rollback().await {
                        warn!(error = %rollback, "Rollback after failed status update failed");
                    }
                    self.errors.fetch_add(1, Ordering::Relaxed);
                    counter!(METRIC_FLUSH_ERRORS).increment(1);
                    return Err(FlushError::Exec {
                        table: table.to_string(),
                        source,
                    });
                }
            }

            tx.commit().await.map_err(|source| {
                self.errors.fetch_add(1, Ordering::Relaxed);
                counter!(METRIC_FLUSH_ERRORS).increment(1);
                FlushError::Commit(source)
            })?;
        }

        let flushed = pending.len() - skipped;
        let tables = by_table.len();
        pending.clear();

        self.flushed.fetch_add(flushed as u64, Ordering::Relaxed);
        self.skipped.fetch_add(skipped as u64, Ordering::Relaxed);
        counter!(METRIC_FLUSHED).increment(flushed as u64);
        counter!(METRIC_SKIPPED).increment(skipped as u64);
        histogram!(METRIC_FLUSH_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        debug!(reason, flushed, skipped, tables, "Status updates flushed");
        Ok(flushed)
    }
}

/// Non-blocking, lossless batcher for "mark consumed" writes.
pub struct UpdateBatcher {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl UpdateBatcher {
    /// Create the batcher and spawn its interval flush loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(store: Arc<dyn StatusStore>, config: BatcherConfig) -> Self {
        let shared = Arc::new(Shared {
            store,
            config,
            pending: AsyncMutex::new(Vec::new()),
            flushed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        });
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(run_flush_loop(Arc::clone(&shared), cancel.clone()));

        Self {
            shared,
            cancel,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue a task. Never drops it; may wait behind an in-progress flush.
    ///
    /// Reaching `max_batch` flushes inline. After [`stop`](Self::stop) there
    /// is no interval loop left, so every task is flushed right away.
    pub async fn add(&self, task: UpdateTask) {
        let mut pending = self.shared.pending.lock().await;
        pending.push(task);

        let threshold_hit = pending.len() >= self.shared.config.max_batch;
        if threshold_hit || self.cancel.is_cancelled() {
            let reason = if threshold_hit { "max_batch" } else { "stopped" };
            if let Err(error) = self.shared.flush_locked(&mut pending, reason).await {
                warn!(error = %error, pending = pending.len(), "Inline status flush failed; tasks retained");
            }
        }
    }

    /// Flush now, surfacing the error to the caller.
    pub async fn flush(&self) -> Result<usize, FlushError> {
        self.shared.flush("manual").await
    }

    pub async fn pending_len(&self) -> usize {
        self.shared.pending.lock().await.len()
    }

    pub fn stats(&self) -> BatcherStats {
        BatcherStats {
            flushed_tasks: self.shared.flushed.load(Ordering::Relaxed),
            skipped_tasks: self.shared.skipped.load(Ordering::Relaxed),
            flush_errors: self.shared.errors.load(Ordering::Relaxed),
        }
    }

    /// Halt the interval loop, wait for it, then flush what is pending.
    ///
    /// `add` checks for cancellation under the queue lock, so a task queued
    /// concurrently is either caught by the final flush or flushed inline.
    /// Only the first call does any work.
    pub async fn stop(&self) {
        let worker = lock::lock(&self.worker, SOURCE, "stop").take();
        let Some(worker) = worker else {
            return;
        };

        self.cancel.cancel();
        if let Err(error) = worker.await {
            warn!(error = %error, "Update batcher loop ended abnormally");
        }
        self.shared.flush_logged("stop").await;
        info!(stats = ?self.stats(), "Update batcher stopped");
    }
}

impl Drop for UpdateBatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_flush_loop(shared: Arc<Shared>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(shared.config.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => shared.flush_logged("interval").await,
        }
    }
    debug!("Update batcher loop exited");
}
