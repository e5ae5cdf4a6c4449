//! Buffered audit logger.
//!
//! `log_access` only redacts and enqueues, so the request path never waits on
//! the sink. A background task drains the queue in batches every
//! `flush_interval`, or as soon as the queue reaches `max_queue_size`. A batch
//! the sink rejects goes back to the front of the queue and is retried on the
//! next flush, so entries are delivered at least once. Past `max_pending`
//! queued entries, new entries are dropped and counted.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use super::entry::{AuditLogEntry, LogOptions, RequestMeta};
use super::redact::redact;
use super::sink::{AuditError, AuditQuery, AuditSink, InMemoryAuditSink, sink_from_config};
use crate::config::AuditConfig;

/// Logger counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuditStats {
    /// Entries waiting for the next flush.
    pub queued: usize,
    /// Entries accepted into the queue.
    pub enqueued: u64,
    /// Entries written to the sink.
    pub flushed: u64,
    /// Sink writes that failed.
    pub failed_batches: u64,
    /// Entries discarded because the queue was full.
    pub dropped: u64,
}

struct Inner {
    config: AuditConfig,
    sink: Arc<dyn AuditSink>,
    queue: Mutex<VecDeque<AuditLogEntry>>,
    notify: Notify,
    flush_lock: tokio::sync::Mutex<()>,
    shutdown: AtomicBool,
    enqueued: AtomicU64,
    flushed: AtomicU64,
    failed_batches: AtomicU64,
    dropped: AtomicU64,
}

impl Inner {
    fn queue(&self) -> MutexGuard<'_, VecDeque<AuditLogEntry>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_batch(&self) -> Vec<AuditLogEntry> {
        let mut queue = self.queue();
        let n = self.config.batch_size.max(1).min(queue.len());
        queue.drain(..n).collect()
    }

    fn requeue_front(&self, batch: Vec<AuditLogEntry>) {
        let mut queue = self.queue();
        for entry in batch.into_iter().rev() {
            queue.push_front(entry);
        }
    }

    /// Drain the queue into the sink. Stops at the first failed batch.
    async fn flush(&self) -> Result<usize, AuditError> {
        let _guard = self.flush_lock.lock().await;
        let mut written = 0;

        loop {
            let batch = self.take_batch();
            if batch.is_empty() {
                break;
            }
            let len = batch.len();

            match self.sink.write_batch(&batch).await {
                Ok(()) => {
                    written += len;
                    self.flushed.fetch_add(len as u64, Ordering::Relaxed);
                }
                Err(e) => {
                    self.failed_batches.fetch_add(1, Ordering::Relaxed);
                    self.requeue_front(batch);
                    tracing::error!(error = %e, entries = len, "Failed to write audit batch");
                    return Err(e);
                }
            }
        }

        if written > 0 {
            tracing::debug!(entries = written, "Flushed audit entries");
        }
        Ok(written)
    }
}

/// Asynchronous audit logger.
pub struct AuditLogger {
    inner: Arc<Inner>,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl AuditLogger {
    /// Create a logger writing to `sink` and start its flush task.
    ///
    /// Must be called within a Tokio runtime when `config.enabled` is set.
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>, config: AuditConfig) -> Self {
        let enabled = config.enabled;
        let inner = Arc::new(Inner {
            config,
            sink,
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            flush_lock: tokio::sync::Mutex::new(()),
            shutdown: AtomicBool::new(false),
            enqueued: AtomicU64::new(0),
            flushed: AtomicU64::new(0),
            failed_batches: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });

        let flush_task = enabled.then(|| start_flush_task(Arc::clone(&inner)));

        Self {
            inner,
            flush_task: Mutex::new(flush_task),
        }
    }

    /// Create a logger with the sink named by `config.sink`.
    #[must_use]
    pub fn from_config(config: AuditConfig) -> Self {
        let sink = sink_from_config(&config.sink);
        Self::new(sink, config)
    }

    /// A logger that discards every entry.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(
            Arc::new(InMemoryAuditSink::new()),
            AuditConfig {
                enabled: false,
                ..AuditConfig::default()
            },
        )
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.config.enabled
    }

    #[must_use]
    pub fn config(&self) -> &AuditConfig {
        &self.inner.config
    }

    /// Enqueue an entry. Never blocks on the sink and never fails.
    pub fn log_access(&self, mut entry: AuditLogEntry, meta: Option<&RequestMeta>, options: LogOptions) {
        if !self.is_enabled() || self.inner.shutdown.load(Ordering::Acquire) {
            return;
        }

        if let Some(meta) = meta {
            entry.apply_meta(meta);
        }
        if let Some(context) = entry.context.as_mut() {
            redact(context);
        }

        let queued = {
            let mut queue = self.inner.queue();
            if queue.len() >= self.inner.config.max_pending {
                drop(queue);
                let dropped = self.inner.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::error!(
                    user_id = %entry.user_id,
                    action = %entry.action,
                    resource = %entry.resource,
                    dropped,
                    "Audit queue full, dropping entry"
                );
                return;
            }
            queue.push_back(entry);
            queue.len()
        };
        self.inner.enqueued.fetch_add(1, Ordering::Relaxed);

        if options.flush_immediately || queued >= self.inner.config.max_queue_size {
            self.inner.notify.notify_one();
        }
    }

    /// Write everything queued now. Returns the number of entries written.
    pub async fn flush(&self) -> Result<usize, AuditError> {
        self.inner.flush().await
    }

    /// Stop the flush task and drain the queue.
    ///
    /// Entries logged after shutdown are discarded. If the final drain fails
    /// the error is returned and the entries stay queued.
    pub async fn shutdown(&self) -> Result<(), AuditError> {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.notify.notify_one();

        let handle = self
            .flush_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::warn!(error = %e, "Audit flush task ended abnormally");
        }

        self.inner.flush().await?;
        tracing::info!(flushed = self.inner.flushed.load(Ordering::Relaxed), "Audit logger stopped");
        Ok(())
    }

    #[must_use]
    pub fn stats(&self) -> AuditStats {
        AuditStats {
            queued: self.inner.queue().len(),
            enqueued: self.inner.enqueued.load(Ordering::Relaxed),
            flushed: self.inner.flushed.load(Ordering::Relaxed),
            failed_batches: self.inner.failed_batches.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
        }
    }

    /// Run a query against the sink. Queued entries are not visible until flushed.
    pub async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>, AuditError> {
        self.inner.sink.query(query).await
    }

    pub async fn logs_for_user(&self, user_id: &str, limit: Option<usize>) -> Result<Vec<AuditLogEntry>, AuditError> {
        let mut query = AuditQuery::for_user(user_id);
        query.limit = limit;
        self.query(&query).await
    }

    pub async fn logs_for_resource(
        &self,
        resource: &str,
        resource_id: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<AuditLogEntry>, AuditError> {
        let mut query = AuditQuery::for_resource(resource, resource_id);
        query.limit = limit;
        self.query(&query).await
    }

    /// Denials and permission changes.
    pub async fn security_events(&self, limit: Option<usize>) -> Result<Vec<AuditLogEntry>, AuditError> {
        let mut query = AuditQuery::security_events();
        query.limit = limit;
        self.query(&query).await
    }
}

impl Drop for AuditLogger {
    fn drop(&mut self) {
        if let Some(handle) = self
            .flush_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

/// Periodically drain the queue until shutdown.
fn start_flush_task(inner: Arc<Inner>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(inner.config.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = inner.notify.notified() => {}
            }

            if inner.shutdown.load(Ordering::Acquire) {
                break;
            }

            // Failures are logged inside flush; the batch is retried next round.
            let _ = inner.flush().await;
        }

        tracing::debug!("Audit flush task stopped");
    })
}
