//! Audit sinks: where flushed entries end up.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use super::entry::{AuditCategory, AuditLogEntry, AuditResult};
use crate::config::AuditSinkConfig;
use crate::error::AuthzError;

/// Audit sink errors.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<AuditError> for AuthzError {
    fn from(err: AuditError) -> Self {
        AuthzError::audit_log_failed(err.to_string())
    }
}

/// Filter for audit queries. Results are newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditQuery {
    pub user_id: Option<String>,
    pub resource: Option<String>,
    pub resource_id: Option<String>,
    pub result: Option<AuditResult>,
    pub category: Option<AuditCategory>,
    /// Only denials and permission changes.
    pub security_only: bool,
    pub since: Option<OffsetDateTime>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn for_resource(resource: impl Into<String>, resource_id: Option<&str>) -> Self {
        Self {
            resource: Some(resource.into()),
            resource_id: resource_id.map(str::to_string),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn security_events() -> Self {
        Self {
            security_only: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn since(mut self, since: OffsetDateTime) -> Self {
        self.since = Some(since);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns `true` if `entry` passes every set filter.
    #[must_use]
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        if let Some(user_id) = &self.user_id
            && entry.user_id != *user_id
        {
            return false;
        }
        if let Some(resource) = &self.resource
            && entry.resource != *resource
        {
            return false;
        }
        if let Some(resource_id) = &self.resource_id
            && entry.resource_id.as_deref() != Some(resource_id.as_str())
        {
            return false;
        }
        if let Some(result) = self.result
            && entry.result != result
        {
            return false;
        }
        if let Some(category) = self.category
            && entry.category != category
        {
            return false;
        }
        if self.security_only && !entry.is_security_event() {
            return false;
        }
        if let Some(since) = self.since
            && entry.timestamp < since
        {
            return false;
        }
        true
    }

    /// Filter, order newest first and apply the limit.
    fn select<'a>(&self, entries: impl DoubleEndedIterator<Item = &'a AuditLogEntry>) -> Vec<AuditLogEntry> {
        entries
            .rev()
            .filter(|e| self.matches(e))
            .take(self.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

/// Persistent destination for audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Write a batch. Either the whole batch is accepted or an error is returned.
    async fn write_batch(&self, entries: &[AuditLogEntry]) -> Result<(), AuditError>;

    /// Read back entries matching `query`, newest first.
    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>, AuditError>;
}

/// Build the sink named by configuration.
#[must_use]
pub fn sink_from_config(config: &AuditSinkConfig) -> Arc<dyn AuditSink> {
    match config {
        AuditSinkConfig::Memory => Arc::new(InMemoryAuditSink::new()),
        AuditSinkConfig::File { path } => Arc::new(FileAuditSink::new(path)),
    }
}

// =============================================================================
// In-memory Sink
// =============================================================================

/// Sink keeping entries in process memory, in write order.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    entries: RwLock<Vec<AuditLogEntry>>,
}

impl InMemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Every stored entry, oldest first.
    pub async fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn write_batch(&self, entries: &[AuditLogEntry]) -> Result<(), AuditError> {
        self.entries.write().await.extend_from_slice(entries);
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>, AuditError> {
        let entries = self.entries.read().await;
        Ok(query.select(entries.iter()))
    }
}

// =============================================================================
// File Sink
// =============================================================================

/// Sink appending entries as JSON lines.
#[derive(Debug)]
pub struct FileAuditSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileAuditSink {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn write_batch(&self, entries: &[AuditLogEntry]) -> Result<(), AuditError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::with_capacity(entries.len() * 256);
        for entry in entries {
            serde_json::to_writer(&mut buf, entry)?;
            buf.push(b'\n');
        }

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&buf).await?;
        file.flush().await?;
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>, AuditError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditLogEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(
                    path = %self.path.display(),
                    line = line_no + 1,
                    error = %e,
                    "Skipping malformed audit line"
                ),
            }
        }

        Ok(query.select(entries.iter()))
    }
}
