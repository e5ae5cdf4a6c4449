//! Audit trail of authorization decisions and permission changes.

pub mod entry;
pub mod logger;
pub mod redact;
pub mod sink;

pub use entry::{AuditCategory, AuditEntryBuilder, AuditLogEntry, AuditResult, LogOptions, RequestMeta};
pub use logger::{AuditLogger, AuditStats};
pub use redact::{REDACTED, is_sensitive_key, redact};
pub use sink::{AuditError, AuditQuery, AuditSink, FileAuditSink, InMemoryAuditSink, sink_from_config};
