//! Audit log entries.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// Outcome recorded for an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    Granted,
    Denied,
}

impl AuditResult {
    #[must_use]
    pub fn from_allowed(allowed: bool) -> Self {
        if allowed { Self::Granted } else { Self::Denied }
    }
}

impl fmt::Display for AuditResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Granted => write!(f, "granted"),
            Self::Denied => write!(f, "denied"),
        }
    }
}

/// What kind of event an entry records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    /// A permission or resource access decision.
    #[default]
    Access,
    /// A grant, revoke or catalog edit.
    PermissionChange,
}

/// Request metadata attached by the calling layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMeta {
    pub ip_address: Option<IpAddr>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
}

impl RequestMeta {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn ip_address(mut self, ip: IpAddr) -> Self {
        self.ip_address = Some(ip);
        self
    }

    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    #[must_use]
    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// Per-call logging switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Wake the flush task right after enqueueing.
    pub flush_immediately: bool,
}

impl LogOptions {
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            flush_immediately: true,
        }
    }
}

/// An append-only record of one audited action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub user_id: String,
    pub action: String,
    pub resource: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    pub result: AuditResult,

    #[serde(default)]
    pub category: AuditCategory,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Request context, redacted before persistence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<IpAddr>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl AuditLogEntry {
    /// Start building an entry for `user_id` performing `action` on `resource`.
    #[must_use]
    pub fn builder(
        user_id: impl Into<String>,
        action: impl Into<String>,
        resource: impl Into<String>,
    ) -> AuditEntryBuilder {
        AuditEntryBuilder::new(user_id, action, resource)
    }

    /// Denials and permission changes.
    #[must_use]
    pub fn is_security_event(&self) -> bool {
        self.result == AuditResult::Denied || self.category == AuditCategory::PermissionChange
    }

    /// Fill request metadata the entry does not carry yet.
    pub fn apply_meta(&mut self, meta: &RequestMeta) {
        if self.ip_address.is_none() {
            self.ip_address = meta.ip_address;
        }
        if self.user_agent.is_none() {
            self.user_agent.clone_from(&meta.user_agent);
        }
        if self.request_id.is_none() {
            self.request_id.clone_from(&meta.request_id);
        }
    }
}

/// Builder for [`AuditLogEntry`].
#[derive(Debug, Clone)]
pub struct AuditEntryBuilder {
    user_id: String,
    action: String,
    resource: String,
    resource_id: Option<String>,
    result: AuditResult,
    category: AuditCategory,
    reason: Option<String>,
    context: Option<Value>,
}

impl AuditEntryBuilder {
    fn new(user_id: impl Into<String>, action: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            action: action.into(),
            resource: resource.into(),
            resource_id: None,
            result: AuditResult::Granted,
            category: AuditCategory::Access,
            reason: None,
            context: None,
        }
    }

    #[must_use]
    pub fn resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn maybe_resource_id(mut self, id: Option<&str>) -> Self {
        self.resource_id = id.map(str::to_string);
        self
    }

    #[must_use]
    pub fn result(mut self, result: AuditResult) -> Self {
        self.result = result;
        self
    }

    #[must_use]
    pub fn allowed(self, allowed: bool) -> Self {
        self.result(AuditResult::from_allowed(allowed))
    }

    #[must_use]
    pub fn category(mut self, category: AuditCategory) -> Self {
        self.category = category;
        self
    }

    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[must_use]
    pub fn context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    #[must_use]
    pub fn build(self) -> AuditLogEntry {
        AuditLogEntry {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            action: self.action,
            resource: self.resource,
            resource_id: self.resource_id,
            result: self.result,
            category: self.category,
            reason: self.reason,
            context: self.context,
            ip_address: None,
            user_agent: None,
            request_id: None,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}
