//! Decision results.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use super::{Condition, Permission};

/// Reason reported when the super-admin shortcut allows a check.
pub const REASON_SUPER_ADMIN: &str = "super admin";
/// Reason reported when a candidate permission allows a check.
pub const REASON_GRANTED: &str = "permission granted";
/// Reason reported when no candidate matches the requested pair.
pub const REASON_NO_MATCH: &str = "no matching permissions";
/// Reason reported when every candidate failed its conditions.
pub const REASON_CONDITIONS_NOT_MET: &str = "permission conditions not met";
/// Reason reported when the resource guard denies an otherwise allowed check.
pub const REASON_RESOURCE_DENIED: &str = "resource access denied";

/// Outcome of evaluating one condition, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedCondition {
    /// The condition as declared.
    pub condition: Condition,

    /// The field value found in the context, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,

    /// The comparison value after reference resolution.
    pub expected: Value,

    /// Whether the condition held.
    pub passed: bool,
}

/// Result of a permission check. A denial is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionCheckResult {
    /// Whether the action is allowed.
    pub allowed: bool,

    /// Human-readable reason.
    pub reason: String,

    /// Conditions evaluated while reaching the decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluated_conditions: Option<Vec<EvaluatedCondition>>,

    /// Permissions that produced an allow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_permissions: Option<Vec<Permission>>,

    /// Instant after which the decision must not be reused (set when an allow
    /// depends on an expiring grant).
    #[serde(skip)]
    pub valid_until: Option<OffsetDateTime>,
}

impl PermissionCheckResult {
    /// An allow with the given reason.
    #[must_use]
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            evaluated_conditions: None,
            applied_permissions: None,
            valid_until: None,
        }
    }

    /// A denial with the given reason.
    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            evaluated_conditions: None,
            applied_permissions: None,
            valid_until: None,
        }
    }

    /// Attach evaluated condition diagnostics.
    #[must_use]
    pub fn with_evaluated_conditions(mut self, evaluated: Vec<EvaluatedCondition>) -> Self {
        if !evaluated.is_empty() {
            self.evaluated_conditions = Some(evaluated);
        }
        self
    }

    /// Attach the permission that produced the allow.
    #[must_use]
    pub fn with_applied(mut self, permission: Permission) -> Self {
        self.applied_permissions
            .get_or_insert_with(Vec::new)
            .push(permission);
        self
    }

    /// Bound the reuse window of this decision.
    #[must_use]
    pub fn with_valid_until(mut self, until: Option<OffsetDateTime>) -> Self {
        self.valid_until = until;
        self
    }
}
