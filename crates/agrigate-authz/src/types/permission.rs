//! Permissions, conditions and dynamic value references.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::AuthzResult;
use crate::error::AuthzError;

/// Wildcard token matching any resource or action.
pub const WILDCARD: &str = "*";

/// Valid resource/action token: lower-case letters and underscores.
static TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_]+$").expect("Invalid permission token regex"));

/// Returns `true` if `token` is a valid resource/action token or the wildcard.
#[must_use]
pub fn is_valid_token(token: &str) -> bool {
    token == WILDCARD || TOKEN_REGEX.is_match(token)
}

// =============================================================================
// Permission
// =============================================================================

/// A `(resource, action)` grant, optionally restricted by conditions.
///
/// All conditions must hold for the permission to apply (AND semantics).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    /// Resource token (`^[a-z_]+$`) or `*`.
    pub resource: String,

    /// Action token (`^[a-z_]+$`) or `*`.
    pub action: String,

    /// Conditions restricting when the permission applies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl Permission {
    /// Create an unconditioned permission.
    #[must_use]
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
            conditions: Vec::new(),
        }
    }

    /// The `*:*` permission.
    #[must_use]
    pub fn wildcard() -> Self {
        Self::new(WILDCARD, WILDCARD)
    }

    /// Add a condition.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Returns `true` if this permission covers the requested pair.
    ///
    /// Either side matches exactly or is the wildcard on the permission.
    #[must_use]
    pub fn matches(&self, resource: &str, action: &str) -> bool {
        (self.resource == WILDCARD || self.resource == resource)
            && (self.action == WILDCARD || self.action == action)
    }

    /// Returns `true` if the permission carries conditions.
    #[must_use]
    pub fn is_conditional(&self) -> bool {
        !self.conditions.is_empty()
    }

    /// Validate the resource and action tokens.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::InvalidPermission` if either token is malformed.
    pub fn validate(&self) -> AuthzResult<()> {
        if !is_valid_token(&self.resource) {
            return Err(AuthzError::invalid_permission(format!(
                "resource '{}' must match ^[a-z_]+$ or be '*'",
                self.resource
            )));
        }
        if !is_valid_token(&self.action) {
            return Err(AuthzError::invalid_permission(format!(
                "action '{}' must match ^[a-z_]+$ or be '*'",
                self.action
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)?;
        if !self.conditions.is_empty() {
            write!(f, " [{} condition(s)]", self.conditions.len())?;
        }
        Ok(())
    }
}

/// A bare `(resource, action)` pair used by the `has_*_permission` helpers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionRequest {
    pub resource: String,
    pub action: String,
}

impl PermissionRequest {
    #[must_use]
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
        }
    }
}

impl fmt::Display for PermissionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)
    }
}

// =============================================================================
// Condition
// =============================================================================

/// Comparison operator of a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Ne,
    In,
    Nin,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    Exists,
    /// Any operator name the engine does not know. Always evaluates `false`.
    #[serde(other)]
    Unknown,
}

impl Operator {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::In => "in",
            Self::Nin => "nin",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Contains => "contains",
            Self::Exists => "exists",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `(field, operator, value)` predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Dot path into the evaluation context (e.g. `created_by`, `resource.region.id`).
    pub field: String,

    /// Comparison operator.
    pub operator: Operator,

    /// Comparison value, possibly a dynamic reference.
    #[serde(default)]
    pub value: ConditionValue,
}

impl Condition {
    /// Create a condition. String values of the form `${user.id}` or
    /// `${resource.field}` become dynamic references.
    #[must_use]
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: ConditionValue::from(value.into()),
        }
    }

    /// `field == ${user.id}`.
    #[must_use]
    pub fn owned_by_user(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator: Operator::Eq,
            value: ConditionValue::Ref(ValueRef::UserId),
        }
    }
}

// =============================================================================
// Dynamic values
// =============================================================================

/// A value resolved at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueRef {
    /// `${user.id}`
    UserId,
    /// `${user.email}`
    UserEmail,
    /// `${user.role}`
    UserRole,
    /// `${resource.<path>}`: a field of the resource snapshot.
    ResourceField(String),
}

impl ValueRef {
    /// Parse a `${...}` token. Returns `None` for anything that is not exactly
    /// one supported reference.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        let inner = token.strip_prefix("${")?.strip_suffix('}')?.trim();
        match inner {
            "user.id" => Some(Self::UserId),
            "user.email" => Some(Self::UserEmail),
            "user.role" => Some(Self::UserRole),
            _ => inner
                .strip_prefix("resource.")
                .filter(|path| !path.is_empty())
                .map(|path| Self::ResourceField(path.to_string())),
        }
    }

    /// The `${...}` token form, used when a reference cannot be resolved.
    #[must_use]
    pub fn token(&self) -> String {
        match self {
            Self::UserId => "${user.id}".to_string(),
            Self::UserEmail => "${user.email}".to_string(),
            Self::UserRole => "${user.role}".to_string(),
            Self::ResourceField(path) => format!("${{resource.{path}}}"),
        }
    }
}

/// Right-hand side of a condition: a literal or a dynamic reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum ConditionValue {
    Literal(Value),
    Ref(ValueRef),
}

impl Default for ConditionValue {
    fn default() -> Self {
        Self::Literal(Value::Null)
    }
}

impl From<Value> for ConditionValue {
    fn from(value: Value) -> Self {
        if let Value::String(s) = &value
            && let Some(reference) = ValueRef::parse(s)
        {
            return Self::Ref(reference);
        }
        Self::Literal(value)
    }
}

impl From<ConditionValue> for Value {
    fn from(value: ConditionValue) -> Self {
        match value {
            ConditionValue::Literal(v) => v,
            ConditionValue::Ref(r) => Value::String(r.token()),
        }
    }
}
