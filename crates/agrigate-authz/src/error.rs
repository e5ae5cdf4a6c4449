//! Authorization error types.
//!
//! A plain denial from a permission check is never an error: it is returned as
//! a [`PermissionCheckResult`](crate::types::PermissionCheckResult) with
//! `allowed == false`. The variants below cover requirement enforcement,
//! structural mistakes (malformed permissions) and infrastructure failures.

use std::fmt;

use serde_json::{Value, json};

/// Errors raised by the authorization engine.
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// No authenticated user was supplied.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description of why the request is unauthorized.
        message: String,
    },

    /// Generic denial.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Description of why access is forbidden.
        message: String,
    },

    /// The user's role is below the required level or not in the allowed set.
    #[error("Insufficient role: requires {required}, user has {actual}")]
    InsufficientRole {
        /// Human-readable description of the required role(s).
        required: String,
        /// The user's actual role.
        actual: String,
    },

    /// The user lacks a `(resource, action)` permission.
    #[error("Insufficient permission: {resource}:{action}")]
    InsufficientPermission {
        /// Resource that was requested.
        resource: String,
        /// Action that was requested.
        action: String,
        /// Reason reported by the decision algorithm.
        reason: String,
    },

    /// The resource does not exist or the caller may not know it exists.
    #[error("Resource not found: {resource}")]
    ResourceNotFound {
        /// Resource type (and id, when known).
        resource: String,
    },

    /// A permission's resource or action token is malformed.
    #[error("Invalid permission: {message}")]
    InvalidPermission {
        /// Description of the formatting problem.
        message: String,
    },

    /// A dynamic grant was used after its expiry.
    #[error("Permission expired")]
    PermissionExpired,

    /// Request rate exceeded. Defined for the shared error set; the engine
    /// never produces it.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// The audit sink rejected a write.
    #[error("Audit log failed: {message}")]
    AuditLogFailed {
        /// Description of the sink failure.
        message: String,
    },

    /// The cache backend failed or timed out on an operation that must not
    /// fail open (invalidation).
    #[error("Cache error: {message}")]
    Cache {
        /// Description of the cache failure.
        message: String,
    },

    /// The engine configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthzError {
    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a new `Forbidden` error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a new `InsufficientRole` error.
    #[must_use]
    pub fn insufficient_role(required: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InsufficientRole {
            required: required.into(),
            actual: actual.into(),
        }
    }

    /// Creates a new `InsufficientPermission` error.
    #[must_use]
    pub fn insufficient_permission(
        resource: impl Into<String>,
        action: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InsufficientPermission {
            resource: resource.into(),
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `ResourceNotFound` error.
    #[must_use]
    pub fn resource_not_found(resource: impl Into<String>) -> Self {
        Self::ResourceNotFound {
            resource: resource.into(),
        }
    }

    /// Creates a new `InvalidPermission` error.
    #[must_use]
    pub fn invalid_permission(message: impl Into<String>) -> Self {
        Self::InvalidPermission {
            message: message.into(),
        }
    }

    /// Creates a new `AuditLogFailed` error.
    #[must_use]
    pub fn audit_log_failed(message: impl Into<String>) -> Self {
        Self::AuditLogFailed {
            message: message.into(),
        }
    }

    /// Creates a new `Cache` error.
    #[must_use]
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the stable error code used by callers and transport layers.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::InsufficientRole { .. } => "INSUFFICIENT_ROLE",
            Self::InsufficientPermission { .. } => "INSUFFICIENT_PERMISSION",
            Self::ResourceNotFound { .. } => "RESOURCE_NOT_FOUND",
            Self::InvalidPermission { .. } => "INVALID_PERMISSION",
            Self::PermissionExpired => "PERMISSION_EXPIRED",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::AuditLogFailed { .. } => "AUDIT_LOG_FAILED",
            Self::Cache { .. } => "CACHE_ERROR",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Returns the HTTP-style status code associated with this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized { .. } => 401,
            Self::Forbidden { .. }
            | Self::InsufficientRole { .. }
            | Self::InsufficientPermission { .. }
            | Self::PermissionExpired => 403,
            Self::ResourceNotFound { .. } => 404,
            Self::InvalidPermission { .. } => 400,
            Self::RateLimitExceeded => 429,
            Self::AuditLogFailed { .. }
            | Self::Cache { .. }
            | Self::Configuration { .. }
            | Self::Internal { .. } => 500,
        }
    }

    /// Returns structured details for the error, if any.
    #[must_use]
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::InsufficientRole { required, actual } => Some(json!({
                "required": required,
                "actual": actual,
            })),
            Self::InsufficientPermission {
                resource,
                action,
                reason,
            } => Some(json!({
                "resource": resource,
                "action": action,
                "reason": reason,
            })),
            Self::ResourceNotFound { resource } => Some(json!({ "resource": resource })),
            Self::InvalidPermission { message } => Some(json!({ "message": message })),
            _ => None,
        }
    }

    /// Serializes the error as `{code, statusCode, message, details}`.
    #[must_use]
    pub fn to_body(&self) -> Value {
        let mut body = json!({
            "code": self.code(),
            "statusCode": self.status_code(),
            "message": self.to_string(),
        });
        if let Some(details) = self.details() {
            body["details"] = details;
        }
        body
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Unauthorized { .. } => ErrorCategory::Authentication,
            Self::Forbidden { .. }
            | Self::InsufficientRole { .. }
            | Self::InsufficientPermission { .. }
            | Self::ResourceNotFound { .. }
            | Self::PermissionExpired => ErrorCategory::Authorization,
            Self::InvalidPermission { .. } => ErrorCategory::Validation,
            Self::RateLimitExceeded => ErrorCategory::Throttling,
            Self::AuditLogFailed { .. } | Self::Cache { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of authorization errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Missing or invalid identity.
    Authentication,
    /// Permission checks.
    Authorization,
    /// Malformed input.
    Validation,
    /// Rate limiting.
    Throttling,
    /// Cache or audit storage failures.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::Validation => write!(f, "validation"),
            Self::Throttling => write!(f, "throttling"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthzError::invalid_permission("resource 'Medicines' must match ^[a-z_]+$");
        assert_eq!(
            err.to_string(),
            "Invalid permission: resource 'Medicines' must match ^[a-z_]+$"
        );

        let err = AuthzError::insufficient_permission("submissions", "approve", "no matching permissions");
        assert_eq!(err.to_string(), "Insufficient permission: submissions:approve");

        assert_eq!(AuthzError::PermissionExpired.to_string(), "Permission expired");
    }

    #[test]
    fn test_codes_and_status() {
        assert_eq!(AuthzError::unauthorized("x").code(), "UNAUTHORIZED");
        assert_eq!(AuthzError::unauthorized("x").status_code(), 401);
        assert_eq!(AuthzError::forbidden("x").status_code(), 403);
        assert_eq!(AuthzError::insufficient_role("DINAS", "PPL").code(), "INSUFFICIENT_ROLE");
        assert_eq!(AuthzError::resource_not_found("submissions").status_code(), 404);
        assert_eq!(AuthzError::invalid_permission("x").status_code(), 400);
        assert_eq!(AuthzError::RateLimitExceeded.status_code(), 429);
        assert_eq!(AuthzError::audit_log_failed("x").code(), "AUDIT_LOG_FAILED");
        assert_eq!(AuthzError::cache("timeout").status_code(), 500);
    }

    #[test]
    fn test_error_predicates() {
        assert!(AuthzError::forbidden("x").is_client_error());
        assert!(!AuthzError::forbidden("x").is_server_error());
        assert!(AuthzError::internal("x").is_server_error());
        assert_eq!(
            AuthzError::insufficient_role("ADMIN", "PPL").category(),
            ErrorCategory::Authorization
        );
        assert_eq!(
            AuthzError::cache("x").category(),
            ErrorCategory::Infrastructure
        );
    }

    #[test]
    fn test_error_body_includes_details() {
        let body = AuthzError::insufficient_role("DINAS", "PPL").to_body();
        assert_eq!(body["code"], "INSUFFICIENT_ROLE");
        assert_eq!(body["statusCode"], 403);
        assert_eq!(body["details"]["required"], "DINAS");
        assert_eq!(body["details"]["actual"], "PPL");

        let body = AuthzError::PermissionExpired.to_body();
        assert!(body.get("details").is_none());
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Authorization.to_string(), "authorization");
        assert_eq!(ErrorCategory::Infrastructure.to_string(), "infrastructure");
    }
}
