//! # agrigate-authz
//!
//! Permission evaluation engine for the agrigate distribution backend.
//!
//! This crate provides:
//! - A role catalog with conditioned permissions and wildcard entries
//! - Per-user dynamic grants with expiry
//! - Condition evaluation with `${user.*}` and `${resource.*}` references
//! - Record-level access control: ownership, role bypass, inheritance
//! - Access queries for list endpoints
//! - Decision caching with targeted invalidation
//! - Buffered, redacted audit logging
//!
//! ## Overview
//!
//! The engine is handed an already-authenticated user. It never
//! authenticates, and a denial is data rather than an error. Callers hold one
//! [`AuthorizationService`] built at startup and pass it by reference.
//!
//! ## Modules
//!
//! - [`types`] - Roles, users, permissions, grants and decision results
//! - [`policy`] - Catalog, condition evaluator and decision algorithm
//! - [`guard`] - Resource-instance access control and access queries
//! - [`cache`] - Decision and snapshot caching
//! - [`audit`] - Audit entries, sinks and the buffered logger
//! - [`service`] - The façade orchestrating all of the above
//! - [`requirement`] - Declarative route requirements
//! - [`config`] - Engine configuration and loader
//! - [`error`] - Error taxonomy

pub mod audit;
pub mod cache;
pub mod config;
pub mod error;
pub mod guard;
pub mod policy;
pub mod requirement;
pub mod service;
pub mod types;

pub use audit::{AuditLogEntry, AuditLogger, AuditResult, LogOptions, RequestMeta};
pub use cache::PermissionCache;
pub use config::{AuthzConfig, ConfigError};
pub use error::{AuthzError, ErrorCategory};
pub use guard::{AccessQuery, MembershipResolver, ResourceGuard, ResourceGuardConfig};
pub use policy::{CheckOptions, PermissionCatalog, PermissionContext, PermissionManager, PermissionSnapshot};
pub use requirement::{Requirement, Scope, enforce};
pub use service::AuthorizationService;
pub use types::{
    AuthenticatedUser, Condition, DynamicPermission, Operator, Permission, PermissionCheckResult,
    PermissionRequest, Role, UserStatus,
};

/// Type alias for authorization results.
pub type AuthzResult<T> = Result<T, AuthzError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use agrigate_authz::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthzResult;
    pub use crate::audit::{AuditLogEntry, AuditLogger, LogOptions, RequestMeta};
    pub use crate::config::{AuthzConfig, ConfigError};
    pub use crate::error::{AuthzError, ErrorCategory};
    pub use crate::guard::{AccessQuery, ResourceGuard};
    pub use crate::policy::{CheckOptions, PermissionContext, PermissionManager};
    pub use crate::requirement::{Requirement, Scope, enforce};
    pub use crate::service::AuthorizationService;
    pub use crate::types::{
        AuthenticatedUser, Condition, Operator, Permission, PermissionCheckResult,
        PermissionRequest, Role,
    };
}
