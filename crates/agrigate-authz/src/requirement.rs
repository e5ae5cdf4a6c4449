//! Declarative route requirements.
//!
//! A handler states what it needs as a [`Requirement`]; [`enforce`] turns an
//! unmet requirement into a typed [`AuthzError`] the transport layer can map
//! to a response.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::AuthzResult;
use crate::error::AuthzError;
use crate::policy::{CheckOptions, PermissionContext};
use crate::service::AuthorizationService;
use crate::types::{AuthenticatedUser, PermissionRequest, Role};

/// What a caller must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Requirement {
    /// Any active user.
    Authenticated,
    /// A role at or above the given level.
    MinimumRole { role: Role },
    /// One of the listed roles.
    AnyRole { roles: Vec<Role> },
    /// One `(resource, action)` permission.
    Permission { resource: String, action: String },
    /// At least one of the listed permissions.
    AnyPermission { permissions: Vec<PermissionRequest> },
    /// Every listed permission.
    AllPermissions { permissions: Vec<PermissionRequest> },
    /// Access to the record named by the scope's resource id.
    ResourceAccess { resource: String, action: String },
}

impl Requirement {
    #[must_use]
    pub fn minimum_role(role: Role) -> Self {
        Self::MinimumRole { role }
    }

    #[must_use]
    pub fn any_role(roles: impl IntoIterator<Item = Role>) -> Self {
        Self::AnyRole {
            roles: roles.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn permission(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self::Permission {
            resource: resource.into(),
            action: action.into(),
        }
    }

    #[must_use]
    pub fn resource_access(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self::ResourceAccess {
            resource: resource.into(),
            action: action.into(),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authenticated => write!(f, "authenticated"),
            Self::MinimumRole { role } => write!(f, "role >= {role}"),
            Self::AnyRole { roles } => write!(f, "role in [{}]", join(roles)),
            Self::Permission { resource, action } => write!(f, "{resource}:{action}"),
            Self::AnyPermission { permissions } => write!(f, "any of [{}]", join(permissions)),
            Self::AllPermissions { permissions } => write!(f, "all of [{}]", join(permissions)),
            Self::ResourceAccess { resource, action } => write!(f, "{resource}/<id>:{action}"),
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Request-specific inputs to [`enforce`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Scope<'a> {
    /// Target record id, if the route addresses one.
    pub resource_id: Option<&'a str>,
    /// Request fields and optional record snapshot.
    pub context: Option<&'a PermissionContext>,
    /// Evaluation switches for `Permission` requirements.
    pub options: CheckOptions,
}

impl<'a> Scope<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_resource_id(mut self, id: &'a str) -> Self {
        self.resource_id = Some(id);
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: &'a PermissionContext) -> Self {
        self.context = Some(context);
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: CheckOptions) -> Self {
        self.options = options;
        self
    }
}

/// Check `requirement` for `user`.
///
/// # Errors
///
/// - `Unauthorized` without a user
/// - `Forbidden` for an inactive user
/// - `InsufficientRole` for failed role requirements
/// - `InsufficientPermission` for failed permission requirements
/// - `ResourceNotFound` for a denied record, so its existence is not revealed
/// - `Internal` for a resource requirement without a resource id in scope
pub async fn enforce(
    service: &AuthorizationService,
    user: Option<&AuthenticatedUser>,
    requirement: &Requirement,
    scope: Scope<'_>,
) -> AuthzResult<()> {
    let user = user.ok_or_else(|| AuthzError::unauthorized("authentication required"))?;
    if !user.is_active() {
        return Err(AuthzError::forbidden(format!("account {} is {}", user.id, user.status)));
    }

    match requirement {
        Requirement::Authenticated => Ok(()),

        Requirement::MinimumRole { role } => {
            if user.role.is_at_least(*role) {
                Ok(())
            } else {
                Err(AuthzError::insufficient_role(format!("{role} or higher"), user.role.as_str()))
            }
        }

        Requirement::AnyRole { roles } => {
            if roles.contains(&user.role) {
                Ok(())
            } else {
                Err(AuthzError::insufficient_role(join(roles), user.role.as_str()))
            }
        }

        Requirement::Permission { resource, action } => {
            let result = service
                .check_permission(user, resource, action, scope.resource_id, scope.context, scope.options)
                .await;
            if result.allowed {
                Ok(())
            } else {
                Err(AuthzError::insufficient_permission(resource, action, result.reason))
            }
        }

        Requirement::AnyPermission { permissions } => {
            if service.has_any_permission(user, permissions, scope.context).await {
                return Ok(());
            }
            Err(AuthzError::insufficient_permission(
                permissions.iter().map(|p| p.resource.as_str()).collect::<Vec<_>>().join("|"),
                permissions.iter().map(|p| p.action.as_str()).collect::<Vec<_>>().join("|"),
                "none of the permissions is granted",
            ))
        }

        Requirement::AllPermissions { permissions } => {
            let missing = service
                .missing_permissions(user, permissions, scope.context)
                .await;
            match missing.first() {
                None => Ok(()),
                Some(first) => Err(AuthzError::insufficient_permission(
                    &first.resource,
                    &first.action,
                    format!("missing {}", join(&missing)),
                )),
            }
        }

        Requirement::ResourceAccess { resource, action } => {
            let resource_id = scope.resource_id.ok_or_else(|| {
                AuthzError::internal(format!("requirement {requirement} needs a resource id"))
            })?;
            let data = scope.context.and_then(|c| c.resource.as_ref());
            if service
                .can_access_resource(user, resource, resource_id, action, data)
                .await
            {
                Ok(())
            } else {
                Err(AuthzError::resource_not_found(format!("{resource}/{resource_id}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::audit::AuditLogger;
    use crate::cache::PermissionCache;
    use crate::guard::ResourceGuard;
    use crate::policy::{PermissionCatalog, PermissionManager};
    use crate::types::{Permission, UserStatus};

    fn service() -> AuthorizationService {
        AuthorizationService::new(
            PermissionManager::new(Arc::new(PermissionCatalog::with_defaults())),
            ResourceGuard::with_defaults(),
            PermissionCache::disabled(),
            AuditLogger::disabled(),
        )
    }

    fn user(role: Role) -> AuthenticatedUser {
        AuthenticatedUser::new("u1", "u1@example.com", role)
    }

    #[tokio::test]
    async fn test_missing_user_is_unauthorized() {
        let svc = service();
        let err = enforce(&svc, None, &Requirement::Authenticated, Scope::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
        assert_eq!(err.status_code(), 401);
    }

    #[tokio::test]
    async fn test_inactive_user_is_forbidden() {
        let svc = service();
        let suspended = user(Role::Admin).with_status(UserStatus::Suspended);
        let err = enforce(&svc, Some(&suspended), &Requirement::Authenticated, Scope::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
    }

    #[tokio::test]
    async fn test_role_requirements() {
        let svc = service();
        let popt = user(Role::Popt);

        enforce(&svc, Some(&popt), &Requirement::minimum_role(Role::Ppl), Scope::new())
            .await
            .unwrap();

        let err = enforce(&svc, Some(&popt), &Requirement::minimum_role(Role::Dinas), Scope::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_ROLE");
        assert_eq!(err.details().unwrap()["actual"], "POPT");

        enforce(
            &svc,
            Some(&popt),
            &Requirement::any_role([Role::Ppl, Role::Popt]),
            Scope::new(),
        )
        .await
        .unwrap();
        assert!(
            enforce(&svc, Some(&popt), &Requirement::any_role([Role::Admin]), Scope::new())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_permission_requirements() {
        let svc = service();
        let ppl = user(Role::Ppl);

        enforce(&svc, Some(&ppl), &Requirement::permission("submissions", "create"), Scope::new())
            .await
            .unwrap();

        let err = enforce(&svc, Some(&ppl), &Requirement::permission("submissions", "approve"), Scope::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_PERMISSION");
        assert_eq!(err.details().unwrap()["reason"], "no matching permissions");

        let admin = user(Role::Admin);
        svc.update_role_permissions("root", Role::Admin, vec![Permission::new("reports", "view")])
            .await
            .unwrap();
        let requirement = Requirement::permission("medicines", "delete");
        enforce(&svc, Some(&admin), &requirement, Scope::new()).await.unwrap();
        let err = enforce(
            &svc,
            Some(&admin),
            &requirement,
            Scope::new().with_options(CheckOptions::strict()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_PERMISSION");

        let any = Requirement::AnyPermission {
            permissions: vec![
                PermissionRequest::new("submissions", "approve"),
                PermissionRequest::new("submissions", "create"),
            ],
        };
        enforce(&svc, Some(&ppl), &any, Scope::new()).await.unwrap();

        let all = Requirement::AllPermissions {
            permissions: vec![
                PermissionRequest::new("submissions", "create"),
                PermissionRequest::new("submissions", "approve"),
            ],
        };
        let err = enforce(&svc, Some(&ppl), &all, Scope::new()).await.unwrap_err();
        assert_eq!(err.details().unwrap()["action"], "approve");
    }

    #[tokio::test]
    async fn test_resource_access_hides_existence() {
        let svc = service();
        let ppl = user(Role::Ppl);
        let foreign = PermissionContext::new().with_resource_value(&json!({"created_by": "u2"}));
        let requirement = Requirement::resource_access("submissions", "view");

        let err = enforce(
            &svc,
            Some(&ppl),
            &requirement,
            Scope::new().with_resource_id("s-1").with_context(&foreign),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "RESOURCE_NOT_FOUND");
        assert_eq!(err.status_code(), 404);

        let own = PermissionContext::new().with_resource_value(&json!({"created_by": "u1"}));
        enforce(
            &svc,
            Some(&ppl),
            &requirement,
            Scope::new().with_resource_id("s-1").with_context(&own),
        )
        .await
        .unwrap();

        let err = enforce(&svc, Some(&ppl), &requirement, Scope::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_requirement_serde() {
        let requirement: Requirement =
            serde_json::from_value(json!({"type": "minimum_role", "role": "DINAS"})).unwrap();
        assert_eq!(requirement, Requirement::minimum_role(Role::Dinas));
        assert_eq!(requirement.to_string(), "role >= DINAS");
    }
}
