//! Decision algorithm over the role catalog and dynamic grants.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info};

use super::catalog::PermissionCatalog;
use super::condition::ConditionEvaluator;
use super::context::PermissionContext;
use super::grants::DynamicGrantStore;
use crate::AuthzResult;
use crate::config::ManagerConfig;
use crate::types::{
    AuthenticatedUser, DynamicPermission, Permission, PermissionCheckResult, PermissionRequest,
    REASON_CONDITIONS_NOT_MET, REASON_GRANTED, REASON_NO_MATCH, REASON_SUPER_ADMIN, Role,
};

// =============================================================================
// Check Options
// =============================================================================

/// Per-call switches for [`PermissionManager::check_permission`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckOptions {
    /// Let roles in the super-admin set skip evaluation entirely.
    pub allow_super_admin: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            allow_super_admin: true,
        }
    }
}

impl CheckOptions {
    /// Options that force full evaluation, even for super admins.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            allow_super_admin: false,
        }
    }
}

// =============================================================================
// Permission Snapshot
// =============================================================================

/// Everything a user may currently do: role permissions plus live grants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionSnapshot {
    pub user_id: String,
    pub role: Role,
    pub role_permissions: Vec<Permission>,
    pub dynamic_permissions: Vec<DynamicPermission>,

    /// Earliest expiry among the included grants.
    #[serde(skip)]
    pub valid_until: Option<OffsetDateTime>,
}

impl PermissionSnapshot {
    /// Role and dynamic permissions in evaluation order.
    pub fn permissions(&self) -> impl Iterator<Item = &Permission> {
        self.role_permissions
            .iter()
            .chain(self.dynamic_permissions.iter().map(|g| &g.permission))
    }
}

// =============================================================================
// Permission Manager
// =============================================================================

/// A candidate permission and the expiry of the grant it came from.
struct Candidate<'a> {
    permission: &'a Permission,
    expires_at: Option<OffsetDateTime>,
}

/// Central decision algorithm.
///
/// Candidates are the role's catalog entries followed by the user's live
/// dynamic grants. The first matching candidate whose conditions all hold
/// allows the request; there is no priority system.
#[derive(Debug)]
pub struct PermissionManager {
    catalog: Arc<PermissionCatalog>,
    grants: DynamicGrantStore,
    config: ManagerConfig,
}

impl PermissionManager {
    /// Create a manager with the default configuration.
    #[must_use]
    pub fn new(catalog: Arc<PermissionCatalog>) -> Self {
        Self::with_config(catalog, ManagerConfig::default())
    }

    #[must_use]
    pub fn with_config(catalog: Arc<PermissionCatalog>, config: ManagerConfig) -> Self {
        Self {
            catalog,
            grants: DynamicGrantStore::new(),
            config,
        }
    }

    /// The underlying catalog.
    #[must_use]
    pub fn catalog(&self) -> &Arc<PermissionCatalog> {
        &self.catalog
    }

    /// Returns `true` if `role` is in the configured super-admin set.
    #[must_use]
    pub fn is_super_admin(&self, role: Role) -> bool {
        self.config.super_admin_roles.contains(&role)
    }

    /// Decide whether `user` may perform `action` on `resource`.
    ///
    /// `resource_id` does not influence the decision here; instance-level
    /// checks belong to the resource guard.
    #[must_use]
    pub fn check_permission(
        &self,
        user: &AuthenticatedUser,
        resource: &str,
        action: &str,
        resource_id: Option<&str>,
        context: Option<&PermissionContext>,
        options: CheckOptions,
    ) -> PermissionCheckResult {
        let result = self.check_permission_at(
            user,
            resource,
            action,
            context,
            options,
            OffsetDateTime::now_utc(),
        );

        debug!(
            user_id = %user.id,
            role = %user.role,
            resource,
            action,
            resource_id = resource_id.unwrap_or("null"),
            allowed = result.allowed,
            reason = %result.reason,
            "Permission evaluated"
        );

        result
    }

    /// [`check_permission`](Self::check_permission) with an explicit clock.
    #[must_use]
    pub fn check_permission_at(
        &self,
        user: &AuthenticatedUser,
        resource: &str,
        action: &str,
        context: Option<&PermissionContext>,
        options: CheckOptions,
        now: OffsetDateTime,
    ) -> PermissionCheckResult {
        if options.allow_super_admin && self.is_super_admin(user.role) {
            return PermissionCheckResult::allow(REASON_SUPER_ADMIN);
        }

        let role_permissions = self.catalog.role_permissions(user.role);
        let grants = self.grants.active_at(&user.id, now);

        let candidates: Vec<Candidate<'_>> = role_permissions
            .iter()
            .map(|permission| Candidate {
                permission,
                expires_at: None,
            })
            .chain(grants.iter().map(|grant| Candidate {
                permission: &grant.permission,
                expires_at: grant.expires_at,
            }))
            .filter(|c| c.permission.matches(resource, action))
            .collect();

        if candidates.is_empty() {
            return PermissionCheckResult::deny(REASON_NO_MATCH);
        }

        let empty = PermissionContext::default();
        let evaluator = ConditionEvaluator::new(user, context.unwrap_or(&empty));
        let mut diagnostics = Vec::new();

        for candidate in candidates {
            let (passed, evaluated) = evaluator.evaluate_all(&candidate.permission.conditions);
            if passed {
                return PermissionCheckResult::allow(REASON_GRANTED)
                    .with_evaluated_conditions(evaluated)
                    .with_applied(candidate.permission.clone())
                    .with_valid_until(candidate.expires_at);
            }
            diagnostics.extend(evaluated);
        }

        PermissionCheckResult::deny(REASON_CONDITIONS_NOT_MET).with_evaluated_conditions(diagnostics)
    }

    /// Returns `true` if the check allows.
    #[must_use]
    pub fn has_permission(
        &self,
        user: &AuthenticatedUser,
        resource: &str,
        action: &str,
        context: Option<&PermissionContext>,
    ) -> bool {
        self.check_permission(user, resource, action, None, context, CheckOptions::default())
            .allowed
    }

    /// Returns `true` if any request is allowed. Stops at the first allow.
    #[must_use]
    pub fn has_any_permission(
        &self,
        user: &AuthenticatedUser,
        requests: &[PermissionRequest],
        context: Option<&PermissionContext>,
    ) -> bool {
        requests
            .iter()
            .any(|r| self.has_permission(user, &r.resource, &r.action, context))
    }

    /// Returns `true` if every request is allowed.
    #[must_use]
    pub fn has_all_permissions(
        &self,
        user: &AuthenticatedUser,
        requests: &[PermissionRequest],
        context: Option<&PermissionContext>,
    ) -> bool {
        self.missing_permissions(user, requests, context).is_empty()
    }

    /// Every request that is denied, in input order. Evaluates all requests.
    #[must_use]
    pub fn missing_permissions(
        &self,
        user: &AuthenticatedUser,
        requests: &[PermissionRequest],
        context: Option<&PermissionContext>,
    ) -> Vec<PermissionRequest> {
        requests
            .iter()
            .filter(|r| !self.has_permission(user, &r.resource, &r.action, context))
            .cloned()
            .collect()
    }

    /// Role permissions plus live grants of `user`.
    #[must_use]
    pub fn permission_snapshot(&self, user: &AuthenticatedUser) -> PermissionSnapshot {
        let dynamic_permissions = self.grants.active_at(&user.id, OffsetDateTime::now_utc());
        let valid_until = dynamic_permissions.iter().filter_map(|g| g.expires_at).min();

        PermissionSnapshot {
            user_id: user.id.clone(),
            role: user.role,
            role_permissions: self.catalog.role_permissions(user.role).to_vec(),
            dynamic_permissions,
            valid_until,
        }
    }

    // -------------------------------------------------------------------------
    // Dynamic grants
    // -------------------------------------------------------------------------

    /// Store a dynamic grant.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::InvalidPermission` if the granted permission is malformed.
    pub fn add_dynamic_permission(&self, grant: DynamicPermission) -> AuthzResult<()> {
        grant.permission.validate()?;
        info!(
            user_id = %grant.user_id,
            permission = %grant.permission,
            granted_by = %grant.granted_by,
            "Dynamic permission added"
        );
        self.grants.add(grant);
        Ok(())
    }

    /// Remove the grants of `user_id` for exactly `(resource, action)`.
    pub fn remove_dynamic_permission(&self, user_id: &str, resource: &str, action: &str) -> usize {
        let removed = self.grants.remove(user_id, resource, action);
        info!(user_id, resource, action, removed, "Dynamic permission removed");
        removed
    }

    /// Remove every grant of `user_id`.
    pub fn clear_dynamic_permissions(&self, user_id: &str) -> usize {
        let removed = self.grants.clear(user_id);
        info!(user_id, removed, "Dynamic permissions cleared");
        removed
    }

    /// Every grant of `user_id`, including expired ones.
    #[must_use]
    pub fn dynamic_permissions(&self, user_id: &str) -> Vec<DynamicPermission> {
        self.grants.all(user_id)
    }
}
