//! Authorization service.
//!
//! Bundles the manager, guard, cache and audit logger behind one handle that
//! request-handling code receives by reference. Every decision goes through
//! the same path:
//!
//! ```text
//! cache lookup ──hit──────────────────────────────┐
//!      │ miss                                     │
//!      ▼                                          │
//! PermissionManager ──allowed + resource id──▶ ResourceGuard
//!      │                                          │
//!      ▼                                          ▼
//! cache store ─────────────────────────────▶ audit (enqueue) ──▶ result
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::AuthzResult;
use crate::audit::{AuditCategory, AuditLogEntry, AuditLogger, AuditStats, LogOptions, RequestMeta};
use crate::cache::{CacheStats, PermissionCache, decision_key, snapshot_key};
use crate::config::AuthzConfig;
use crate::guard::{AccessQuery, MembershipResolver, ResourceGuard};
use crate::policy::{CheckOptions, PermissionCatalog, PermissionContext, PermissionManager, PermissionSnapshot};
use crate::types::{
    AuthenticatedUser, DynamicPermission, Permission, PermissionCheckResult, PermissionRequest,
    REASON_RESOURCE_DENIED, Role,
};

/// Audit action recorded for a dynamic grant.
pub const ACTION_GRANT: &str = "grant_permission";
/// Audit action recorded for a dynamic revoke.
pub const ACTION_REVOKE: &str = "revoke_permission";
/// Audit action recorded when every grant of a user is cleared.
pub const ACTION_CLEAR_GRANTS: &str = "clear_permissions";
/// Audit action recorded for a catalog edit.
pub const ACTION_UPDATE_ROLE: &str = "update_role_permissions";

/// Façade over the permission engine.
pub struct AuthorizationService {
    manager: PermissionManager,
    guard: ResourceGuard,
    cache: PermissionCache,
    audit: AuditLogger,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for AuthorizationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationService")
            .field("guarded_resources", &self.guard.resources())
            .field("cache", &self.cache)
            .field("audit", &self.audit)
            .finish_non_exhaustive()
    }
}

impl AuthorizationService {
    /// Assemble a service from prebuilt parts. No background task is started
    /// for the cache; see [`start_cache_cleanup`](Self::start_cache_cleanup).
    #[must_use]
    pub fn new(
        manager: PermissionManager,
        guard: ResourceGuard,
        cache: PermissionCache,
        audit: AuditLogger,
    ) -> Self {
        Self {
            manager,
            guard,
            cache,
            audit,
            cleanup_task: Mutex::new(None),
        }
    }

    /// Build every part from configuration and start background tasks.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::Configuration` if validation fails, or
    /// `AuthzError::InvalidPermission` if a catalog or guard override is
    /// malformed.
    pub fn from_config(config: AuthzConfig) -> AuthzResult<Self> {
        config.validate()?;

        let catalog = match config.roles {
            Some(roles) => PermissionCatalog::new(roles)?,
            None => PermissionCatalog::with_defaults(),
        };
        let manager = PermissionManager::with_config(Arc::new(catalog), config.manager);

        let guard = match config.resources {
            Some(registry) => ResourceGuard::new(registry)?,
            None => ResourceGuard::with_defaults(),
        };

        let cache = PermissionCache::local(config.cache);
        let audit = AuditLogger::from_config(config.audit);

        let service = Self::new(manager, guard, cache, audit);
        service.start_cache_cleanup();

        info!(
            cache_enabled = service.cache.is_enabled(),
            audit_enabled = service.audit.is_enabled(),
            guarded_resources = service.guard.resources().len(),
            "Authorization service initialized"
        );
        Ok(service)
    }

    /// Replace the membership resolver used for inheritance checks.
    #[must_use]
    pub fn with_membership_resolver(mut self, resolver: Arc<dyn MembershipResolver>) -> Self {
        self.guard.set_membership_resolver(resolver);
        self
    }

    /// Start the periodic expired-entry sweep, once. No-op for a disabled cache.
    pub fn start_cache_cleanup(&self) {
        if !self.cache.is_enabled() {
            return;
        }
        let mut task = self
            .cleanup_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if task.is_none() {
            *task = Some(self.cache.start_cleanup_task());
        }
    }

    #[must_use]
    pub fn manager(&self) -> &PermissionManager {
        &self.manager
    }

    #[must_use]
    pub fn guard(&self) -> &ResourceGuard {
        &self.guard
    }

    #[must_use]
    pub fn cache(&self) -> &PermissionCache {
        &self.cache
    }

    #[must_use]
    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    #[must_use]
    pub fn audit_stats(&self) -> AuditStats {
        self.audit.stats()
    }

    // =========================================================================
    // Decisions
    // =========================================================================

    /// Decide whether `user` may perform `action` on `resource`.
    ///
    /// A denial is returned as data. The decision is audited whether it came
    /// from the cache or was computed. Strict and default `options` never
    /// share a cached decision.
    pub async fn check_permission(
        &self,
        user: &AuthenticatedUser,
        resource: &str,
        action: &str,
        resource_id: Option<&str>,
        context: Option<&PermissionContext>,
        options: CheckOptions,
    ) -> PermissionCheckResult {
        self.check_permission_with_meta(user, resource, action, resource_id, context, options, None)
            .await
    }

    /// [`check_permission`](Self::check_permission) with request metadata for the audit entry.
    #[allow(clippy::too_many_arguments)]
    pub async fn check_permission_with_meta(
        &self,
        user: &AuthenticatedUser,
        resource: &str,
        action: &str,
        resource_id: Option<&str>,
        context: Option<&PermissionContext>,
        options: CheckOptions,
        meta: Option<&RequestMeta>,
    ) -> PermissionCheckResult {
        // Read before computing: a grant change racing this check retires the key.
        let epoch = self.cache.epoch(user);
        let key = decision_key(user, epoch, resource, action, resource_id, context, options);

        let result = match self.cache.get_decision(&key).await {
            Some(cached) => {
                debug!(key = %key, allowed = cached.allowed, "Decision served from cache");
                cached
            }
            None => {
                let computed = self
                    .compute(user, resource, action, resource_id, context, options)
                    .await;
                self.cache.set_decision(key, &computed).await;
                computed
            }
        };

        let mut entry = AuditLogEntry::builder(&user.id, action, resource)
            .maybe_resource_id(resource_id)
            .allowed(result.allowed)
            .reason(result.reason.clone());
        if let Some(context) = context.filter(|c| !c.is_empty())
            && let Ok(value) = serde_json::to_value(context)
        {
            entry = entry.context(value);
        }
        self.audit.log_access(entry.build(), meta, LogOptions::default());

        result
    }

    async fn compute(
        &self,
        user: &AuthenticatedUser,
        resource: &str,
        action: &str,
        resource_id: Option<&str>,
        context: Option<&PermissionContext>,
        options: CheckOptions,
    ) -> PermissionCheckResult {
        let result = self
            .manager
            .check_permission(user, resource, action, resource_id, context, options);

        let Some(resource_id) = resource_id else {
            return result;
        };
        let shortcut = options.allow_super_admin && self.manager.is_super_admin(user.role);
        if !result.allowed || shortcut || !self.guard.is_guarded(resource) {
            return result;
        }

        let data = context.and_then(|c| c.resource.as_ref());
        if self
            .guard
            .can_access_resource(user, resource, resource_id, action, data)
            .await
        {
            result
        } else {
            PermissionCheckResult::deny(REASON_RESOURCE_DENIED)
        }
    }

    /// Returns `true` if the check allows.
    pub async fn has_permission(
        &self,
        user: &AuthenticatedUser,
        resource: &str,
        action: &str,
        context: Option<&PermissionContext>,
    ) -> bool {
        self.check_permission(user, resource, action, None, context, CheckOptions::default())
            .await
            .allowed
    }

    /// Returns `true` if any request is allowed. Stops at the first allow.
    pub async fn has_any_permission(
        &self,
        user: &AuthenticatedUser,
        requests: &[PermissionRequest],
        context: Option<&PermissionContext>,
    ) -> bool {
        for request in requests {
            if self
                .has_permission(user, &request.resource, &request.action, context)
                .await
            {
                return true;
            }
        }
        false
    }

    /// Returns `true` if every request is allowed.
    pub async fn has_all_permissions(
        &self,
        user: &AuthenticatedUser,
        requests: &[PermissionRequest],
        context: Option<&PermissionContext>,
    ) -> bool {
        self.missing_permissions(user, requests, context)
            .await
            .is_empty()
    }

    /// Every denied request, in input order.
    pub async fn missing_permissions(
        &self,
        user: &AuthenticatedUser,
        requests: &[PermissionRequest],
        context: Option<&PermissionContext>,
    ) -> Vec<PermissionRequest> {
        let mut missing = Vec::new();
        for request in requests {
            if !self
                .has_permission(user, &request.resource, &request.action, context)
                .await
            {
                missing.push(request.clone());
            }
        }
        missing
    }

    /// Decide access to one record.
    ///
    /// Guarded resources go through the resource guard. Unguarded resources
    /// fall back to a plain permission check with the record as context.
    pub async fn can_access_resource(
        &self,
        user: &AuthenticatedUser,
        resource: &str,
        resource_id: &str,
        action: &str,
        resource_data: Option<&Map<String, Value>>,
    ) -> bool {
        let allowed = if self.guard.is_guarded(resource) {
            self.guard
                .can_access_resource(user, resource, resource_id, action, resource_data)
                .await
        } else {
            let context = resource_data.map(|data| PermissionContext::new().with_resource(data.clone()));
            self.manager
                .check_permission(user, resource, action, Some(resource_id), context.as_ref(), CheckOptions::default())
                .allowed
        };

        let entry = AuditLogEntry::builder(&user.id, action, resource)
            .resource_id(resource_id)
            .allowed(allowed)
            .reason(if allowed { "resource access granted" } else { REASON_RESOURCE_DENIED })
            .build();
        self.audit.log_access(entry, None, LogOptions::default());

        allowed
    }

    /// Filter of records `user` may access for `action`.
    ///
    /// Unguarded resources yield all records when the role check passes
    /// without context, and none otherwise.
    #[must_use]
    pub fn build_access_query(&self, user: &AuthenticatedUser, resource: &str, action: &str) -> AccessQuery {
        if self.guard.is_guarded(resource) {
            return self.guard.build_access_query(user, resource, action);
        }
        if self.manager.has_permission(user, resource, action, None) {
            AccessQuery::All
        } else {
            AccessQuery::None
        }
    }

    // =========================================================================
    // Grants and catalog
    // =========================================================================

    /// Grant `permission` to `user_id` until `expires_at` (or indefinitely).
    ///
    /// The user's cached decisions are invalidated before this returns.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::InvalidPermission` if the permission is malformed,
    /// or `AuthzError::Cache` if invalidation fails. In the latter case the
    /// grant is stored.
    pub async fn grant_dynamic_permission(
        &self,
        granted_by: &str,
        user_id: &str,
        permission: Permission,
        expires_at: Option<OffsetDateTime>,
    ) -> AuthzResult<DynamicPermission> {
        let grant = DynamicPermission::new(user_id, permission, granted_by, expires_at);
        self.manager.add_dynamic_permission(grant.clone())?;
        self.cache.invalidate_user(user_id).await?;

        let entry = AuditLogEntry::builder(granted_by, ACTION_GRANT, &grant.permission.resource)
            .category(AuditCategory::PermissionChange)
            .reason(format!("granted {} to {user_id}", grant.permission))
            .context(json!({
                "target_user_id": user_id,
                "permission": grant.permission,
                "grant_id": grant.id,
                "expires_at": grant.expires_at.map(|t| t.unix_timestamp()),
            }))
            .build();
        self.audit.log_access(entry, None, LogOptions::immediate());

        Ok(grant)
    }

    /// Revoke the grants of `user_id` for exactly `(resource, action)`.
    /// Returns the number of grants removed.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::Cache` if invalidation fails.
    pub async fn revoke_dynamic_permission(
        &self,
        revoked_by: &str,
        user_id: &str,
        resource: &str,
        action: &str,
    ) -> AuthzResult<usize> {
        let removed = self.manager.remove_dynamic_permission(user_id, resource, action);
        self.cache.invalidate_user(user_id).await?;

        let entry = AuditLogEntry::builder(revoked_by, ACTION_REVOKE, resource)
            .category(AuditCategory::PermissionChange)
            .reason(format!("revoked {resource}:{action} from {user_id}"))
            .context(json!({
                "target_user_id": user_id,
                "action": action,
                "removed": removed,
            }))
            .build();
        self.audit.log_access(entry, None, LogOptions::immediate());

        Ok(removed)
    }

    /// Remove every grant of `user_id`. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::Cache` if invalidation fails.
    pub async fn clear_dynamic_permissions(&self, cleared_by: &str, user_id: &str) -> AuthzResult<usize> {
        let removed = self.manager.clear_dynamic_permissions(user_id);
        self.cache.invalidate_user(user_id).await?;

        let entry = AuditLogEntry::builder(cleared_by, ACTION_CLEAR_GRANTS, "*")
            .category(AuditCategory::PermissionChange)
            .context(json!({"target_user_id": user_id, "removed": removed}))
            .build();
        self.audit.log_access(entry, None, LogOptions::immediate());

        Ok(removed)
    }

    /// Replace the catalog entry of `role` and drop every decision cached for it.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::InvalidPermission` if any permission is malformed
    /// (the catalog is left untouched), or `AuthzError::Cache` if
    /// invalidation fails.
    pub async fn update_role_permissions(
        &self,
        updated_by: &str,
        role: Role,
        permissions: Vec<Permission>,
    ) -> AuthzResult<()> {
        let summary: Vec<String> = permissions.iter().map(ToString::to_string).collect();
        self.manager.catalog().replace_role_permissions(role, permissions)?;
        self.cache.invalidate_role(role).await?;

        let entry = AuditLogEntry::builder(updated_by, ACTION_UPDATE_ROLE, "roles")
            .resource_id(role.as_str())
            .category(AuditCategory::PermissionChange)
            .context(json!({"role": role, "permissions": summary}))
            .build();
        self.audit.log_access(entry, None, LogOptions::immediate());

        Ok(())
    }

    /// Current catalog entry of `role`.
    #[must_use]
    pub fn get_role_permissions(&self, role: Role) -> Arc<Vec<Permission>> {
        self.manager.catalog().role_permissions(role)
    }

    /// Role permissions plus live grants of `user`, served from the cache when possible.
    pub async fn get_user_permissions(&self, user: &AuthenticatedUser) -> PermissionSnapshot {
        let key = snapshot_key(user, self.cache.epoch(user));
        if let Some(snapshot) = self.cache.get_snapshot(&key).await {
            return snapshot;
        }

        let snapshot = self.manager.permission_snapshot(user);
        self.cache.set_snapshot(key, &snapshot).await;
        snapshot
    }

    // =========================================================================
    // Audit queries
    // =========================================================================

    /// Persisted audit entries of `user_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::AuditLogFailed` if the sink cannot be read.
    pub async fn audit_logs_for_user(&self, user_id: &str, limit: Option<usize>) -> AuthzResult<Vec<AuditLogEntry>> {
        Ok(self.audit.logs_for_user(user_id, limit).await?)
    }

    /// Persisted audit entries of a resource type or one record, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::AuditLogFailed` if the sink cannot be read.
    pub async fn audit_logs_for_resource(
        &self,
        resource: &str,
        resource_id: Option<&str>,
        limit: Option<usize>,
    ) -> AuthzResult<Vec<AuditLogEntry>> {
        Ok(self.audit.logs_for_resource(resource, resource_id, limit).await?)
    }

    /// Persisted denials and permission changes, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::AuditLogFailed` if the sink cannot be read.
    pub async fn security_events(&self, limit: Option<usize>) -> AuthzResult<Vec<AuditLogEntry>> {
        Ok(self.audit.security_events(limit).await?)
    }

    /// Stop background tasks and drain the audit queue.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::AuditLogFailed` if the final flush fails.
    pub async fn shutdown(&self) -> AuthzResult<()> {
        if let Some(task) = self
            .cleanup_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        self.audit.shutdown().await?;
        info!("Authorization service stopped");
        Ok(())
    }
}

impl Drop for AuthorizationService {
    fn drop(&mut self) {
        if let Some(task) = self
            .cleanup_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::audit::{AuditResult, InMemoryAuditSink};
    use crate::config::{AuditConfig, CacheConfig};
    use crate::guard::{GuardRegistry, RelationshipKind, ResourceGuardConfig};
    use crate::types::{REASON_GRANTED, REASON_NO_MATCH, REASON_SUPER_ADMIN};
    use async_trait::async_trait;

    fn service() -> AuthorizationService {
        AuthorizationService::new(
            PermissionManager::new(Arc::new(PermissionCatalog::with_defaults())),
            ResourceGuard::with_defaults(),
            PermissionCache::local(CacheConfig::default()),
            AuditLogger::new(
                Arc::new(InMemoryAuditSink::new()),
                AuditConfig {
                    flush_interval: Duration::from_secs(3600),
                    ..AuditConfig::default()
                },
            ),
        )
    }

    fn ppl(id: &str) -> AuthenticatedUser {
        AuthenticatedUser::new(id, format!("{id}@example.com"), Role::Ppl)
    }

    #[tokio::test]
    async fn test_check_is_cached_and_audited() {
        let svc = service();
        let user = ppl("u1");

        let first = svc.check_permission(&user, "submissions", "create", None, None, CheckOptions::default()).await;
        let second = svc.check_permission(&user, "submissions", "create", None, None, CheckOptions::default()).await;
        assert!(first.allowed);
        assert_eq!(first, second);
        assert_eq!(first.reason, REASON_GRANTED);

        let stats = svc.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(svc.audit_stats().enqueued, 2);
    }

    #[tokio::test]
    async fn test_guard_denies_foreign_record() {
        let svc = service();
        let user = ppl("u1");
        let context = PermissionContext::new().with_resource_value(&json!({"created_by": "u2"}));

        let result = svc
            .check_permission(&user, "submissions", "view", Some("s-1"), Some(&context), CheckOptions::default())
            .await;
        assert!(!result.allowed);
        assert_eq!(result.reason, REASON_RESOURCE_DENIED);

        let own = PermissionContext::new().with_resource_value(&json!({"created_by": "u1"}));
        let result = svc
            .check_permission(&user, "submissions", "view", Some("s-1"), Some(&own), CheckOptions::default())
            .await;
        assert!(result.allowed);
    }

    #[tokio::test]
    async fn test_grant_and_revoke_invalidate_cache() {
        let svc = service();
        let user = ppl("u9");

        assert!(!svc.has_permission(&user, "reports", "export", None).await);

        svc.grant_dynamic_permission("admin-1", "u9", Permission::new("reports", "export"), None)
            .await
            .unwrap();
        assert!(svc.has_permission(&user, "reports", "export", None).await);

        assert_eq!(
            svc.revoke_dynamic_permission("admin-1", "u9", "reports", "export")
                .await
                .unwrap(),
            1
        );
        let result = svc
            .check_permission(&user, "reports", "export", None, None, CheckOptions::default())
            .await;
        assert!(!result.allowed);
        assert_eq!(result.reason, REASON_NO_MATCH);
    }

    #[tokio::test]
    async fn test_grant_rejects_malformed_permission() {
        let svc = service();
        let err = svc
            .grant_dynamic_permission("admin-1", "u9", Permission::new("Bad Resource", "view"), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PERMISSION");
        assert!(svc.manager().dynamic_permissions("u9").is_empty());
    }

    #[tokio::test]
    async fn test_update_role_permissions_invalidates_role() {
        let svc = service();
        let user = ppl("u1");
        assert!(svc.has_permission(&user, "submissions", "create", None).await);

        svc.update_role_permissions("admin-1", Role::Ppl, vec![Permission::new("reports", "view")])
            .await
            .unwrap();

        assert!(!svc.has_permission(&user, "submissions", "create", None).await);
        assert!(svc.has_permission(&user, "reports", "view", None).await);
        assert_eq!(svc.get_role_permissions(Role::Ppl).len(), 1);
    }

    #[tokio::test]
    async fn test_update_role_permissions_rejects_malformed() {
        let svc = service();
        let before = svc.get_role_permissions(Role::Ppl);
        let err = svc
            .update_role_permissions("admin-1", Role::Ppl, vec![Permission::new("", "view")])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PERMISSION");
        assert_eq!(svc.get_role_permissions(Role::Ppl), before);
    }

    #[tokio::test]
    async fn test_user_permissions_snapshot() {
        let svc = service();
        let user = ppl("u1");
        let first = svc.get_user_permissions(&user).await;
        let second = svc.get_user_permissions(&user).await;
        assert_eq!(first, second);
        assert!(!first.role_permissions.is_empty());
        assert_eq!(svc.cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn test_access_query_for_unguarded_resource() {
        let svc = service();
        let admin = AuthenticatedUser::new("a1", "a1@example.com", Role::Admin);
        let user = ppl("u1");

        assert!(svc.build_access_query(&admin, "reports", "view").is_unrestricted());
        assert!(svc.build_access_query(&user, "reports", "delete").is_deny_all());
    }

    #[tokio::test]
    async fn test_strict_check_skips_super_admin_shortcut() {
        let svc = service();
        let admin = AuthenticatedUser::new("a1", "a1@example.com", Role::Admin);
        svc.update_role_permissions("root", Role::Admin, vec![Permission::new("reports", "view")])
            .await
            .unwrap();

        let shortcut = svc
            .check_permission(&admin, "medicines", "delete", None, None, CheckOptions::default())
            .await;
        assert!(shortcut.allowed);
        assert_eq!(shortcut.reason, REASON_SUPER_ADMIN);

        let strict = svc
            .check_permission(&admin, "medicines", "delete", None, None, CheckOptions::strict())
            .await;
        assert!(!strict.allowed);
        assert_eq!(strict.reason, REASON_NO_MATCH);

        // Both served from their own cache entries.
        let again = svc
            .check_permission(&admin, "medicines", "delete", None, None, CheckOptions::strict())
            .await;
        assert_eq!(again, strict);
        assert_eq!(svc.cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn test_strict_check_applies_guard_to_super_admin() {
        let registry = GuardRegistry::from([(
            "submissions".to_string(),
            ResourceGuardConfig::new().owned_by("created_by"),
        )]);
        let svc = AuthorizationService::new(
            PermissionManager::new(Arc::new(PermissionCatalog::with_defaults())),
            ResourceGuard::new(registry).unwrap(),
            PermissionCache::local(CacheConfig::default()),
            AuditLogger::disabled(),
        );
        let admin = AuthenticatedUser::new("a1", "a1@example.com", Role::Admin);
        let context = PermissionContext::new().with_resource_value(&json!({"created_by": "u2"}));

        let shortcut = svc
            .check_permission(&admin, "submissions", "view", Some("s-1"), Some(&context), CheckOptions::default())
            .await;
        assert!(shortcut.allowed);

        let strict = svc
            .check_permission(&admin, "submissions", "view", Some("s-1"), Some(&context), CheckOptions::strict())
            .await;
        assert!(!strict.allowed);
        assert_eq!(strict.reason, REASON_RESOURCE_DENIED);
    }

    struct ProjectMembers;

    #[async_trait]
    impl MembershipResolver for ProjectMembers {
        async fn is_related(
            &self,
            user: &AuthenticatedUser,
            parent_resource: &str,
            _resource_id: &str,
            _relationship: RelationshipKind,
            _resource_data: Option<&Map<String, Value>>,
        ) -> bool {
            parent_resource == "projects" && user.id == "member"
        }
    }

    fn project_service() -> AuthorizationService {
        let registry = GuardRegistry::from([
            (
                "projects".to_string(),
                ResourceGuardConfig::new().with_custom_permission(Permission::new("projects", "view")),
            ),
            (
                "tasks".to_string(),
                ResourceGuardConfig::new().inherits("projects", RelationshipKind::Member),
            ),
        ]);
        AuthorizationService::new(
            PermissionManager::new(Arc::new(PermissionCatalog::with_defaults())),
            ResourceGuard::new(registry).unwrap(),
            PermissionCache::local(CacheConfig::default()),
            AuditLogger::disabled(),
        )
    }

    #[tokio::test]
    async fn test_membership_resolver_reaches_guard() {
        let member = AuthenticatedUser::new("member", "m@example.com", Role::Popt);

        let without = project_service();
        assert!(!without.can_access_resource(&member, "tasks", "t-1", "view", None).await);

        let svc = project_service().with_membership_resolver(Arc::new(ProjectMembers));
        assert!(svc.can_access_resource(&member, "tasks", "t-1", "view", None).await);
        assert!(!svc.can_access_resource(&member, "tasks", "t-1", "delete", None).await);

        let outsider = AuthenticatedUser::new("outsider", "o@example.com", Role::Popt);
        assert!(!svc.can_access_resource(&outsider, "tasks", "t-1", "view", None).await);
    }

    #[tokio::test]
    async fn test_security_events_after_shutdown() {
        let svc = service();
        let user = ppl("u1");
        svc.check_permission(&user, "submissions", "approve", None, None, CheckOptions::default())
            .await;
        svc.grant_dynamic_permission("admin-1", "u1", Permission::new("reports", "view"), None)
            .await
            .unwrap();

        svc.shutdown().await.unwrap();

        let events = svc.security_events(None).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].category, AuditCategory::PermissionChange);
        assert_eq!(events[1].result, AuditResult::Denied);

        let for_user = svc.audit_logs_for_user("u1", None).await.unwrap();
        assert_eq!(for_user.len(), 1);
    }
}
