//! Resource-instance access control.
//!
//! The guard answers "may this user touch this record" and "which records may
//! this user see" for resource types registered with a
//! [`ResourceGuardConfig`]. It layers on top of the role catalog: the
//! authorization service consults it only for checks that name a record.
//!
//! # Access Order
//!
//! 1. Role bypass (`allowed_roles`)
//! 2. Ownership, read from the supplied record snapshot
//! 3. Custom conditioned permissions matching the action (or `*`)
//! 4. Inheritance from parent resources
//! 5. Deny
//!
//! Ownership is never inferred from the record id alone: without a snapshot
//! the ownership and custom steps cannot allow.

pub mod config;
pub mod membership;
pub mod query;

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

pub use config::{
    GuardRegistry, InheritanceRule, RelationshipKind, ResourceGuardConfig, default_guard_registry,
};
pub use membership::{MembershipResolver, NoMembershipResolver};
pub use query::{AccessQuery, FieldPredicate};

use crate::AuthzResult;
use crate::policy::{ConditionEvaluator, PermissionContext};
use crate::types::{AuthenticatedUser, ConditionValue, Operator, Permission, ValueRef};

/// Maximum depth of inheritance chains.
pub const MAX_INHERITANCE_DEPTH: usize = 8;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The fixed inputs of one access check.
#[derive(Clone, Copy)]
struct AccessRequest<'a> {
    user: &'a AuthenticatedUser,
    resource_id: &'a str,
    action: &'a str,
    data: Option<&'a Map<String, Value>>,
}

/// Ownership, bypass, custom permission and inheritance checks per resource type.
pub struct ResourceGuard {
    registry: GuardRegistry,
    membership: Arc<dyn MembershipResolver>,
}

impl std::fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceGuard")
            .field("resources", &self.registry.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ResourceGuard {
    /// Create a guard over `registry`, validating every entry.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::InvalidPermission` if a custom permission or
    /// parent name is malformed.
    pub fn new(registry: GuardRegistry) -> AuthzResult<Self> {
        for config in registry.values() {
            config.validate()?;
        }
        Ok(Self {
            registry,
            membership: Arc::new(NoMembershipResolver),
        })
    }

    /// Guard over the built-in registry.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            registry: default_guard_registry(),
            membership: Arc::new(NoMembershipResolver),
        }
    }

    /// Use `resolver` for `member`, `viewer` and `custom` inheritance.
    #[must_use]
    pub fn with_membership_resolver(mut self, resolver: Arc<dyn MembershipResolver>) -> Self {
        self.set_membership_resolver(resolver);
        self
    }

    /// Replace the resolver in place.
    pub fn set_membership_resolver(&mut self, resolver: Arc<dyn MembershipResolver>) {
        self.membership = resolver;
    }

    /// Configuration of `resource`, if registered.
    #[must_use]
    pub fn config(&self, resource: &str) -> Option<&ResourceGuardConfig> {
        self.registry.get(resource)
    }

    /// Returns `true` if `resource` has a guard configuration.
    #[must_use]
    pub fn is_guarded(&self, resource: &str) -> bool {
        self.registry.contains_key(resource)
    }

    /// Names of every guarded resource, sorted.
    #[must_use]
    pub fn resources(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.registry.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Decide whether `user` may perform `action` on one record.
    ///
    /// Unregistered resources are denied.
    pub async fn can_access_resource(
        &self,
        user: &AuthenticatedUser,
        resource: &str,
        resource_id: &str,
        action: &str,
        resource_data: Option<&Map<String, Value>>,
    ) -> bool {
        let request = AccessRequest {
            user,
            resource_id,
            action,
            data: resource_data,
        };
        let mut visited = HashSet::new();
        let allowed = self.check_access(request, resource, &mut visited, 0).await;

        debug!(
            user_id = %user.id,
            resource,
            resource_id,
            action,
            allowed,
            "Resource access evaluated"
        );
        allowed
    }

    fn check_access<'a>(
        &'a self,
        request: AccessRequest<'a>,
        resource: &'a str,
        visited: &'a mut HashSet<String>,
        depth: usize,
    ) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            if depth > MAX_INHERITANCE_DEPTH || !visited.insert(resource.to_string()) {
                debug!(resource, depth, "Inheritance cycle or depth limit reached");
                return false;
            }

            let allowed = 'check: {
                let Some(config) = self.registry.get(resource) else {
                    break 'check false;
                };

                if config.is_bypassed_by(request.user.role)
                    || is_owner(config, request)
                    || self.custom_permission_allows(config, resource, request)
                {
                    break 'check true;
                }

                for rule in &config.inheritance_rules {
                    let parent = rule.parent_resource.as_str();
                    let granted = match rule.relationship {
                        RelationshipKind::Owner => self
                            .registry
                            .get(parent)
                            .is_some_and(|parent_config| is_owner(parent_config, request)),
                        kind => {
                            self.check_access(request, parent, &mut *visited, depth + 1).await
                                && self
                                    .membership
                                    .is_related(
                                        request.user,
                                        parent,
                                        request.resource_id,
                                        kind,
                                        request.data,
                                    )
                                    .await
                        }
                    };
                    if granted {
                        break 'check true;
                    }
                }

                false
            };

            // Visited tracks the current path only: sibling branches may
            // reach the same ancestor.
            visited.remove(resource);
            allowed
        })
    }

    fn custom_permission_allows(
        &self,
        config: &ResourceGuardConfig,
        resource: &str,
        request: AccessRequest<'_>,
    ) -> bool {
        let applicable: Vec<&Permission> = config
            .custom_permissions
            .iter()
            .filter(|p| p.matches(resource, request.action))
            .collect();
        if applicable.is_empty() {
            return false;
        }

        let context = request
            .data
            .map(|data| PermissionContext::new().with_resource(data.clone()))
            .unwrap_or_default();
        let evaluator = ConditionEvaluator::new(request.user, &context);

        applicable
            .into_iter()
            .any(|p| evaluator.evaluate_all(&p.conditions).0)
    }

    /// Build the filter of records `user` may access for `action`.
    ///
    /// Inheritance is not expressed in queries. Custom permissions whose
    /// conditions reference other record fields, or use an unknown operator,
    /// contribute nothing, so the query only ever narrows.
    #[must_use]
    pub fn build_access_query(
        &self,
        user: &AuthenticatedUser,
        resource: &str,
        action: &str,
    ) -> AccessQuery {
        let Some(config) = self.registry.get(resource) else {
            return AccessQuery::None;
        };

        if config.is_bypassed_by(user.role) {
            return AccessQuery::All;
        }

        let mut clauses = Vec::new();

        if let Some(field) = &config.ownership_field {
            clauses.push(vec![FieldPredicate::eq(field.clone(), user.id.clone())]);
        }

        for permission in config
            .custom_permissions
            .iter()
            .filter(|p| p.matches(resource, action))
        {
            if let Some(clause) = permission_clause(user, permission) {
                clauses.push(clause);
            }
        }

        let query = AccessQuery::from_clauses(clauses);
        debug!(user_id = %user.id, resource, action, ?query, "Access query built");
        query
    }
}

impl Default for ResourceGuard {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn is_owner(config: &ResourceGuardConfig, request: AccessRequest<'_>) -> bool {
    let (Some(field), Some(data)) = (&config.ownership_field, request.data) else {
        return false;
    };
    data.get(field)
        .and_then(Value::as_str)
        .is_some_and(|owner| owner == request.user.id)
}

/// Translate a permission's conditions into one conjunction.
fn permission_clause(user: &AuthenticatedUser, permission: &Permission) -> Option<Vec<FieldPredicate>> {
    permission
        .conditions
        .iter()
        .map(|condition| {
            if condition.operator == Operator::Unknown {
                return None;
            }
            let value = match &condition.value {
                ConditionValue::Literal(v) => v.clone(),
                ConditionValue::Ref(ValueRef::UserId) => Value::String(user.id.clone()),
                ConditionValue::Ref(ValueRef::UserEmail) => Value::String(user.email.clone()),
                ConditionValue::Ref(ValueRef::UserRole) => {
                    Value::String(user.role.as_str().to_string())
                }
                ConditionValue::Ref(ValueRef::ResourceField(_)) => return None,
            };
            let field = condition
                .field
                .strip_prefix("resource.")
                .unwrap_or(&condition.field);
            Some(FieldPredicate::new(field, condition.operator, value))
        })
        .collect()
}
