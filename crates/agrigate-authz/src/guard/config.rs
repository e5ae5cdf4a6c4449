//! Per-resource guard configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::AuthzResult;
use crate::error::AuthzError;
use crate::types::{Permission, Role, WILDCARD, is_valid_token};

/// Relationship between a resource and its parent in an inheritance rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKind {
    /// Access requires owning the parent record.
    Owner,
    /// Access requires membership on the parent, resolved externally.
    Member,
    /// Access requires viewer rights on the parent, resolved externally.
    Viewer,
    /// Application-defined relationship, resolved externally.
    Custom,
}

impl RelationshipKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Member => "member",
            Self::Viewer => "viewer",
            Self::Custom => "custom",
        }
    }
}

/// Grants access to a resource through its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InheritanceRule {
    pub parent_resource: String,
    pub relationship: RelationshipKind,
}

impl InheritanceRule {
    #[must_use]
    pub fn new(parent_resource: impl Into<String>, relationship: RelationshipKind) -> Self {
        Self {
            parent_resource: parent_resource.into(),
            relationship,
        }
    }
}

/// How instances of one resource type are protected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceGuardConfig {
    /// Record field holding the owning user's id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ownership_field: Option<String>,

    /// Roles that bypass every other check.
    pub allowed_roles: Vec<Role>,

    /// Conditioned permissions evaluated against the record.
    pub custom_permissions: Vec<Permission>,

    /// Parents granting access by relationship.
    pub inheritance_rules: Vec<InheritanceRule>,
}

impl ResourceGuardConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn owned_by(mut self, field: impl Into<String>) -> Self {
        self.ownership_field = Some(field.into());
        self
    }

    #[must_use]
    pub fn bypass_for(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.allowed_roles.extend(roles);
        self
    }

    #[must_use]
    pub fn with_custom_permission(mut self, permission: Permission) -> Self {
        self.custom_permissions.push(permission);
        self
    }

    #[must_use]
    pub fn inherits(mut self, parent_resource: impl Into<String>, relationship: RelationshipKind) -> Self {
        self.inheritance_rules
            .push(InheritanceRule::new(parent_resource, relationship));
        self
    }

    /// Returns `true` if `role` bypasses this guard.
    #[must_use]
    pub fn is_bypassed_by(&self, role: Role) -> bool {
        self.allowed_roles.contains(&role)
    }

    /// Validate custom permissions and parent names.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::InvalidPermission` for malformed tokens.
    pub fn validate(&self) -> AuthzResult<()> {
        self.custom_permissions
            .iter()
            .try_for_each(Permission::validate)?;

        for rule in &self.inheritance_rules {
            if rule.parent_resource == WILDCARD || !is_valid_token(&rule.parent_resource) {
                return Err(AuthzError::invalid_permission(format!(
                    "parent resource '{}' must match ^[a-z_]+$",
                    rule.parent_resource
                )));
            }
        }
        Ok(())
    }
}

/// Resource name → guard configuration.
pub type GuardRegistry = HashMap<String, ResourceGuardConfig>;

/// Guards for the distribution workflow's records.
#[must_use]
pub fn default_guard_registry() -> GuardRegistry {
    let staff = [Role::Admin, Role::Dinas];

    HashMap::from([
        (
            "submissions".to_string(),
            ResourceGuardConfig::new()
                .owned_by("created_by")
                .bypass_for(staff),
        ),
        (
            "transactions".to_string(),
            ResourceGuardConfig::new()
                .owned_by("user_id")
                .bypass_for(staff),
        ),
        (
            "medicines".to_string(),
            ResourceGuardConfig::new()
                .bypass_for(staff)
                .with_custom_permission(Permission::new("medicines", "view")),
        ),
        (
            "submission_attachments".to_string(),
            ResourceGuardConfig::new()
                .owned_by("uploaded_by")
                .inherits("submissions", RelationshipKind::Owner),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry() {
        let registry = default_guard_registry();
        assert_eq!(registry.len(), 4);
        for config in registry.values() {
            config.validate().unwrap();
        }

        let submissions = &registry["submissions"];
        assert_eq!(submissions.ownership_field.as_deref(), Some("created_by"));
        assert!(submissions.is_bypassed_by(Role::Dinas));
        assert!(!submissions.is_bypassed_by(Role::Popt));

        let attachments = &registry["submission_attachments"];
        assert_eq!(
            attachments.inheritance_rules,
            vec![InheritanceRule::new("submissions", RelationshipKind::Owner)]
        );
    }

    #[test]
    fn test_validate_rejects_bad_parent() {
        let config = ResourceGuardConfig::new().inherits("*", RelationshipKind::Member);
        assert!(config.validate().is_err());

        let config = ResourceGuardConfig::new().with_custom_permission(Permission::new("x", "View"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_from_json() {
        let config: ResourceGuardConfig = serde_json::from_value(serde_json::json!({
            "ownership_field": "owner_id",
            "allowed_roles": ["ADMIN"],
            "inheritance_rules": [{"parent_resource": "projects", "relationship": "member"}]
        }))
        .unwrap();

        assert_eq!(config.ownership_field.as_deref(), Some("owner_id"));
        assert!(config.custom_permissions.is_empty());
        assert_eq!(config.inheritance_rules[0].relationship, RelationshipKind::Member);
    }
}
