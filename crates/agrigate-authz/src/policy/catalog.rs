//! Role → permission catalog.
//!
//! The catalog is an immutable snapshot behind an [`ArcSwap`]: reads are a
//! single atomic load and never block, and a role edit swaps in a new
//! snapshot while in-flight checks keep using the old one.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::info;

use crate::AuthzResult;
use crate::types::{Condition, Permission, Role};

/// Immutable catalog contents.
pub type CatalogSnapshot = HashMap<Role, Arc<Vec<Permission>>>;

/// Role-based permission catalog with lock-free reads.
#[derive(Debug)]
pub struct PermissionCatalog {
    inner: ArcSwap<CatalogSnapshot>,
}

impl PermissionCatalog {
    /// Build a catalog, validating every permission.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::InvalidPermission` on the first malformed entry.
    pub fn new(entries: HashMap<Role, Vec<Permission>>) -> AuthzResult<Self> {
        let mut snapshot = CatalogSnapshot::with_capacity(entries.len());
        for (role, permissions) in entries {
            validate_all(&permissions)?;
            snapshot.insert(role, Arc::new(permissions));
        }
        Ok(Self {
            inner: ArcSwap::from_pointee(snapshot),
        })
    }

    /// The built-in catalog.
    #[must_use]
    pub fn with_defaults() -> Self {
        let snapshot = default_catalog()
            .into_iter()
            .map(|(role, permissions)| (role, Arc::new(permissions)))
            .collect();
        Self {
            inner: ArcSwap::from_pointee(snapshot),
        }
    }

    /// Current snapshot (lock-free).
    #[must_use]
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.inner.load_full()
    }

    /// Permissions of `role`, in catalog order. Unknown roles have none.
    #[must_use]
    pub fn role_permissions(&self, role: Role) -> Arc<Vec<Permission>> {
        self.inner
            .load()
            .get(&role)
            .cloned()
            .unwrap_or_default()
    }

    /// Replace the permission list of `role`.
    ///
    /// Every entry is validated before anything is swapped in.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::InvalidPermission` if any entry is malformed; the
    /// catalog is left untouched.
    pub fn replace_role_permissions(
        &self,
        role: Role,
        permissions: Vec<Permission>,
    ) -> AuthzResult<()> {
        validate_all(&permissions)?;

        let count = permissions.len();
        let permissions = Arc::new(permissions);
        self.inner.rcu(|current| {
            let mut next = CatalogSnapshot::clone(current);
            next.insert(role, Arc::clone(&permissions));
            next
        });

        info!(role = %role, permissions = count, "Role permissions replaced");
        Ok(())
    }
}

impl Default for PermissionCatalog {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn validate_all(permissions: &[Permission]) -> AuthzResult<()> {
    permissions.iter().try_for_each(Permission::validate)
}

// =============================================================================
// Default Catalog
// =============================================================================

fn allow<'a>(resource: &'a str, actions: &'a [&'a str]) -> impl Iterator<Item = Permission> + 'a {
    actions
        .iter()
        .map(move |action| Permission::new(resource, *action))
}

fn owned(resource: &str, action: &str, owner_field: &str) -> Permission {
    Permission::new(resource, action).with_condition(Condition::owned_by_user(owner_field))
}

/// The built-in catalog for the distribution workflow.
///
/// Role levels are not inherited: every role lists exactly what it may do.
#[must_use]
pub fn default_catalog() -> HashMap<Role, Vec<Permission>> {
    let admin = vec![Permission::wildcard()];

    let dinas = allow("users", &["view", "view_all"])
        .chain(allow(
            "medicines",
            &["view", "create", "update", "delete", "manage_stock"],
        ))
        .chain(allow("submissions", &["view", "view_all"]))
        .chain([owned("submissions", "view_own", "created_by")])
        .chain(allow("submissions", &["approve", "reject", "process"]))
        .chain(allow(
            "transactions",
            &["view", "view_all", "create", "approve"],
        ))
        .chain(allow("reports", &["view", "generate", "export"]))
        .chain(allow("audit_logs", &["view"]))
        .collect();

    let popt = allow("medicines", &["view"])
        .chain(allow("submissions", &["view", "create"]))
        .chain([
            owned("submissions", "view_own", "created_by"),
            owned("submissions", "update", "created_by"),
        ])
        .chain(allow("submissions", &["review", "recommend"]))
        .chain(allow("transactions", &["view", "create"]))
        .chain(allow("reports", &["view", "generate"]))
        .collect();

    let ppl = allow("medicines", &["view"])
        .chain(allow("submissions", &["view", "create"]))
        .chain([
            owned("submissions", "view_own", "created_by"),
            owned("submissions", "update", "created_by"),
            owned("submissions", "cancel", "created_by"),
            owned("transactions", "view_own", "user_id"),
        ])
        .chain(allow("transactions", &["create"]))
        .chain(allow("reports", &["view"]))
        .collect();

    HashMap::from([
        (Role::Admin, admin),
        (Role::Dinas, dinas),
        (Role::Popt, popt),
        (Role::Ppl, ppl),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has(perms: &[Permission], resource: &str, action: &str) -> bool {
        perms
            .iter()
            .any(|p| p.resource == resource && p.action == action)
    }

    #[test]
    fn test_default_catalog_is_valid() {
        let catalog = PermissionCatalog::new(default_catalog()).unwrap();
        assert_eq!(catalog.snapshot().len(), 4);
    }

    #[test]
    fn test_default_catalog_contents() {
        let catalog = PermissionCatalog::with_defaults();

        let admin = catalog.role_permissions(Role::Admin);
        assert_eq!(admin.as_slice(), &[Permission::wildcard()]);

        let ppl = catalog.role_permissions(Role::Ppl);
        assert!(has(&ppl, "submissions", "create"));
        assert!(!has(&ppl, "submissions", "approve"));
        assert!(has(&ppl, "transactions", "view_own"));

        let dinas = catalog.role_permissions(Role::Dinas);
        assert!(has(&dinas, "audit_logs", "view"));
        let view_own = dinas
            .iter()
            .find(|p| p.resource == "submissions" && p.action == "view_own")
            .unwrap();
        assert_eq!(view_own.conditions.len(), 1);
    }

    #[test]
    fn test_replace_role_permissions() {
        let catalog = PermissionCatalog::with_defaults();
        let before = catalog.role_permissions(Role::Popt);

        catalog
            .replace_role_permissions(Role::Popt, vec![Permission::new("reports", "view")])
            .unwrap();

        let after = catalog.role_permissions(Role::Popt);
        assert_eq!(after.len(), 1);
        assert!(before.len() > 1, "old snapshot stays intact for existing readers");
        assert!(has(&catalog.role_permissions(Role::Ppl), "submissions", "create"));
    }

    #[test]
    fn test_replace_rejects_malformed_entries() {
        let catalog = PermissionCatalog::with_defaults();
        let err = catalog
            .replace_role_permissions(
                Role::Ppl,
                vec![
                    Permission::new("reports", "view"),
                    Permission::new("Reports", "export"),
                ],
            )
            .unwrap_err();

        assert_eq!(err.code(), "INVALID_PERMISSION");
        assert!(has(&catalog.role_permissions(Role::Ppl), "submissions", "create"));
    }

    #[test]
    fn test_missing_role_has_no_permissions() {
        let catalog = PermissionCatalog::new(HashMap::new()).unwrap();
        assert!(catalog.role_permissions(Role::Dinas).is_empty());
    }
}
