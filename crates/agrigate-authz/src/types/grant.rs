//! Per-user temporary permission grants.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::Permission;

/// A permission granted to a single user, independent of role.
///
/// Expiry is checked lazily on every read; expired grants are never purged
/// automatically and stay visible to [`dynamic_permissions`] listings.
///
/// [`dynamic_permissions`]: crate::policy::PermissionManager::dynamic_permissions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicPermission {
    /// Unique grant identifier.
    pub id: Uuid,

    /// User receiving the grant.
    pub user_id: String,

    /// The granted permission.
    pub permission: Permission,

    /// User that issued the grant.
    pub granted_by: String,

    /// When the grant was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub granted_at: OffsetDateTime,

    /// When the grant stops applying. `None` means no expiry.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

impl DynamicPermission {
    /// Create a grant issued now.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        permission: Permission,
        granted_by: impl Into<String>,
        expires_at: Option<OffsetDateTime>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            permission,
            granted_by: granted_by.into(),
            granted_at: OffsetDateTime::now_utc(),
            expires_at,
        }
    }

    /// Returns `true` if the grant has expired at `now`.
    ///
    /// A grant expiring exactly at `now` is still valid.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|exp| exp < now)
    }

    /// Returns `true` if the grant has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }
}
