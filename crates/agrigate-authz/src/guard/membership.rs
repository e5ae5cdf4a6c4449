//! Membership lookups for relationship-based inheritance.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use super::config::RelationshipKind;
use crate::types::AuthenticatedUser;

/// Answers whether a user stands in a relationship to a parent record.
///
/// Consulted for `member`, `viewer` and `custom` inheritance rules. The
/// engine ships no membership model of its own.
#[async_trait]
pub trait MembershipResolver: Send + Sync {
    async fn is_related(
        &self,
        user: &AuthenticatedUser,
        parent_resource: &str,
        resource_id: &str,
        relationship: RelationshipKind,
        resource_data: Option<&Map<String, Value>>,
    ) -> bool;
}

/// Resolver that denies every relationship.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMembershipResolver;

#[async_trait]
impl MembershipResolver for NoMembershipResolver {
    async fn is_related(
        &self,
        user: &AuthenticatedUser,
        parent_resource: &str,
        resource_id: &str,
        relationship: RelationshipKind,
        _resource_data: Option<&Map<String, Value>>,
    ) -> bool {
        debug!(
            user_id = %user.id,
            parent_resource,
            resource_id,
            relationship = relationship.as_str(),
            "No membership resolver configured, denying relationship"
        );
        false
    }
}
