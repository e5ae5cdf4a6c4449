//! Core data model shared by every component.

mod grant;
mod permission;
mod result;
mod role;
mod user;

pub use grant::DynamicPermission;
pub use permission::{
    Condition, ConditionValue, Operator, Permission, PermissionRequest, ValueRef, WILDCARD,
    is_valid_token,
};
pub use result::{
    EvaluatedCondition, PermissionCheckResult, REASON_CONDITIONS_NOT_MET, REASON_GRANTED,
    REASON_NO_MATCH, REASON_RESOURCE_DENIED, REASON_SUPER_ADMIN,
};
pub use role::{Role, UnknownRole};
pub use user::{AuthenticatedUser, UserStatus};
