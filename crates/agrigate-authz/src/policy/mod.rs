//! Role-based permission evaluation.
//!
//! - [`catalog`]: role → permission list, swapped atomically on edit
//! - [`condition`]: condition evaluation with dynamic value references
//! - [`context`]: request fields and resource snapshot handed in by the caller
//! - [`grants`]: per-user dynamic grants with lazy expiry
//! - [`manager`]: the decision algorithm
//!
//! # Decision Order
//!
//! ```text
//! super admin? ──yes──> allow ("super admin")
//!      │no
//! catalog entries ++ live grants, filtered by (resource, action) or `*`
//!      │none ──> deny ("no matching permissions")
//! first candidate whose conditions all hold ──> allow ("permission granted")
//!      │none
//! deny ("permission conditions not met") + evaluated conditions
//! ```

pub mod catalog;
pub mod condition;
pub mod context;
pub mod grants;
pub mod manager;

pub use catalog::{CatalogSnapshot, PermissionCatalog, default_catalog};
pub use condition::{ConditionEvaluator, compare};
pub use context::{PermissionContext, lookup_path};
pub use grants::DynamicGrantStore;
pub use manager::{CheckOptions, PermissionManager, PermissionSnapshot};
