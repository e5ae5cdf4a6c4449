//! Evaluation context for permission checks.
//!
//! The context is assembled by the caller from request parameters and, where
//! relevant, a snapshot of the target record. The engine never fetches
//! resource data itself.
//!
//! ```ignore
//! use agrigate_authz::policy::PermissionContext;
//! use serde_json::json;
//!
//! let context = PermissionContext::new()
//!     .with_field("created_by", json!("u1"))
//!     .with_resource_value(&json!({"id": "s-1", "created_by": "u1"}));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Prefix addressing the resource snapshot explicitly.
const RESOURCE_PREFIX: &str = "resource.";

/// Number of hex characters kept from the context digest.
const FINGERPRINT_LEN: usize = 16;

// =============================================================================
// Permission Context
// =============================================================================

/// Request fields plus an optional resource snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PermissionContext {
    /// Request parameters, body and query fields.
    #[serde(default)]
    pub fields: Map<String, Value>,

    /// Snapshot of the target record, if the caller fetched one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Map<String, Value>>,
}

impl PermissionContext {
    /// An empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a JSON value. Objects become request fields;
    /// anything else yields an empty context.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self {
                fields,
                resource: None,
            },
            _ => Self::default(),
        }
    }

    /// Add a request field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Attach a resource snapshot.
    #[must_use]
    pub fn with_resource(mut self, resource: Map<String, Value>) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Attach a resource snapshot from a JSON value. Non-object values are ignored.
    #[must_use]
    pub fn with_resource_value(mut self, resource: &Value) -> Self {
        if let Value::Object(map) = resource {
            self.resource = Some(map.clone());
        }
        self
    }

    /// Returns `true` if the context carries no fields and no snapshot.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.resource.as_ref().is_none_or(Map::is_empty)
    }

    /// Resolve a dot path.
    ///
    /// A `resource.`-prefixed path is looked up in the snapshot first. Other
    /// paths are looked up in the request fields and fall back to the
    /// snapshot. A missing path yields `None`.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&Value> {
        if let Some(rest) = path.strip_prefix(RESOURCE_PREFIX)
            && let Some(found) = self.resource_field(rest)
        {
            return Some(found);
        }

        lookup_path(&self.fields, path).or_else(|| self.resource_field(path))
    }

    /// Resolve a dot path against the resource snapshot only.
    #[must_use]
    pub fn resource_field(&self, path: &str) -> Option<&Value> {
        self.resource.as_ref().and_then(|res| lookup_path(res, path))
    }

    /// Stable short digest of the context, used to key cached decisions.
    ///
    /// Returns `None` for an empty context. Object keys are kept sorted by
    /// `serde_json`, so equal contexts always produce equal fingerprints.
    #[must_use]
    pub fn fingerprint(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let bytes = serde_json::to_vec(self).ok()?;
        let digest = Sha256::digest(&bytes);
        let mut hex = hex::encode(digest);
        hex.truncate(FINGERPRINT_LEN);
        Some(hex)
    }
}

/// Walk a dot path through nested objects and arrays.
///
/// Numeric segments index into arrays.
#[must_use]
pub fn lookup_path<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }

    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = root.get(first)?;

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("snapshot must be an object"),
        }
    }

    #[test]
    fn test_lookup_path() {
        let root = snapshot(json!({
            "region": {"id": "r1", "tags": ["north", "dry"]},
            "count": 3
        }));

        assert_eq!(lookup_path(&root, "count"), Some(&json!(3)));
        assert_eq!(lookup_path(&root, "region.id"), Some(&json!("r1")));
        assert_eq!(lookup_path(&root, "region.tags.1"), Some(&json!("dry")));
        assert_eq!(lookup_path(&root, "region.missing"), None);
        assert_eq!(lookup_path(&root, "count.deeper"), None);
        assert_eq!(lookup_path(&root, ""), None);
    }

    #[test]
    fn test_resolve_prefers_request_fields() {
        let ctx = PermissionContext::new()
            .with_field("status", json!("draft"))
            .with_resource(snapshot(json!({"status": "approved", "created_by": "u1"})));

        assert_eq!(ctx.resolve("status"), Some(&json!("draft")));
        assert_eq!(ctx.resolve("resource.status"), Some(&json!("approved")));
        assert_eq!(ctx.resolve("created_by"), Some(&json!("u1")));
        assert_eq!(ctx.resolve("unknown"), None);
    }

    #[test]
    fn test_fingerprint_is_stable_and_order_independent() {
        assert_eq!(PermissionContext::new().fingerprint(), None);

        let a = PermissionContext::new()
            .with_field("a", json!(1))
            .with_field("b", json!(2));
        let b = PermissionContext::new()
            .with_field("b", json!(2))
            .with_field("a", json!(1));
        let c = PermissionContext::new().with_field("a", json!(2));

        let fa = a.fingerprint().unwrap();
        assert_eq!(fa.len(), FINGERPRINT_LEN);
        assert_eq!(Some(fa.clone()), b.fingerprint());
        assert_ne!(Some(fa), c.fingerprint());
    }

    #[test]
    fn test_from_value() {
        let ctx = PermissionContext::from_value(json!({"created_by": "u1"}));
        assert_eq!(ctx.resolve("created_by"), Some(&json!("u1")));
        assert!(PermissionContext::from_value(json!([1, 2])).is_empty());
    }
}
