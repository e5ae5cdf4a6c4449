//! Cache key layout and glob invalidation patterns.
//!
//! ```text
//! permission:<user_id>:<ROLE>:<epoch>:<resource>:<action>:<resource_id|*>:<mode>[:<ctx>]
//! permission:<user_id>:<ROLE>:<epoch>:snapshot
//! ```
//!
//! `<epoch>` is `<user generation>.<role generation>`. Grant changes bump the
//! user generation and catalog edits bump the role generation, so a decision
//! computed before a change lands under a key no later lookup reads.
//!
//! `<mode>` is `default` or `strict` (no super-admin shortcut). `<ctx>` is a
//! short digest of the evaluation context, present only when the context is
//! non-empty. Conditions read the context, so two checks that differ only in
//! context must not share an entry.
//!
//! Caller-supplied segments are percent-encoded (`%`, `:`, `*`): a segment can
//! never spill into its neighbour, and a literal `*` always means "no record".

use std::borrow::Cow;
use std::fmt;

use regex::Regex;

use crate::AuthzResult;
use crate::error::AuthzError;
use crate::policy::{CheckOptions, PermissionContext};
use crate::types::{AuthenticatedUser, Role};

/// Namespace shared by every permission cache key.
pub const KEY_PREFIX: &str = "permission";

/// Resource id segment of checks that name no record.
const NO_RECORD: &str = "*";

/// Generations of a user's grants and role catalog entry at lookup time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct KeyEpoch {
    pub user: u64,
    pub role: u64,
}

impl fmt::Display for KeyEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.user, self.role)
    }
}

/// Percent-encode the characters that carry meaning in keys and patterns.
#[must_use]
pub fn escape_segment(segment: &str) -> Cow<'_, str> {
    if !segment.contains(['%', ':', '*']) {
        return Cow::Borrowed(segment);
    }
    let mut escaped = String::with_capacity(segment.len() + 6);
    for c in segment.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            ':' => escaped.push_str("%3A"),
            '*' => escaped.push_str("%2A"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

fn user_prefix(user: &AuthenticatedUser, epoch: KeyEpoch) -> String {
    format!(
        "{KEY_PREFIX}:{}:{}:{epoch}",
        escape_segment(&user.id),
        user.role.as_str()
    )
}

/// Key of a single decision.
#[must_use]
pub fn decision_key(
    user: &AuthenticatedUser,
    epoch: KeyEpoch,
    resource: &str,
    action: &str,
    resource_id: Option<&str>,
    context: Option<&PermissionContext>,
    options: CheckOptions,
) -> String {
    let mut key = format!(
        "{}:{}:{}:{}:{}",
        user_prefix(user, epoch),
        escape_segment(resource),
        escape_segment(action),
        resource_id.map_or(Cow::Borrowed(NO_RECORD), escape_segment),
        if options.allow_super_admin { "default" } else { "strict" },
    );
    if let Some(fingerprint) = context.and_then(PermissionContext::fingerprint) {
        key.push(':');
        key.push_str(&fingerprint);
    }
    key
}

/// Key of a user's permission snapshot.
#[must_use]
pub fn snapshot_key(user: &AuthenticatedUser, epoch: KeyEpoch) -> String {
    format!("{}:snapshot", user_prefix(user, epoch))
}

/// Pattern covering every entry of one user.
#[must_use]
pub fn user_pattern(user_id: &str) -> String {
    format!("{KEY_PREFIX}:{}:*", escape_segment(user_id))
}

/// Pattern covering every entry computed for one role.
#[must_use]
pub fn role_pattern(role: Role) -> String {
    format!("{KEY_PREFIX}:*:{}:*", role.as_str())
}

/// Compile a glob pattern (`*` matches any run of characters) into an
/// anchored regex. Every other character matches literally.
///
/// # Errors
///
/// Returns `AuthzError::Cache` if the resulting regex fails to compile.
pub fn glob_to_regex(pattern: &str) -> AuthzResult<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{body}$"))
        .map_err(|e| AuthzError::cache(format!("invalid pattern '{pattern}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user() -> AuthenticatedUser {
        AuthenticatedUser::new("u1", "u1@agrigate.test", Role::Ppl)
    }

    fn key(
        user: &AuthenticatedUser,
        resource: &str,
        action: &str,
        resource_id: Option<&str>,
        context: Option<&PermissionContext>,
    ) -> String {
        decision_key(user, KeyEpoch::default(), resource, action, resource_id, context, CheckOptions::default())
    }

    #[test]
    fn test_decision_key_layout() {
        let u = user();
        assert_eq!(
            key(&u, "submissions", "create", None, None),
            "permission:u1:PPL:0.0:submissions:create:*:default"
        );
        assert_eq!(
            key(&u, "submissions", "view", Some("s-1"), Some(&PermissionContext::new())),
            "permission:u1:PPL:0.0:submissions:view:s-1:default"
        );

        let ctx = PermissionContext::new().with_field("created_by", json!("u1"));
        let with_ctx = key(&u, "submissions", "view_own", None, Some(&ctx));
        assert!(with_ctx.starts_with("permission:u1:PPL:0.0:submissions:view_own:*:default:"));
        assert_eq!(with_ctx.rsplit(':').next().map(str::len), Some(16));
    }

    #[test]
    fn test_context_changes_key() {
        let u = user();
        let a = PermissionContext::new().with_field("created_by", json!("u1"));
        let b = PermissionContext::new().with_field("created_by", json!("u2"));
        assert_ne!(
            key(&u, "submissions", "view_own", None, Some(&a)),
            key(&u, "submissions", "view_own", None, Some(&b))
        );
    }

    #[test]
    fn test_epoch_and_mode_change_key() {
        let u = user();
        let base = key(&u, "submissions", "create", None, None);

        let bumped = decision_key(
            &u,
            KeyEpoch { user: 1, role: 0 },
            "submissions",
            "create",
            None,
            None,
            CheckOptions::default(),
        );
        assert_ne!(base, bumped);
        assert!(bumped.contains(":1.0:"));

        let strict = decision_key(
            &u,
            KeyEpoch::default(),
            "submissions",
            "create",
            None,
            None,
            CheckOptions::strict(),
        );
        assert_ne!(base, strict);
        assert!(strict.ends_with(":strict"));
    }

    #[test]
    fn test_record_id_cannot_forge_context_segment() {
        let u = user();
        let ctx = PermissionContext::new().with_field("created_by", json!("u1"));
        let fingerprint = ctx.fingerprint().unwrap();

        let with_ctx = key(&u, "submissions", "view", Some("s-1"), Some(&ctx));
        let forged_id = format!("s-1:{fingerprint}");
        let forged = key(&u, "submissions", "view", Some(&forged_id), None);
        assert_ne!(with_ctx, forged);
        assert!(forged.contains("s-1%3A"));

        assert_ne!(
            key(&u, "submissions", "view", Some("*"), None),
            key(&u, "submissions", "view", None, None)
        );
    }

    #[test]
    fn test_escape_segment() {
        assert!(matches!(escape_segment("s-1"), Cow::Borrowed("s-1")));
        assert_eq!(escape_segment("a:b"), "a%3Ab");
        assert_eq!(escape_segment("50%*"), "50%25%2A");
    }

    #[test]
    fn test_patterns_cover_keys() {
        let u = user();
        let decision = key(&u, "submissions", "create", None, None);
        let snapshot = snapshot_key(&u, KeyEpoch { user: 3, role: 2 });

        let by_user = glob_to_regex(&user_pattern("u1")).unwrap();
        assert!(by_user.is_match(&decision));
        assert!(by_user.is_match(&snapshot));
        assert!(!glob_to_regex(&user_pattern("u2")).unwrap().is_match(&decision));

        let by_role = glob_to_regex(&role_pattern(Role::Ppl)).unwrap();
        assert!(by_role.is_match(&decision));
        assert!(by_role.is_match(&snapshot));
        assert!(!glob_to_regex(&role_pattern(Role::Popt)).unwrap().is_match(&decision));
    }

    #[test]
    fn test_user_pattern_escapes_wildcards() {
        let star = AuthenticatedUser::new("*", "star@agrigate.test", Role::Ppl);
        let other = user();
        let by_star = glob_to_regex(&user_pattern("*")).unwrap();
        assert!(by_star.is_match(&key(&star, "reports", "view", None, None)));
        assert!(!by_star.is_match(&key(&other, "reports", "view", None, None)));
    }

    #[test]
    fn test_glob_escapes_literals() {
        let re = glob_to_regex("permission:u.1:*").unwrap();
        assert!(re.is_match("permission:u.1:PPL:snapshot"));
        assert!(!re.is_match("permission:ux1:PPL:snapshot"));
        assert!(glob_to_regex("exact").unwrap().is_match("exact"));
        assert!(!glob_to_regex("exact").unwrap().is_match("exactly"));
    }
}
