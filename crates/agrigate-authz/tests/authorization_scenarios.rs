//! End-to-end decision scenarios through the authorization service.

use std::sync::Arc;
use std::time::Duration;

use agrigate_authz::audit::InMemoryAuditSink;
use agrigate_authz::config::{AuditConfig, CacheConfig};
use agrigate_authz::policy::CheckOptions;
use agrigate_authz::prelude::*;
use agrigate_authz::types::{REASON_CONDITIONS_NOT_MET, REASON_NO_MATCH, WILDCARD};
use agrigate_authz::{PermissionCache, PermissionCatalog};
use serde_json::{Map, Value, json};
use time::OffsetDateTime;

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

fn user(id: &str, role: Role) -> AuthenticatedUser {
    AuthenticatedUser::new(id, format!("{id}@agrigate.test"), role)
}

fn record(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("record must be an object"),
    }
}

// =============================================================================
// Catalog properties
// =============================================================================

#[tokio::test]
async fn unconditioned_catalog_entries_are_allowed() {
    let svc = service();

    for role in Role::ALL {
        let u = user("u1", role);
        let permissions = svc.get_role_permissions(role);
        for permission in permissions.iter().filter(|p| !p.is_conditional()) {
            let result = svc
                .check_permission(&u, &permission.resource, &permission.action, None, None, CheckOptions::default())
                .await;
            assert!(result.allowed, "{role} should be allowed {permission}");
        }
    }
}

#[tokio::test]
async fn absent_pairs_are_denied() {
    let svc = service();
    let resources = ["users", "medicines", "submissions", "transactions", "reports", "warehouses"];
    let actions = ["view", "create", "delete", "approve", "export", "archive"];

    for role in [Role::Dinas, Role::Popt, Role::Ppl] {
        let u = user("u1", role);
        let permissions = svc.get_role_permissions(role);
        for resource in resources {
            for action in actions {
                if permissions.iter().any(|p| p.matches(resource, action)) {
                    continue;
                }
                let result = svc.check_permission(&u, resource, action, None, None, CheckOptions::default()).await;
                assert!(!result.allowed, "{role} must not be allowed {resource}:{action}");
                assert_eq!(result.reason, REASON_NO_MATCH);
            }
        }
    }
}

#[tokio::test]
async fn wildcard_allows_everything() {
    let svc = service();
    svc.update_role_permissions("a1", Role::Popt, vec![Permission::new(WILDCARD, WILDCARD)])
        .await
        .unwrap();

    let u = user("p1", Role::Popt);
    for (resource, action) in [("warehouses", "archive"), ("users", "delete"), ("x", "y")] {
        assert!(svc.has_permission(&u, resource, action, None).await);
    }

    // Without the super-admin shortcut the wildcard entry still matches.
    let admin = user("a1", Role::Admin);
    let result = svc.manager().check_permission(
        &admin,
        "anything",
        "at_all",
        None,
        None,
        CheckOptions::strict(),
    );
    assert!(result.allowed);
}

#[tokio::test]
async fn ppl_submission_scenario() {
    let svc = service();
    let ppl = user("u1", Role::Ppl);

    assert!(svc.check_permission(&ppl, "submissions", "create", None, None, CheckOptions::default()).await.allowed);
    assert!(!svc.check_permission(&ppl, "submissions", "approve", None, None, CheckOptions::default()).await.allowed);
}

// =============================================================================
// Conditions
// =============================================================================

#[tokio::test]
async fn dinas_view_own_scenario() {
    let svc = service();
    let dinas = user("u1", Role::Dinas);

    let own = PermissionContext::new().with_field("created_by", json!("u1"));
    let result = svc
        .check_permission(&dinas, "submissions", "view_own", None, Some(&own), CheckOptions::default())
        .await;
    assert!(result.allowed);

    let foreign = PermissionContext::new().with_field("created_by", json!("u2"));
    let result = svc
        .check_permission(&dinas, "submissions", "view_own", None, Some(&foreign), CheckOptions::default())
        .await;
    assert!(!result.allowed);
    assert_eq!(result.reason, REASON_CONDITIONS_NOT_MET);
    let evaluated = result.evaluated_conditions.unwrap();
    assert_eq!(evaluated[0].actual, Some(json!("u2")));
    assert_eq!(evaluated[0].expected, json!("u1"));
}

#[tokio::test]
async fn ownership_condition_holds_for_any_user_id() {
    let svc = service();
    for id in ["u1", "user-42", "0", "a.b@c"] {
        let ppl = user(id, Role::Ppl);
        let own = PermissionContext::new().with_field("created_by", json!(id));
        let other = PermissionContext::new().with_field("created_by", json!(format!("{id}-other")));

        assert!(svc.has_permission(&ppl, "submissions", "update", Some(&own)).await);
        assert!(!svc.has_permission(&ppl, "submissions", "update", Some(&other)).await);
        assert!(!svc.has_permission(&ppl, "submissions", "update", None).await);
    }
}

// =============================================================================
// Dynamic grants
// =============================================================================

#[tokio::test]
async fn temporary_grant_scenario() {
    let svc = service();
    let u9 = user("u9", Role::Ppl);
    let expires_at = OffsetDateTime::now_utc() + time::Duration::hours(1);

    assert!(!svc.has_permission(&u9, "medicines", "delete", None).await);

    let grant = svc
        .grant_dynamic_permission("a1", "u9", Permission::new("medicines", "delete"), Some(expires_at))
        .await
        .unwrap();
    assert_eq!(grant.granted_by, "a1");

    let result = svc.check_permission(&u9, "medicines", "delete", None, None, CheckOptions::default()).await;
    assert!(result.allowed);
    assert_eq!(result.valid_until, Some(expires_at));

    let later = svc.manager().check_permission_at(
        &u9,
        "medicines",
        "delete",
        None,
        CheckOptions::default(),
        expires_at + time::Duration::minutes(1),
    );
    assert!(!later.allowed);
    assert_eq!(later.reason, REASON_NO_MATCH);
}

#[tokio::test]
async fn cached_decision_does_not_outlive_grant() {
    let svc = service();
    let u9 = user("u9", Role::Ppl);
    let expires_at = OffsetDateTime::now_utc() + time::Duration::milliseconds(100);

    svc.grant_dynamic_permission("a1", "u9", Permission::new("medicines", "delete"), Some(expires_at))
        .await
        .unwrap();
    assert!(svc.has_permission(&u9, "medicines", "delete", None).await);

    tokio::time::sleep(Duration::from_millis(250)).await;

    assert!(!svc.has_permission(&u9, "medicines", "delete", None).await);
}

#[tokio::test]
async fn expired_grant_is_ignored() {
    let svc = service();
    let u9 = user("u9", Role::Ppl);
    let before = svc.check_permission(&u9, "medicines", "delete", None, None, CheckOptions::default()).await;

    svc.grant_dynamic_permission(
        "a1",
        "u9",
        Permission::new("medicines", "delete"),
        Some(OffsetDateTime::now_utc() - time::Duration::hours(1)),
    )
    .await
    .unwrap();

    let after = svc.check_permission(&u9, "medicines", "delete", None, None, CheckOptions::default()).await;
    assert_eq!(before, after);
}

#[tokio::test]
async fn revoke_takes_effect_immediately() {
    let svc = service();
    let u9 = user("u9", Role::Ppl);

    svc.grant_dynamic_permission("a1", "u9", Permission::new("reports", "export"), None)
        .await
        .unwrap();
    assert!(svc.has_permission(&u9, "reports", "export", None).await);

    svc.revoke_dynamic_permission("a1", "u9", "reports", "export")
        .await
        .unwrap();
    assert!(!svc.has_permission(&u9, "reports", "export", None).await);
}

#[tokio::test]
async fn repeated_checks_are_identical() {
    let svc = service();
    let dinas = user("u1", Role::Dinas);
    let context = PermissionContext::new().with_field("created_by", json!("u1"));

    let first = svc
        .check_permission(&dinas, "submissions", "view_own", None, Some(&context), CheckOptions::default())
        .await;
    let second = svc
        .check_permission(&dinas, "submissions", "view_own", None, Some(&context), CheckOptions::default())
        .await;
    assert_eq!(first, second);
    assert_eq!(svc.cache_stats().hits, 1);

    let uncached = svc.manager().check_permission(
        &dinas,
        "submissions",
        "view_own",
        None,
        Some(&context),
        CheckOptions::default(),
    );
    assert_eq!(first, uncached);
}

// =============================================================================
// Resource guard
// =============================================================================

#[tokio::test]
async fn access_query_bypass_and_ownership() {
    let svc = service();
    let records = [
        record(json!({"id": "s1", "created_by": "u1"})),
        record(json!({"id": "s2", "created_by": "u2"})),
        record(json!({"id": "s3", "created_by": "u1"})),
        record(json!({"id": "s4"})),
    ];

    let dinas = user("d1", Role::Dinas);
    let query = svc.build_access_query(&dinas, "submissions", "view");
    assert!(query.is_unrestricted());
    assert!(records.iter().all(|r| query.matches(r)));

    let ppl = user("u1", Role::Ppl);
    let query = svc.build_access_query(&ppl, "submissions", "view");
    let visible: Vec<&str> = records
        .iter()
        .filter(|r| query.matches(r))
        .filter_map(|r| r["id"].as_str())
        .collect();
    assert_eq!(visible, ["s1", "s3"]);
    assert_eq!(query.to_filter_document(), json!({"created_by": "u1"}));
}

#[tokio::test]
async fn record_level_checks_use_snapshot() {
    let svc = service();
    let ppl = user("u1", Role::Ppl);

    let own = record(json!({"created_by": "u1"}));
    let foreign = record(json!({"created_by": "u2"}));
    assert!(svc.can_access_resource(&ppl, "submissions", "s1", "view", Some(&own)).await);
    assert!(!svc.can_access_resource(&ppl, "submissions", "s2", "view", Some(&foreign)).await);
    assert!(!svc.can_access_resource(&ppl, "submissions", "s2", "view", None).await);

    let dinas = user("d1", Role::Dinas);
    assert!(svc.can_access_resource(&dinas, "submissions", "s2", "view", Some(&foreign)).await);
}

#[tokio::test]
async fn denials_reach_security_events() {
    let svc = service();
    let ppl = user("u1", Role::Ppl);
    let context = PermissionContext::new().with_field("password", json!("hunter2"));

    svc.check_permission(&ppl, "submissions", "approve", None, Some(&context), CheckOptions::default())
        .await;
    svc.shutdown().await.unwrap();

    let events = svc.security_events(None).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].user_id, "u1");
    assert_eq!(
        events[0].context.as_ref().unwrap()["fields"]["password"],
        json!("[REDACTED]")
    );
}
