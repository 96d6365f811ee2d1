//! Security context and tenant isolation tests

use serde_json::{json, Value};

use equiptrack::config::SyncCacheConfig;
use equiptrack::services::SyncCache;

use crate::common::{expired_session_token, session_claims, session_token, TestApp};

async fn create_equipment(app: &TestApp, token: &str, code: &str) -> Value {
    let response = app
        .post_json_as(
            "/api/v1/equipment",
            json!({"code": code, "name": "Hilti TE 70 drill", "category": "power-tools"}),
            token,
        )
        .await;
    response.assert_created();
    response.json()
}

#[tokio::test]
async fn test_missing_token_is_unauthenticated() {
    let app = TestApp::new().await;

    app.get("/api/v1/equipment").await.assert_unauthorized();
    app.get("/api/v1/me").await.assert_unauthorized();
}

#[tokio::test]
async fn test_expired_token_is_unauthenticated() {
    let app = TestApp::new().await;
    let tenant = app.tenant("org:admin");

    let response = app
        .get_as("/api/v1/me", &expired_session_token(tenant.user_id()))
        .await;
    response.assert_unauthorized();
    assert_eq!(app.provider.calls("get_user"), 0);
}

#[tokio::test]
async fn test_token_signed_with_other_key_is_rejected() {
    let app = TestApp::new().await;
    let tenant = app.tenant("org:admin");
    let claims = session_claims(tenant.user_id(), None);
    let forged = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(b"some_other_secret_that_is_32_bytes_long!"),
    )
    .unwrap();

    app.get_as("/api/v1/me", &forged).await.assert_unauthorized();
}

#[tokio::test]
async fn test_session_cookie_is_accepted() {
    let app = TestApp::new().await;
    let tenant = app.tenant("org:member");

    let request = axum::http::Request::builder()
        .method("GET")
        .uri("/api/v1/me")
        .header("Cookie", format!("__session={}", tenant.token()))
        .body(axum::body::Body::empty())
        .unwrap();

    app.request(request).await.assert_ok();
}

#[tokio::test]
async fn test_tenant_routes_require_selected_organization() {
    let app = TestApp::new().await;
    let tenant = app.tenant("org:admin");

    let response = app.get_as("/api/v1/equipment", &tenant.user_token()).await;
    response.assert_unauthorized();
}

#[tokio::test]
async fn test_equipment_is_invisible_across_tenants() {
    let app = TestApp::new().await;
    let alpha = app.tenant("org:admin");
    let beta = app.tenant("org:admin");

    let created = create_equipment(&app, &alpha.token(), "DRL-0042").await;
    let id = created["id"].as_str().unwrap();

    // By code: unknown and foreign codes look the same
    app.get_as("/api/v1/equipment/by-code/DRL-0042", &beta.token())
        .await
        .assert_not_found();
    app.get_as("/api/v1/equipment/by-code/NOPE-1", &beta.token())
        .await
        .assert_not_found();
    app.get_as("/api/v1/equipment/by-code/DRL-0042", &alpha.token())
        .await
        .assert_ok();

    // By id, listing, update and delete
    app.get_as(&format!("/api/v1/equipment/{}", id), &beta.token())
        .await
        .assert_not_found();
    let listed: Vec<Value> = app.get_as("/api/v1/equipment", &beta.token()).await.json();
    assert!(listed.is_empty());
    app.put_json_as(
        &format!("/api/v1/equipment/{}", id),
        json!({"name": "hijacked"}),
        &beta.token(),
    )
    .await
    .assert_not_found();
    app.delete_as(&format!("/api/v1/equipment/{}", id), &beta.token())
        .await
        .assert_not_found();

    let still_there: Value = app
        .get_as(&format!("/api/v1/equipment/{}", id), &alpha.token())
        .await
        .json();
    assert_eq!(still_there["name"], "Hilti TE 70 drill");
}

#[tokio::test]
async fn test_same_code_allowed_in_different_tenants() {
    let app = TestApp::new().await;
    let alpha = app.tenant("org:admin");
    let beta = app.tenant("org:admin");

    create_equipment(&app, &alpha.token(), "DRL-0001").await;
    create_equipment(&app, &beta.token(), "DRL-0001").await;

    app.post_json_as(
        "/api/v1/equipment",
        json!({"code": "DRL-0001", "name": "Duplicate"}),
        &alpha.token(),
    )
    .await
    .assert_conflict();
}

#[tokio::test]
async fn test_role_ordering_on_equipment() {
    let app = TestApp::new().await;
    let admin = app.tenant("org:admin");
    let manager = app.member_of(&admin, "manager");
    let member = app.member_of(&admin, "org:member");

    // Member: read only
    app.get_as("/api/v1/equipment", &member.token())
        .await
        .assert_ok();
    app.post_json_as(
        "/api/v1/equipment",
        json!({"code": "MBR-1", "name": "Ladder"}),
        &member.token(),
    )
    .await
    .assert_forbidden();

    // Manager: write, no delete
    let created = create_equipment(&app, &manager.token(), "MGR-1").await;
    let uri = format!("/api/v1/equipment/{}", created["id"].as_str().unwrap());
    app.put_json_as(&uri, json!({"status": "maintenance"}), &manager.token())
        .await
        .assert_ok();
    app.delete_as(&uri, &manager.token()).await.assert_forbidden();

    // Admin: everything
    app.delete_as(&uri, &admin.token()).await.assert_no_content();
    app.get_as(&uri, &admin.token()).await.assert_not_found();
}

#[tokio::test]
async fn test_membership_role_wins_over_session_claim() {
    let app = TestApp::new().await;
    let admin = app.tenant("org:admin");
    let member = app.member_of(&admin, "org:member");

    // Token claims `manager` but the provider membership says `member`
    let token = session_token(member.user_id(), Some((member.org_id(), "manager")));
    app.post_json_as(
        "/api/v1/equipment",
        json!({"code": "CLM-1", "name": "Scaffold"}),
        &token,
    )
    .await
    .assert_forbidden();
}

#[tokio::test]
async fn test_provider_admin_claim_grants_admin() {
    let app = TestApp::new().await;
    let owner = app.tenant("org:admin");
    let created = create_equipment(&app, &owner.token(), "ADM-1").await;

    // Membership says member, session says org:admin
    let member = app.member_of(&owner, "org:member");
    let token = session_token(member.user_id(), Some((member.org_id(), "org:admin")));
    app.delete_as(
        &format!("/api/v1/equipment/{}", created["id"].as_str().unwrap()),
        &token,
    )
    .await
    .assert_no_content();
}

#[tokio::test]
async fn test_organization_members_are_tenant_scoped() {
    let app = TestApp::new().await;
    let alpha = app.tenant("org:admin");
    app.member_of(&alpha, "org:member");
    let beta = app.tenant("org:admin");

    // Members are mirrored when each of them signs in
    for tenant in [&alpha, &beta] {
        app.get_as("/api/v1/me", &tenant.token()).await.assert_ok();
    }

    let members: Vec<Value> = app
        .get_as("/api/v1/organizations/current/members", &alpha.token())
        .await
        .json();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0]["external_id"], alpha.user_id());

    let org: Value = app
        .get_as("/api/v1/organizations/current", &beta.token())
        .await
        .json();
    assert_eq!(org["external_id"], beta.org_id());
}

#[test]
fn test_cache_entries_are_bound_to_owner() {
    let cache: SyncCache<String> = SyncCache::new(&SyncCacheConfig {
        secret: Some("cache-test-secret".to_string()),
        ..SyncCacheConfig::default()
    });

    cache.set("lazy-sync:user_a:-", "alpha".to_string(), "user_a", None);

    assert_eq!(
        cache.get("lazy-sync:user_a:-", "user_a", None),
        Some("alpha".to_string())
    );
    assert_eq!(cache.get("lazy-sync:user_a:-", "user_b", None), None);
    assert!(!cache.invalidate("lazy-sync:user_a:-", Some("user_b")));
    assert_eq!(cache.invalidate_owner("user_a"), 1);
    assert!(cache.is_empty());
}
