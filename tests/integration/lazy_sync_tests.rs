//! Lazy sync integration tests
//!
//! The first authenticated request of a user the mirror has never seen must
//! succeed, and repeated requests inside the cache TTL must not call the
//! identity provider again.

use serde_json::{json, Value};

use equiptrack::db::{MembershipRepository, OrganizationRepository, UserRepository};
use equiptrack::models::OrgRole;
use equiptrack::services::{ProviderSession, Reconciler, SyncError};

use crate::common::{provider_org, session_token, test_config, MockError, TestApp};

fn session(user: &str, org: Option<&str>) -> ProviderSession {
    ProviderSession {
        user_id: user.to_string(),
        org_id: org.map(String::from),
        org_role: Some("org:member".to_string()),
        org_slug: None,
    }
}

#[tokio::test]
async fn test_first_request_mirrors_identity() {
    let app = TestApp::new().await;
    let tenant = app.tenant("org:admin");

    let response = app.get_as("/api/v1/me", &tenant.token()).await;
    response.assert_ok();

    let body: Value = response.json();
    assert_eq!(body["user"]["external_id"], tenant.user_id());
    assert_eq!(body["organization"]["external_id"], tenant.org_id());
    assert_eq!(body["role"], "admin");
    assert_eq!(body["isAdmin"], true);

    assert_eq!(UserRepository::new(&app.state.db).count().await.unwrap(), 1);
    assert_eq!(OrganizationRepository::new(&app.state.db).count().await.unwrap(), 1);
    assert_eq!(MembershipRepository::new(&app.state.db).count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_repeated_sync_within_ttl_calls_provider_once() {
    let app = TestApp::new().await;
    let tenant = app.tenant("org:member");
    let token = tenant.token();

    app.get_as("/api/v1/me", &token).await.assert_ok();
    app.get_as("/api/v1/me", &token).await.assert_ok();

    assert_eq!(app.provider.calls("get_user"), 1);
    assert_eq!(app.provider.calls("get_organization"), 1);
    assert_eq!(app.provider.calls("get_membership"), 1);
}

#[tokio::test]
async fn test_disabled_cache_syncs_every_time() {
    let mut config = test_config();
    config.sync_cache.enabled = false;
    let app = TestApp::with_config(config).await;
    let tenant = app.tenant("org:member");

    app.get_as("/api/v1/me", &tenant.token()).await.assert_ok();
    app.get_as("/api/v1/me", &tenant.token()).await.assert_ok();

    assert_eq!(app.provider.calls("get_user"), 2);
}

#[tokio::test]
async fn test_switching_organization_is_a_separate_cache_entry() {
    let app = TestApp::new().await;
    let tenant = app.tenant("org:member");
    let other = provider_org("org_other", "Other Company");
    app.provider.add_organization(other.clone());
    app.provider.add_membership(&other.id, tenant.user_id(), "org:admin");

    let first = app
        .state
        .reconciler
        .lazy_sync(&session(tenant.user_id(), Some(tenant.org_id())))
        .await
        .unwrap();
    let second = app
        .state
        .reconciler
        .lazy_sync(&session(tenant.user_id(), Some("org_other")))
        .await
        .unwrap();

    assert_eq!(first.user_id, second.user_id);
    assert_ne!(first.organization_id, second.organization_id);
    assert_eq!(first.role, Some(OrgRole::Member));
    assert_eq!(second.role, Some(OrgRole::Admin));
    assert_eq!(app.provider.calls("get_user"), 2);
    assert_eq!(app.state.sync_cache.len(), 2);
}

#[tokio::test]
async fn test_cache_keys_are_per_user() {
    let app = TestApp::new().await;
    let ada = app.tenant("org:member");
    let bob = app.member_of(&ada, "org:member");

    let ada_synced = app
        .state
        .reconciler
        .lazy_sync(&session(ada.user_id(), Some(ada.org_id())))
        .await
        .unwrap();
    let bob_synced = app
        .state
        .reconciler
        .lazy_sync(&session(bob.user_id(), Some(bob.org_id())))
        .await
        .unwrap();

    assert_ne!(ada_synced.user_id, bob_synced.user_id);
    assert_eq!(ada_synced.organization_id, bob_synced.organization_id);
    assert_eq!(app.provider.calls("get_user"), 2);

    let key = Reconciler::lazy_sync_key(ada.user_id(), Some(ada.org_id()));
    assert!(app.state.sync_cache.get(&key, bob.user_id(), None).is_none());
    assert!(app.state.sync_cache.get(&key, ada.user_id(), None).is_some());
}

#[tokio::test]
async fn test_provider_failure_is_not_cached() {
    let app = TestApp::new().await;
    let tenant = app.tenant("org:member");
    let token = tenant.token();

    app.provider
        .set_error_mode(MockError::InternalError("upstream down".to_string()));
    let response = app.get_as("/api/v1/me", &token).await;
    assert_eq!(response.status.as_u16(), 502);
    assert!(app.state.sync_cache.is_empty());

    app.provider.clear_error_mode();
    app.get_as("/api/v1/me", &token).await.assert_ok();
    assert_eq!(app.provider.calls("get_user"), 2);
}

#[tokio::test]
async fn test_unknown_provider_user_is_unauthenticated() {
    let app = TestApp::new().await;
    let token = session_token("user_ghost", None);

    let response = app.get_as("/api/v1/me", &token).await;
    response.assert_unauthorized();
}

#[tokio::test]
async fn test_missing_provider_membership_writes_no_row() {
    let app = TestApp::new().await;
    let tenant = app.tenant("org:member");
    app.provider.remove_membership(tenant.org_id(), tenant.user_id());

    let synced = app
        .state
        .reconciler
        .lazy_sync(&session(tenant.user_id(), Some(tenant.org_id())))
        .await
        .unwrap();

    assert!(synced.organization_id.is_some());
    assert_eq!(synced.role, None);
    assert_eq!(MembershipRepository::new(&app.state.db).count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_empty_session_user_is_rejected() {
    let app = TestApp::new().await;

    let err = app
        .state
        .reconciler
        .lazy_sync(&session("  ", None))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Unauthenticated(_)));
    assert_eq!(app.provider.calls("get_user"), 0);
}

#[tokio::test]
async fn test_lazy_sync_refreshes_stale_profile() {
    let app = TestApp::new().await;
    let tenant = app.tenant("org:member");
    app.get_as("/api/v1/me", &tenant.token()).await.assert_ok();

    let mut renamed = tenant.user.clone();
    renamed.first_name = Some("Ada".to_string());
    renamed.last_name = Some("Lovelace".to_string());
    app.provider.add_user(renamed);
    app.state.reconciler.invalidate_user(tenant.user_id());

    let response = app.get_as("/api/v1/me", &tenant.token()).await;
    response.assert_ok();
    let body: Value = response.json();
    assert_eq!(body["user"]["display_name"], "Ada Lovelace");
}

#[tokio::test]
async fn test_tenant_route_syncs_on_first_request() {
    let app = TestApp::new().await;
    let tenant = app.tenant("org:member");

    // No /me call first: the security context extractor runs the sync itself
    let response = app.get_as("/api/v1/equipment", &tenant.token()).await;
    response.assert_ok();
    let items: Vec<Value> = response.json();
    assert!(items.is_empty());
}

#[tokio::test]
async fn test_update_onboarding_round_trips_through_provider() {
    let app = TestApp::new().await;
    let tenant = app.tenant("org:member");
    app.get_as("/api/v1/me", &tenant.token()).await.assert_ok();
    assert_eq!(app.state.sync_cache.len(), 1);

    let response = app
        .patch_json_as(
            "/api/v1/me/onboarding",
            json!({"onboarding": {"completed": true, "step": 3}}),
            &tenant.user_token(),
        )
        .await;
    response.assert_ok();

    let body: Value = response.json();
    assert_eq!(body["onboarding"]["completed"], true);
    assert_eq!(app.provider.calls("update_user_metadata"), 1);
    assert!(app.state.sync_cache.is_empty());

    let stored = app.provider.user(tenant.user_id()).unwrap();
    assert_eq!(
        stored.metadata().onboarding,
        Some(json!({"completed": true, "step": 3}))
    );
}

#[tokio::test]
async fn test_update_onboarding_requires_object() {
    let app = TestApp::new().await;
    let tenant = app.tenant("org:member");

    let response = app
        .patch_json_as(
            "/api/v1/me/onboarding",
            json!({"onboarding": "done"}),
            &tenant.user_token(),
        )
        .await;

    response.assert_bad_request();
    assert_eq!(app.provider.calls("update_user_metadata"), 0);
}
