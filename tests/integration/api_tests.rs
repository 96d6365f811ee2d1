//! API integration tests
//!
//! Tests the API endpoints with real HTTP requests against the router.

use axum::http::StatusCode;
use serde_json::{json, Value};

use equiptrack::db::UserRepository;

use crate::common::{test_config, TestApp};

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    let app = TestApp::new().await;
    let response = app.get("/api/v1/health").await;

    response.assert_ok();

    let json: Value = response.json();
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn test_detailed_health_endpoint() {
    let app = TestApp::new().await;
    let response = app.get("/api/v1/health/detailed").await;

    response.assert_ok();

    let json: Value = response.json();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["components"]["database"]["status"], "healthy");
    assert_eq!(json["components"]["webhooks"]["status"], "healthy");
    assert!(json["components"]["sync_cache"].get("message").is_some());
}

#[tokio::test]
async fn test_detailed_health_reports_missing_webhook_secret() {
    let mut config = test_config();
    config.webhooks.memberships_secret = None;
    let app = TestApp::with_config(config).await;

    let response = app.get("/api/v1/health/detailed").await;

    // Degraded components never fail the probe
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["components"]["webhooks"]["status"], "degraded");
}

#[tokio::test]
async fn test_liveness_probe() {
    let app = TestApp::new().await;
    let response = app.get("/api/v1/health/live").await;

    response.assert_ok();
}

#[tokio::test]
async fn test_readiness_probe() {
    let app = TestApp::new().await;
    let response = app.get("/api/v1/health/ready").await;

    response.assert_ok();
}

#[tokio::test]
async fn test_equipment_crud_flow() {
    let app = TestApp::new().await;
    let tenant = app.tenant("org:admin");
    let token = tenant.token();

    let created: Value = {
        let response = app
            .post_json_as(
                "/api/v1/equipment",
                json!({
                    "code": "  https://scan.example.com/e/DRL-0042/ ",
                    "name": "Hilti TE 70",
                    "category": "drill",
                    "serial_number": "SN-998877"
                }),
                &token,
            )
            .await;
        response.assert_created();
        response.json()
    };
    assert_eq!(created["code"], "DRL-0042");
    assert_eq!(created["status"], "available");
    let uri = format!("/api/v1/equipment/{}", created["id"].as_str().unwrap());

    // A scanned URL and the bare code resolve to the same record
    let by_code: Value = app
        .get_as("/api/v1/equipment/by-code/DRL-0042", &token)
        .await
        .json();
    assert_eq!(by_code["id"], created["id"]);

    let updated: Value = app
        .put_json_as(&uri, json!({"name": "Hilti TE 70-ATC"}), &token)
        .await
        .json();
    assert_eq!(updated["name"], "Hilti TE 70-ATC");
    assert_eq!(updated["code"], "DRL-0042");

    let listed: Vec<Value> = app
        .get_as("/api/v1/equipment?search=hilti", &token)
        .await
        .json();
    assert_eq!(listed.len(), 1);

    app.delete_as(&uri, &token).await.assert_no_content();
    app.get_as(&uri, &token).await.assert_not_found();
}

#[tokio::test]
async fn test_equipment_validation() {
    let app = TestApp::new().await;
    let tenant = app.tenant("org:admin");

    let response = app
        .post_json_as(
            "/api/v1/equipment",
            json!({"code": "HAS SPACES", "name": "Drill"}),
            &tenant.token(),
        )
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    app.get_as("/api/v1/equipment/not-a-uuid", &tenant.token())
        .await
        .assert_bad_request();
}

#[tokio::test]
async fn test_project_crud_flow() {
    let app = TestApp::new().await;
    let tenant = app.tenant("org:admin");
    let token = tenant.token();

    let response = app
        .post_json_as(
            "/api/v1/projects",
            json!({
                "name": "Résidence Les Tilleuls",
                "code": "CH-2024-017",
                "start_date": "2024-03-01",
                "end_date": "2024-12-20"
            }),
            &token,
        )
        .await;
    response.assert_created();
    let project: Value = response.json();
    assert_eq!(project["status"], "active");
    let uri = format!("/api/v1/projects/{}", project["id"].as_str().unwrap());

    let updated: Value = app
        .put_json_as(&uri, json!({"status": "completed"}), &token)
        .await
        .json();
    assert_eq!(updated["status"], "completed");

    let listed: Vec<Value> = app.get_as("/api/v1/projects", &token).await.json();
    assert_eq!(listed.len(), 1);

    app.delete_as(&uri, &token).await.assert_no_content();
}

#[tokio::test]
async fn test_project_dates_must_be_ordered() {
    let app = TestApp::new().await;
    let tenant = app.tenant("org:admin");

    let response = app
        .post_json_as(
            "/api/v1/projects",
            json!({"name": "Backwards", "start_date": "2024-12-01", "end_date": "2024-01-01"}),
            &tenant.token(),
        )
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_assignment_flow() {
    let app = TestApp::new().await;
    let manager = app.tenant("manager");
    let worker = app.member_of(&manager, "org:member");
    let token = manager.token();

    // The worker must be mirrored before equipment can be handed to them
    app.get_as("/api/v1/me", &worker.token()).await.assert_ok();
    let worker_id = UserRepository::new(&app.state.db)
        .get_by_external_id(worker.user_id())
        .await
        .unwrap()
        .unwrap()
        .id;

    let equipment: Value = app
        .post_json_as(
            "/api/v1/equipment",
            json!({"code": "LDR-7", "name": "Ladder 7m"}),
            &token,
        )
        .await
        .json();
    let equipment_id = equipment["id"].as_str().unwrap();

    let response = app
        .post_json_as(
            "/api/v1/assignments",
            json!({"equipment_id": equipment_id, "user_id": worker_id}),
            &token,
        )
        .await;
    response.assert_created();
    let assignment: Value = response.json();
    assert!(assignment["returned_at"].is_null());

    let status: Value = app
        .get_as(&format!("/api/v1/equipment/{}", equipment_id), &token)
        .await
        .json();
    assert_eq!(status["status"], "assigned");

    // Already out
    app.post_json_as(
        "/api/v1/assignments",
        json!({"equipment_id": equipment_id, "user_id": worker_id}),
        &token,
    )
    .await
    .assert_conflict();

    // Members may look but not hand out equipment
    let open: Vec<Value> = app
        .get_as("/api/v1/assignments?open_only=true", &worker.token())
        .await
        .json();
    assert_eq!(open.len(), 1);

    let response = app
        .post_json_as(
            &format!("/api/v1/assignments/{}/return", assignment["id"].as_str().unwrap()),
            json!({}),
            &token,
        )
        .await;
    response.assert_ok();
    let returned: Value = response.json();
    assert!(!returned["returned_at"].is_null());

    let status: Value = app
        .get_as(&format!("/api/v1/equipment/{}", equipment_id), &token)
        .await
        .json();
    assert_eq!(status["status"], "available");
}

#[tokio::test]
async fn test_assignment_to_foreign_user_is_rejected() {
    let app = TestApp::new().await;
    let alpha = app.tenant("org:admin");
    let beta = app.tenant("org:admin");

    app.get_as("/api/v1/me", &beta.token()).await.assert_ok();
    let outsider = UserRepository::new(&app.state.db)
        .get_by_external_id(beta.user_id())
        .await
        .unwrap()
        .unwrap()
        .id;

    let equipment: Value = app
        .post_json_as(
            "/api/v1/equipment",
            json!({"code": "GEN-1", "name": "Generator"}),
            &alpha.token(),
        )
        .await
        .json();

    app.post_json_as(
        "/api/v1/assignments",
        json!({"equipment_id": equipment["id"], "user_id": outsider}),
        &alpha.token(),
    )
    .await
    .assert_not_found();
}

#[tokio::test]
async fn test_assignment_requires_target() {
    let app = TestApp::new().await;
    let tenant = app.tenant("org:admin");

    let equipment: Value = app
        .post_json_as(
            "/api/v1/equipment",
            json!({"code": "CMP-1", "name": "Compressor"}),
            &tenant.token(),
        )
        .await
        .json();

    let response = app
        .post_json_as(
            "/api/v1/assignments",
            json!({"equipment_id": equipment["id"]}),
            &tenant.token(),
        )
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}
