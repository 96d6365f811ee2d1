//! Step definitions for tenant-scoped equipment access

use cucumber::{given, when};
use serde_json::json;

use crate::features::support::TestWorld;

async fn register(world: &mut TestWorld, user: &str, code: &str) {
    let token = world.user(user).token();
    let response = world
        .app()
        .post_json_as(
            "/api/v1/equipment",
            json!({"code": code, "name": format!("Equipment {}", code)}),
            &token,
        )
        .await;
    world.record(response);
}

#[given(expr = "{string} has registered equipment {string}")]
async fn has_registered(world: &mut TestWorld, user: String, code: String) {
    register(world, &user, &code).await;
    assert_eq!(world.response().status, 201);
}

#[when(expr = "{string} registers equipment {string}")]
async fn registers(world: &mut TestWorld, user: String, code: String) {
    register(world, &user, &code).await;
}

#[when(expr = "{string} scans code {string}")]
async fn scans_code(world: &mut TestWorld, user: String, code: String) {
    let token = world.user(&user).token();
    let uri = format!("/api/v1/equipment/by-code/{}", urlencoding::encode(&code));
    let response = world.app().get_as(&uri, &token).await;
    world.record(response);
}
