//! Step definitions for identity webhook deliveries

use cucumber::{then, when};

use crate::common::{event, provider_membership, provider_org, signed_headers};
use crate::features::support::TestWorld;

#[when(expr = "the provider sends {string} for organization {string} named {string}")]
async fn send_organization_event(
    world: &mut TestWorld,
    event_type: String,
    org_id: String,
    name: String,
) {
    let payload = event(&event_type, &provider_org(&org_id, &name));
    let response = world.app().post_webhook("organizations", &payload).await;
    world.record(response);
}

#[when(expr = "the provider sends a membership of {string} in {string} with role {string}")]
async fn send_membership_event(world: &mut TestWorld, user_id: String, org_id: String, role: String) {
    let organization = provider_org(&org_id, &org_id);
    let payload = event(
        "organizationMembership.created",
        &provider_membership(&organization, &user_id, &role),
    );
    let response = world.app().post_webhook("memberships", &payload).await;
    world.record(response);
}

#[when("an organization event is sent with an invalid signature")]
async fn send_badly_signed_event(world: &mut TestWorld) {
    let payload = event("organization.created", &provider_org("org_forged", "Forged"));
    let body = payload.to_string();
    let headers = signed_headers("whsec_bm90LXRoZS1yaWdodC1rZXk=", body.as_bytes());
    let response = world
        .app()
        .post_webhook_raw("organizations", body.as_bytes(), headers)
        .await;
    world.record(response);
}

#[then("the webhook should report success")]
async fn webhook_success(world: &mut TestWorld) {
    assert_eq!(world.response().body["success"], true);
}

#[then("the webhook should report failure")]
async fn webhook_failure(world: &mut TestWorld) {
    assert_eq!(world.response().body["success"], false);
}
