//! Common step definitions used across features

use cucumber::{given, then};

use equiptrack::db::{MembershipRepository, OrganizationRepository, UserRepository};

use crate::common::{provider_org, provider_user, TestApp, TestTenant};
use crate::features::support::TestWorld;

#[given("a running EquipTrack instance")]
async fn running_instance(world: &mut TestWorld) {
    world.app = Some(TestApp::new().await);
}

#[given(expr = "a provider organization {string} with user {string} as {string}")]
async fn provider_organization_with_user(
    world: &mut TestWorld,
    org_name: String,
    user_name: String,
    role: String,
) {
    let organization = provider_org(&format!("org_{}", org_name.to_lowercase()), &org_name);
    world.app().provider.add_organization(organization.clone());
    world.organizations.insert(org_name, organization.clone());
    join(world, user_name, organization, role);
}

#[given(expr = "user {string} joins {string} as {string}")]
async fn user_joins(world: &mut TestWorld, user_name: String, org_name: String, role: String) {
    let organization = world.organization(&org_name).clone();
    join(world, user_name, organization, role);
}

fn join(
    world: &mut TestWorld,
    user_name: String,
    organization: equiptrack::models::ProviderOrganization,
    role: String,
) {
    let user_id = format!("user_{}", user_name.to_lowercase());
    let user = provider_user(&user_id, &format!("{}@example.com", user_name.to_lowercase()));
    let provider = &world.app().provider;
    provider.add_user(user.clone());
    provider.add_membership(&organization.id, &user_id, &role);
    world.users.insert(
        user_name,
        TestTenant {
            organization,
            user,
            role,
        },
    );
}

#[then(expr = "the response status should be {int}")]
async fn response_status(world: &mut TestWorld, status: u16) {
    assert_eq!(
        world.response().status,
        status,
        "body: {}",
        world.response().body
    );
}

#[then("the response should contain an error")]
async fn response_contains_error(world: &mut TestWorld) {
    assert!(world.response().body.get("error").is_some());
}

#[then(expr = "{int} organization(s) should be mirrored")]
async fn organizations_mirrored(world: &mut TestWorld, expected: i64) {
    let count = OrganizationRepository::new(&world.app().state.db)
        .count()
        .await
        .unwrap();
    assert_eq!(count, expected);
}

#[then(expr = "{int} user(s) should be mirrored")]
async fn users_mirrored(world: &mut TestWorld, expected: i64) {
    let count = UserRepository::new(&world.app().state.db)
        .count()
        .await
        .unwrap();
    assert_eq!(count, expected);
}

#[then(expr = "{int} membership(s) should be mirrored")]
async fn memberships_mirrored(world: &mut TestWorld, expected: i64) {
    let count = MembershipRepository::new(&world.app().state.db)
        .count()
        .await
        .unwrap();
    assert_eq!(count, expected);
}
