//! Test fixtures for common test data
//!
//! Provider objects, signed webhook deliveries and session tokens.

use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use equiptrack::middleware::SessionClaims;
use equiptrack::models::{
    DeletedObject, EmailVerification, ProviderEmailAddress, ProviderMembership,
    ProviderOrganization, ProviderUser, PublicUserData, UserMetadata,
};
use equiptrack::services::WebhookVerifier;

/// HS256 secret used to sign test session tokens
pub const TEST_SESSION_SECRET: &str = "test_session_secret_that_is_at_least_32_bytes_long";

/// Signing secret shared by every webhook category in tests
pub const TEST_WEBHOOK_SECRET: &str = "whsec_ZXF1aXB0cmFjay10ZXN0LXdlYmhvb2sta2V5";

/// Value accepted in the `X-API-Key` header
pub const TEST_API_KEY: &str = "test-internal-api-key";

/// A provider user with one verified email address
pub fn provider_user(id: &str, email: &str) -> ProviderUser {
    ProviderUser {
        id: id.to_string(),
        email_addresses: vec![ProviderEmailAddress {
            id: format!("idn_{}", id),
            email_address: email.to_string(),
            verification: Some(EmailVerification {
                status: "verified".to_string(),
            }),
        }],
        primary_email_address_id: Some(format!("idn_{}", id)),
        ..Default::default()
    }
}

pub fn provider_user_named(id: &str, email: &str, first: &str, last: &str) -> ProviderUser {
    ProviderUser {
        first_name: Some(first.to_string()),
        last_name: Some(last.to_string()),
        ..provider_user(id, email)
    }
}

/// A provider user whose metadata still carries legacy organization ids
pub fn legacy_provider_user(id: &str, email: &str, organizations: &[&str]) -> ProviderUser {
    ProviderUser {
        public_metadata: Some(UserMetadata {
            organizations: organizations.iter().map(|o| o.to_string()).collect(),
            ..Default::default()
        }),
        ..provider_user(id, email)
    }
}

pub fn provider_org(id: &str, name: &str) -> ProviderOrganization {
    ProviderOrganization {
        id: id.to_string(),
        name: name.to_string(),
        slug: Some(name.to_lowercase().replace(' ', "-")),
        ..Default::default()
    }
}

pub fn provider_membership(
    org: &ProviderOrganization,
    user_id: &str,
    role: &str,
) -> ProviderMembership {
    ProviderMembership {
        id: format!("orgmem_{}_{}", org.id, user_id),
        role: role.to_string(),
        organization: org.clone(),
        public_user_data: PublicUserData {
            user_id: user_id.to_string(),
            ..Default::default()
        },
    }
}

pub fn deleted(id: &str) -> DeletedObject {
    DeletedObject {
        id: id.to_string(),
        deleted: true,
    }
}

/// Webhook envelope as the provider posts it
pub fn event<T: Serialize>(event_type: &str, data: &T) -> Value {
    json!({
        "type": event_type,
        "object": "event",
        "data": data,
    })
}

/// Svix headers signing `body` with `secret` at the current time
pub fn signed_headers(secret: &str, body: &[u8]) -> Vec<(&'static str, String)> {
    let verifier = WebhookVerifier::from_secret(secret, 300).expect("valid test webhook secret");
    let msg_id = format!("msg_{}", Uuid::new_v4().simple());
    let timestamp = Utc::now().timestamp();

    vec![
        ("svix-id", msg_id.clone()),
        ("svix-timestamp", timestamp.to_string()),
        ("svix-signature", verifier.sign(&msg_id, timestamp, body)),
    ]
}

/// Session claims for a provider user, optionally with a selected organization
pub fn session_claims(user_id: &str, org: Option<(&str, &str)>) -> SessionClaims {
    let now = Utc::now().timestamp();
    SessionClaims {
        sub: user_id.to_string(),
        exp: now + 3600,
        nbf: Some(now - 5),
        iat: Some(now - 5),
        azp: None,
        org_id: org.map(|(id, _)| id.to_string()),
        org_role: org.map(|(_, role)| role.to_string()),
        org_slug: None,
    }
}

pub fn sign_session(claims: &SessionClaims) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(TEST_SESSION_SECRET.as_bytes()),
    )
    .expect("Failed to generate test token")
}

/// Session token for `user_id` with `org` = `(organization id, provider role)`
pub fn session_token(user_id: &str, org: Option<(&str, &str)>) -> String {
    sign_session(&session_claims(user_id, org))
}

pub fn expired_session_token(user_id: &str) -> String {
    let mut claims = session_claims(user_id, None);
    claims.exp = Utc::now().timestamp() - 3600;
    claims.nbf = Some(claims.exp - 3600);
    claims.iat = claims.nbf;
    sign_session(&claims)
}
