//! Identity provider payloads
//!
//! Shapes returned by the provider's Backend API and carried inside webhook
//! events. Only the fields the mirror needs are decoded; everything else is
//! ignored.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Provider user object
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderUser {
    pub id: String,
    #[serde(default)]
    pub email_addresses: Vec<ProviderEmailAddress>,
    #[serde(default)]
    pub primary_email_address_id: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub public_metadata: Option<UserMetadata>,
    /// Milliseconds since the epoch
    #[serde(default)]
    pub last_sign_in_at: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderEmailAddress {
    pub id: String,
    pub email_address: String,
    #[serde(default)]
    pub verification: Option<EmailVerification>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailVerification {
    pub status: String,
}

/// Application metadata stored on the provider user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, alias = "isAdmin")]
    pub is_admin: bool,
    #[serde(default)]
    pub onboarding: Option<serde_json::Value>,
    /// Older clients wrote either one organization id or a list of them
    #[serde(default, deserialize_with = "one_or_many")]
    pub organizations: Vec<String>,
}

impl ProviderUser {
    fn primary_address(&self) -> Option<&ProviderEmailAddress> {
        let primary = self.primary_email_address_id.as_deref();
        self.email_addresses
            .iter()
            .find(|e| Some(e.id.as_str()) == primary)
            .or_else(|| self.email_addresses.first())
    }

    pub fn primary_email(&self) -> String {
        self.primary_address()
            .map(|e| e.email_address.to_lowercase())
            .unwrap_or_default()
    }

    pub fn is_email_verified(&self) -> bool {
        self.primary_address()
            .and_then(|e| e.verification.as_ref())
            .is_some_and(|v| v.status == "verified")
    }

    /// "First Last", falling back to the username and then the email
    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if !full.is_empty() {
            full
        } else if let Some(username) = self.username.as_deref().filter(|u| !u.is_empty()) {
            username.to_string()
        } else {
            self.primary_email()
        }
    }

    pub fn last_sign_in(&self) -> Option<DateTime<Utc>> {
        self.last_sign_in_at
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }

    pub fn metadata(&self) -> UserMetadata {
        self.public_metadata.clone().unwrap_or_default()
    }
}

/// Provider organization object
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderOrganization {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub public_metadata: Option<OrganizationMetadata>,
    #[serde(default)]
    pub private_metadata: Option<BillingMetadata>,
}

/// Contact details and settings kept in the organization's public metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrganizationMetadata {
    #[serde(default, alias = "contactEmail")]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub settings: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Billing fields kept in the organization's private metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillingMetadata {
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default, alias = "subscriptionStatus")]
    pub subscription_status: Option<String>,
}

/// Provider organization membership object
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderMembership {
    pub id: String,
    pub role: String,
    pub organization: ProviderOrganization,
    pub public_user_data: PublicUserData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublicUserData {
    pub user_id: String,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Payload of `*.deleted` events for users and organizations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeletedObject {
    pub id: String,
    #[serde(default)]
    pub deleted: bool,
}

/// One page of a provider list endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPage<T> {
    pub data: Vec<T>,
    /// Zero when the endpoint does not report a total
    #[serde(default)]
    pub total_count: u64,
}

/// Accepts `"org_1"`, `["org_1", "org_2"]` or `null`
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    let ids = match Option::<OneOrMany>::deserialize(deserializer)? {
        None => vec![],
        Some(OneOrMany::One(id)) => vec![id],
        Some(OneOrMany::Many(ids)) => ids,
    };

    Ok(ids
        .into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect())
}
