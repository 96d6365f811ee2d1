//! Application user model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::provider::ProviderUser;

/// Local mirror of a provider user.
///
/// Organization membership is not stored here; it lives in the membership
/// table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppUser {
    pub id: Uuid,
    pub external_id: String,
    pub email: String,
    pub display_name: String,
    /// Free-text job role (e.g. "site manager"); not used for permissions
    pub role: String,
    /// Global administrator flag
    pub is_admin: bool,
    pub is_verified: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub onboarding: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Field set written by an upsert keyed on `external_id`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppUserUpsert {
    pub external_id: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub is_admin: bool,
    pub is_verified: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub onboarding: Option<serde_json::Value>,
}

impl From<&ProviderUser> for AppUserUpsert {
    fn from(user: &ProviderUser) -> Self {
        let meta = user.metadata();
        Self {
            external_id: user.id.clone(),
            email: user.primary_email(),
            display_name: user.display_name(),
            role: meta
                .role
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| "member".to_string()),
            is_admin: meta.is_admin,
            is_verified: user.is_email_verified(),
            last_login_at: user.last_sign_in(),
            onboarding: meta.onboarding,
        }
    }
}
