//! Organization (tenant) model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::provider::ProviderOrganization;

/// Local mirror of a provider organization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    /// Provider organization id; never changes once set
    pub external_id: String,
    pub name: String,
    pub slug: Option<String>,
    pub contact_email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub settings: serde_json::Value,
    pub plan: Option<String>,
    pub subscription_status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Field set written by an upsert keyed on `external_id`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrganizationUpsert {
    pub external_id: String,
    pub name: String,
    pub slug: Option<String>,
    pub contact_email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub settings: serde_json::Map<String, serde_json::Value>,
    pub plan: Option<String>,
    pub subscription_status: Option<String>,
}

impl From<&ProviderOrganization> for OrganizationUpsert {
    fn from(org: &ProviderOrganization) -> Self {
        let public = org.public_metadata.clone().unwrap_or_default();
        let billing = org.private_metadata.clone().unwrap_or_default();

        let name = if org.name.trim().is_empty() {
            org.slug.clone().unwrap_or_else(|| org.id.clone())
        } else {
            org.name.trim().to_string()
        };

        Self {
            external_id: org.id.clone(),
            name,
            slug: org.slug.clone().filter(|s| !s.is_empty()),
            contact_email: public.contact_email,
            phone: public.phone,
            address: public.address,
            settings: public.settings.unwrap_or_default(),
            plan: billing.plan,
            subscription_status: billing.subscription_status,
        }
    }
}
