//! Identity provider webhook events
//!
//! Raw envelopes are decoded once, at the HTTP boundary, into [`IdentityEvent`].
//! Handlers downstream never look at untyped JSON.

use serde::{Deserialize, Serialize};

use super::provider::{DeletedObject, ProviderMembership, ProviderOrganization, ProviderUser};

/// Wire envelope: `{"type": "...", "data": {...}, "object": "event"}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
}

/// Webhook routes are split per category, each with its own signing secret
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Organizations,
    Memberships,
    Users,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Organizations => "organizations",
            EventCategory::Memberships => "memberships",
            EventCategory::Users => "users",
        }
    }
}

impl std::str::FromStr for EventCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "organizations" => Ok(EventCategory::Organizations),
            "memberships" => Ok(EventCategory::Memberships),
            "users" => Ok(EventCategory::Users),
            _ => Err(format!("Unknown webhook category: {}", s)),
        }
    }
}

/// The nine provider events the mirror reacts to
#[derive(Debug, Clone)]
pub enum IdentityEvent {
    OrganizationCreated(ProviderOrganization),
    OrganizationUpdated(ProviderOrganization),
    OrganizationDeleted(DeletedObject),
    MembershipCreated(ProviderMembership),
    MembershipUpdated(ProviderMembership),
    MembershipDeleted(ProviderMembership),
    UserCreated(ProviderUser),
    UserUpdated(ProviderUser),
    UserDeleted(DeletedObject),
}

impl IdentityEvent {
    /// Decode an envelope into a typed event.
    ///
    /// Returns `Ok(None)` for event types outside the known set and an error
    /// when a known type carries a payload that does not match its shape.
    pub fn decode(envelope: WebhookEnvelope) -> Result<Option<Self>, serde_json::Error> {
        let WebhookEnvelope { event_type, data } = envelope;

        let event = match event_type.as_str() {
            "organization.created" => Self::OrganizationCreated(serde_json::from_value(data)?),
            "organization.updated" => Self::OrganizationUpdated(serde_json::from_value(data)?),
            "organization.deleted" => Self::OrganizationDeleted(serde_json::from_value(data)?),
            "organizationMembership.created" => {
                Self::MembershipCreated(serde_json::from_value(data)?)
            }
            "organizationMembership.updated" => {
                Self::MembershipUpdated(serde_json::from_value(data)?)
            }
            "organizationMembership.deleted" => {
                Self::MembershipDeleted(serde_json::from_value(data)?)
            }
            "user.created" => Self::UserCreated(serde_json::from_value(data)?),
            "user.updated" => Self::UserUpdated(serde_json::from_value(data)?),
            "user.deleted" => Self::UserDeleted(serde_json::from_value(data)?),
            _ => return Ok(None),
        };

        Ok(Some(event))
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::OrganizationCreated(_) => "organization.created",
            Self::OrganizationUpdated(_) => "organization.updated",
            Self::OrganizationDeleted(_) => "organization.deleted",
            Self::MembershipCreated(_) => "organizationMembership.created",
            Self::MembershipUpdated(_) => "organizationMembership.updated",
            Self::MembershipDeleted(_) => "organizationMembership.deleted",
            Self::UserCreated(_) => "user.created",
            Self::UserUpdated(_) => "user.updated",
            Self::UserDeleted(_) => "user.deleted",
        }
    }

    pub fn category(&self) -> EventCategory {
        match self {
            Self::OrganizationCreated(_)
            | Self::OrganizationUpdated(_)
            | Self::OrganizationDeleted(_) => EventCategory::Organizations,
            Self::MembershipCreated(_)
            | Self::MembershipUpdated(_)
            | Self::MembershipDeleted(_) => EventCategory::Memberships,
            Self::UserCreated(_) | Self::UserUpdated(_) | Self::UserDeleted(_) => {
                EventCategory::Users
            }
        }
    }

    /// Provider id of the primary object the event is about
    pub fn external_id(&self) -> &str {
        match self {
            Self::OrganizationCreated(o) | Self::OrganizationUpdated(o) => &o.id,
            Self::MembershipCreated(m)
            | Self::MembershipUpdated(m)
            | Self::MembershipDeleted(m) => &m.id,
            Self::UserCreated(u) | Self::UserUpdated(u) => &u.id,
            Self::OrganizationDeleted(d) | Self::UserDeleted(d) => &d.id,
        }
    }

    /// Provider user id touched by the event, if any
    pub fn affected_user(&self) -> Option<&str> {
        match self {
            Self::UserCreated(u) | Self::UserUpdated(u) => Some(&u.id),
            Self::UserDeleted(d) => Some(&d.id),
            Self::MembershipCreated(m)
            | Self::MembershipUpdated(m)
            | Self::MembershipDeleted(m) => Some(&m.public_user_data.user_id),
            _ => None,
        }
    }
}
