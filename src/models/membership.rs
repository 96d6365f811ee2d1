//! Organization membership model and role ordering

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a user inside one organization.
///
/// The role set is open; only `admin`, `manager` and `member` carry meaning for
/// permission checks, with `admin > manager > member > other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrgRole {
    Admin,
    Manager,
    Member,
    Other(String),
}

impl OrgRole {
    /// Parse a role as reported by the identity provider.
    ///
    /// Provider roles may be namespaced (`org:admin`) and use `basic_member`
    /// for plain members.
    pub fn from_provider(raw: &str) -> Self {
        let role = raw.trim();
        let role = role.strip_prefix("org:").unwrap_or(role);
        match role.to_ascii_lowercase().as_str() {
            "admin" | "owner" => OrgRole::Admin,
            "manager" => OrgRole::Manager,
            "member" | "basic_member" => OrgRole::Member,
            _ => OrgRole::Other(role.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OrgRole::Admin => "admin",
            OrgRole::Manager => "manager",
            OrgRole::Member => "member",
            OrgRole::Other(s) => s,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            OrgRole::Admin => 3,
            OrgRole::Manager => 2,
            OrgRole::Member => 1,
            OrgRole::Other(_) => 0,
        }
    }

    /// True when this role is at least as privileged as `other`
    pub fn at_least(&self, other: &OrgRole) -> bool {
        self.rank() >= other.rank()
    }
}

impl From<String> for OrgRole {
    fn from(value: String) -> Self {
        OrgRole::from_provider(&value)
    }
}

impl From<OrgRole> for String {
    fn from(value: OrgRole) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for OrgRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (user, organization, role) mapping mirrored from the identity provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role: OrgRole,
    /// Provider membership id, when known
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Member listing row joined with the user record
#[derive(Debug, Clone, Serialize)]
pub struct OrganizationMember {
    pub user_id: Uuid,
    pub external_id: String,
    pub email: String,
    pub display_name: String,
    pub role: OrgRole,
    pub joined_at: DateTime<Utc>,
}
