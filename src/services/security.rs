//! Security context resolution and tenant authorization
//!
//! A verified provider session is turned into a [`SecurityContext`] by looking
//! up the local mirror. Every tenant-scoped operation then goes through
//! [`SecurityContext::authorize`], which rejects cross-tenant access before
//! looking at roles.
//!
//! Resolution is read-only. A `NotFound` result means the local mirror has
//! not caught up yet; callers decide whether to run a lazy sync and retry.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::{DbPool, MembershipRepository, OrganizationRepository, UserRepository};
use crate::models::OrgRole;

/// Identity claims taken from a verified provider session token
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderSession {
    /// Provider user id (`sub`)
    pub user_id: String,
    /// Currently selected provider organization, if any
    pub org_id: Option<String>,
    /// Role in the selected organization as reported by the provider
    pub org_role: Option<String>,
    pub org_slug: Option<String>,
}

impl ProviderSession {
    pub fn selected_org(&self) -> Option<&str> {
        self.org_id.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("{operation} forbidden: {reason}")]
    Forbidden { operation: String, reason: String },

    /// Local mirror record missing; a lazy sync may fix it
    #[error("{0} not found")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

/// Required privilege for an operation on tenant data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Read,
    Write,
    Admin,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Read => "read",
            AccessLevel::Write => "write",
            AccessLevel::Admin => "admin",
        }
    }
}

/// Request-scoped identity of a user-facing caller. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityContext {
    pub provider_user_id: String,
    pub provider_org_id: Option<String>,
    /// Normalised provider role (`org:admin` becomes `admin`)
    pub provider_role: Option<String>,
    pub user_id: Uuid,
    pub organization_id: Option<Uuid>,
    /// Local membership role in `organization_id`
    pub role: Option<OrgRole>,
    /// Global administrator flag of the local user
    pub user_is_admin: bool,
    /// Provider admin role in the selected organization, or global admin
    pub is_admin: bool,
}

impl SecurityContext {
    /// The selected organization, or `Unauthenticated` for user-only contexts
    pub fn require_organization(&self) -> Result<Uuid, SecurityError> {
        self.organization_id
            .ok_or_else(|| SecurityError::Unauthenticated("No organization selected".to_string()))
    }

    pub fn belongs_to(&self, organization_id: Uuid) -> bool {
        self.organization_id == Some(organization_id)
    }

    /// Guard an operation on data owned by `organization_id`.
    ///
    /// Tenant mismatch is rejected regardless of role. `Admin` implies
    /// `Write`, which implies `Read`.
    pub fn authorize(
        &self,
        operation: &str,
        organization_id: Uuid,
        level: AccessLevel,
    ) -> Result<(), SecurityError> {
        if !self.belongs_to(organization_id) {
            warn!(
                operation = operation,
                user = %self.provider_user_id,
                target_org = %organization_id,
                "Cross-tenant access rejected"
            );
            return Err(SecurityError::Forbidden {
                operation: operation.to_string(),
                reason: "resource belongs to another organization".to_string(),
            });
        }

        let allowed = match level {
            AccessLevel::Read => true,
            AccessLevel::Write => {
                self.is_admin
                    || self
                        .role
                        .as_ref()
                        .is_some_and(|r| r.at_least(&OrgRole::Manager))
            }
            AccessLevel::Admin => self.is_admin || self.role == Some(OrgRole::Admin),
        };

        if !allowed {
            warn!(
                operation = operation,
                user = %self.provider_user_id,
                level = level.as_str(),
                role = ?self.role,
                "Insufficient role"
            );
            return Err(SecurityError::Forbidden {
                operation: operation.to_string(),
                reason: format!("{} access required", level.as_str()),
            });
        }

        Ok(())
    }
}

/// Tenant and admin check without logging or errors
pub fn check_permission(
    resource_organization_id: Uuid,
    context: &SecurityContext,
    require_admin: bool,
) -> bool {
    if !context.belongs_to(resource_organization_id) {
        return false;
    }
    !require_admin || context.is_admin
}

/// Builds security contexts from the local mirror
#[derive(Clone)]
pub struct SecurityResolver {
    db: DbPool,
}

impl SecurityResolver {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Resolve an organization-scoped context
    pub async fn resolve(&self, session: &ProviderSession) -> Result<SecurityContext, SecurityError> {
        let org_external_id = session
            .selected_org()
            .ok_or_else(|| SecurityError::Unauthenticated("No organization selected".to_string()))?;

        let mut context = self.resolve_user(session).await?;

        let organization = OrganizationRepository::new(&self.db)
            .get_by_external_id(org_external_id)
            .await?
            .ok_or_else(|| SecurityError::NotFound(format!("organization {}", org_external_id)))?;

        // A missing membership row is not an error; the context simply has no role
        let membership = MembershipRepository::new(&self.db)
            .get(organization.id, context.user_id)
            .await?;

        let provider_role = session
            .org_role
            .as_deref()
            .map(|r| OrgRole::from_provider(r).as_str().to_string());

        context.provider_org_id = Some(org_external_id.to_string());
        context.is_admin = context.user_is_admin || provider_role.as_deref() == Some("admin");
        context.provider_role = provider_role;
        context.organization_id = Some(organization.id);
        context.role = membership.map(|m| m.role);

        debug!(
            user = %context.provider_user_id,
            organization = org_external_id,
            role = ?context.role,
            is_admin = context.is_admin,
            "Resolved security context"
        );

        Ok(context)
    }

    /// Resolve a context for flows that do not need an organization
    pub async fn resolve_user(
        &self,
        session: &ProviderSession,
    ) -> Result<SecurityContext, SecurityError> {
        let user_external_id = session.user_id.trim();
        if user_external_id.is_empty() {
            return Err(SecurityError::Unauthenticated(
                "Missing user identity".to_string(),
            ));
        }

        let user = UserRepository::new(&self.db)
            .get_by_external_id(user_external_id)
            .await?
            .ok_or_else(|| SecurityError::NotFound(format!("user {}", user_external_id)))?;

        Ok(SecurityContext {
            provider_user_id: user.external_id,
            provider_org_id: None,
            provider_role: None,
            user_id: user.id,
            organization_id: None,
            role: None,
            user_is_admin: user.is_admin,
            is_admin: user.is_admin,
        })
    }
}
