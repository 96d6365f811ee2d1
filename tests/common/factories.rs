//! Test factories for generating test data
//!
//! Factories create unique tenants in the mock identity provider so tests
//! never collide on provider ids.

use std::sync::atomic::{AtomicU64, Ordering};

use equiptrack::models::{ProviderOrganization, ProviderUser};

use super::fixtures::{provider_org, provider_user, session_token};
use super::mocks::MockIdentityProvider;

/// A provider organization with one member
#[derive(Debug, Clone)]
pub struct TestTenant {
    pub organization: ProviderOrganization,
    pub user: ProviderUser,
    /// Provider role string (`org:admin`, `org:member`, ...)
    pub role: String,
}

impl TestTenant {
    pub fn org_id(&self) -> &str {
        &self.organization.id
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    /// Session token with this tenant's organization selected
    pub fn token(&self) -> String {
        session_token(&self.user.id, Some((&self.organization.id, &self.role)))
    }

    /// Session token without a selected organization
    pub fn user_token(&self) -> String {
        session_token(&self.user.id, None)
    }
}

/// Factory for creating tenants in the mock provider
pub struct TenantFactory {
    counter: AtomicU64,
}

impl Default for TenantFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl TenantFactory {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst)
    }

    /// New organization with one user holding `role`
    pub fn tenant(&self, provider: &MockIdentityProvider, role: &str) -> TestTenant {
        let n = self.next();
        let organization = provider_org(&format!("org_{}", n), &format!("Company {}", n));
        provider.add_organization(organization.clone());
        self.member(provider, &organization, role)
    }

    /// New user added to an existing organization
    pub fn member(
        &self,
        provider: &MockIdentityProvider,
        organization: &ProviderOrganization,
        role: &str,
    ) -> TestTenant {
        let n = self.next();
        let user = provider_user(&format!("user_{}", n), &format!("worker{}@example.com", n));
        provider.add_user(user.clone());
        provider.add_membership(&organization.id, &user.id, role);

        TestTenant {
            organization: organization.clone(),
            user,
            role: role.to_string(),
        }
    }
}
