//! Mock services for testing
//!
//! Provides an in-memory identity provider so reconciliation can be tested
//! without the hosted Backend API.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use equiptrack::models::{
    ProviderMembership, ProviderOrganization, ProviderPage, ProviderUser, PublicUserData,
    UserMetadata,
};
use equiptrack::services::{IdentityProvider, ProviderError, ProviderResult};

/// Types of errors the mock can simulate
#[derive(Debug, Clone)]
pub enum MockError {
    /// Connection refused
    ConnectionRefused,
    /// Provider answered with a 5xx
    InternalError(String),
    /// Provider answered 404
    NotFound,
}

impl MockError {
    fn into_provider_error(self, operation: &str) -> ProviderError {
        match self {
            MockError::ConnectionRefused => ProviderError::Transport {
                operation: operation.to_string(),
                message: "connection refused".to_string(),
            },
            MockError::InternalError(body) => ProviderError::Status {
                operation: operation.to_string(),
                status: 500,
                body,
            },
            MockError::NotFound => ProviderError::NotFound {
                operation: operation.to_string(),
                resource: "resource".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone)]
struct MembershipRecord {
    id: String,
    organization_id: String,
    user_id: String,
    role: String,
}

/// In-memory identity provider with per-operation call counters
#[derive(Clone, Default)]
pub struct MockIdentityProvider {
    users: Arc<RwLock<BTreeMap<String, ProviderUser>>>,
    organizations: Arc<RwLock<BTreeMap<String, ProviderOrganization>>>,
    memberships: Arc<RwLock<Vec<MembershipRecord>>>,
    calls: Arc<RwLock<HashMap<String, usize>>>,
    /// Fail every operation when set
    pub error_mode: Arc<RwLock<Option<MockError>>>,
    /// Fail only the named operations
    failing: Arc<RwLock<HashMap<String, MockError>>>,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set error mode to simulate an unavailable provider
    pub fn set_error_mode(&self, error: MockError) {
        *self.error_mode.write().unwrap() = Some(error);
    }

    pub fn clear_error_mode(&self) {
        *self.error_mode.write().unwrap() = None;
        self.failing.write().unwrap().clear();
    }

    /// Make a single operation (e.g. `"list_users"`) fail
    pub fn fail_operation(&self, operation: &str, error: MockError) {
        self.failing
            .write()
            .unwrap()
            .insert(operation.to_string(), error);
    }

    /// Number of times an operation was called
    pub fn calls(&self, operation: &str) -> usize {
        self.calls
            .read()
            .unwrap()
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    pub fn reset_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    pub fn add_user(&self, user: ProviderUser) {
        self.users.write().unwrap().insert(user.id.clone(), user);
    }

    pub fn remove_user(&self, user_id: &str) {
        self.users.write().unwrap().remove(user_id);
        self.memberships
            .write()
            .unwrap()
            .retain(|m| m.user_id != user_id);
    }

    pub fn add_organization(&self, org: ProviderOrganization) {
        self.organizations
            .write()
            .unwrap()
            .insert(org.id.clone(), org);
    }

    /// Add or replace the membership of `user_id` in `organization_id`
    pub fn add_membership(&self, organization_id: &str, user_id: &str, role: &str) {
        let mut memberships = self.memberships.write().unwrap();
        memberships.retain(|m| !(m.organization_id == organization_id && m.user_id == user_id));
        memberships.push(MembershipRecord {
            id: format!("orgmem_{}_{}", organization_id, user_id),
            organization_id: organization_id.to_string(),
            user_id: user_id.to_string(),
            role: role.to_string(),
        });
    }

    pub fn remove_membership(&self, organization_id: &str, user_id: &str) {
        self.memberships
            .write()
            .unwrap()
            .retain(|m| !(m.organization_id == organization_id && m.user_id == user_id));
    }

    pub fn user(&self, user_id: &str) -> Option<ProviderUser> {
        self.users.read().unwrap().get(user_id).cloned()
    }

    /// Count the call, then fail if an error is configured for it
    fn check(&self, operation: &str) -> ProviderResult<()> {
        *self
            .calls
            .write()
            .unwrap()
            .entry(operation.to_string())
            .or_insert(0) += 1;

        if let Some(error) = self.error_mode.read().unwrap().clone() {
            return Err(error.into_provider_error(operation));
        }
        if let Some(error) = self.failing.read().unwrap().get(operation).cloned() {
            return Err(error.into_provider_error(operation));
        }
        Ok(())
    }

    fn to_membership(&self, record: &MembershipRecord) -> ProviderMembership {
        let organization = self
            .organizations
            .read()
            .unwrap()
            .get(&record.organization_id)
            .cloned()
            .unwrap_or_else(|| ProviderOrganization {
                id: record.organization_id.clone(),
                ..Default::default()
            });
        let user = self.users.read().unwrap().get(&record.user_id).cloned();

        ProviderMembership {
            id: record.id.clone(),
            role: record.role.clone(),
            organization,
            public_user_data: PublicUserData {
                user_id: record.user_id.clone(),
                identifier: user.as_ref().map(|u| u.primary_email()),
                first_name: user.as_ref().and_then(|u| u.first_name.clone()),
                last_name: user.as_ref().and_then(|u| u.last_name.clone()),
            },
        }
    }

    fn memberships_where(&self, keep: impl Fn(&MembershipRecord) -> bool) -> Vec<ProviderMembership> {
        let records: Vec<MembershipRecord> = self
            .memberships
            .read()
            .unwrap()
            .iter()
            .filter(|m| keep(m))
            .cloned()
            .collect();
        records.iter().map(|r| self.to_membership(r)).collect()
    }
}

fn page<T>(items: Vec<T>, limit: u32, offset: u32) -> ProviderPage<T> {
    let total_count = items.len() as u64;
    ProviderPage {
        data: items
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect(),
        total_count,
    }
}

fn not_found(operation: &str, resource: &str) -> ProviderError {
    ProviderError::NotFound {
        operation: operation.to_string(),
        resource: resource.to_string(),
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn get_user(&self, user_id: &str) -> ProviderResult<ProviderUser> {
        self.check("get_user")?;
        self.user(user_id)
            .ok_or_else(|| not_found("get_user", &format!("user {}", user_id)))
    }

    async fn get_organization(&self, organization_id: &str) -> ProviderResult<ProviderOrganization> {
        self.check("get_organization")?;
        self.organizations
            .read()
            .unwrap()
            .get(organization_id)
            .cloned()
            .ok_or_else(|| not_found("get_organization", &format!("organization {}", organization_id)))
    }

    async fn get_membership(
        &self,
        organization_id: &str,
        user_id: &str,
    ) -> ProviderResult<Option<ProviderMembership>> {
        self.check("get_membership")?;
        Ok(self
            .memberships_where(|m| m.organization_id == organization_id && m.user_id == user_id)
            .into_iter()
            .next())
    }

    async fn list_users(&self, limit: u32, offset: u32) -> ProviderResult<ProviderPage<ProviderUser>> {
        self.check("list_users")?;
        let users = self.users.read().unwrap().values().cloned().collect();
        Ok(page(users, limit, offset))
    }

    async fn list_organizations(
        &self,
        limit: u32,
        offset: u32,
    ) -> ProviderResult<ProviderPage<ProviderOrganization>> {
        self.check("list_organizations")?;
        let orgs = self.organizations.read().unwrap().values().cloned().collect();
        Ok(page(orgs, limit, offset))
    }

    async fn list_organization_memberships(
        &self,
        organization_id: &str,
        limit: u32,
        offset: u32,
    ) -> ProviderResult<ProviderPage<ProviderMembership>> {
        self.check("list_organization_memberships")?;
        if !self.organizations.read().unwrap().contains_key(organization_id) {
            return Err(not_found(
                "list_organization_memberships",
                &format!("organization {}", organization_id),
            ));
        }
        let memberships = self.memberships_where(|m| m.organization_id == organization_id);
        Ok(page(memberships, limit, offset))
    }

    async fn list_user_memberships(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> ProviderResult<ProviderPage<ProviderMembership>> {
        self.check("list_user_memberships")?;
        let memberships = self.memberships_where(|m| m.user_id == user_id);
        Ok(page(memberships, limit, offset))
    }

    async fn update_user_metadata(
        &self,
        user_id: &str,
        public_metadata: Value,
    ) -> ProviderResult<ProviderUser> {
        self.check("update_user_metadata")?;
        let mut users = self.users.write().unwrap();
        let user = users
            .get_mut(user_id)
            .ok_or_else(|| not_found("update_user_metadata", &format!("user {}", user_id)))?;

        // The provider merges top-level keys into the existing metadata
        let mut merged = serde_json::to_value(user.metadata()).unwrap_or_default();
        if let (Some(target), Some(patch)) = (merged.as_object_mut(), public_metadata.as_object()) {
            for (key, value) in patch {
                target.insert(key.clone(), value.clone());
            }
        }
        let metadata: UserMetadata =
            serde_json::from_value(merged).map_err(|e| ProviderError::Decode {
                operation: "update_user_metadata".to_string(),
                message: e.to_string(),
            })?;
        user.public_metadata = Some(metadata);

        Ok(user.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::fixtures::{provider_org, provider_user};

    #[tokio::test]
    async fn test_mock_counts_calls_and_paginates() {
        let mock = MockIdentityProvider::new();
        for i in 0..5 {
            mock.add_user(provider_user(&format!("user_{}", i), &format!("u{}@example.com", i)));
        }

        let first = mock.list_users(2, 0).await.unwrap();
        let last = mock.list_users(2, 4).await.unwrap();

        assert_eq!(first.data.len(), 2);
        assert_eq!(first.total_count, 5);
        assert_eq!(last.data.len(), 1);
        assert_eq!(mock.calls("list_users"), 2);
    }

    #[tokio::test]
    async fn test_mock_error_injection() {
        let mock = MockIdentityProvider::new();
        mock.add_organization(provider_org("org_1", "Bati Nord"));
        mock.fail_operation("get_organization", MockError::InternalError("boom".into()));

        let err = mock.get_organization("org_1").await.unwrap_err();
        assert!(matches!(err, ProviderError::Status { status: 500, .. }));

        mock.clear_error_mode();
        assert!(mock.get_organization("org_1").await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_metadata_merge_keeps_existing_keys() {
        let mock = MockIdentityProvider::new();
        let mut user = provider_user("user_1", "ada@example.com");
        user.public_metadata = Some(UserMetadata {
            role: Some("site manager".into()),
            ..Default::default()
        });
        mock.add_user(user);

        let updated = mock
            .update_user_metadata("user_1", serde_json::json!({"onboarding": {"step": 2}}))
            .await
            .unwrap();

        let meta = updated.metadata();
        assert_eq!(meta.role.as_deref(), Some("site manager"));
        assert_eq!(meta.onboarding, Some(serde_json::json!({"step": 2})));
    }
}
