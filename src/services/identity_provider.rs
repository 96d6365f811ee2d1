//! Identity provider client
//!
//! The provider owns users, organizations and memberships. This module exposes
//! the small read surface the reconciliation engine needs, plus user metadata
//! mutation, behind the [`IdentityProvider`] trait. [`ClerkClient`] talks to a
//! Clerk-compatible Backend API over HTTPS.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::IdentityConfig;
use crate::models::{ProviderMembership, ProviderOrganization, ProviderPage, ProviderUser};

/// Identity provider call failure
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{operation}: {resource} not found")]
    NotFound { operation: String, resource: String },

    #[error("{operation}: request failed: {message}")]
    Transport { operation: String, message: String },

    #[error("{operation}: provider returned HTTP {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("{operation}: invalid response: {message}")]
    Decode { operation: String, message: String },
}

impl ProviderError {
    /// Name of the provider call that failed
    pub fn operation(&self) -> &str {
        match self {
            ProviderError::NotFound { operation, .. }
            | ProviderError::Transport { operation, .. }
            | ProviderError::Status { operation, .. }
            | ProviderError::Decode { operation, .. } => operation,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound { .. })
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Read and metadata-mutation surface of the identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn get_user(&self, user_id: &str) -> ProviderResult<ProviderUser>;

    async fn get_organization(&self, organization_id: &str) -> ProviderResult<ProviderOrganization>;

    /// The user's membership in one organization, if any
    async fn get_membership(
        &self,
        organization_id: &str,
        user_id: &str,
    ) -> ProviderResult<Option<ProviderMembership>>;

    async fn list_users(&self, limit: u32, offset: u32) -> ProviderResult<ProviderPage<ProviderUser>>;

    async fn list_organizations(
        &self,
        limit: u32,
        offset: u32,
    ) -> ProviderResult<ProviderPage<ProviderOrganization>>;

    async fn list_organization_memberships(
        &self,
        organization_id: &str,
        limit: u32,
        offset: u32,
    ) -> ProviderResult<ProviderPage<ProviderMembership>>;

    async fn list_user_memberships(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> ProviderResult<ProviderPage<ProviderMembership>>;

    /// Merge `public_metadata` into the user's metadata and return the updated user
    async fn update_user_metadata(
        &self,
        user_id: &str,
        public_metadata: serde_json::Value,
    ) -> ProviderResult<ProviderUser>;
}

/// Clerk-compatible Backend API client
pub struct ClerkClient {
    client: Client,
    base_url: String,
    secret_key: String,
}

impl ClerkClient {
    pub fn new(config: &IdentityConfig) -> anyhow::Result<Self> {
        info!("Initializing identity provider client for {}", config.api_url);

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        operation: &str,
        resource: &str,
        path: &str,
    ) -> ProviderResult<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(operation = operation, url = %url, "Identity provider request");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| transport_error(operation, e))?;

        handle_response(operation, resource, response).await
    }

    async fn patch<T: DeserializeOwned>(
        &self,
        operation: &str,
        resource: &str,
        path: &str,
        body: &serde_json::Value,
    ) -> ProviderResult<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(operation = operation, url = %url, "Identity provider request");

        let response = self
            .client
            .patch(&url)
            .bearer_auth(&self.secret_key)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(operation, e))?;

        handle_response(operation, resource, response).await
    }
}

fn transport_error(operation: &str, err: reqwest::Error) -> ProviderError {
    let message = if err.is_timeout() {
        "request timed out".to_string()
    } else {
        err.to_string()
    };
    ProviderError::Transport {
        operation: operation.to_string(),
        message,
    }
}

async fn handle_response<T: DeserializeOwned>(
    operation: &str,
    resource: &str,
    response: Response,
) -> ProviderResult<T> {
    let status = response.status();

    if status == StatusCode::NOT_FOUND {
        return Err(ProviderError::NotFound {
            operation: operation.to_string(),
            resource: resource.to_string(),
        });
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Status {
            operation: operation.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    response.json::<T>().await.map_err(|e| ProviderError::Decode {
        operation: operation.to_string(),
        message: e.to_string(),
    })
}

fn page_query(limit: u32, offset: u32) -> String {
    format!("limit={}&offset={}", limit, offset)
}

#[async_trait]
impl IdentityProvider for ClerkClient {
    async fn get_user(&self, user_id: &str) -> ProviderResult<ProviderUser> {
        let path = format!("/users/{}", urlencoding::encode(user_id));
        self.get("get_user", user_id, &path).await
    }

    async fn get_organization(&self, organization_id: &str) -> ProviderResult<ProviderOrganization> {
        let path = format!("/organizations/{}", urlencoding::encode(organization_id));
        self.get("get_organization", organization_id, &path).await
    }

    async fn get_membership(
        &self,
        organization_id: &str,
        user_id: &str,
    ) -> ProviderResult<Option<ProviderMembership>> {
        let path = format!(
            "/organizations/{}/memberships?user_id={}&limit=1",
            urlencoding::encode(organization_id),
            urlencoding::encode(user_id)
        );

        match self
            .get::<ProviderPage<ProviderMembership>>("get_membership", organization_id, &path)
            .await
        {
            Ok(page) => Ok(page
                .data
                .into_iter()
                .find(|m| m.public_user_data.user_id == user_id)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_users(&self, limit: u32, offset: u32) -> ProviderResult<ProviderPage<ProviderUser>> {
        // The users endpoint returns a bare array rather than a page object
        let path = format!("/users?order_by=created_at&{}", page_query(limit, offset));
        let data: Vec<ProviderUser> = self.get("list_users", "users", &path).await?;
        // No total in the response; callers page until a short page
        Ok(ProviderPage {
            data,
            total_count: 0,
        })
    }

    async fn list_organizations(
        &self,
        limit: u32,
        offset: u32,
    ) -> ProviderResult<ProviderPage<ProviderOrganization>> {
        let path = format!("/organizations?{}", page_query(limit, offset));
        self.get("list_organizations", "organizations", &path).await
    }

    async fn list_organization_memberships(
        &self,
        organization_id: &str,
        limit: u32,
        offset: u32,
    ) -> ProviderResult<ProviderPage<ProviderMembership>> {
        let path = format!(
            "/organizations/{}/memberships?{}",
            urlencoding::encode(organization_id),
            page_query(limit, offset)
        );
        self.get("list_organization_memberships", organization_id, &path)
            .await
    }

    async fn list_user_memberships(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> ProviderResult<ProviderPage<ProviderMembership>> {
        let path = format!(
            "/users/{}/organization_memberships?{}",
            urlencoding::encode(user_id),
            page_query(limit, offset)
        );
        self.get("list_user_memberships", user_id, &path).await
    }

    async fn update_user_metadata(
        &self,
        user_id: &str,
        public_metadata: serde_json::Value,
    ) -> ProviderResult<ProviderUser> {
        let path = format!("/users/{}/metadata", urlencoding::encode(user_id));
        let body = serde_json::json!({ "public_metadata": public_metadata });
        self.patch("update_user_metadata", user_id, &path, &body).await
    }
}
