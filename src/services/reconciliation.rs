//! Identity reconciliation engine
//!
//! Keeps the local mirror of organizations, users and memberships eventually
//! consistent with the identity provider. Three triggers share the same
//! idempotent upsert-by-external-id primitives:
//!
//! - webhooks: [`Reconciler::handle_event`], one typed event at a time
//! - lazy sync: [`Reconciler::lazy_sync`], on the request path, gated by the
//!   sync cache
//! - batch: [`Reconciler::reconcile`], operator driven, settle-all fan-out
//!
//! Mirror writes require a [`TrustedSystemContext`], which only this module
//! can mint. User-facing code holds a `SecurityContext` and cannot reach them.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::{DbPool, MembershipRepository, OrganizationRepository, UserRepository};
use crate::models::{
    AppUser, AppUserUpsert, DeletedObject, IdentityEvent, OrgRole, Organization,
    OrganizationUpsert, ProviderMembership, ProviderOrganization, ProviderPage, ProviderUser,
};
use crate::services::identity_provider::{IdentityProvider, ProviderError, ProviderResult};
use crate::services::security::{ProviderSession, SecurityContext};
use crate::services::sync_cache::SyncCache;

/// What started a privileged mirror write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncTrigger {
    Webhook,
    Lazy,
    Batch,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::Webhook => "webhook",
            SyncTrigger::Lazy => "lazy",
            SyncTrigger::Batch => "batch",
        }
    }
}

/// Capability for writing the identity mirror.
///
/// Has no public constructor: only the reconciliation engine issues one, for
/// the duration of a webhook, lazy sync or batch run.
#[derive(Debug)]
pub struct TrustedSystemContext {
    trigger: SyncTrigger,
}

impl TrustedSystemContext {
    fn issue(trigger: SyncTrigger) -> Self {
        Self { trigger }
    }

    pub fn trigger(&self) -> SyncTrigger {
        self.trigger
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

/// How a webhook delivery was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    /// The mirror changed
    Applied,
    /// Nothing to do (duplicate create, delete of a missing record, unknown type)
    Skipped,
    /// A referenced organization or user is not mirrored yet
    Unresolved,
    /// Unexpected failure while handling the event
    Failed,
}

/// Result body returned to the provider for every delivery
#[derive(Debug, Clone, Serialize)]
pub struct WebhookOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip)]
    pub kind: OutcomeKind,
}

impl WebhookOutcome {
    pub fn applied(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            kind: OutcomeKind::Applied,
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            kind: OutcomeKind::Skipped,
        }
    }

    pub fn unresolved(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            kind: OutcomeKind::Unresolved,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            kind: OutcomeKind::Failed,
        }
    }
}

/// Cached result of a lazy sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncedIdentity {
    pub user_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub role: Option<OrgRole>,
    pub synced_at: DateTime<Utc>,
}

/// Which part of the provider directory a batch run covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileScope {
    Full,
    User(String),
    Organization(String),
}

impl ReconcileScope {
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcileScope::Full => "full",
            ReconcileScope::User(_) => "user",
            ReconcileScope::Organization(_) => "organization",
        }
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            ReconcileScope::Full => None,
            ReconcileScope::User(id) | ReconcileScope::Organization(id) => Some(id),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityTally {
    pub total: usize,
    pub failed: usize,
}

impl EntityTally {
    fn record<T, E>(&mut self, results: &[Result<T, E>]) {
        self.total += results.len();
        self.failed += results.iter().filter(|r| r.is_err()).count();
    }

    fn fail(&mut self) {
        self.total += 1;
        self.failed += 1;
    }
}

/// Summary of a batch run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub total: usize,
    pub failed: usize,
    pub organizations: EntityTally,
    pub users: EntityTally,
    pub memberships: EntityTally,
    pub elapsed_ms: u64,
}

pub type SyncCacheHandle = Arc<SyncCache<SyncedIdentity>>;

pub struct Reconciler {
    db: DbPool,
    provider: Arc<dyn IdentityProvider>,
    cache: SyncCacheHandle,
    page_size: u32,
}

impl Reconciler {
    pub fn new(
        db: DbPool,
        provider: Arc<dyn IdentityProvider>,
        cache: SyncCacheHandle,
        page_size: u32,
    ) -> Self {
        Self {
            db,
            provider,
            cache,
            page_size: page_size.max(1),
        }
    }

    pub fn lazy_sync_key(user_external_id: &str, org_external_id: Option<&str>) -> String {
        format!("lazy-sync:{}:{}", user_external_id, org_external_id.unwrap_or("-"))
    }

    // ==================== Webhooks ====================

    /// Apply one provider event. Never returns an error: unexpected failures
    /// become a `Failed` outcome.
    pub async fn handle_event(&self, event: IdentityEvent) -> WebhookOutcome {
        let ctx = TrustedSystemContext::issue(SyncTrigger::Webhook);
        let event_type = event.event_type();
        let external_id = event.external_id().to_string();
        let affected_user = event.affected_user().map(String::from);

        let result = match event {
            IdentityEvent::OrganizationCreated(org) => self.on_organization_created(&ctx, &org).await,
            IdentityEvent::OrganizationUpdated(org) => self.on_organization_updated(&ctx, &org).await,
            IdentityEvent::OrganizationDeleted(deleted) => {
                self.on_organization_deleted(&ctx, &deleted).await
            }
            IdentityEvent::MembershipCreated(m) | IdentityEvent::MembershipUpdated(m) => {
                self.on_membership_upserted(&ctx, &m).await
            }
            IdentityEvent::MembershipDeleted(m) => self.on_membership_deleted(&ctx, &m).await,
            IdentityEvent::UserCreated(user) => self.on_user_created(&ctx, &user).await,
            IdentityEvent::UserUpdated(user) => self.on_user_updated(&ctx, &user).await,
            IdentityEvent::UserDeleted(deleted) => self.on_user_deleted(&ctx, &deleted).await,
        };

        if let Some(user) = affected_user.as_deref() {
            let dropped = self.cache.invalidate_owner(user);
            if dropped > 0 {
                debug!(user = user, dropped = dropped, "Invalidated lazy-sync cache entries");
            }
        }

        let outcome = result.unwrap_or_else(|e| {
            error!(
                event_type = event_type,
                external_id = %external_id,
                error = %e,
                "Webhook handler failed"
            );
            WebhookOutcome::failed(format!("Failed to process {}: {}", event_type, e))
        });

        info!(
            event_type = event_type,
            external_id = %external_id,
            success = outcome.success,
            kind = ?outcome.kind,
            "Webhook processed"
        );

        outcome
    }

    async fn on_organization_created(
        &self,
        ctx: &TrustedSystemContext,
        org: &ProviderOrganization,
    ) -> anyhow::Result<WebhookOutcome> {
        debug!(trigger = ctx.trigger().as_str(), external_id = %org.id, "Creating organization");
        let (_, created) = OrganizationRepository::new(&self.db)
            .insert_if_absent(&OrganizationUpsert::from(org))
            .await?;

        Ok(if created {
            WebhookOutcome::applied(format!("Organization {} created", org.id))
        } else {
            WebhookOutcome::skipped(format!("Organization {} already exists", org.id))
        })
    }

    async fn on_organization_updated(
        &self,
        ctx: &TrustedSystemContext,
        org: &ProviderOrganization,
    ) -> anyhow::Result<WebhookOutcome> {
        let repo = OrganizationRepository::new(&self.db);
        let existed = repo.get_by_external_id(&org.id).await?.is_some();
        self.upsert_organization(ctx, org).await?;

        Ok(if existed {
            WebhookOutcome::applied(format!("Organization {} updated", org.id))
        } else {
            WebhookOutcome::applied(format!("Organization {} created from update", org.id))
        })
    }

    async fn on_organization_deleted(
        &self,
        ctx: &TrustedSystemContext,
        deleted: &DeletedObject,
    ) -> anyhow::Result<WebhookOutcome> {
        debug!(trigger = ctx.trigger().as_str(), external_id = %deleted.id, "Deleting organization");
        let orgs = OrganizationRepository::new(&self.db);

        // Read the members before the cascade removes their rows
        let members: Vec<String> = match orgs.get_by_external_id(&deleted.id).await? {
            Some(org) => MembershipRepository::new(&self.db)
                .list_members(org.id)
                .await?
                .into_iter()
                .map(|m| m.external_id)
                .collect(),
            None => Vec::new(),
        };

        let removed = orgs.delete_by_external_id(&deleted.id).await?;
        for member in &members {
            self.invalidate_user(member);
        }

        Ok(if removed {
            WebhookOutcome::applied(format!("Organization {} deleted", deleted.id))
        } else {
            WebhookOutcome::skipped(format!("Organization {} not found; nothing to delete", deleted.id))
        })
    }

    /// Resolve both sides of a membership. `Err` carries the unresolved outcome.
    async fn resolve_membership_sides(
        &self,
        membership: &ProviderMembership,
    ) -> anyhow::Result<Result<(Organization, AppUser), WebhookOutcome>> {
        let org_ext = &membership.organization.id;
        let user_ext = &membership.public_user_data.user_id;

        let org = OrganizationRepository::new(&self.db)
            .get_by_external_id(org_ext)
            .await?;
        let user = UserRepository::new(&self.db)
            .get_by_external_id(user_ext)
            .await?;

        Ok(match (org, user) {
            (Some(org), Some(user)) => Ok((org, user)),
            (None, _) => Err(WebhookOutcome::unresolved(format!(
                "Organization {} not found for membership {}",
                org_ext, membership.id
            ))),
            (_, None) => Err(WebhookOutcome::unresolved(format!(
                "User {} not found for membership {}",
                user_ext, membership.id
            ))),
        })
    }

    async fn on_membership_upserted(
        &self,
        ctx: &TrustedSystemContext,
        membership: &ProviderMembership,
    ) -> anyhow::Result<WebhookOutcome> {
        let (org, user) = match self.resolve_membership_sides(membership).await? {
            Ok(sides) => sides,
            Err(outcome) => {
                warn!(membership = %membership.id, message = %outcome.message, "Membership not applied");
                return Ok(outcome);
            }
        };

        let role = OrgRole::from_provider(&membership.role);
        self.upsert_membership(ctx, org.id, user.id, &role, Some(&membership.id))
            .await?;

        Ok(WebhookOutcome::applied(format!(
            "Membership {} set to {} for user {} in organization {}",
            membership.id, role, user.external_id, org.external_id
        )))
    }

    async fn on_membership_deleted(
        &self,
        ctx: &TrustedSystemContext,
        membership: &ProviderMembership,
    ) -> anyhow::Result<WebhookOutcome> {
        let (org, user) = match self.resolve_membership_sides(membership).await? {
            Ok(sides) => sides,
            // Without either side there is no row to delete
            Err(outcome) => return Ok(WebhookOutcome::skipped(outcome.message)),
        };

        debug!(trigger = ctx.trigger().as_str(), membership = %membership.id, "Deleting membership");
        let removed = MembershipRepository::new(&self.db)
            .delete(org.id, user.id)
            .await?;

        Ok(if removed {
            WebhookOutcome::applied(format!("Membership {} deleted", membership.id))
        } else {
            WebhookOutcome::skipped(format!("Membership {} not found; nothing to delete", membership.id))
        })
    }

    async fn on_user_created(
        &self,
        ctx: &TrustedSystemContext,
        user: &ProviderUser,
    ) -> anyhow::Result<WebhookOutcome> {
        debug!(trigger = ctx.trigger().as_str(), external_id = %user.id, "Creating user");
        let (stored, created) = UserRepository::new(&self.db)
            .insert_if_absent(&AppUserUpsert::from(user))
            .await?;

        if !created {
            return Ok(WebhookOutcome::skipped(format!("User {} already exists", user.id)));
        }

        let linked = self.link_legacy_organizations(ctx, &stored, user).await?;
        Ok(WebhookOutcome::applied(with_legacy_note(
            format!("User {} created", user.id),
            linked,
        )))
    }

    async fn on_user_updated(
        &self,
        ctx: &TrustedSystemContext,
        user: &ProviderUser,
    ) -> anyhow::Result<WebhookOutcome> {
        let existed = UserRepository::new(&self.db)
            .get_by_external_id(&user.id)
            .await?
            .is_some();
        let stored = self.upsert_user(ctx, user).await?;
        let linked = self.link_legacy_organizations(ctx, &stored, user).await?;

        let message = if existed {
            format!("User {} updated", user.id)
        } else {
            format!("User {} created from update", user.id)
        };
        Ok(WebhookOutcome::applied(with_legacy_note(message, linked)))
    }

    async fn on_user_deleted(
        &self,
        ctx: &TrustedSystemContext,
        deleted: &DeletedObject,
    ) -> anyhow::Result<WebhookOutcome> {
        debug!(trigger = ctx.trigger().as_str(), external_id = %deleted.id, "Deleting user");
        let removed = UserRepository::new(&self.db)
            .delete_by_external_id(&deleted.id)
            .await?;

        Ok(if removed {
            WebhookOutcome::applied(format!("User {} deleted", deleted.id))
        } else {
            WebhookOutcome::skipped(format!("User {} not found; nothing to delete", deleted.id))
        })
    }

    // ==================== Mirror writes ====================

    async fn upsert_organization(
        &self,
        ctx: &TrustedSystemContext,
        org: &ProviderOrganization,
    ) -> anyhow::Result<Organization> {
        debug!(trigger = ctx.trigger().as_str(), external_id = %org.id, "Upserting organization");
        OrganizationRepository::new(&self.db)
            .upsert(&OrganizationUpsert::from(org))
            .await
    }

    async fn upsert_user(
        &self,
        ctx: &TrustedSystemContext,
        user: &ProviderUser,
    ) -> anyhow::Result<AppUser> {
        debug!(trigger = ctx.trigger().as_str(), external_id = %user.id, "Upserting user");
        UserRepository::new(&self.db)
            .upsert(&AppUserUpsert::from(user))
            .await
    }

    async fn upsert_membership(
        &self,
        ctx: &TrustedSystemContext,
        organization_id: Uuid,
        user_id: Uuid,
        role: &OrgRole,
        external_id: Option<&str>,
    ) -> anyhow::Result<()> {
        debug!(
            trigger = ctx.trigger().as_str(),
            organization_id = %organization_id,
            user_id = %user_id,
            role = %role,
            "Upserting membership"
        );
        MembershipRepository::new(&self.db)
            .upsert(organization_id, user_id, role, external_id)
            .await?;
        Ok(())
    }

    /// Turn the legacy `organizations` metadata into member rows for the
    /// organizations that are already mirrored. Existing roles are kept.
    async fn link_legacy_organizations(
        &self,
        ctx: &TrustedSystemContext,
        user: &AppUser,
        provider_user: &ProviderUser,
    ) -> anyhow::Result<usize> {
        let legacy = provider_user.metadata().organizations;
        if legacy.is_empty() {
            return Ok(0);
        }

        let orgs = OrganizationRepository::new(&self.db);
        let memberships = MembershipRepository::new(&self.db);
        let mut linked = 0;

        for org_ext in &legacy {
            match orgs.get_by_external_id(org_ext).await? {
                Some(org) => {
                    if memberships
                        .insert_if_absent(org.id, user.id, &OrgRole::Member)
                        .await?
                    {
                        linked += 1;
                    }
                }
                None => debug!(
                    trigger = ctx.trigger().as_str(),
                    user = %user.external_id,
                    organization = %org_ext,
                    "Legacy organization not mirrored; skipping"
                ),
            }
        }

        Ok(linked)
    }

    // ==================== Lazy sync ====================

    /// Bring the caller's own user, organization and membership up to date.
    ///
    /// Served from the sync cache when a fresh entry exists for the same
    /// (user, organization) pair. Failures are returned and never cached.
    pub async fn lazy_sync(&self, session: &ProviderSession) -> Result<SyncedIdentity, SyncError> {
        let user_ext = session.user_id.trim();
        if user_ext.is_empty() {
            return Err(SyncError::Unauthenticated("Missing user identity".to_string()));
        }
        let org_ext = session.selected_org();
        let key = Self::lazy_sync_key(user_ext, org_ext);

        if let Some(hit) = self.cache.get(&key, user_ext, None) {
            debug!(key = %key, "Lazy sync served from cache");
            return Ok(hit);
        }

        let ctx = TrustedSystemContext::issue(SyncTrigger::Lazy);

        let provider_user = self.provider.get_user(user_ext).await?;
        let user = self.upsert_user(&ctx, &provider_user).await?;
        self.link_legacy_organizations(&ctx, &user, &provider_user)
            .await?;

        let mut organization_id = None;
        let mut role = None;

        if let Some(org_ext) = org_ext {
            let provider_org = self.provider.get_organization(org_ext).await?;
            let org = self.upsert_organization(&ctx, &provider_org).await?;
            organization_id = Some(org.id);

            match self.provider.get_membership(org_ext, user_ext).await? {
                Some(membership) => {
                    let provider_role = OrgRole::from_provider(&membership.role);
                    self.upsert_membership(&ctx, org.id, user.id, &provider_role, Some(&membership.id))
                        .await?;
                    role = Some(provider_role);
                }
                None => warn!(
                    user = user_ext,
                    organization = org_ext,
                    "Session names an organization the provider has no membership for"
                ),
            }
        }

        let synced = SyncedIdentity {
            user_id: user.id,
            organization_id,
            role,
            synced_at: Utc::now(),
        };
        self.cache.set(&key, synced.clone(), user_ext, None);

        info!(user = user_ext, organization = ?org_ext, "Lazy sync completed");
        Ok(synced)
    }

    /// Drop every cached lazy-sync result for a provider user
    pub fn invalidate_user(&self, user_external_id: &str) -> usize {
        self.cache.invalidate_owner(user_external_id)
    }

    /// Write onboarding state to the provider and mirror the returned user
    pub async fn update_onboarding(
        &self,
        context: &SecurityContext,
        onboarding: serde_json::Value,
    ) -> Result<AppUser, SyncError> {
        let provider_user = self
            .provider
            .update_user_metadata(
                &context.provider_user_id,
                serde_json::json!({ "onboarding": onboarding }),
            )
            .await?;

        let ctx = TrustedSystemContext::issue(SyncTrigger::Lazy);
        let user = self.upsert_user(&ctx, &provider_user).await?;
        self.invalidate_user(&context.provider_user_id);
        Ok(user)
    }

    // ==================== Batch ====================

    /// Reconcile a scope of the provider directory. Individual record
    /// failures are counted, never fatal; only a failed top-level fetch
    /// aborts the run.
    pub async fn reconcile(&self, scope: ReconcileScope) -> Result<ReconcileReport, SyncError> {
        let started = Instant::now();
        let ctx = TrustedSystemContext::issue(SyncTrigger::Batch);
        info!(scope = scope.kind(), target = ?scope.target(), "Starting reconciliation");

        let mut report = ReconcileReport {
            scope: scope.kind().to_string(),
            target: scope.target().map(String::from),
            total: 0,
            failed: 0,
            organizations: EntityTally::default(),
            users: EntityTally::default(),
            memberships: EntityTally::default(),
            elapsed_ms: 0,
        };

        match &scope {
            ReconcileScope::Full => self.reconcile_full(&ctx, &mut report).await?,
            ReconcileScope::User(id) => self.reconcile_user(&ctx, id, &mut report).await?,
            ReconcileScope::Organization(id) => {
                self.reconcile_organization(&ctx, id, &mut report).await?
            }
        }

        report.total =
            report.organizations.total + report.users.total + report.memberships.total;
        report.failed =
            report.organizations.failed + report.users.failed + report.memberships.failed;
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            scope = scope.kind(),
            total = report.total,
            failed = report.failed,
            elapsed_ms = report.elapsed_ms,
            "Reconciliation finished"
        );

        Ok(report)
    }

    async fn reconcile_full(
        &self,
        ctx: &TrustedSystemContext,
        report: &mut ReconcileReport,
    ) -> Result<(), SyncError> {
        let orgs = collect_pages(self.page_size, |limit, offset| {
            self.provider.list_organizations(limit, offset)
        })
        .await?;
        let users = collect_pages(self.page_size, |limit, offset| {
            self.provider.list_users(limit, offset)
        })
        .await?;

        let org_results = join_all(orgs.iter().map(|org| self.upsert_organization(ctx, org))).await;
        log_failures("organization", orgs.iter().map(|o| o.id.as_str()), &org_results);
        report.organizations.record(&org_results);

        let user_results = join_all(users.iter().map(|user| self.upsert_user(ctx, user))).await;
        log_failures("user", users.iter().map(|u| u.id.as_str()), &user_results);
        report.users.record(&user_results);

        let local_orgs = index_by_external_id(orgs.iter().map(|o| o.id.as_str()), &org_results, |o| o.id);
        let local_users =
            index_by_external_id(users.iter().map(|u| u.id.as_str()), &user_results, |u| u.id);

        for org in orgs.iter().filter(|o| local_orgs.contains_key(o.id.as_str())) {
            let memberships = match collect_pages(self.page_size, |limit, offset| {
                self.provider
                    .list_organization_memberships(&org.id, limit, offset)
            })
            .await
            {
                Ok(memberships) => memberships,
                Err(e) => {
                    warn!(organization = %org.id, error = %e, "Failed to list memberships");
                    report.memberships.fail();
                    continue;
                }
            };

            let results = join_all(memberships.iter().map(|m| async {
                let org_id = local_orgs
                    .get(m.organization.id.as_str())
                    .or_else(|| local_orgs.get(org.id.as_str()))
                    .copied()
                    .ok_or_else(|| anyhow::anyhow!("organization {} not mirrored", org.id))?;
                let user_id = local_users
                    .get(m.public_user_data.user_id.as_str())
                    .copied()
                    .ok_or_else(|| {
                        anyhow::anyhow!("user {} not mirrored", m.public_user_data.user_id)
                    })?;
                self.upsert_membership(ctx, org_id, user_id, &OrgRole::from_provider(&m.role), Some(&m.id))
                    .await
            }))
            .await;
            log_failures("membership", memberships.iter().map(|m| m.id.as_str()), &results);
            report.memberships.record(&results);
        }

        Ok(())
    }

    async fn reconcile_user(
        &self,
        ctx: &TrustedSystemContext,
        user_ext: &str,
        report: &mut ReconcileReport,
    ) -> Result<(), SyncError> {
        let provider_user = self.provider.get_user(user_ext).await?;
        let user = match self.upsert_user(ctx, &provider_user).await {
            Ok(user) => {
                report.users.total += 1;
                user
            }
            Err(e) => {
                warn!(user = user_ext, error = %e, "Failed to upsert user");
                report.users.fail();
                return Ok(());
            }
        };

        let memberships = collect_pages(self.page_size, |limit, offset| {
            self.provider.list_user_memberships(user_ext, limit, offset)
        })
        .await?;
        let user = &user;

        let org_results = join_all(
            memberships
                .iter()
                .map(|m| self.upsert_organization(ctx, &m.organization)),
        )
        .await;
        log_failures(
            "organization",
            memberships.iter().map(|m| m.organization.id.as_str()),
            &org_results,
        );
        report.organizations.record(&org_results);

        let results = join_all(memberships.iter().zip(org_results.iter()).map(
            |(m, org)| async move {
                let org = org
                    .as_ref()
                    .map_err(|_| anyhow::anyhow!("organization {} not mirrored", m.organization.id))?;
                self.upsert_membership(ctx, org.id, user.id, &OrgRole::from_provider(&m.role), Some(&m.id))
                    .await
            },
        ))
        .await;
        log_failures("membership", memberships.iter().map(|m| m.id.as_str()), &results);
        report.memberships.record(&results);

        self.link_legacy_organizations(ctx, user, &provider_user)
            .await?;
        self.invalidate_user(user_ext);

        Ok(())
    }

    async fn reconcile_organization(
        &self,
        ctx: &TrustedSystemContext,
        org_ext: &str,
        report: &mut ReconcileReport,
    ) -> Result<(), SyncError> {
        let provider_org = self.provider.get_organization(org_ext).await?;
        let org = match self.upsert_organization(ctx, &provider_org).await {
            Ok(org) => {
                report.organizations.total += 1;
                org
            }
            Err(e) => {
                warn!(organization = org_ext, error = %e, "Failed to upsert organization");
                report.organizations.fail();
                return Ok(());
            }
        };

        let memberships = collect_pages(self.page_size, |limit, offset| {
            self.provider
                .list_organization_memberships(org_ext, limit, offset)
        })
        .await?;
        let org = &org;

        let user_results = join_all(
            memberships
                .iter()
                .map(|m| self.ensure_user(ctx, &m.public_user_data.user_id)),
        )
        .await;
        log_failures(
            "user",
            memberships.iter().map(|m| m.public_user_data.user_id.as_str()),
            &user_results,
        );
        report.users.record(&user_results);

        let results = join_all(memberships.iter().zip(user_results.iter()).map(
            |(m, user)| async move {
                let user = user.as_ref().map_err(|_| {
                    anyhow::anyhow!("user {} not mirrored", m.public_user_data.user_id)
                })?;
                self.upsert_membership(ctx, org.id, user.id, &OrgRole::from_provider(&m.role), Some(&m.id))
                    .await?;
                self.invalidate_user(&user.external_id);
                Ok::<_, anyhow::Error>(())
            },
        ))
        .await;
        log_failures("membership", memberships.iter().map(|m| m.id.as_str()), &results);
        report.memberships.record(&results);

        Ok(())
    }

    /// Fetch and mirror a user referenced by a membership
    async fn ensure_user(
        &self,
        ctx: &TrustedSystemContext,
        user_ext: &str,
    ) -> Result<AppUser, SyncError> {
        let provider_user = self.provider.get_user(user_ext).await?;
        Ok(self.upsert_user(ctx, &provider_user).await?)
    }
}

fn with_legacy_note(message: String, linked: usize) -> String {
    if linked == 0 {
        message
    } else {
        format!("{} ({} legacy organization link(s) added)", message, linked)
    }
}

/// Follow offset pagination until a short or empty page
async fn collect_pages<T, F, Fut>(page_size: u32, mut fetch: F) -> ProviderResult<Vec<T>>
where
    F: FnMut(u32, u32) -> Fut,
    Fut: Future<Output = ProviderResult<ProviderPage<T>>>,
{
    let mut items = Vec::new();
    let mut offset = 0u32;

    loop {
        let page = fetch(page_size, offset).await?;
        let received = page.data.len() as u32;
        items.extend(page.data);

        if received < page_size {
            break;
        }
        offset += received;
        if page.total_count > 0 && u64::from(offset) >= page.total_count {
            break;
        }
    }

    Ok(items)
}

fn log_failures<'a, T, E: std::fmt::Display>(
    kind: &str,
    ids: impl Iterator<Item = &'a str>,
    results: &[Result<T, E>],
) {
    for (id, result) in ids.zip(results) {
        if let Err(e) = result {
            warn!(kind = kind, external_id = id, error = %e, "Reconciliation item failed");
        }
    }
}

fn index_by_external_id<'a, T, E>(
    ids: impl Iterator<Item = &'a str>,
    results: &[Result<T, E>],
    local_id: impl Fn(&T) -> Uuid,
) -> HashMap<&'a str, Uuid> {
    ids.zip(results)
        .filter_map(|(id, result)| result.as_ref().ok().map(|v| (id, local_id(v))))
        .collect()
}
