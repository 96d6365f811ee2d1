//! EquipTrack Library
//!
//! Backend of a multi-tenant equipment tracking service. Identity data is
//! owned by a hosted identity provider and mirrored locally by the
//! reconciliation engine; every tenant-scoped operation goes through a
//! resolved security context.

use std::sync::Arc;

use anyhow::Context;

pub mod api;
pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use db::DbPool;
use middleware::SessionVerifier;
use services::{
    AssignmentService, EquipmentService, IdentityProvider, ProjectService, Reconciler,
    SecurityResolver, SyncCache, WebhookVerifiers,
};
use services::reconciliation::SyncCacheHandle;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Database connection pool
    pub db: DbPool,
    /// Identity provider backend API
    pub identity: Arc<dyn IdentityProvider>,
    /// Lazy-sync result cache
    pub sync_cache: SyncCacheHandle,
    pub reconciler: Arc<Reconciler>,
    pub resolver: SecurityResolver,
    /// Session token verification
    pub sessions: Arc<SessionVerifier>,
    /// Per-category webhook signature verification
    pub webhooks: Arc<WebhookVerifiers>,
    pub equipment: EquipmentService,
    pub projects: ProjectService,
    pub assignments: AssignmentService,
}

impl AppState {
    /// Wire every service from configuration and an identity provider
    pub fn build(
        config: AppConfig,
        db: DbPool,
        identity: Arc<dyn IdentityProvider>,
    ) -> anyhow::Result<Self> {
        let sessions = SessionVerifier::from_config(&config.session)
            .context("Failed to initialize session verification")?;
        let webhooks = WebhookVerifiers::from_config(&config.webhooks)
            .context("Failed to initialize webhook verification")?;

        let sync_cache: SyncCacheHandle = Arc::new(SyncCache::new(&config.sync_cache));
        let reconciler = Arc::new(Reconciler::new(
            db.clone(),
            identity.clone(),
            sync_cache.clone(),
            config.identity.page_size,
        ));

        Ok(Self {
            resolver: SecurityResolver::new(db.clone()),
            equipment: EquipmentService::new(db.clone()),
            projects: ProjectService::new(db.clone()),
            assignments: AssignmentService::new(db.clone()),
            sessions: Arc::new(sessions),
            webhooks: Arc::new(webhooks),
            sync_cache,
            reconciler,
            identity,
            config,
            db,
        })
    }
}
