//! Business logic services

pub mod assignments;
pub mod equipment;
pub mod identity_provider;
pub mod projects;
pub mod reconciliation;
pub mod security;
pub mod sync_cache;
pub mod webhook_signature;

pub use assignments::AssignmentService;
pub use equipment::EquipmentService;
pub use identity_provider::{ClerkClient, IdentityProvider, ProviderError, ProviderResult};
pub use projects::ProjectService;
pub use reconciliation::{
    OutcomeKind, ReconcileReport, ReconcileScope, Reconciler, SyncError, SyncTrigger,
    SyncedIdentity, TrustedSystemContext, WebhookOutcome,
};
pub use security::{
    check_permission, AccessLevel, ProviderSession, SecurityContext, SecurityError,
    SecurityResolver,
};
pub use sync_cache::SyncCache;
pub use webhook_signature::{SignatureError, WebhookVerifier, WebhookVerifiers};
