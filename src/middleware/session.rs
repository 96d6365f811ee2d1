//! Provider session authentication
//!
//! The identity provider issues a short-lived session JWT, sent either as a
//! bearer token or in the `__session` cookie. It is verified locally (HS256
//! shared secret or RS256 PEM public key) and turned into a
//! [`ProviderSession`]. The [`SecurityContext`] extractor then resolves the
//! local mirror, running a lazy sync once if the mirror has not caught up.

use anyhow::Context;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use axum_extra::extract::CookieJar;
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::SessionConfig;
use crate::services::security::{ProviderSession, SecurityContext, SecurityError};
use crate::utils::error::AppError;
use crate::AppState;

/// Claims carried by a provider session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Provider user id
    pub sub: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Authorized party (origin of the frontend that obtained the token)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_slug: Option<String>,
}

impl From<SessionClaims> for ProviderSession {
    fn from(claims: SessionClaims) -> Self {
        Self {
            user_id: claims.sub,
            org_id: claims.org_id,
            org_role: claims.org_role,
            org_slug: claims.org_slug,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Missing session token")]
    MissingToken,

    #[error("Invalid session token")]
    InvalidToken,

    #[error("Session token has expired")]
    TokenExpired,

    #[error("Session token issued for an unauthorized party")]
    UnauthorizedParty,
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        AppError::Unauthenticated(err.to_string())
    }
}

pub struct SessionVerifier {
    key: DecodingKey,
    validation: Validation,
    authorized_parties: Vec<String>,
    cookie_name: String,
}

impl SessionVerifier {
    pub fn from_config(config: &SessionConfig) -> anyhow::Result<Self> {
        let (key, algorithm) = match (&config.jwt_public_key, &config.jwt_secret) {
            (Some(pem), _) => (
                DecodingKey::from_rsa_pem(pem.as_bytes()).context("Invalid session public key")?,
                Algorithm::RS256,
            ),
            (None, Some(secret)) => (DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256),
            (None, None) => anyhow::bail!("No session verification key configured"),
        };

        let mut validation = Validation::new(algorithm);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.leeway = 5;

        Ok(Self {
            key,
            validation,
            authorized_parties: config.authorized_parties.clone(),
            cookie_name: config.cookie_name.clone(),
        })
    }

    pub fn verify(&self, token: &str) -> Result<ProviderSession, SessionError> {
        let data = decode::<SessionClaims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => SessionError::TokenExpired,
                _ => SessionError::InvalidToken,
            }
        })?;

        if !self.authorized_parties.is_empty() {
            let azp = data.claims.azp.as_deref().unwrap_or_default();
            if !self.authorized_parties.iter().any(|p| p == azp) {
                return Err(SessionError::UnauthorizedParty);
            }
        }

        if data.claims.sub.trim().is_empty() {
            return Err(SessionError::InvalidToken);
        }

        Ok(data.claims.into())
    }

    /// Bearer token first, then the session cookie
    pub fn token_from_headers(&self, headers: &HeaderMap) -> Option<String> {
        let bearer = headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
            .map(str::trim)
            .filter(|t| !t.is_empty());
        if let Some(token) = bearer {
            return Some(token.to_string());
        }

        CookieJar::from_headers(headers)
            .get(&self.cookie_name)
            .map(|c| c.value().to_string())
            .filter(|t| !t.is_empty())
    }

    pub fn authenticate(&self, headers: &HeaderMap) -> Result<ProviderSession, SessionError> {
        let token = self
            .token_from_headers(headers)
            .ok_or(SessionError::MissingToken)?;
        self.verify(&token)
    }
}

impl FromRequestParts<AppState> for ProviderSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<ProviderSession>() {
            return Ok(session.clone());
        }

        let session = state.sessions.authenticate(&parts.headers)?;
        parts.extensions.insert(session.clone());
        Ok(session)
    }
}

/// Resolve a context, bringing the mirror up to date once when it is behind
pub async fn resolve_with_sync(
    state: &AppState,
    session: &ProviderSession,
    organization_scoped: bool,
) -> Result<SecurityContext, AppError> {
    let resolve = || async {
        if organization_scoped {
            state.resolver.resolve(session).await
        } else {
            state.resolver.resolve_user(session).await
        }
    };

    match resolve().await {
        Err(SecurityError::NotFound(missing)) => {
            debug!(user = %session.user_id, missing = %missing, "Local mirror behind; running lazy sync");
            // A cached sync result is stale if the mirror is still missing records
            state.reconciler.invalidate_user(&session.user_id);
            state.reconciler.lazy_sync(session).await?;
            Ok(resolve().await?)
        }
        other => Ok(other?),
    }
}

impl FromRequestParts<AppState> for SecurityContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session = ProviderSession::from_request_parts(parts, state).await?;
        resolve_with_sync(state, &session, true).await
    }
}

/// Security context for flows that need a user but no selected organization
#[derive(Debug, Clone)]
pub struct UserContext(pub SecurityContext);

impl FromRequestParts<AppState> for UserContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session = ProviderSession::from_request_parts(parts, state).await?;
        resolve_with_sync(state, &session, false).await.map(UserContext)
    }
}
