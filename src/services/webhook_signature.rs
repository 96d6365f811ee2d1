//! Webhook signature verification
//!
//! The identity provider signs deliveries with the Svix scheme:
//! `base64(HMAC-SHA256(key, "{id}.{timestamp}.{body}"))`, sent as one or more
//! space-separated `v1,<signature>` entries. The key is the base64 part of a
//! `whsec_` secret.

use axum::http::HeaderMap;
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::WebhookConfig;
use crate::models::EventCategory;

type HmacSha256 = Hmac<Sha256>;

const SECRET_PREFIX: &str = "whsec_";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing header {0}")]
    MissingHeader(&'static str),

    #[error("invalid signing secret")]
    InvalidSecret,

    #[error("invalid timestamp")]
    InvalidTimestamp,

    #[error("timestamp outside tolerance")]
    TimestampOutOfTolerance,

    #[error("no matching signature")]
    NoMatchingSignature,
}

/// Verifies deliveries for one webhook endpoint
#[derive(Clone)]
pub struct WebhookVerifier {
    mac: HmacSha256,
    tolerance_secs: i64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn from_secret(secret: &str, tolerance_secs: i64) -> Result<Self, SignatureError> {
        let encoded = secret.strip_prefix(SECRET_PREFIX).unwrap_or(secret);
        let key = STANDARD
            .decode(encoded)
            .map_err(|_| SignatureError::InvalidSecret)?;
        if key.is_empty() {
            return Err(SignatureError::InvalidSecret);
        }
        let mac = HmacSha256::new_from_slice(&key).map_err(|_| SignatureError::InvalidSecret)?;

        Ok(Self {
            mac,
            tolerance_secs,
        })
    }

    /// Verify a delivery against the current time
    pub fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), SignatureError> {
        self.verify_at(headers, body, chrono::Utc::now().timestamp())
    }

    pub fn verify_at(
        &self,
        headers: &HeaderMap,
        body: &[u8],
        now: i64,
    ) -> Result<(), SignatureError> {
        let msg_id = header(headers, "svix-id", "webhook-id")?;
        let timestamp = header(headers, "svix-timestamp", "webhook-timestamp")?;
        let signatures = header(headers, "svix-signature", "webhook-signature")?;

        let ts: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| SignatureError::InvalidTimestamp)?;
        if now.abs_diff(ts) > self.tolerance_secs.unsigned_abs() {
            return Err(SignatureError::TimestampOutOfTolerance);
        }

        let expected = self.compute(msg_id, timestamp.trim(), body);

        let matched = signatures
            .split_whitespace()
            .filter_map(|entry| entry.split_once(','))
            .filter(|(version, _)| *version == "v1")
            .filter_map(|(_, sig)| STANDARD.decode(sig).ok())
            .any(|candidate| bool::from(candidate.ct_eq(&expected)));

        if matched {
            Ok(())
        } else {
            Err(SignatureError::NoMatchingSignature)
        }
    }

    /// Signature header value for a payload, as the provider would send it
    pub fn sign(&self, msg_id: &str, timestamp: i64, body: &[u8]) -> String {
        let sig = self.compute(msg_id, &timestamp.to_string(), body);
        format!("v1,{}", STANDARD.encode(sig))
    }

    fn compute(&self, msg_id: &str, timestamp: &str, body: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(msg_id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        mac.finalize().into_bytes().to_vec()
    }
}

/// One verifier per webhook route. A category without a configured secret
/// rejects every delivery.
#[derive(Debug, Clone, Default)]
pub struct WebhookVerifiers {
    organizations: Option<WebhookVerifier>,
    memberships: Option<WebhookVerifier>,
    users: Option<WebhookVerifier>,
}

impl WebhookVerifiers {
    pub fn from_config(config: &WebhookConfig) -> Result<Self, SignatureError> {
        let build = |secret: &Option<String>| {
            secret
                .as_deref()
                .map(|s| WebhookVerifier::from_secret(s, config.tolerance_secs))
                .transpose()
        };

        Ok(Self {
            organizations: build(&config.organizations_secret)?,
            memberships: build(&config.memberships_secret)?,
            users: build(&config.users_secret)?,
        })
    }

    pub fn for_category(&self, category: EventCategory) -> Option<&WebhookVerifier> {
        match category {
            EventCategory::Organizations => self.organizations.as_ref(),
            EventCategory::Memberships => self.memberships.as_ref(),
            EventCategory::Users => self.users.as_ref(),
        }
    }
}

fn header<'a>(
    headers: &'a HeaderMap,
    name: &'static str,
    alias: &'static str,
) -> Result<&'a str, SignatureError> {
    headers
        .get(name)
        .or_else(|| headers.get(alias))
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(SignatureError::MissingHeader(name))
}
