//! Input validation utilities

use once_cell::sync::Lazy;
use regex::Regex;
use validator::ValidationError;

/// QR/NFC payloads: printable, no whitespace
static EQUIPMENT_CODE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._:/-]*$").unwrap());

/// Provider identifiers such as `user_2abc` or `org_9xyz`
static EXTERNAL_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

/// Validate an equipment code read from a QR tag or NFC chip
pub fn validate_equipment_code(code: &str) -> Result<(), ValidationError> {
    if code.len() > 128 || !EQUIPMENT_CODE_REGEX.is_match(code) {
        let mut err = ValidationError::new("equipment_code");
        err.message = Some("code must be 1-128 printable characters without spaces".into());
        return Err(err);
    }
    Ok(())
}

/// Validate an identity provider id
pub fn validate_external_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 64 && EXTERNAL_ID_REGEX.is_match(id)
}

/// Normalize a scanned code: trims whitespace and strips a URL prefix so that
/// `https://host/e/ABC-123` and `ABC-123` resolve to the same record.
pub fn normalize_equipment_code(raw: &str) -> String {
    let trimmed = raw.trim();
    let code = match trimmed.rsplit_once("/e/") {
        Some((prefix, tail)) if prefix.starts_with("http") => tail,
        _ => trimmed,
    };
    code.trim_end_matches('/').to_string()
}
