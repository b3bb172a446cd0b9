//! Trusted-key registry: `resolveTrustedPublicKey` and key lifecycle rules.
//!
//! Mirrors the teacher's session-key lifecycle bookkeeping (`rpc.rs`'s
//! `REVOKED_SESSION_KEYS` / `is_session_revoked`), generalized from "revoked
//! in the mempool" to "outside its configured validity window or flagged
//! deprecated."

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::GateError;
use crate::types::KeyStore;

static KEY_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9:_-]{3,128}$").unwrap());

/// The `signature.keyId` form check run by the validator as its own gate
/// (spec.md §4.11 step 2), ahead of and independent from key resolution.
pub fn validate_key_id_form(key_id: &str) -> Result<(), GateError> {
    if key_id == "default" || !KEY_ID_RE.is_match(key_id) {
        return Err(GateError::KeyIdInvalid(key_id.to_string()));
    }
    Ok(())
}

/// Resolve `keyId` to a trusted public key (base64), enforcing scope and
/// lifecycle. Strict checks, no grace period — see spec.md §4.4.
pub fn resolve_trusted_public_key(
    key_store: &KeyStore,
    key_id: &str,
    requester_id: &str,
    now: DateTime<Utc>,
) -> Result<String, GateError> {
    validate_key_id_form(key_id)?;

    let entry = key_store
        .trusted_keys
        .get(key_id)
        .ok_or_else(|| GateError::KeyNotTrusted(key_id.to_string()))?;

    if entry.deprecated {
        return Err(GateError::KeyDeprecated(key_id.to_string()));
    }

    if let Some(scope) = &entry.requester_id {
        if scope != requester_id {
            return Err(GateError::KeyRequesterMismatch(key_id.to_string()));
        }
    }

    let not_before = entry
        .effective_not_before()
        .ok_or_else(|| GateError::KeyLifecycleInvalid(key_id.to_string()))?;
    let expires_at = entry
        .effective_expires_at()
        .ok_or_else(|| GateError::KeyLifecycleInvalid(key_id.to_string()))?;

    let not_before = parse_iso8601(not_before)
        .map_err(|_| GateError::KeyLifecycleInvalid(key_id.to_string()))?;
    let expires_at = parse_iso8601(expires_at)
        .map_err(|_| GateError::KeyLifecycleInvalid(key_id.to_string()))?;

    if not_before >= expires_at {
        return Err(GateError::KeyLifecycleInvalid(key_id.to_string()));
    }
    if now < not_before {
        return Err(GateError::KeyNotYetValid(key_id.to_string()));
    }
    if now > expires_at {
        return Err(GateError::KeyExpired(key_id.to_string()));
    }

    if entry.public_key.is_empty() {
        return Err(GateError::KeyConfigInvalid(key_id.to_string()));
    }

    Ok(entry.public_key.clone())
}

fn parse_iso8601(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}
