//! `policy-sign` (SPEC_FULL.md §F): reads the policy file, canonicalizes
//! it, signs with a supplied private key, and writes `policy.sig.json`
//! atomically. The signing key never arrives as a CLI literal — always a
//! path to a file holding the base64 Ed25519 seed.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::atomic::atomic_write;
use crate::config::Config;
use crate::crypto;
use crate::errors::GateError;
use crate::schema;
use crate::types::Policy;

pub fn run(config: &Config, signing_key_path: &std::path::Path, key_id: &str, now: DateTime<Utc>) -> (Value, i32) {
    match try_run(config, signing_key_path, key_id, now) {
        Ok(body) => (body, 0),
        Err(e) => super::error_body(&e),
    }
}

fn try_run(
    config: &Config,
    signing_key_path: &std::path::Path,
    key_id: &str,
    now: DateTime<Utc>,
) -> Result<Value, GateError> {
    let policy_bytes = std::fs::read(&config.policy_path)
        .map_err(|e| GateError::IntegrityFailure(format!("cannot read policy file: {e}")))?;
    let policy_value: Value = serde_json::from_slice(&policy_bytes)
        .map_err(|e| GateError::IntegrityFailure(format!("policy is not valid JSON: {e}")))?;
    let schema_result = schema::validate_policy(&policy_value);
    if !schema_result.valid {
        return Err(GateError::IntegrityFailure(schema_result.errors.join("; ")));
    }
    let policy: Policy = serde_json::from_value(policy_value)
        .map_err(|e| GateError::IntegrityFailure(format!("malformed policy: {e}")))?;

    let seed_b64 = std::fs::read_to_string(signing_key_path)
        .map_err(|e| GateError::Internal(format!("cannot read signing key file: {e}")))?;
    let seed_b64 = seed_b64.trim();

    let created_at = now.to_rfc3339();

    let signed_bytes = crate::canonical::to_canonical_bytes(&policy.to_value());

    let sig = crypto::sign(seed_b64, &signed_bytes)?;

    let derived_pub = crypto::public_key_for_seed(seed_b64)?;
    let envelope = json!({
        "alg": "ed25519",
        "keyId": key_id,
        "sig": sig,
        "createdAt": created_at,
    });

    let bytes = serde_json::to_vec_pretty(&envelope)?;
    atomic_write(&config.policy_sig_path, &bytes)?;

    Ok(json!({
        "status": "signed",
        "keyId": key_id,
        "publicKey": derived_pub,
        "policySigPath": config.policy_sig_path.to_string_lossy(),
    }))
}
