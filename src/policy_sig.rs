//! Policy-signature preflight (spec.md §4.2): verifies the policy file
//! itself was signed by a trusted key before any proposal is evaluated
//! against it. Runs ahead of the policy-version guard and the validator
//! pipeline proper — a tampered policy must never reach either.

use chrono::Utc;

use crate::crypto;
use crate::errors::GateError;
use crate::keystore::resolve_trusted_public_key;
use crate::types::{KeyStore, Policy, PolicySignatureEnvelope};

/// Verify `envelope` over `policy`'s canonical bytes using the trusted key
/// registry. `unsigned_ok` is the explicit escape hatch scoped to this
/// preflight only (`--unsigned-ok` / `SENTINEL_UNSIGNED_OK`) — it skips
/// verification entirely but never silently downgrades a present-but-invalid
/// signature.
pub fn verify_policy_signature(
    policy: &Policy,
    envelope: Option<&PolicySignatureEnvelope>,
    key_store: Option<&KeyStore>,
    unsigned_ok: bool,
) -> Result<(), GateError> {
    let envelope = match envelope {
        Some(e) => e,
        None => {
            if unsigned_ok {
                tracing::warn!(gate = "policy_signature", "no policy signature present, proceeding unsigned");
                return Ok(());
            }
            tracing::warn!(gate = "policy_signature", "policy signature missing");
            return Err(GateError::PolicySignatureMissing);
        }
    };

    if envelope.alg != "ed25519" {
        tracing::warn!(gate = "policy_signature", alg = %envelope.alg, "unsupported policy signature algorithm");
        return Err(GateError::PolicySignatureInvalid);
    }

    let key_store = key_store
        .ok_or_else(|| GateError::PolicySignerKeyStoreUnavailable(envelope.key_id.clone()))?;

    let now = Utc::now();
    let public_key_b64 = resolve_trusted_public_key(key_store, &envelope.key_id, "policy-signer", now)
        .map_err(|_| {
            tracing::warn!(gate = "policy_signature", key_id = %envelope.key_id, "policy signer not trusted");
            GateError::PolicySignerNotTrusted(envelope.key_id.clone())
        })?;

    let signed_bytes = canonical_signed_bytes(policy);

    crypto::verify(&public_key_b64, &signed_bytes, &envelope.sig)
        .map(|()| {
            tracing::info!(gate = "policy_signature", key_id = %envelope.key_id, "policy signature verified");
        })
        .map_err(|_| {
            tracing::warn!(gate = "policy_signature", key_id = %envelope.key_id, "policy signature invalid");
            GateError::PolicySignatureInvalid
        })
}

/// The canonical policy object, exactly as spec.md §4.2 defines the signed
/// payload — the envelope's own `createdAt` travels alongside the signature,
/// not inside it.
fn canonical_signed_bytes(policy: &Policy) -> Vec<u8> {
    crate::canonical::to_canonical_bytes(&policy.to_value())
}
