//! Ed25519 signing and verification over canonical-JSON byte strings.
//!
//! Keys and signatures cross the wire/disk as base64; this module is the
//! only place that decodes/encodes them.

use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::errors::GateError;

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// Decode a base64 Ed25519 public key and verify `sig` (also base64) over
/// `message`. Any malformed input or cryptographic mismatch is reported as
/// `SIGNATURE_INVALID` — the spec does not distinguish "couldn't parse the
/// key" from "signature didn't verify" at this layer; that distinction is
/// made earlier, by the key registry.
pub fn verify(public_key_b64: &str, message: &[u8], sig_b64: &str) -> Result<(), GateError> {
    let key_bytes = B64
        .decode(public_key_b64.trim())
        .map_err(|_| GateError::SignatureInvalid)?;
    let key_bytes: [u8; 32] = key_bytes
        .try_into()
        .map_err(|_| GateError::SignatureInvalid)?;
    let verifying_key =
        VerifyingKey::from_bytes(&key_bytes).map_err(|_| GateError::SignatureInvalid)?;

    let sig_bytes = B64
        .decode(sig_b64.trim())
        .map_err(|_| GateError::SignatureInvalid)?;
    let sig_bytes: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| GateError::SignatureInvalid)?;
    let signature = Signature::from_bytes(&sig_bytes);

    verifying_key
        .verify(message, &signature)
        .map_err(|_| GateError::SignatureInvalid)
}

/// Sign `message` with a base64-encoded 32-byte Ed25519 seed, returning the
/// base64-encoded 64-byte signature. Used only by the `policy-sign` action.
pub fn sign(signing_key_seed_b64: &str, message: &[u8]) -> Result<String, GateError> {
    use ed25519_dalek::{Signer, SigningKey};

    let seed_bytes = B64
        .decode(signing_key_seed_b64.trim())
        .map_err(|e| GateError::Internal(format!("invalid signing key base64: {e}")))?;
    let seed: [u8; 32] = seed_bytes
        .try_into()
        .map_err(|_| GateError::Internal("signing key must be 32 bytes".into()))?;
    let signing_key = SigningKey::from_bytes(&seed);
    let signature = signing_key.sign(message);
    Ok(B64.encode(signature.to_bytes()))
}

/// Derive the base64-encoded public key for a base64-encoded signing seed.
/// Used by `policy-sign` to assert the envelope's `keyId` actually belongs
/// to the key doing the signing.
pub fn public_key_for_seed(signing_key_seed_b64: &str) -> Result<String, GateError> {
    use ed25519_dalek::SigningKey;

    let seed_bytes = B64
        .decode(signing_key_seed_b64.trim())
        .map_err(|e| GateError::Internal(format!("invalid signing key base64: {e}")))?;
    let seed: [u8; 32] = seed_bytes
        .try_into()
        .map_err(|_| GateError::Internal("signing key must be 32 bytes".into()))?;
    let signing_key = SigningKey::from_bytes(&seed);
    Ok(B64.encode(signing_key.verifying_key().to_bytes()))
}
