//! The orchestrator (spec.md §4.11): runs the ordered pipeline over a single
//! proposal and reports which gate, if any, tripped.
//!
//! Mirrors the teacher's `handle_rpc` cascade — each check either advances
//! the state machine or returns immediately with the reason attached.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::errors::GateError;
use crate::keystore::{resolve_trusted_public_key, validate_key_id_form};
use crate::nonce::NonceStore;
use crate::policy;
use crate::ratelimit::RateLimiter;
use crate::schema;
use crate::types::{KeyStore, Policy, Proposal, Risk};

#[derive(Debug, Clone, serde::Serialize, Default)]
pub struct Checks {
    pub schema: bool,
    #[serde(rename = "keyId")]
    pub key_id: bool,
    pub timestamp: bool,
    pub signature: bool,
    #[serde(rename = "rateLimit", skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<bool>,
    pub nonce: bool,
    pub policy: bool,
}

pub struct ValidationOutcome {
    pub valid: bool,
    pub checks: Checks,
    pub errors: Vec<GateError>,
    pub risk: Option<Risk>,
}

/// Whether the rate limiter participates in this run (`run` only, per
/// spec.md §4.6).
pub enum RateLimiting<'a> {
    Skip,
    Enforce {
        limiter: &'a mut RateLimiter,
        window_sec: i64,
        max_requests: u64,
    },
}

/// Run the full gate chain for `proposal`. `proposal_value` is the raw
/// parsed JSON (used for schema checks against the wire shape before typed
/// deserialization); `proposal` is the typed form used everywhere else.
#[allow(clippy::too_many_arguments)]
pub fn validate(
    proposal_value: &Value,
    proposal: &Proposal,
    key_store: &KeyStore,
    policy_doc: &Policy,
    nonce_store: &mut NonceStore,
    rate_limiting: RateLimiting,
    now: DateTime<Utc>,
) -> ValidationOutcome {
    let mut checks = Checks::default();
    let mut errors = Vec::new();

    let command_id = proposal.command_id.as_str();
    let requester_id = proposal.requester_id.as_str();

    let schema_result = schema::validate_proposal(proposal_value);
    if !schema_result.valid {
        tracing::warn!(command_id, requester_id, gate = "schema", "proposal failed schema validation");
        errors.push(GateError::SchemaError(schema_result.errors.join("; ")));
        return ValidationOutcome {
            valid: false,
            checks,
            errors,
            risk: None,
        };
    }
    checks.schema = true;
    tracing::info!(command_id, requester_id, gate = "schema", "schema ok");

    if let Err(e) = validate_key_id_form(&proposal.signature.key_id) {
        tracing::warn!(command_id, requester_id, gate = "key_id", key_id = %proposal.signature.key_id, "malformed keyId");
        errors.push(e);
        return ValidationOutcome {
            valid: false,
            checks,
            errors,
            risk: None,
        };
    }
    checks.key_id = true;
    tracing::info!(command_id, requester_id, gate = "key_id", "keyId ok");

    let skew = (now.timestamp() - proposal.timestamp).abs();
    let max_skew = policy_doc.security.max_clock_skew_sec;
    if skew > max_skew {
        tracing::warn!(command_id, requester_id, gate = "timestamp", skew_sec = skew, max_skew_sec = max_skew, "timestamp skew exceeded");
        errors.push(GateError::TimestampSkewExceeded);
        return ValidationOutcome {
            valid: false,
            checks,
            errors,
            risk: None,
        };
    }
    checks.timestamp = true;
    tracing::info!(command_id, requester_id, gate = "timestamp", "timestamp ok");

    let public_key = match resolve_trusted_public_key(
        key_store,
        &proposal.signature.key_id,
        &proposal.requester_id,
        now,
    ) {
        Ok(k) => k,
        Err(e) => {
            tracing::warn!(command_id, requester_id, gate = "signature", key_id = %proposal.signature.key_id, "no trusted key for signer");
            errors.push(e);
            return ValidationOutcome {
                valid: false,
                checks,
                errors,
                risk: None,
            };
        }
    };

    let signed_bytes =
        crate::canonical::canonical_bytes_excluding(&proposal.to_value(), "signature");
    if let Err(e) = crate::crypto::verify(&public_key, &signed_bytes, &proposal.signature.sig) {
        tracing::warn!(command_id, requester_id, gate = "signature", "signature invalid");
        errors.push(e);
        return ValidationOutcome {
            valid: false,
            checks,
            errors,
            risk: None,
        };
    }
    checks.signature = true;
    tracing::info!(command_id, requester_id, gate = "signature", "signature ok");

    if let RateLimiting::Enforce {
        limiter,
        window_sec,
        max_requests,
    } = rate_limiting
    {
        match limiter.check_and_record(&proposal.requester_id, window_sec, max_requests, now.timestamp()) {
            Ok(()) => {
                checks.rate_limit = Some(true);
            }
            Err(e) => {
                checks.rate_limit = Some(false);
                errors.push(e);
                return ValidationOutcome {
                    valid: false,
                    checks,
                    errors,
                    risk: None,
                };
            }
        }
    }

    match nonce_store.check_and_record(
        &proposal.requester_id,
        &proposal.session_id,
        &proposal.nonce,
        now.timestamp(),
    ) {
        Ok(()) => {
            checks.nonce = true;
        }
        Err(e) => {
            errors.push(e);
            return ValidationOutcome {
                valid: false,
                checks,
                errors,
                risk: None,
            };
        }
    }

    let risk = match policy::evaluate(
        policy_doc,
        &proposal.requester_id,
        &proposal.id,
        &proposal.payload,
    ) {
        Ok(risk) => {
            checks.policy = true;
            risk
        }
        Err(e) => {
            errors.push(e);
            return ValidationOutcome {
                valid: false,
                checks,
                errors,
                risk: None,
            };
        }
    };

    ValidationOutcome {
        valid: true,
        checks,
        errors,
        risk: Some(risk),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        ExecPolicy, FilesystemPolicy, ProposalSignature, RateLimitConfig, RequesterPolicy,
        SecurityConfig,
    };
    use base64::Engine;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;
    use serde_json::json;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn b64() -> base64::engine::GeneralPurpose {
        base64::engine::general_purpose::STANDARD
    }

    fn signed_proposal(key_id: &str, signing_key: &SigningKey) -> (Value, Proposal) {
        let mut proposal = Proposal {
            id: "RUN_SHELL".into(),
            command_id: "11111111-1111-1111-1111-111111111111".into(),
            requester_id: "agent:gpt".into(),
            session_id: "sess-1".into(),
            timestamp: 1_700_000_000,
            nonce: "a".repeat(32),
            requires: vec![],
            risk: Risk::Low,
            payload: json!({"adapter": "noop", "cmd": "echo", "cwd": "/srv/app"}),
            signature: ProposalSignature {
                alg: "ed25519".into(),
                key_id: key_id.into(),
                sig: String::new(),
            },
        };
        let bytes = crate::canonical::canonical_bytes_excluding(&proposal.to_value(), "signature");
        let sig = signing_key.sign(&bytes);
        proposal.signature.sig = b64().encode(sig.to_bytes());
        let value = proposal.to_value();
        (value, proposal)
    }

    fn fixture_key_store(key_id: &str, pub_b64: String) -> KeyStore {
        let mut trusted_keys = HashMap::new();
        trusted_keys.insert(
            key_id.to_string(),
            crate::types::TrustedKeyEntry {
                public_key: pub_b64,
                requester_id: Some("agent:gpt".into()),
                not_before: Some("2020-01-01T00:00:00Z".into()),
                expires_at: Some("2099-01-01T00:00:00Z".into()),
                valid_from: None,
                valid_until: None,
                deprecated: false,
            },
        );
        KeyStore {
            schema_version: 1,
            default_key_id: None,
            trusted_keys,
        }
    }

    fn permissive_policy() -> Policy {
        let mut requesters = HashMap::new();
        requesters.insert(
            "agent:gpt".to_string(),
            RequesterPolicy {
                allow_adapters: vec!["noop".into()],
                allow_commands: vec!["RUN_SHELL".into()],
                filesystem: FilesystemPolicy {
                    roots: vec!["/srv/app".into()],
                    deny_patterns: vec![],
                },
                exec: ExecPolicy {
                    allow_cmds: vec![],
                    deny_cmds: vec![],
                    timeout_ms_max: None,
                },
                rate_limit: None,
            },
        );
        Policy {
            default: "DENY".into(),
            version: json!(1),
            created_at: json!("2026-01-01T00:00:00Z"),
            security: SecurityConfig {
                max_clock_skew_sec: 300,
                max_policy_created_at_skew_sec: 86400,
                default_rate_limit: RateLimitConfig {
                    window_sec: 60,
                    max_requests: 10,
                },
            },
            requesters,
        }
    }

    #[test]
    fn happy_path_all_checks_pass() {
        let dir = TempDir::new().unwrap();
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let pub_b64 = b64().encode(signing_key.verifying_key().to_bytes());
        let (value, proposal) = signed_proposal("agent:gpt-v1-2026Q1", &signing_key);
        let key_store = fixture_key_store("agent:gpt-v1-2026Q1", pub_b64);
        let policy_doc = permissive_policy();
        let mut nonce_store = NonceStore::load(&dir.path().join("nonce.db.json"), 3600).unwrap();
        let now: DateTime<Utc> = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        let outcome = validate(
            &value,
            &proposal,
            &key_store,
            &policy_doc,
            &mut nonce_store,
            RateLimiting::Skip,
            now,
        );

        assert!(outcome.valid, "{:?}", outcome.errors);
        assert!(outcome.checks.schema);
        assert!(outcome.checks.signature);
        assert!(outcome.checks.nonce);
        assert!(outcome.checks.policy);
        assert_eq!(outcome.risk, Some(Risk::Low));
    }

    #[test]
    fn replayed_nonce_fails_after_first_success() {
        let dir = TempDir::new().unwrap();
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let pub_b64 = b64().encode(signing_key.verifying_key().to_bytes());
        let (value, proposal) = signed_proposal("agent:gpt-v1-2026Q1", &signing_key);
        let key_store = fixture_key_store("agent:gpt-v1-2026Q1", pub_b64);
        let policy_doc = permissive_policy();
        let mut nonce_store = NonceStore::load(&dir.path().join("nonce.db.json"), 3600).unwrap();
        let now: DateTime<Utc> = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        let first = validate(
            &value,
            &proposal,
            &key_store,
            &policy_doc,
            &mut nonce_store,
            RateLimiting::Skip,
            now,
        );
        assert!(first.valid);

        let second = validate(
            &value,
            &proposal,
            &key_store,
            &policy_doc,
            &mut nonce_store,
            RateLimiting::Skip,
            now,
        );
        assert!(!second.valid);
        assert!(matches!(second.errors[0], GateError::ReplayNonce));
    }

    #[test]
    fn tampered_payload_fails_signature() {
        let dir = TempDir::new().unwrap();
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let pub_b64 = b64().encode(signing_key.verifying_key().to_bytes());
        let (_, mut proposal) = signed_proposal("agent:gpt-v1-2026Q1", &signing_key);
        proposal.payload = json!({"adapter": "noop", "cmd": "rm", "cwd": "/srv/app"});
        let value = proposal.to_value();
        let key_store = fixture_key_store("agent:gpt-v1-2026Q1", pub_b64);
        let policy_doc = permissive_policy();
        let mut nonce_store = NonceStore::load(&dir.path().join("nonce.db.json"), 3600).unwrap();
        let now: DateTime<Utc> = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        let outcome = validate(
            &value,
            &proposal,
            &key_store,
            &policy_doc,
            &mut nonce_store,
            RateLimiting::Skip,
            now,
        );
        assert!(!outcome.valid);
        assert!(matches!(outcome.errors[0], GateError::SignatureInvalid));
    }

    #[test]
    fn unknown_requester_denied_by_policy() {
        let dir = TempDir::new().unwrap();
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let pub_b64 = b64().encode(signing_key.verifying_key().to_bytes());
        let (value, mut proposal) = signed_proposal("agent:gpt-v1-2026Q1", &signing_key);
        proposal.requester_id = "agent:unknown".into();
        let key_store = fixture_key_store("agent:gpt-v1-2026Q1", pub_b64);

        let mut store = key_store.clone();
        store
            .trusted_keys
            .get_mut("agent:gpt-v1-2026Q1")
            .unwrap()
            .requester_id = None;

        let policy_doc = permissive_policy();
        let mut nonce_store = NonceStore::load(&dir.path().join("nonce.db.json"), 3600).unwrap();
        let now: DateTime<Utc> = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        let outcome = validate(
            &value,
            &proposal,
            &store,
            &policy_doc,
            &mut nonce_store,
            RateLimiting::Skip,
            now,
        );
        assert!(!outcome.valid);
        assert!(matches!(outcome.errors[0], GateError::RequesterNotAllowed));
    }
}
