//! Shared preflight loading for the `verify`/`dryrun`/`run` actions: load
//! policy, verify its signature, check version monotonicity, then parse and
//! validate the proposal. Each action handler builds on this and differs
//! only in what it does after validation succeeds.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::Config;
use crate::errors::GateError;
use crate::nonce::NonceStore;
use crate::policy_sig;
use crate::policy_version;
use crate::ratelimit::RateLimiter;
use crate::schema;
use crate::types::{KeyStore, Policy, PolicySignatureEnvelope, Proposal};
use crate::validator::{self, RateLimiting, ValidationOutcome};

pub struct Loaded {
    pub policy: Policy,
    pub key_store: KeyStore,
    pub proposal_value: Value,
    pub proposal: Proposal,
}

/// Everything through "policy accepted, proposal parsed" — short-circuits
/// on the first failing preflight, exactly mirroring spec.md's control
/// flow: load policy → verify policy signature → check policy-version →
/// parse proposal → schema.
pub fn load_and_preflight(config: &Config, now: DateTime<Utc>) -> Result<Loaded, GateError> {
    let policy_bytes = std::fs::read(&config.policy_path)
        .map_err(|e| GateError::IntegrityFailure(format!("cannot read policy file: {e}")))?;
    let policy_value: Value = serde_json::from_slice(&policy_bytes)
        .map_err(|e| GateError::IntegrityFailure(format!("policy is not valid JSON: {e}")))?;
    let policy_schema = schema::validate_policy(&policy_value);
    if !policy_schema.valid {
        return Err(GateError::IntegrityFailure(policy_schema.errors.join("; ")));
    }
    let policy: Policy = serde_json::from_value(policy_value.clone())
        .map_err(|e| GateError::IntegrityFailure(format!("malformed policy: {e}")))?;

    let key_store = load_key_store(config)?;
    let envelope = load_policy_sig_envelope(config)?;

    policy_sig::verify_policy_signature(
        &policy,
        envelope.as_ref(),
        Some(&key_store),
        config.unsigned_ok,
    )?;

    let version_state = policy_version::load_state(&config.policy_state_path())?;
    policy_version::check_policy_version(
        &version_state,
        &policy.version,
        &policy.created_at,
        now,
        policy.security.max_policy_created_at_skew_sec,
    )?;
    // Acceptance is not persisted here: `verify` must stay pure with respect
    // to disk state. Only `run` calls `persist_policy_version_acceptance`,
    // after every other gate has passed.

    let proposal_bytes = std::fs::read(&config.proposal_path)
        .map_err(|e| GateError::SchemaError(format!("cannot read proposal file: {e}")))?;
    let proposal_value: Value = serde_json::from_slice(&proposal_bytes)
        .map_err(|e| GateError::SchemaError(format!("proposal is not valid JSON: {e}")))?;
    let proposal_schema = schema::validate_proposal(&proposal_value);
    if !proposal_schema.valid {
        return Err(GateError::SchemaError(proposal_schema.errors.join("; ")));
    }
    let proposal: Proposal = serde_json::from_value(proposal_value.clone())
        .map_err(|e| GateError::SchemaError(format!("malformed proposal: {e}")))?;

    Ok(Loaded {
        policy,
        key_store,
        proposal_value,
        proposal,
    })
}

/// Persist `policy`'s `(version, createdAt)` as the new accepted high-water
/// mark. Only `run` calls this — `verify`/`dryrun` must leave
/// `policy.state.json` untouched (spec.md §9's idempotence property).
pub fn persist_policy_version_acceptance(config: &Config, policy: &Policy) -> Result<(), GateError> {
    let version_state = policy_version::load_state(&config.policy_state_path())?;
    policy_version::record_accepted(
        &config.policy_state_path(),
        version_state,
        &policy.version,
        &policy.created_at,
    )
}

fn load_key_store(config: &Config) -> Result<KeyStore, GateError> {
    let bytes = std::fs::read(&config.keys_path)
        .map_err(|e| GateError::SignatureKeyUnavailable(format!("cannot read keys file: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| GateError::SignatureKeyUnavailable(format!("malformed keys file: {e}")))
}

fn load_policy_sig_envelope(
    config: &Config,
) -> Result<Option<PolicySignatureEnvelope>, GateError> {
    if !config.policy_sig_path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(&config.policy_sig_path)?;
    if bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(&bytes)?))
}

/// Run the validator against an already-loaded proposal, with or without
/// rate limiting, reusing the shared nonce store instance the caller owns
/// (so it can persist afterward regardless of outcome).
pub fn run_validator(
    loaded: &Loaded,
    nonce_store: &mut NonceStore,
    rate_limiting: RateLimiting,
    now: DateTime<Utc>,
) -> ValidationOutcome {
    validator::validate(
        &loaded.proposal_value,
        &loaded.proposal,
        &loaded.key_store,
        &loaded.policy,
        nonce_store,
        rate_limiting,
        now,
    )
}

/// Resolve the requester's `ExecPolicy`, used by the `shell` adapter as a
/// second, defense-in-depth check.
pub fn requester_exec_policy(loaded: &Loaded) -> crate::types::ExecPolicy {
    loaded
        .policy
        .requesters
        .get(&loaded.proposal.requester_id)
        .map(|r| r.exec.clone())
        .unwrap_or_default()
}

pub fn open_nonce_store(config: &Config) -> Result<NonceStore, GateError> {
    NonceStore::load(&config.nonce_db_path(), NonceStore::default_ttl())
}

pub fn open_rate_limiter(config: &Config) -> Result<RateLimiter, GateError> {
    RateLimiter::load(&config.rate_limit_db_path())
}
