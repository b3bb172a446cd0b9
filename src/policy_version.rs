//! Policy-version monotonicity guard (spec.md §4.3).
//!
//! A policy's `(version, createdAt)` pair must never regress against the
//! last one this install accepted. `version` may be an integer or a
//! semver-like string; `createdAt` is epoch seconds or an RFC 3339 string.
//! Acceptance persists the new pair atomically so the next invocation
//! compares against it.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::atomic::atomic_write;
use crate::errors::GateError;
use crate::types::{LastAccepted, PolicyVersionState};

/// Parse `version` into a comparable key: integers compare numerically,
/// dotted strings (`"1.2.3"`) compare component-wise, anything else is
/// rejected as `POLICY_VERSION_INVALID`.
fn parse_version(value: &Value) -> Result<Vec<i64>, GateError> {
    if let Some(i) = value.as_i64() {
        return Ok(vec![i]);
    }
    if let Some(u) = value.as_u64() {
        return Ok(vec![u as i64]);
    }
    if let Some(s) = value.as_str() {
        let parts: Result<Vec<i64>, _> = s.split('.').map(|p| p.parse::<i64>()).collect();
        return parts.map_err(|_| GateError::PolicyVersionInvalid(s.to_string()));
    }
    Err(GateError::PolicyVersionInvalid(format!("{value}")))
}

fn compare_versions(a: &[i64], b: &[i64]) -> std::cmp::Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let av = a.get(i).copied().unwrap_or(0);
        let bv = b.get(i).copied().unwrap_or(0);
        match av.cmp(&bv) {
            std::cmp::Ordering::Equal => continue,
            other => return other,
        }
    }
    std::cmp::Ordering::Equal
}

/// Parse `createdAt` into a `DateTime<Utc>`: either epoch seconds (integer)
/// or an RFC 3339 string.
fn parse_created_at(value: &Value) -> Result<DateTime<Utc>, GateError> {
    if let Some(secs) = value.as_i64() {
        return DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| GateError::PolicyCreatedAtInvalid(secs.to_string()));
    }
    if let Some(s) = value.as_str() {
        return DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| GateError::PolicyCreatedAtInvalid(s.to_string()));
    }
    Err(GateError::PolicyCreatedAtInvalid(format!("{value}")))
}

/// Check `version`/`created_at` against `state`, rejecting clock skew beyond
/// `max_skew_sec` and any regression against `state.last_accepted`. Does not
/// mutate `state` — call [`record_accepted`] after all other gates pass.
pub fn check_policy_version(
    state: &PolicyVersionState,
    version: &Value,
    created_at: &Value,
    now: DateTime<Utc>,
    max_skew_sec: i64,
) -> Result<(), GateError> {
    let parsed_version = parse_version(version)?;
    let parsed_created_at = parse_created_at(created_at)?;

    let skew = (now - parsed_created_at).num_seconds().abs();
    if skew > max_skew_sec {
        tracing::warn!(gate = "policy_version", skew_sec = skew, max_skew_sec, "policy createdAt skew exceeded");
        return Err(GateError::PolicyCreatedAtSkewExceeded);
    }

    if let Some(last) = &state.last_accepted {
        let last_version = parse_version(&last.version)?;
        let last_created_at = parse_created_at(&last.created_at)?;

        // Monotonicity across both axes (spec.md §4.9): even a strictly newer
        // version must not carry an older createdAt than what was accepted.
        if compare_versions(&parsed_version, &last_version) == std::cmp::Ordering::Less {
            tracing::warn!(gate = "policy_version", version = %version, "policy version regression");
            return Err(GateError::PolicyVersionRegression);
        }
        if parsed_created_at < last_created_at {
            tracing::warn!(gate = "policy_version", "policy createdAt regression");
            return Err(GateError::PolicyCreatedAtRegression);
        }
    }

    tracing::info!(gate = "policy_version", version = %version, "policy version accepted");
    Ok(())
}

/// Persist `(version, createdAt)` as the new high-water mark, at
/// `state_path`. Called only after a proposal has cleared every gate.
pub fn record_accepted(
    state_path: &std::path::Path,
    mut state: PolicyVersionState,
    version: &Value,
    created_at: &Value,
) -> Result<(), GateError> {
    state.last_accepted = Some(LastAccepted {
        version: version.clone(),
        created_at: created_at.clone(),
        environment: None,
    });
    let bytes = serde_json::to_vec_pretty(&state)?;
    atomic_write(state_path, &bytes)
}

pub fn load_state(path: &std::path::Path) -> Result<PolicyVersionState, GateError> {
    if !path.exists() {
        return Ok(PolicyVersionState::default());
    }
    let bytes = std::fs::read(path)?;
    if bytes.is_empty() {
        return Ok(PolicyVersionState::default());
    }
    Ok(serde_json::from_slice(&bytes)?)
}
