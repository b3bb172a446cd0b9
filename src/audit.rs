//! Hash-chained append-only audit ledger (spec.md §4.8).
//!
//! Each entry embeds the SHA-256 hash of its predecessor (`"GENESIS"` for
//! entry zero) and its own hash over its canonical bytes plus `prevHash`.
//! Appends happen one entry at a time via the atomic-write primitive —
//! there's no O_APPEND reliance, matching the crate's single-writer model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::atomic::atomic_write;
use crate::errors::GateError;

const GENESIS: &str = "GENESIS";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: u64,
    pub timestamp: String,
    pub action: String,
    pub status: String,
    #[serde(rename = "requesterId")]
    pub requester_id: Option<String>,
    #[serde(rename = "commandId")]
    pub command_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,
    #[serde(default, rename = "exitCode", skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, rename = "durationMs", skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub detail: Value,
    #[serde(rename = "prevHash")]
    pub prev_hash: String,
    pub hash: String,
}

/// Everything about an entry except its own `hash`, used to recompute that
/// hash deterministically from the other fields plus `prevHash`.
#[derive(Serialize)]
struct HashedFields<'a> {
    seq: u64,
    timestamp: &'a str,
    action: &'a str,
    status: &'a str,
    #[serde(rename = "requesterId")]
    requester_id: &'a Option<String>,
    #[serde(rename = "commandId")]
    command_id: &'a Option<String>,
    adapter: &'a Option<String>,
    #[serde(rename = "exitCode")]
    exit_code: &'a Option<i32>,
    #[serde(rename = "durationMs")]
    duration_ms: &'a Option<u64>,
    detail: &'a Value,
    #[serde(rename = "prevHash")]
    prev_hash: &'a str,
}

fn compute_hash(fields: &HashedFields) -> String {
    let value = serde_json::to_value(fields).expect("HashedFields always serializes");
    let bytes = crate::canonical::to_canonical_bytes(&value);
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}

pub struct AppendResult {
    pub entry: AuditEntry,
}

/// What the `run` action observed about adapter dispatch, flattened onto
/// the audit entry per spec.md §4.10's schema instead of nested in `detail`.
#[derive(Debug, Clone, Default)]
pub struct AuditOutcome {
    pub adapter: Option<String>,
    pub exit_code: Option<i32>,
    pub duration_ms: Option<u64>,
}

/// Append a new entry to the JSONL ledger at `path`, chaining off the last
/// line's `hash` (or `GENESIS` for an empty/missing ledger). `detail` is
/// free-form context beyond the fixed schema (e.g. a rejection reason) and
/// defaults to `Value::Null` when there is none.
#[allow(clippy::too_many_arguments)]
pub fn append_audit(
    path: &Path,
    action: &str,
    status: &str,
    requester_id: Option<String>,
    command_id: Option<String>,
    outcome: AuditOutcome,
    detail: Value,
    now: DateTime<Utc>,
) -> Result<AppendResult, GateError> {
    let existing = read_entries(path)?;
    let (seq, prev_hash) = match existing.last() {
        Some(last) => (last.seq + 1, last.hash.clone()),
        None => (0, GENESIS.to_string()),
    };

    let timestamp = now.to_rfc3339();
    let AuditOutcome { adapter, exit_code, duration_ms } = outcome;
    let hash = compute_hash(&HashedFields {
        seq,
        timestamp: &timestamp,
        action,
        status,
        requester_id: &requester_id,
        command_id: &command_id,
        adapter: &adapter,
        exit_code: &exit_code,
        duration_ms: &duration_ms,
        detail: &detail,
        prev_hash: &prev_hash,
    });

    let entry = AuditEntry {
        seq,
        timestamp,
        action: action.to_string(),
        status: status.to_string(),
        requester_id,
        command_id,
        adapter,
        exit_code,
        duration_ms,
        detail,
        prev_hash,
        hash,
    };

    tracing::info!(
        command_id = entry.command_id.as_deref().unwrap_or(""),
        requester_id = entry.requester_id.as_deref().unwrap_or(""),
        gate = "audit_append",
        seq,
        status,
        "audit entry appended"
    );

    let mut lines = existing;
    lines.push(entry.clone());
    persist_all(path, &lines)?;

    Ok(AppendResult { entry })
}

fn persist_all(path: &Path, entries: &[AuditEntry]) -> Result<(), GateError> {
    let mut out = String::new();
    for e in entries {
        out.push_str(&serde_json::to_string(e)?);
        out.push('\n');
    }
    atomic_write(path, out.as_bytes())
}

fn read_entries(path: &Path) -> Result<Vec<AuditEntry>, GateError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(line)?);
    }
    Ok(entries)
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub valid: bool,
    #[serde(rename = "entriesChecked")]
    pub entries_checked: u64,
    #[serde(rename = "firstBrokenSeq")]
    pub first_broken_seq: Option<u64>,
    pub errors: Vec<String>,
}

/// Verify the full hash chain. With `fail_fast`, stop at the first broken
/// link; otherwise keep scanning (bounded by `max_entries`, if given) and
/// report every break found.
pub fn verify_audit_log_integrity(
    path: &Path,
    fail_fast: bool,
    max_entries: Option<u64>,
) -> Result<IntegrityReport, GateError> {
    let entries = read_entries(path)?;
    let mut errors = Vec::new();
    let mut first_broken_seq = None;
    let mut expected_prev = GENESIS.to_string();
    let mut checked = 0u64;

    for entry in &entries {
        if let Some(limit) = max_entries {
            if checked >= limit {
                break;
            }
        }
        checked += 1;

        let mut broken = false;
        if entry.prev_hash != expected_prev {
            errors.push(format!(
                "seq {}: prevHash mismatch (expected {}, got {})",
                entry.seq, expected_prev, entry.prev_hash
            ));
            broken = true;
        }

        let recomputed = compute_hash(&HashedFields {
            seq: entry.seq,
            timestamp: &entry.timestamp,
            action: &entry.action,
            status: &entry.status,
            requester_id: &entry.requester_id,
            command_id: &entry.command_id,
            adapter: &entry.adapter,
            exit_code: &entry.exit_code,
            duration_ms: &entry.duration_ms,
            detail: &entry.detail,
            prev_hash: &entry.prev_hash,
        });
        if recomputed != entry.hash {
            errors.push(format!("seq {}: hash mismatch", entry.seq));
            broken = true;
        }

        if broken {
            first_broken_seq.get_or_insert(entry.seq);
            if fail_fast {
                break;
            }
        }

        expected_prev = entry.hash.clone();
    }

    Ok(IntegrityReport {
        valid: errors.is_empty(),
        entries_checked: checked,
        first_broken_seq,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        "2026-01-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn first_entry_chains_off_genesis() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log.jsonl");
        let result = append_audit(&path, "run", "allowed", None, None, AuditOutcome::default(), json!({}), now()).unwrap();
        assert_eq!(result.entry.prev_hash, GENESIS);
        assert_eq!(result.entry.seq, 0);
    }

    #[test]
    fn successive_entries_chain_hashes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log.jsonl");
        let first = append_audit(&path, "run", "allowed", None, None, AuditOutcome::default(), json!({}), now()).unwrap();
        let second = append_audit(&path, "verify", "allowed", None, None, AuditOutcome::default(), json!({}), now()).unwrap();
        assert_eq!(second.entry.prev_hash, first.entry.hash);
        assert_eq!(second.entry.seq, 1);
    }

    #[test]
    fn verify_passes_on_untouched_ledger() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log.jsonl");
        append_audit(&path, "run", "allowed", None, None, AuditOutcome::default(), json!({"a": 1}), now()).unwrap();
        append_audit(&path, "run", "denied", None, None, AuditOutcome::default(), json!({"b": 2}), now()).unwrap();
        let report = verify_audit_log_integrity(&path, false, None).unwrap();
        assert!(report.valid, "{:?}", report.errors);
        assert_eq!(report.entries_checked, 2);
    }

    #[test]
    fn tampered_detail_breaks_hash_chain() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log.jsonl");
        append_audit(&path, "run", "allowed", None, None, AuditOutcome::default(), json!({"a": 1}), now()).unwrap();
        append_audit(&path, "run", "allowed", None, None, AuditOutcome::default(), json!({"a": 2}), now()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines: Vec<String> = contents.lines().map(|s| s.to_string()).collect();
        let mut first: AuditEntry = serde_json::from_str(&lines[0]).unwrap();
        first.detail = json!({"a": 999});
        lines[0] = serde_json::to_string(&first).unwrap();
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();

        let report = verify_audit_log_integrity(&path, false, None).unwrap();
        assert!(!report.valid);
        assert_eq!(report.first_broken_seq, Some(0));
        // Tampering seq 0's hash also breaks seq 1's prevHash link.
        assert!(report.errors.len() >= 2);
    }

    #[test]
    fn fail_fast_stops_at_first_break() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log.jsonl");
        append_audit(&path, "run", "allowed", None, None, AuditOutcome::default(), json!({"a": 1}), now()).unwrap();
        append_audit(&path, "run", "allowed", None, None, AuditOutcome::default(), json!({"a": 2}), now()).unwrap();
        append_audit(&path, "run", "allowed", None, None, AuditOutcome::default(), json!({"a": 3}), now()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines: Vec<String> = contents.lines().map(|s| s.to_string()).collect();
        let mut first: AuditEntry = serde_json::from_str(&lines[0]).unwrap();
        first.detail = json!({"a": 999});
        lines[0] = serde_json::to_string(&first).unwrap();
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();

        let report = verify_audit_log_integrity(&path, true, None).unwrap();
        assert!(!report.valid);
        assert_eq!(report.entries_checked, 1);
    }

    #[test]
    fn empty_ledger_is_valid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log.jsonl");
        let report = verify_audit_log_integrity(&path, false, None).unwrap();
        assert!(report.valid);
        assert_eq!(report.entries_checked, 0);
    }
}
