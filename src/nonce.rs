//! Replay-nonce store: `checkAndRecord` with TTL pruning (spec.md §4.5).
//!
//! Consumes a nonce the moment it's first seen — a proposal that is later
//! rejected by a downstream gate has still burned its nonce, by design (see
//! DESIGN.md's Open Question notes). Persisted to `nonce.db.json` via the
//! atomic-write primitive.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::atomic::atomic_write;
use crate::errors::GateError;

const DEFAULT_TTL_SEC: i64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NonceEntry {
    key: String,
    timestamp: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct NonceFile {
    #[serde(default)]
    entries: Vec<NonceEntry>,
}

pub struct NonceStore {
    path: PathBuf,
    ttl_sec: i64,
    file: NonceFile,
}

impl NonceStore {
    pub fn load(path: &Path, ttl_sec: i64) -> Result<Self, GateError> {
        let file = if path.exists() {
            let bytes = std::fs::read(path)?;
            if bytes.is_empty() {
                NonceFile::default()
            } else {
                serde_json::from_slice(&bytes)?
            }
        } else {
            NonceFile::default()
        };
        Ok(NonceStore {
            path: path.to_path_buf(),
            ttl_sec,
            file,
        })
    }

    pub fn default_ttl() -> i64 {
        DEFAULT_TTL_SEC
    }

    /// Prune stale entries, then check-and-record the composite key. Callers
    /// should call [`Self::persist`] afterward regardless of the result, so
    /// a consumed nonce survives even if a later gate rejects the proposal.
    pub fn check_and_record(
        &mut self,
        requester_id: &str,
        session_id: &str,
        nonce: &str,
        now: i64,
    ) -> Result<(), GateError> {
        self.prune(now);

        let key = composite_key(requester_id, session_id, nonce);
        if self.file.entries.iter().any(|e| e.key == key) {
            tracing::warn!(requester_id, gate = "nonce", "nonce replay detected");
            return Err(GateError::ReplayNonce);
        }

        self.file.entries.push(NonceEntry {
            key,
            timestamp: now,
        });
        tracing::info!(requester_id, gate = "nonce", "nonce recorded");
        Ok(())
    }

    fn prune(&mut self, now: i64) {
        let ttl = self.ttl_sec;
        self.file
            .entries
            .retain(|e| now.saturating_sub(e.timestamp) <= ttl);
    }

    pub fn persist(&self) -> Result<(), GateError> {
        let bytes = serde_json::to_vec_pretty(&self.file)?;
        atomic_write(&self.path, &bytes)
    }
}

fn composite_key(requester_id: &str, session_id: &str, nonce: &str) -> String {
    format!("{requester_id}|{session_id}|{nonce}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn fresh_nonce_is_accepted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nonce.db.json");
        let mut store = NonceStore::load(&path, 3600).unwrap();
        let result = store.check_and_record("req", "sess", "abc123", 1000);
        assert!(result.is_ok());
    }

    #[test]
    fn replayed_nonce_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nonce.db.json");
        let mut store = NonceStore::load(&path, 3600).unwrap();
        store.check_and_record("req", "sess", "abc123", 1000).unwrap();
        let result = store.check_and_record("req", "sess", "abc123", 1001);
        assert!(matches!(result, Err(GateError::ReplayNonce)));
    }

    #[test]
    fn persists_and_reloads_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nonce.db.json");
        {
            let mut store = NonceStore::load(&path, 3600).unwrap();
            store.check_and_record("req", "sess", "abc123", 1000).unwrap();
            store.persist().unwrap();
        }
        let mut reloaded = NonceStore::load(&path, 3600).unwrap();
        let result = reloaded.check_and_record("req", "sess", "abc123", 1001);
        assert!(matches!(result, Err(GateError::ReplayNonce)));
    }

    #[test]
    fn expired_entries_are_pruned_and_reusable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nonce.db.json");
        let mut store = NonceStore::load(&path, 10).unwrap();
        store.check_and_record("req", "sess", "abc123", 1000).unwrap();
        // 20 seconds later, beyond the 10s TTL.
        let result = store.check_and_record("req", "sess", "abc123", 1020);
        assert!(result.is_ok());
    }

    #[test]
    fn different_sessions_are_independent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nonce.db.json");
        let mut store = NonceStore::load(&path, 3600).unwrap();
        store.check_and_record("req", "sessA", "abc123", 1000).unwrap();
        let result = store.check_and_record("req", "sessB", "abc123", 1000);
        assert!(result.is_ok());
    }
}
