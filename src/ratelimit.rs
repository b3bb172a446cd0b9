//! Per-requester sliding-window rate limiter, consulted on `run` only
//! (spec.md §4.6). Shaped directly on the teacher's `REVERT_STRIKE_TRACKER`:
//! a pruned, ordered sequence of timestamps compared against a threshold.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::atomic::atomic_write;
use crate::errors::GateError;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RateEntry {
    #[serde(rename = "requesterId")]
    requester_id: String,
    timestamp: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RateFile {
    #[serde(default)]
    entries: Vec<RateEntry>,
}

pub struct RateLimiter {
    path: PathBuf,
    file: RateFile,
}

impl RateLimiter {
    pub fn load(path: &Path) -> Result<Self, GateError> {
        let file = if path.exists() {
            let bytes = std::fs::read(path)?;
            if bytes.is_empty() {
                RateFile::default()
            } else {
                serde_json::from_slice(&bytes)?
            }
        } else {
            RateFile::default()
        };
        Ok(RateLimiter {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Purge entries outside `window_sec`, count the remainder for
    /// `requester_id`, and either reject with `retryAfterSec` or record the
    /// new request.
    pub fn check_and_record(
        &mut self,
        requester_id: &str,
        window_sec: i64,
        max_requests: u64,
        now: i64,
    ) -> Result<(), GateError> {
        let cutoff = now.saturating_sub(window_sec);
        self.file.entries.retain(|e| e.timestamp >= cutoff);

        let requester_entries: Vec<&RateEntry> = self
            .file
            .entries
            .iter()
            .filter(|e| e.requester_id == requester_id)
            .collect();

        if requester_entries.len() as u64 >= max_requests {
            let oldest = requester_entries
                .iter()
                .map(|e| e.timestamp)
                .min()
                .unwrap_or(now);
            let retry_after_sec = window_sec - (now - oldest);
            tracing::warn!(requester_id, gate = "rate_limit", retry_after_sec, "rate limit exceeded");
            return Err(GateError::RateLimitExceeded {
                retry_after_sec: retry_after_sec.max(0),
            });
        }

        self.file.entries.push(RateEntry {
            requester_id: requester_id.to_string(),
            timestamp: now,
        });
        tracing::info!(requester_id, gate = "rate_limit", "request recorded");
        Ok(())
    }

    pub fn persist(&self) -> Result<(), GateError> {
        let bytes = serde_json::to_vec_pretty(&self.file)?;
        atomic_write(&self.path, &bytes)
    }
}
