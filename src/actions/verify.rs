//! `verify` (spec.md §6): preflights + validation only. Pure with respect to
//! disk state — no nonce consumed, no rate count, no audit entry — so the
//! nonce store is loaded but never persisted.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::config::Config;
use crate::errors::GateError;
use crate::validator::RateLimiting;

use super::common::{load_and_preflight, open_nonce_store, run_validator};

pub fn run(config: &Config, now: DateTime<Utc>) -> (Value, i32) {
    match try_run(config, now) {
        Ok(body) => (body.0, body.1),
        Err(e) => super::error_body(&e),
    }
}

fn try_run(config: &Config, now: DateTime<Utc>) -> Result<(Value, i32), GateError> {
    let loaded = load_and_preflight(config, now)?;
    let mut nonce_store = open_nonce_store(config)?;

    let outcome = run_validator(&loaded, &mut nonce_store, RateLimiting::Skip, now);
    // Deliberately not persisted: `verify` must not consume the nonce.

    let status = if outcome.valid { "valid" } else { "invalid" };
    let body = json!({
        "status": status,
        "commandId": loaded.proposal.command_id,
        "checks": outcome.checks,
        "errors": outcome.errors.iter().map(|e| e.code()).collect::<Vec<_>>(),
        "risk": outcome.risk,
    });

    let exit_code = if outcome.valid {
        0
    } else {
        outcome.errors.first().map(|e| e.exit_code()).unwrap_or(1)
    };

    Ok((body, exit_code))
}
