//! `dryrun` (spec.md §6): preflights + validation, then dispatches the
//! `noop` adapter regardless of what `payload.adapter` names — no audit
//! entry, and like `verify`, the nonce store is loaded but never persisted.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::adapters;
use crate::config::Config;
use crate::errors::GateError;
use crate::validator::RateLimiting;

use super::common::{load_and_preflight, open_nonce_store, run_validator};

pub fn run(config: &Config, now: DateTime<Utc>) -> (Value, i32) {
    match try_run(config, now) {
        Ok(body) => body,
        Err(e) => super::error_body(&e),
    }
}

fn try_run(config: &Config, now: DateTime<Utc>) -> Result<(Value, i32), GateError> {
    let loaded = load_and_preflight(config, now)?;
    let mut nonce_store = open_nonce_store(config)?;

    let outcome = run_validator(&loaded, &mut nonce_store, RateLimiting::Skip, now);

    if !outcome.valid {
        let body = json!({
            "status": "invalid",
            "commandId": loaded.proposal.command_id,
            "checks": outcome.checks,
            "errors": outcome.errors.iter().map(|e| e.code()).collect::<Vec<_>>(),
            "risk": outcome.risk,
        });
        let exit_code = outcome.errors.first().map(|e| e.exit_code()).unwrap_or(1);
        return Ok((body, exit_code));
    }

    let execution_result = adapters::run_noop(&loaded.proposal);
    let body = json!({
        "status": "valid_simulated",
        "commandId": loaded.proposal.command_id,
        "checks": outcome.checks,
        "errors": Vec::<&str>::new(),
        "risk": outcome.risk,
        "executionResult": execution_result,
    });

    Ok((body, 0))
}
