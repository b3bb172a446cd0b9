//! `run` (spec.md §6): preflights + validation (with the rate limiter) +
//! adapter dispatch + audit append. The only action that mutates the nonce
//! store, the rate-limit store, and the audit ledger.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::adapters;
use crate::audit;
use crate::config::Config;
use crate::errors::GateError;
use crate::validator::RateLimiting;

use super::common::{
    load_and_preflight, open_nonce_store, open_rate_limiter, persist_policy_version_acceptance,
    requester_exec_policy, run_validator,
};

pub async fn run(config: &Config, now: DateTime<Utc>) -> (Value, i32) {
    match try_run(config, now).await {
        Ok(body) => body,
        Err(e) => super::error_body(&e),
    }
}

async fn try_run(config: &Config, now: DateTime<Utc>) -> Result<(Value, i32), GateError> {
    let loaded = load_and_preflight(config, now)?;
    persist_policy_version_acceptance(config, &loaded.policy)?;
    let mut nonce_store = open_nonce_store(config)?;
    let mut rate_limiter = open_rate_limiter(config)?;

    let window_sec = loaded
        .policy
        .requesters
        .get(&loaded.proposal.requester_id)
        .and_then(|r| r.rate_limit.as_ref())
        .unwrap_or(&loaded.policy.security.default_rate_limit)
        .window_sec;
    let max_requests = loaded
        .policy
        .requesters
        .get(&loaded.proposal.requester_id)
        .and_then(|r| r.rate_limit.as_ref())
        .unwrap_or(&loaded.policy.security.default_rate_limit)
        .max_requests;

    let outcome = run_validator(
        &loaded,
        &mut nonce_store,
        RateLimiting::Enforce {
            limiter: &mut rate_limiter,
            window_sec,
            max_requests,
        },
        now,
    );

    // Nonce (and rate budget, if consumed) are burned on first observation
    // regardless of downstream outcome — persist unconditionally.
    nonce_store.persist()?;
    rate_limiter.persist()?;

    if !outcome.valid {
        let first_error = outcome.errors.first().cloned();
        let exit_code = first_error.as_ref().map(|e| e.exit_code()).unwrap_or(1);
        let body = json!({
            "status": "rejected",
            "commandId": loaded.proposal.command_id,
            "checks": outcome.checks,
            "errors": outcome.errors.iter().map(|e| e.code()).collect::<Vec<_>>(),
            "risk": outcome.risk,
        });

        if let Some(err) = &first_error {
            audit::append_audit(
                &config.audit_log_path(),
                "run",
                "rejected",
                Some(loaded.proposal.requester_id.clone()),
                Some(loaded.proposal.command_id.clone()),
                audit::AuditOutcome::default(),
                json!({"reason": err.code()}),
                now,
            )?;
        }

        return Ok((body, exit_code));
    }

    let exec_policy = requester_exec_policy(&loaded);
    let dispatch_start = std::time::Instant::now();
    let execution_result = adapters::dispatch(&loaded.proposal, &exec_policy).await;
    let duration_ms = dispatch_start.elapsed().as_millis() as u64;

    let (status, exit_code, exec_value, audit_outcome) = match execution_result {
        Ok(result) => {
            let exit = result.exit_code.unwrap_or(0);
            let audit_outcome = audit::AuditOutcome {
                adapter: Some(result.adapter.clone()),
                exit_code: result.exit_code,
                duration_ms: Some(duration_ms),
            };
            (
                "executed".to_string(),
                if exit == 0 { 0 } else { exit },
                json!(result),
                audit_outcome,
            )
        }
        Err(e) => {
            let exit = e.exit_code();
            let adapter_name = loaded.proposal.adapter().map(str::to_string);
            let audit_outcome = audit::AuditOutcome {
                adapter: adapter_name.clone(),
                exit_code: None,
                duration_ms: Some(duration_ms),
            };
            (
                "error".to_string(),
                exit,
                json!({"adapter": adapter_name, "status": "error", "error": e.to_string()}),
                audit_outcome,
            )
        }
    };

    audit::append_audit(
        &config.audit_log_path(),
        "run",
        &status,
        Some(loaded.proposal.requester_id.clone()),
        Some(loaded.proposal.command_id.clone()),
        audit_outcome,
        exec_value.clone(),
        now,
    )?;

    let body = json!({
        "status": status,
        "commandId": loaded.proposal.command_id,
        "checks": outcome.checks,
        "executionResult": exec_value,
    });

    Ok((body, exit_code))
}
