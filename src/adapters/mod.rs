//! Adapter dispatcher (spec.md §4.12): selects and runs the constrained
//! executor named by `payload.adapter`, after policy has already confirmed
//! the requester may use it.

mod noop;
mod observer;
mod shell;

use serde::Serialize;
use serde_json::Value;

use crate::errors::GateError;
use crate::types::{ExecPolicy, Proposal};

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub adapter: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "exitCode", skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<Value>,
}

/// Always run the `noop` adapter regardless of `payload.adapter` — used by
/// the `dryrun` action, which simulates without touching the requested
/// adapter (spec.md §6).
pub fn run_noop(proposal: &Proposal) -> ExecutionResult {
    noop::run(proposal)
}

/// Dispatch `proposal` to the adapter named in its payload. `exec_policy`
/// supplies the requester's shell allow/deny lists and any timeout/output
/// overrides when the adapter is `shell`.
pub async fn dispatch(proposal: &Proposal, exec_policy: &ExecPolicy) -> Result<ExecutionResult, GateError> {
    let adapter_name = proposal
        .adapter()
        .ok_or_else(|| GateError::AdapterExecutionError("payload.adapter missing".into()))?;

    let command_id = proposal.command_id.as_str();
    let requester_id = proposal.requester_id.as_str();

    let result = match adapter_name {
        "noop" => Ok(noop::run(proposal)),
        "observer" => observer::run(proposal),
        "shell" => shell::run(proposal, exec_policy).await,
        other => Err(GateError::AdapterExecutionError(format!(
            "unknown adapter: {other}"
        ))),
    };

    match &result {
        Ok(r) => tracing::info!(command_id, requester_id, gate = "adapter_dispatch", adapter = adapter_name, status = %r.status, "adapter dispatched"),
        Err(_) => tracing::warn!(command_id, requester_id, gate = "adapter_dispatch", adapter = adapter_name, "adapter dispatch failed"),
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProposalSignature;
    use serde_json::json;

    fn proposal_with_payload(payload: Value) -> Proposal {
        Proposal {
            id: "RUN_SHELL".into(),
            command_id: "c".into(),
            requester_id: "agent:gpt".into(),
            session_id: "s".into(),
            timestamp: 0,
            nonce: "a".repeat(32),
            requires: vec![],
            risk: crate::types::Risk::Low,
            payload,
            signature: ProposalSignature {
                alg: "ed25519".into(),
                key_id: "k".into(),
                sig: "s".into(),
            },
        }
    }

    #[tokio::test]
    async fn unknown_adapter_is_an_execution_error() {
        let proposal = proposal_with_payload(json!({"adapter": "ghost"}));
        let exec_policy = ExecPolicy::default();
        let result = dispatch(&proposal, &exec_policy).await;
        assert!(matches!(result, Err(GateError::AdapterExecutionError(_))));
    }

    #[tokio::test]
    async fn missing_adapter_field_is_an_execution_error() {
        let proposal = proposal_with_payload(json!({}));
        let exec_policy = ExecPolicy::default();
        let result = dispatch(&proposal, &exec_policy).await;
        assert!(matches!(result, Err(GateError::AdapterExecutionError(_))));
    }
}
