//! The `observer` adapter (spec.md §4.12): records an observation with no
//! filesystem, network, or process side effects. The proposal's payload
//! must carry the observer-specific fields checked here.

use serde_json::{json, Value};

use super::ExecutionResult;
use crate::errors::GateError;
use crate::types::Proposal;

const SEVERITIES: &[&str] = &["low", "medium", "high", "critical"];

pub fn run(proposal: &Proposal) -> Result<ExecutionResult, GateError> {
    let payload = proposal
        .payload
        .as_object()
        .ok_or_else(|| GateError::AdapterExecutionError("payload must be an object".into()))?;

    let source = require_str(payload, "source")?;
    let context = require_str(payload, "context")?;
    let issue_type = require_str(payload, "issueType")?;
    let description = require_str(payload, "description")?;
    let severity = require_str(payload, "severity")?;
    if !SEVERITIES.contains(&severity) {
        return Err(GateError::AdapterExecutionError(format!(
            "payload.severity must be one of {SEVERITIES:?}"
        )));
    }
    let metadata = payload.get("metadata").cloned().unwrap_or(Value::Null);

    let observation = json!({
        "source": source,
        "context": context,
        "issueType": issue_type,
        "description": description,
        "severity": severity,
        "metadata": metadata,
    });

    Ok(ExecutionResult {
        adapter: "observer".into(),
        status: "recorded".into(),
        output: None,
        error: None,
        exit_code: Some(0),
        observation: Some(observation),
    })
}

fn require_str<'a>(
    payload: &'a serde_json::Map<String, Value>,
    field: &str,
) -> Result<&'a str, GateError> {
    payload
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| GateError::AdapterExecutionError(format!("payload.{field} is required")))
}
