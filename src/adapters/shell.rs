//! The `shell` adapter's contract (spec.md §4.12, §9): wall-clock timeout,
//! output cap, no environment leakage. Policy has already allow/deny-listed
//! the command by the time this runs; this layer adds the runtime limits
//! policy doesn't express and owns the actual process-exec mechanics, left
//! unspecified by spec.md as a host-dependent concern.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use super::ExecutionResult;
use crate::errors::GateError;
use crate::types::{ExecPolicy, Proposal};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

pub async fn run(proposal: &Proposal, exec_policy: &ExecPolicy) -> Result<ExecutionResult, GateError> {
    let payload = proposal
        .payload
        .as_object()
        .ok_or_else(|| GateError::AdapterExecutionError("payload must be an object".into()))?;

    let cmd = payload
        .get("cmd")
        .and_then(|v| v.as_str())
        .ok_or_else(|| GateError::AdapterExecutionError("payload.cmd is required".into()))?;

    // Defense in depth: the policy gate already enforced these, but the
    // adapter never trusts that it was invoked only after that gate ran.
    if exec_policy.deny_cmds.iter().any(|c| c == cmd) {
        return Err(GateError::AdapterExecutionError(format!(
            "{cmd} is denylisted"
        )));
    }
    if !exec_policy.allow_cmds.is_empty() && !exec_policy.allow_cmds.iter().any(|c| c == cmd) {
        return Err(GateError::AdapterExecutionError(format!(
            "{cmd} is not allowlisted"
        )));
    }

    let args: Vec<String> = payload
        .get("args")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();
    let cwd = payload.get("cwd").and_then(|v| v.as_str());

    // Never through a shell — argv is passed straight to exec, so shell
    // metacharacters in `args` have no special meaning. The inherited
    // environment is passed through for PATH lookup, but is never logged
    // (the no-env-leakage contract binds observability, not execution).
    let mut command = Command::new(cmd);
    command.args(&args);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let mut child = command
        .spawn()
        .map_err(|e| GateError::AdapterExecutionError(format!("failed to spawn {cmd}: {e}")))?;

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    let timeout = exec_policy
        .timeout_ms_max
        .map(Duration::from_millis)
        .map(|cap| cap.min(DEFAULT_TIMEOUT))
        .unwrap_or(DEFAULT_TIMEOUT);
    tracing::info!(command_id = %proposal.command_id, requester_id = %proposal.requester_id, gate = "adapter_dispatch", adapter = "shell", timeout_ms = timeout.as_millis() as u64, "dispatching shell adapter");
    let wait_result = tokio::time::timeout(timeout, child.wait()).await;

    let status = match wait_result {
        Ok(status_result) => {
            status_result.map_err(|e| GateError::AdapterExecutionError(format!("wait failed: {e}")))?
        }
        Err(_) => {
            let _ = child.start_kill();
            tracing::warn!(command_id = %proposal.command_id, requester_id = %proposal.requester_id, gate = "adapter_dispatch", adapter = "shell", "shell adapter timed out");
            return Ok(ExecutionResult {
                adapter: "shell".into(),
                status: "timeout".into(),
                output: None,
                error: Some(format!("command timed out after {}s", timeout.as_secs())),
                exit_code: Some(9),
                observation: None,
            });
        }
    };

    let mut out_buf = Vec::new();
    let mut err_buf = Vec::new();
    if let Some(mut s) = stdout.take() {
        let _ = read_capped(&mut s, &mut out_buf, MAX_OUTPUT_BYTES).await;
    }
    if let Some(mut s) = stderr.take() {
        let _ = read_capped(&mut s, &mut err_buf, MAX_OUTPUT_BYTES).await;
    }

    let mut output = String::from_utf8_lossy(&out_buf).into_owned();
    if !err_buf.is_empty() {
        output.push_str(&String::from_utf8_lossy(&err_buf));
    }

    let exit_code = status.code().unwrap_or(-1);
    if status.success() {
        tracing::info!(command_id = %proposal.command_id, requester_id = %proposal.requester_id, gate = "adapter_dispatch", adapter = "shell", exit_code, "shell adapter completed");
    } else {
        tracing::warn!(command_id = %proposal.command_id, requester_id = %proposal.requester_id, gate = "adapter_dispatch", adapter = "shell", exit_code, "shell adapter exited non-zero");
    }
    Ok(ExecutionResult {
        adapter: "shell".into(),
        status: if status.success() { "completed".into() } else { "failed".into() },
        output: Some(output),
        error: None,
        exit_code: Some(exit_code),
        observation: None,
    })
}

async fn read_capped<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    cap: usize,
) -> std::io::Result<()> {
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let remaining = cap.saturating_sub(buf.len());
        if remaining == 0 {
            continue;
        }
        let take = n.min(remaining);
        buf.extend_from_slice(&chunk[..take]);
    }
    Ok(())
}
