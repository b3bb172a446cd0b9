//! Deny-by-default policy engine (spec.md §4.7).
//!
//! Evaluation order is fixed: requester membership, command allowlist,
//! adapter allowlist, filesystem root/deny-pattern checks, `RUN_SHELL`
//! cmd allow/deny checks, and finally an informational risk heuristic that
//! never gates. Absence is always a denial — there is no implicit allow
//! anywhere in this module.

use std::path::{Component, Path};

use crate::errors::GateError;
use crate::types::{Policy, Risk};

pub fn evaluate(policy: &Policy, requester_id: &str, id: &str, payload: &serde_json::Value) -> Result<Risk, GateError> {
    let requester = policy.requesters.get(requester_id).ok_or_else(|| {
        tracing::warn!(requester_id, gate = "policy", "requester not in policy");
        GateError::RequesterNotAllowed
    })?;

    if requester.allow_commands.is_empty() || !requester.allow_commands.iter().any(|c| c == id) {
        tracing::warn!(requester_id, gate = "policy", command_id = id, "command not allowlisted");
        return Err(GateError::CommandNotAllowed);
    }

    let adapter = payload.get("adapter").and_then(|v| v.as_str()).ok_or_else(|| {
        tracing::warn!(requester_id, gate = "policy", "payload.adapter missing");
        GateError::AdapterNotAllowed
    })?;
    if requester.allow_adapters.is_empty() || !requester.allow_adapters.iter().any(|a| a == adapter) {
        tracing::warn!(requester_id, gate = "policy", adapter, "adapter not allowlisted");
        return Err(GateError::AdapterNotAllowed);
    }

    if let Some(cwd) = payload.get("cwd").and_then(|v| v.as_str()) {
        if requester.filesystem.roots.is_empty() {
            tracing::warn!(requester_id, gate = "policy", "no filesystem roots defined");
            return Err(GateError::NoFilesystemRootsDefined);
        }
        if !is_within_any_root(cwd, &requester.filesystem.roots) {
            tracing::warn!(requester_id, gate = "policy", cwd, "path outside configured roots");
            return Err(GateError::PathOutsideRoots);
        }
        if requester
            .filesystem
            .deny_patterns
            .iter()
            .any(|pat| glob_match(pat, cwd))
        {
            tracing::warn!(requester_id, gate = "policy", cwd, "path denied by pattern");
            return Err(GateError::PathDeniedByPattern);
        }
    }

    if id == "RUN_SHELL" {
        if let Some(cmd) = payload.get("cmd").and_then(|v| v.as_str()) {
            if requester.exec.deny_cmds.iter().any(|c| c == cmd) {
                tracing::warn!(requester_id, gate = "policy", cmd, "shell command denylisted");
                return Err(GateError::ShellCmdDenied);
            }
            if !requester.exec.allow_cmds.is_empty() && !requester.exec.allow_cmds.iter().any(|c| c == cmd) {
                tracing::warn!(requester_id, gate = "policy", cmd, "shell command not allowlisted");
                return Err(GateError::ShellCmdNotAllowlisted);
            }
        }
    }

    let risk = compute_risk(id, payload);
    tracing::info!(requester_id, gate = "policy", command_id = id, ?risk, "policy allowed");
    Ok(risk)
}

/// Path-component match: `cwd` must equal a root or be a descendant of one,
/// comparing normalized path components rather than raw string prefixes (so
/// `/srv/appendix` is not treated as inside root `/srv/app`).
fn is_within_any_root(cwd: &str, roots: &[String]) -> bool {
    let cwd_components = normalized_components(cwd);
    roots.iter().any(|root| {
        let root_components = normalized_components(root);
        cwd_components.len() >= root_components.len()
            && cwd_components[..root_components.len()] == root_components[..]
    })
}

fn normalized_components(p: &str) -> Vec<String> {
    Path::new(p)
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().to_string()),
            Component::RootDir => Some("/".to_string()),
            _ => None,
        })
        .collect()
}

/// Simple glob matcher supporting `*` (any run of characters within a path
/// segment boundary) and `**` (any run of characters, including `/`).
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let regex_source = glob_to_regex(pattern);
    regex::Regex::new(&regex_source)
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    out.push_str(".*");
                } else {
                    out.push_str("[^/]*");
                }
            }
            c if "\\.+^$()[]{}|?".contains(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('$');
    out
}

/// Purely informational risk classification — never gates a decision.
fn compute_risk(id: &str, payload: &serde_json::Value) -> Risk {
    if id == "RUN_SHELL" {
        if let Some(cmd) = payload.get("cmd").and_then(|v| v.as_str()) {
            return match cmd {
                "rm" | "dd" | "mkfs" | "shutdown" | "reboot" => Risk::Critical,
                "sudo" | "chmod" | "chown" | "kill" => Risk::High,
                "mv" | "cp" | "curl" | "wget" => Risk::Medium,
                _ => Risk::Low,
            };
        }
        return Risk::Medium;
    }
    match id {
        "DELETE_FILE" | "DROP_TABLE" | "REVOKE_ACCESS" => Risk::Critical,
        "WRITE_FILE" | "SEND_EMAIL" | "GRANT_ACCESS" => Risk::High,
        "READ_FILE" | "LIST_DIR" => Risk::Low,
        _ => Risk::Medium,
    }
}
