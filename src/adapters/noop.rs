//! The `noop` adapter (spec.md §4.12): performs no side effects. Used by
//! `dryrun` for every proposal, and by proposals that explicitly request it.

use super::ExecutionResult;
use crate::types::Proposal;

pub fn run(proposal: &Proposal) -> ExecutionResult {
    let requested = proposal.adapter().unwrap_or("noop");
    ExecutionResult {
        adapter: "noop".into(),
        status: "completed".into(),
        output: Some(format!(
            "[NOOP] Would execute: {} on adapter: {}",
            proposal.id, requested
        )),
        error: None,
        exit_code: Some(0),
        observation: None,
    }
}
