//! `audit-verify` (SPEC_FULL.md §F): thin wrapper around
//! `audit::verify_audit_log_integrity`, printing the integrity report and
//! exiting 0 (valid) or 8 (governance integrity failure) per spec.md's
//! exit-code table.

use serde_json::{json, Value};

use crate::audit::verify_audit_log_integrity;
use crate::config::Config;

pub fn run(config: &Config, fail_fast: bool, max_entries: Option<u64>) -> (Value, i32) {
    match verify_audit_log_integrity(&config.audit_log_path(), fail_fast, max_entries) {
        Ok(report) => {
            let exit_code = if report.valid { 0 } else { 8 };
            let reason = report.errors.first().map(|e| {
                if e.contains("prevHash mismatch") {
                    "PREV_HASH_MISMATCH"
                } else {
                    "HASH_MISMATCH"
                }
            });
            let body = json!({
                "valid": report.valid,
                "entries": report.entries_checked,
                "firstInvalidIndex": report.first_broken_seq,
                "reason": reason,
                "errors": report.errors,
            });
            (body, exit_code)
        }
        Err(e) => super::error_body(&e),
    }
}
