//! The five actions (spec.md §6): `verify`, `dryrun`, `run`, `policy-sign`,
//! `audit-verify`. Each returns the single JSON object to print on stdout
//! plus the deterministic exit code to terminate with.

mod audit_verify;
mod common;
mod dryrun;
mod policy_sign;
mod run;
mod verify;

use serde_json::{json, Value};

use crate::errors::{ErrorBody, GateError};

pub use audit_verify::run as audit_verify;
pub use dryrun::run as dryrun;
pub use policy_sign::run as policy_sign;
pub use run::run as run_action;
pub use verify::run as verify;

fn error_body(e: &GateError) -> (Value, i32) {
    let body: ErrorBody = e.into();
    (json!(body), e.exit_code())
}
