//! CLI entry point. Argument parsing is intentionally minimal — no
//! subcommand framework — since CLI ergonomics are an external-collaborator
//! concern (spec.md §1); this just routes argv to the five library actions
//! and prints their JSON output.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use chrono::Utc;

use letterblack_sentinel::actions;
use letterblack_sentinel::config::{Config, Overrides};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match run().await {
        Ok(exit_code) => ExitCode::from(exit_code as u8),
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("{err:#}");
            ExitCode::from(1)
        }
    }
}

async fn run() -> anyhow::Result<i32> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        bail!("usage: sentinel <verify|dryrun|run|policy-sign|audit-verify> [options]");
    }
    let action = args.remove(0);

    let mut overrides = Overrides::default();
    let mut positional = Vec::new();
    let mut signing_key_path: Option<PathBuf> = None;
    let mut key_id: Option<String> = None;
    let mut fail_fast = false;
    let mut max_entries: Option<u64> = None;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--policy" => overrides.policy = Some(next_value(&mut iter, "--policy")?),
            "--policy-sig" => overrides.policy_sig = Some(next_value(&mut iter, "--policy-sig")?),
            "--keys" => overrides.keys = Some(next_value(&mut iter, "--keys")?),
            "--state-dir" => overrides.state_dir = Some(next_value(&mut iter, "--state-dir")?),
            "--unsigned-ok" => overrides.unsigned_ok = true,
            "--signing-key" => signing_key_path = Some(PathBuf::from(next_value(&mut iter, "--signing-key")?)),
            "--key-id" => key_id = Some(next_value(&mut iter, "--key-id")?),
            "--fail-fast" => fail_fast = true,
            "--max-entries" => {
                let v = next_value(&mut iter, "--max-entries")?;
                max_entries = Some(v.parse().context("--max-entries must be an integer")?);
            }
            other => positional.push(other.to_string()),
        }
    }

    let now = Utc::now();

    let (body, exit_code) = match action.as_str() {
        "verify" | "dryrun" | "run" => {
            let proposal_path = positional
                .first()
                .cloned()
                .context("missing proposal path argument")?;
            let config = Config::resolve(PathBuf::from(proposal_path), &overrides);
            match action.as_str() {
                "verify" => actions::verify(&config, now),
                "dryrun" => actions::dryrun(&config, now),
                "run" => actions::run_action(&config, now).await,
                _ => unreachable!(),
            }
        }
        "policy-sign" => {
            let proposal_path = positional.first().cloned().unwrap_or_default();
            let config = Config::resolve(PathBuf::from(proposal_path), &overrides);
            let signing_key_path = signing_key_path.context("--signing-key is required")?;
            let key_id = key_id.context("--key-id is required")?;
            actions::policy_sign(&config, &signing_key_path, &key_id, now)
        }
        "audit-verify" => {
            let proposal_path = positional.first().cloned().unwrap_or_default();
            let config = Config::resolve(PathBuf::from(proposal_path), &overrides);
            actions::audit_verify(&config, fail_fast, max_entries)
        }
        other => bail!("unknown action: {other}"),
    };

    println!("{}", serde_json::to_string(&body)?);
    Ok(exit_code)
}

fn next_value(iter: &mut impl Iterator<Item = String>, flag: &str) -> anyhow::Result<String> {
    iter.next().with_context(|| format!("{flag} requires a value"))
}
