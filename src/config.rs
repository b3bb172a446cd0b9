//! Resolves the on-disk paths an action needs (SPEC_FULL.md §D), following
//! the teacher's env-var-with-default-and-context pattern
//! (`config.rs.teacher-ref`'s `Config::from_env`).

use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub proposal_path: PathBuf,
    pub policy_path: PathBuf,
    pub policy_sig_path: PathBuf,
    pub keys_path: PathBuf,
    pub state_dir: PathBuf,
    pub unsigned_ok: bool,
}

impl Config {
    pub fn policy_state_path(&self) -> PathBuf {
        self.state_dir.join("policy.state.json")
    }

    pub fn nonce_db_path(&self) -> PathBuf {
        self.state_dir.join("nonce.db.json")
    }

    pub fn rate_limit_db_path(&self) -> PathBuf {
        self.state_dir.join("rate-limit.db.json")
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.state_dir.join("audit.log.jsonl")
    }
}

/// Resolved overrides parsed from argv, ahead of falling back to env vars
/// and finally to the documented defaults.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub policy: Option<String>,
    pub policy_sig: Option<String>,
    pub keys: Option<String>,
    pub state_dir: Option<String>,
    pub unsigned_ok: bool,
}

impl Config {
    pub fn resolve(proposal_path: PathBuf, overrides: &Overrides) -> Config {
        let policy_path = resolve_path(
            &overrides.policy,
            "SENTINEL_POLICY",
            "config/policy.default.json",
        );
        let policy_sig_path = resolve_path(
            &overrides.policy_sig,
            "SENTINEL_POLICY_SIG",
            "config/policy.sig.json",
        );
        let keys_path = resolve_path(&overrides.keys, "SENTINEL_KEYS", "config/keys.json");
        let state_dir = resolve_path(&overrides.state_dir, "SENTINEL_STATE_DIR", "data");

        let unsigned_ok = overrides.unsigned_ok
            || env::var("SENTINEL_UNSIGNED_OK")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false);

        Config {
            proposal_path,
            policy_path,
            policy_sig_path,
            keys_path,
            state_dir,
            unsigned_ok,
        }
    }
}

fn resolve_path(flag: &Option<String>, env_var: &str, default: &str) -> PathBuf {
    if let Some(f) = flag {
        return PathBuf::from(f);
    }
    if let Ok(v) = env::var(env_var) {
        if !v.is_empty() {
            return PathBuf::from(v);
        }
    }
    PathBuf::from(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_overrides_win_over_defaults() {
        let overrides = Overrides {
            policy: Some("/tmp/custom-policy.json".into()),
            ..Default::default()
        };
        let config = Config::resolve(PathBuf::from("proposal.json"), &overrides);
        assert_eq!(config.policy_path, PathBuf::from("/tmp/custom-policy.json"));
    }

    #[test]
    fn defaults_apply_when_nothing_overridden() {
        let overrides = Overrides::default();
        let config = Config::resolve(PathBuf::from("proposal.json"), &overrides);
        assert_eq!(config.policy_path, PathBuf::from("config/policy.default.json"));
        assert_eq!(config.state_dir, PathBuf::from("data"));
        assert_eq!(config.nonce_db_path(), PathBuf::from("data/nonce.db.json"));
    }

    #[test]
    fn unsigned_ok_flag_is_carried() {
        let overrides = Overrides {
            unsigned_ok: true,
            ..Default::default()
        };
        let config = Config::resolve(PathBuf::from("proposal.json"), &overrides);
        assert!(config.unsigned_ok);
    }
}
