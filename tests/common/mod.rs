//! Shared fixture-building helpers for the black-box action tests: a temp
//! `config/`/`data/` tree, a signed policy, a trusted key store, and a
//! signed proposal.

use std::path::PathBuf;

use base64::Engine;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use serde_json::{json, Value};
use tempfile::TempDir;

use letterblack_sentinel::canonical;
use letterblack_sentinel::config::Config;

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

pub struct Fixture {
    pub dir: TempDir,
    pub proposal_signing_key: SigningKey,
    pub policy_signing_key: SigningKey,
}

pub fn now() -> DateTime<Utc> {
    "2026-01-15T12:00:00Z".parse().unwrap()
}

impl Fixture {
    pub fn new() -> Fixture {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();

        let mut csprng = OsRng;
        let proposal_signing_key = SigningKey::generate(&mut csprng);
        let policy_signing_key = SigningKey::generate(&mut csprng);

        let fixture = Fixture {
            dir,
            proposal_signing_key,
            policy_signing_key,
        };

        fixture.write_keys();
        fixture.write_policy(policy_value(), now());
        fixture
    }

    pub fn config(&self) -> Config {
        Config {
            proposal_path: self.dir.path().join("proposal.json"),
            policy_path: self.dir.path().join("config/policy.default.json"),
            policy_sig_path: self.dir.path().join("config/policy.sig.json"),
            keys_path: self.dir.path().join("config/keys.json"),
            state_dir: self.dir.path().join("data"),
            unsigned_ok: false,
        }
    }

    fn write_keys(&self) {
        let proposal_pub = B64.encode(self.proposal_signing_key.verifying_key().to_bytes());
        let policy_pub = B64.encode(self.policy_signing_key.verifying_key().to_bytes());

        let keys = json!({
            "schemaVersion": 1,
            "defaultKeyId": null,
            "trustedKeys": {
                "agent:gpt-v1-2026Q1": {
                    "publicKey": proposal_pub,
                    "requesterId": "agent:gpt",
                    "notBefore": "2020-01-01T00:00:00Z",
                    "expiresAt": "2099-01-01T00:00:00Z",
                    "deprecated": false
                },
                "policy:signer-v1": {
                    "publicKey": policy_pub,
                    "requesterId": null,
                    "notBefore": "2020-01-01T00:00:00Z",
                    "expiresAt": "2099-01-01T00:00:00Z",
                    "deprecated": false
                }
            }
        });
        std::fs::write(
            self.dir.path().join("config/keys.json"),
            serde_json::to_vec_pretty(&keys).unwrap(),
        )
        .unwrap();
    }

    pub fn write_policy(&self, policy: Value, created_at: DateTime<Utc>) {
        std::fs::write(
            self.dir.path().join("config/policy.default.json"),
            serde_json::to_vec_pretty(&policy).unwrap(),
        )
        .unwrap();
        self.sign_policy(&policy, created_at);
    }

    pub fn sign_policy(&self, policy: &Value, created_at: DateTime<Utc>) {
        let created_at_str = created_at.to_rfc3339();
        let bytes = canonical::to_canonical_bytes(policy);
        let sig = self.policy_signing_key.sign(&bytes);
        let envelope = json!({
            "alg": "ed25519",
            "keyId": "policy:signer-v1",
            "sig": B64.encode(sig.to_bytes()),
            "createdAt": created_at_str,
        });
        std::fs::write(
            self.dir.path().join("config/policy.sig.json"),
            serde_json::to_vec_pretty(&envelope).unwrap(),
        )
        .unwrap();
    }

    pub fn write_proposal(&self, payload: Value, nonce: &str, timestamp: i64) -> PathBuf {
        let mut proposal = json!({
            "id": "RUN_SHELL",
            "commandId": format!("00000000-0000-0000-0000-{:012}", timestamp),
            "requesterId": "agent:gpt",
            "sessionId": "sess-1",
            "timestamp": timestamp,
            "nonce": nonce,
            "requires": [],
            "risk": "LOW",
            "payload": payload,
            "signature": {"alg": "ed25519", "keyId": "agent:gpt-v1-2026Q1", "sig": ""}
        });

        let bytes = canonical::canonical_bytes_excluding(&proposal, "signature");
        let sig = self.proposal_signing_key.sign(&bytes);
        proposal["signature"]["sig"] = json!(B64.encode(sig.to_bytes()));

        let path = self.dir.path().join("proposal.json");
        std::fs::write(&path, serde_json::to_vec_pretty(&proposal).unwrap()).unwrap();
        path
    }
}

pub fn policy_value() -> Value {
    json!({
        "default": "DENY",
        "version": 1,
        "createdAt": now().to_rfc3339(),
        "security": {
            "maxClockSkewSec": 300,
            "maxPolicyCreatedAtSkewSec": 86400,
            "defaultRateLimit": {"windowSec": 60, "maxRequests": 10}
        },
        "requesters": {
            "agent:gpt": {
                "allowAdapters": ["noop"],
                "allowCommands": ["RUN_SHELL"],
                "filesystem": {"roots": [], "denyPatterns": []},
                "exec": {"allowCmds": ["echo"], "denyCmds": ["rm"]}
            }
        }
    })
}
