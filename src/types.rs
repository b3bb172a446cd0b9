//! Domain types for proposals, policy, and trusted keys (spec.md §3).
//!
//! These are kept as `serde_json::Value`-backed where the spec calls for
//! open-ended payloads (`payload`, `metadata`) and as typed structs
//! everywhere the shape is fixed. Canonicalization always goes through
//! `serde_json::to_value` first, never through field order on the struct.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Risk {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalSignature {
    pub alg: String,
    #[serde(rename = "keyId")]
    pub key_id: String,
    pub sig: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    #[serde(rename = "commandId")]
    pub command_id: String,
    #[serde(rename = "requesterId")]
    pub requester_id: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub timestamp: i64,
    pub nonce: String,
    #[serde(default)]
    pub requires: Vec<String>,
    pub risk: Risk,
    pub payload: Value,
    pub signature: ProposalSignature,
}

impl Proposal {
    /// The canonical JSON `serde_json::Value` of this proposal, used both
    /// for schema re-checking and for signature verification (minus
    /// `signature` itself).
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("Proposal always serializes")
    }

    pub fn adapter(&self) -> Option<&str> {
        self.payload.get("adapter").and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(rename = "windowSec")]
    pub window_sec: i64,
    #[serde(rename = "maxRequests")]
    pub max_requests: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecurityConfig {
    #[serde(rename = "maxClockSkewSec")]
    pub max_clock_skew_sec: i64,
    #[serde(rename = "maxPolicyCreatedAtSkewSec")]
    pub max_policy_created_at_skew_sec: i64,
    #[serde(rename = "defaultRateLimit")]
    pub default_rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FilesystemPolicy {
    #[serde(default)]
    pub roots: Vec<String>,
    #[serde(default, rename = "denyPatterns")]
    pub deny_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExecPolicy {
    #[serde(default, rename = "allowCmds")]
    pub allow_cmds: Vec<String>,
    #[serde(default, rename = "denyCmds")]
    pub deny_cmds: Vec<String>,
    /// Caps the `shell` adapter's wall-clock timeout (spec.md §4.12,
    /// `policy.adapters.shell.timeoutMsMax`). `None` leaves the adapter's
    /// built-in default in force.
    #[serde(default, rename = "timeoutMsMax")]
    pub timeout_ms_max: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequesterPolicy {
    #[serde(default, rename = "allowAdapters")]
    pub allow_adapters: Vec<String>,
    #[serde(default, rename = "allowCommands")]
    pub allow_commands: Vec<String>,
    #[serde(default)]
    pub filesystem: FilesystemPolicy,
    #[serde(default)]
    pub exec: ExecPolicy,
    #[serde(default, rename = "rateLimit")]
    pub rate_limit: Option<RateLimitConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Policy {
    pub default: String,
    pub version: Value,
    #[serde(rename = "createdAt")]
    pub created_at: Value,
    pub security: SecurityConfig,
    pub requesters: HashMap<String, RequesterPolicy>,
}

impl Policy {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("Policy always serializes")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicySignatureEnvelope {
    pub alg: String,
    #[serde(rename = "keyId")]
    pub key_id: String,
    pub sig: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrustedKeyEntry {
    #[serde(rename = "publicKey")]
    pub public_key: String,
    #[serde(rename = "requesterId")]
    pub requester_id: Option<String>,
    #[serde(default, rename = "notBefore")]
    pub not_before: Option<String>,
    #[serde(default, rename = "expiresAt")]
    pub expires_at: Option<String>,
    #[serde(default, rename = "validFrom")]
    pub valid_from: Option<String>,
    #[serde(default, rename = "validUntil")]
    pub valid_until: Option<String>,
    #[serde(default)]
    pub deprecated: bool,
}

impl TrustedKeyEntry {
    pub fn effective_not_before(&self) -> Option<&str> {
        self.not_before.as_deref().or(self.valid_from.as_deref())
    }

    pub fn effective_expires_at(&self) -> Option<&str> {
        self.expires_at.as_deref().or(self.valid_until.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeyStore {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "defaultKeyId")]
    pub default_key_id: Option<String>,
    #[serde(rename = "trustedKeys")]
    pub trusted_keys: HashMap<String, TrustedKeyEntry>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LastAccepted {
    pub version: Value,
    #[serde(rename = "createdAt")]
    pub created_at: Value,
    pub environment: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicyVersionState {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "lastAccepted")]
    pub last_accepted: Option<LastAccepted>,
    #[serde(rename = "updatedAt")]
    pub updated_at: Option<String>,
}

impl Default for PolicyVersionState {
    fn default() -> Self {
        PolicyVersionState {
            schema_version: 1,
            last_accepted: None,
            updated_at: None,
        }
    }
}
