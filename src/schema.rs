//! Structural validation of proposals and policy objects.
//!
//! Runs directly against the parsed `serde_json::Value` tree rather than
//! relying on `serde`'s own deserialization errors, so a malformed proposal
//! produces a single `SCHEMA_ERROR` with a full list of everything wrong,
//! not just the first field `serde` happened to choke on.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z_]+$").unwrap());
static KEY_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9:_-]{3,128}$").unwrap());
static NONCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{32,128}$").unwrap());

const RISK_VALUES: &[&str] = &["LOW", "MEDIUM", "HIGH", "CRITICAL"];

#[derive(Debug, Clone, Default)]
pub struct SchemaResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl SchemaResult {
    fn ok() -> Self {
        SchemaResult {
            valid: true,
            errors: Vec::new(),
        }
    }

    fn fail(errors: Vec<String>) -> Self {
        SchemaResult {
            valid: false,
            errors,
        }
    }
}

/// Validate a proposal JSON object against spec.md §3's field rules.
pub fn validate_proposal(value: &Value) -> SchemaResult {
    let mut errors = Vec::new();

    let obj = match value.as_object() {
        Some(o) => o,
        None => return SchemaResult::fail(vec!["proposal must be a JSON object".into()]),
    };

    require_string_matching(obj, "id", &ID_RE, 50, &mut errors);
    require_non_empty_string(obj, "commandId", &mut errors);
    require_non_empty_string(obj, "requesterId", &mut errors);
    require_non_empty_string(obj, "sessionId", &mut errors);
    require_integer(obj, "timestamp", &mut errors);
    require_string_matching(obj, "nonce", &NONCE_RE, 128, &mut errors);

    match obj.get("requires") {
        None => {}
        Some(Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                if !item.is_string() {
                    errors.push(format!("requires[{i}] must be a string"));
                }
            }
        }
        Some(_) => errors.push("requires must be an array".into()),
    }

    match obj.get("risk") {
        None => errors.push("risk is required".into()),
        Some(Value::String(s)) if RISK_VALUES.contains(&s.as_str()) => {}
        Some(_) => errors.push(format!("risk must be one of {RISK_VALUES:?}")),
    }

    match obj.get("payload") {
        None => errors.push("payload is required".into()),
        Some(Value::Object(payload)) => {
            if !matches!(payload.get("adapter"), Some(Value::String(_))) {
                errors.push("payload.adapter is required and must be a string".into());
            }
        }
        Some(_) => errors.push("payload must be an object".into()),
    }

    validate_signature_field(obj, &mut errors);

    if errors.is_empty() {
        SchemaResult::ok()
    } else {
        SchemaResult::fail(errors)
    }
}

fn validate_signature_field(
    obj: &serde_json::Map<String, Value>,
    errors: &mut Vec<String>,
) {
    match obj.get("signature") {
        None => errors.push("signature is required".into()),
        Some(Value::Object(sig)) => {
            match sig.get("alg") {
                Some(Value::String(a)) if a == "ed25519" => {}
                _ => errors.push("signature.alg must be \"ed25519\"".into()),
            }
            match sig.get("keyId") {
                Some(Value::String(k)) if KEY_ID_RE.is_match(k) => {}
                Some(Value::String(_)) => errors.push("signature.keyId has invalid form".into()),
                _ => errors.push("signature.keyId is required".into()),
            }
            if !matches!(sig.get("sig"), Some(Value::String(_))) {
                errors.push("signature.sig is required and must be a string".into());
            }
        }
        Some(_) => errors.push("signature must be an object".into()),
    }
}

/// Validate a policy JSON object against spec.md §3's field rules.
pub fn validate_policy(value: &Value) -> SchemaResult {
    let mut errors = Vec::new();

    let obj = match value.as_object() {
        Some(o) => o,
        None => return SchemaResult::fail(vec!["policy must be a JSON object".into()]),
    };

    match obj.get("default") {
        Some(Value::String(s)) if s == "DENY" => {}
        Some(Value::String(_)) => errors.push("policy.default must be \"DENY\"".into()),
        _ => errors.push("policy.default is required".into()),
    }

    if obj.get("version").is_none() {
        errors.push("policy.version is required".into());
    }
    if obj.get("createdAt").is_none() {
        errors.push("policy.createdAt is required".into());
    }

    match obj.get("security") {
        Some(Value::Object(sec)) => {
            require_integer(sec, "maxClockSkewSec", &mut errors);
            require_integer(sec, "maxPolicyCreatedAtSkewSec", &mut errors);
            match sec.get("defaultRateLimit") {
                Some(Value::Object(rl)) => {
                    require_integer(rl, "windowSec", &mut errors);
                    require_integer(rl, "maxRequests", &mut errors);
                }
                _ => errors.push("security.defaultRateLimit is required".into()),
            }
        }
        _ => errors.push("policy.security is required".into()),
    }

    match obj.get("requesters") {
        Some(Value::Object(_)) => {}
        _ => errors.push("policy.requesters is required and must be an object".into()),
    }

    if errors.is_empty() {
        SchemaResult::ok()
    } else {
        SchemaResult::fail(errors)
    }
}

fn require_non_empty_string(
    obj: &serde_json::Map<String, Value>,
    field: &str,
    errors: &mut Vec<String>,
) {
    match obj.get(field) {
        Some(Value::String(s)) if !s.is_empty() => {}
        Some(Value::String(_)) => errors.push(format!("{field} must not be empty")),
        _ => errors.push(format!("{field} is required and must be a string")),
    }
}

fn require_string_matching(
    obj: &serde_json::Map<String, Value>,
    field: &str,
    re: &Regex,
    max_len: usize,
    errors: &mut Vec<String>,
) {
    match obj.get(field) {
        Some(Value::String(s)) if s.len() > max_len => {
            errors.push(format!("{field} exceeds max length {max_len}"))
        }
        Some(Value::String(s)) if re.is_match(s) => {}
        Some(Value::String(_)) => errors.push(format!("{field} does not match required pattern")),
        _ => errors.push(format!("{field} is required and must be a string")),
    }
}

fn require_integer(obj: &serde_json::Map<String, Value>, field: &str, errors: &mut Vec<String>) {
    match obj.get(field) {
        Some(v) if v.is_i64() || v.is_u64() => {}
        _ => errors.push(format!("{field} is required and must be an integer")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_proposal() -> Value {
        json!({
            "id": "RUN_SHELL",
            "commandId": "a1b2c3d4-0000-0000-0000-000000000000",
            "requesterId": "agent:gpt",
            "sessionId": "sess-1",
            "timestamp": 1_700_000_000,
            "nonce": "a".repeat(32),
            "requires": ["fs.read"],
            "risk": "LOW",
            "payload": {"adapter": "noop"},
            "signature": {"alg": "ed25519", "keyId": "agent:gpt-v1", "sig": "c2ln"}
        })
    }

    #[test]
    fn accepts_well_formed_proposal() {
        let result = validate_proposal(&valid_proposal());
        assert!(result.valid, "{:?}", result.errors);
    }

    #[test]
    fn rejects_lowercase_id() {
        let mut p = valid_proposal();
        p["id"] = json!("run_shell");
        let result = validate_proposal(&p);
        assert!(!result.valid);
    }

    #[test]
    fn rejects_short_nonce() {
        let mut p = valid_proposal();
        p["nonce"] = json!("abc");
        let result = validate_proposal(&p);
        assert!(!result.valid);
    }

    #[test]
    fn rejects_missing_payload_adapter() {
        let mut p = valid_proposal();
        p["payload"] = json!({});
        let result = validate_proposal(&p);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.contains("adapter")));
    }

    #[test]
    fn rejects_bad_keyid_form() {
        let mut p = valid_proposal();
        p["signature"]["keyId"] = json!("x");
        let result = validate_proposal(&p);
        assert!(!result.valid);
    }

    fn valid_policy() -> Value {
        json!({
            "default": "DENY",
            "version": 1,
            "createdAt": "2026-01-01T00:00:00Z",
            "security": {
                "maxClockSkewSec": 300,
                "maxPolicyCreatedAtSkewSec": 86400,
                "defaultRateLimit": {"windowSec": 60, "maxRequests": 10}
            },
            "requesters": {}
        })
    }

    #[test]
    fn accepts_well_formed_policy() {
        let result = validate_policy(&valid_policy());
        assert!(result.valid, "{:?}", result.errors);
    }

    #[test]
    fn rejects_non_deny_default() {
        let mut p = valid_policy();
        p["default"] = json!("ALLOW");
        let result = validate_policy(&p);
        assert!(!result.valid);
    }
}
