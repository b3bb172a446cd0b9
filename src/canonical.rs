//! RFC 8785 (JSON Canonicalization Scheme) serialization.
//!
//! Signing and hashing both depend on byte-exact agreement between producer
//! and verifier, so this is the one place that turns a `serde_json::Value`
//! into bytes. Object keys are sorted lexicographically by their UTF-16 code
//! units (RFC 8785 §3.2.3, which for the ASCII-range keys this crate deals
//! with is the same as ordinary lexicographic `&str` ordering), arrays keep
//! their order, and numbers are printed in the shortest round-tripping form.

use serde_json::Value;

/// Serialize `value` to its canonical JSON byte representation.
pub fn to_canonical_bytes(value: &Value) -> Vec<u8> {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out.into_bytes()
}

/// Convenience: `value` minus a single top-level field (used to exclude
/// `signature` from a proposal, or the envelope fields from a policy,
/// before signing/verifying).
pub fn canonical_bytes_excluding(value: &Value, excluded_key: &str) -> Vec<u8> {
    let mut pruned = value.clone();
    if let Value::Object(map) = &mut pruned {
        map.remove(excluded_key);
    }
    to_canonical_bytes(&pruned)
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&canonical_number(n)),
        Value::String(s) => write_json_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json_string(key, out);
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
    }
}

/// Shortest round-tripping form. Integral `f64`/`i64`/`u64` values are
/// printed without a decimal point; anything with a fractional component
/// uses Rust's shortest `f64` formatting (which, like `ECMAScript`'s
/// `Number::toString`, is round-trip-minimal).
fn canonical_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    let f = n.as_f64().unwrap_or(0.0);
    if f.fract() == 0.0 && f.is_finite() && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        let mut s = format!("{}", f);
        if !s.contains('e') && !s.contains('E') && !s.contains('.') {
            s.push_str(".0");
        }
        s
    }
}

/// Minimal JSON string escaping (RFC 8785 §3.2.2): only the characters that
/// must be escaped are escaped, everything else passes through verbatim.
fn write_json_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}
