//! Bearer token claim decoding.
//! Claims are read for UI gating only; the signature is never checked here, the API
//! server does that on every request.

use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use super::principal::Role;

/// Claim names accepted for the role, newest first.
pub const ROLE_CLAIM_KEYS: [&str; 2] = ["role", "userRole"];
/// Claim names accepted for the tenant identifier, newest first.
pub const TENANT_CLAIM_KEYS: [&str; 2] = ["tenantId", "tenant_id"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenClaims {
    pub role: Option<Role>,
    pub tenant_id: Option<String>,
    pub subject: Option<String>,
    /// `exp`, seconds since the epoch
    pub expires_at: Option<i64>,
    pub raw: Map<String, Value>,
}

impl TokenClaims {
    pub fn is_empty(&self) -> bool { self.raw.is_empty() }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expires_at.and_then(|s| Utc.timestamp_opt(s, 0).single())
    }

    /// Tokens without `exp` never report as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry().map(|e| e <= now).unwrap_or(false)
    }
}

/// Decode the claims of a `header.payload.signature` token. Any structural, base64 or JSON
/// problem yields an empty claim set.
pub fn decode_claims(token: &str) -> TokenClaims {
    let Some(raw) = decode_payload(token) else {
        tracing::debug!(target: "session", "token claims not decodable; identity left empty");
        return TokenClaims::default();
    };
    let role = ROLE_CLAIM_KEYS.iter().find_map(|k| raw.get(*k).and_then(role_from_value));
    let tenant_id = TENANT_CLAIM_KEYS.iter().find_map(|k| raw.get(*k).and_then(scalar_to_string));
    let subject = raw.get("sub").and_then(scalar_to_string);
    let expires_at = raw.get("exp").and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)));
    TokenClaims { role, tenant_id, subject, expires_at, raw }
}

fn decode_payload(token: &str) -> Option<Map<String, Value>> {
    let parts: Vec<&str> = token.trim().split('.').collect();
    if parts.len() != 3 || parts[1].is_empty() {
        return None;
    }
    let seg = parts[1].trim_end_matches('=');
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(seg)
        .or_else(|_| base64::engine::general_purpose::STANDARD_NO_PAD.decode(seg))
        .ok()?;
    match serde_json::from_slice::<Value>(&bytes).ok()? {
        Value::Object(m) => Some(m),
        _ => None,
    }
}

// A role claim may be a plain string or a list of roles; the first recognizable one wins.
fn role_from_value(v: &Value) -> Option<Role> {
    match v {
        Value::String(s) => Role::parse(s),
        Value::Array(arr) => arr.iter().filter_map(|x| x.as_str()).find_map(Role::parse),
        _ => None,
    }
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) fn encode_test_token(claims: &Value) -> String {
    let enc = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    format!(
        "{}.{}.{}",
        enc.encode(br#"{"alg":"HS256","typ":"JWT"}"#),
        enc.encode(claims.to_string()),
        enc.encode(b"signature")
    )
}
