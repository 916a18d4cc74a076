//! Response interpretation.
//! The declared content type is resolved once into a `ResponseKind`; the body is then
//! decoded exactly one way. Binary documents are never passed through text decoding.

use reqwest::header::{HeaderMap, CONTENT_DISPOSITION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::files::extract_filename;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Json,
    Text,
    Binary,
}

/// Media types delivered as opaque bytes.
const BINARY_TYPES: [&str; 2] = ["application/pdf", "application/octet-stream"];

/// Strip parameters and lowercase, e.g. `Application/JSON; charset=utf-8` -> `application/json`.
pub fn essence(content_type: &str) -> String {
    content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase()
}

impl ResponseKind {
    /// Binary for PDF / octet-stream, Json for JSON media types and for an undeclared
    /// type, Text for everything else.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(ct) = content_type.map(essence).filter(|s| !s.is_empty()) else {
            return ResponseKind::Json;
        };
        if BINARY_TYPES.contains(&ct.as_str()) {
            ResponseKind::Binary
        } else if ct == "application/json" || ct.ends_with("+json") {
            ResponseKind::Json
        } else {
            ResponseKind::Text
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
    Binary(Vec<u8>),
}

impl ResponseBody {
    /// Decode raw bytes per the negotiated kind. A JSON body that fails to parse is kept
    /// as text.
    pub fn negotiate(kind: ResponseKind, bytes: Vec<u8>) -> Self {
        match kind {
            ResponseKind::Binary => ResponseBody::Binary(bytes),
            ResponseKind::Text => ResponseBody::Text(into_text(bytes)),
            ResponseKind::Json => {
                let text = into_text(bytes);
                match serde_json::from_str::<Value>(&text) {
                    Ok(v) => ResponseBody::Json(v),
                    Err(_) => ResponseBody::Text(text),
                }
            }
        }
    }

    pub fn kind(&self) -> ResponseKind {
        match self {
            ResponseBody::Json(_) => ResponseKind::Json,
            ResponseBody::Text(_) => ResponseKind::Text,
            ResponseBody::Binary(_) => ResponseKind::Binary,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self { ResponseBody::Json(v) => Some(v), _ => None }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self { ResponseBody::Text(s) => Some(s.as_str()), _ => None }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ResponseBody::Json(v) => v.is_null(),
            ResponseBody::Text(s) => s.trim().is_empty(),
            ResponseBody::Binary(b) => b.is_empty(),
        }
    }
}

fn into_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

/// Best-effort human message for an error response.
pub fn error_message(status: u16, body: &ResponseBody) -> String {
    const KEYS: [&str; 4] = ["message", "error", "detail", "title"];
    let from_body = match body {
        ResponseBody::Json(Value::Object(m)) => KEYS.iter().find_map(|k| match m.get(*k) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Object(inner)) => inner.get("message").and_then(|v| v.as_str()).map(|s| s.to_string()),
            _ => None,
        }),
        ResponseBody::Json(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        ResponseBody::Text(s) if !s.trim().is_empty() => Some(truncate(s.trim(), 200)),
        _ => None,
    };
    from_body.unwrap_or_else(|| {
        let reason = reqwest::StatusCode::from_u16(status).ok().and_then(|s| s.canonical_reason());
        match reason {
            Some(r) => format!("HTTP {} {}", status, r),
            None => format!("HTTP {}", status),
        }
    })
}

/// Cut `s` to at most `max` characters, marking the cut with an ellipsis.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max { return s.to_string(); }
    if max <= 1 { return "…".to_string(); }
    s.chars().take(max - 1).collect::<String>() + "…"
}

/// A successful (2xx) response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl ApiResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Filename announced by `Content-Disposition`, if any.
    pub fn filename(&self) -> Option<String> {
        self.headers
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(extract_filename)
    }

    pub fn json(&self) -> Option<&Value> { self.body.as_json() }

    /// JSON body, `Null` for an empty body, error for anything else.
    pub fn into_json(self) -> ApiResult<Value> {
        match self.body {
            ResponseBody::Json(v) => Ok(v),
            ResponseBody::Text(s) if s.trim().is_empty() => Ok(Value::Null),
            other => Err(ApiError::invalid_response(
                self.status,
                format!("expected JSON body, got {:?}", other.kind()),
            )),
        }
    }

    pub fn decode<T: DeserializeOwned>(self) -> ApiResult<T> {
        let status = self.status;
        let v = self.into_json()?;
        serde_json::from_value(v).map_err(|e| ApiError::invalid_response(status, format!("unexpected body: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_negotiation() {
        assert_eq!(ResponseKind::from_content_type(Some("application/pdf")), ResponseKind::Binary);
        assert_eq!(ResponseKind::from_content_type(Some("Application/Octet-Stream; foo=bar")), ResponseKind::Binary);
        assert_eq!(ResponseKind::from_content_type(Some("application/json; charset=utf-8")), ResponseKind::Json);
        assert_eq!(ResponseKind::from_content_type(Some("application/problem+json")), ResponseKind::Json);
        assert_eq!(ResponseKind::from_content_type(None), ResponseKind::Json);
        assert_eq!(ResponseKind::from_content_type(Some("text/html")), ResponseKind::Text);
    }

    #[test]
    fn binary_bytes_untouched() {
        let raw = vec![0x25, 0x50, 0x44, 0x46, 0xff, 0xfe, 0x00];
        assert_eq!(ResponseBody::negotiate(ResponseKind::Binary, raw.clone()), ResponseBody::Binary(raw));
    }

    #[test]
    fn json_falls_back_to_text() {
        assert_eq!(ResponseBody::negotiate(ResponseKind::Json, br#"{"a":1}"#.to_vec()), ResponseBody::Json(json!({"a": 1})));
        assert_eq!(ResponseBody::negotiate(ResponseKind::Json, b"plain words".to_vec()), ResponseBody::Text("plain words".into()));
        assert_eq!(ResponseBody::negotiate(ResponseKind::Json, Vec::new()), ResponseBody::Text(String::new()));
        assert_eq!(ResponseBody::negotiate(ResponseKind::Text, b"[1]".to_vec()), ResponseBody::Text("[1]".into()));
    }

    #[test]
    fn error_messages() {
        assert_eq!(error_message(400, &ResponseBody::Json(json!({"message": "title is required"}))), "title is required");
        assert_eq!(error_message(500, &ResponseBody::Json(json!({"error": {"message": "boom"}}))), "boom");
        assert_eq!(error_message(502, &ResponseBody::Text("upstream down\n".into())), "upstream down");
        assert_eq!(error_message(404, &ResponseBody::Text(String::new())), "HTTP 404 Not Found");
        assert_eq!(error_message(599, &ResponseBody::Binary(vec![1])), "HTTP 599");
    }

    #[test]
    fn into_json_rules() {
        let ok = ApiResponse { status: 204, headers: HeaderMap::new(), body: ResponseBody::Text(String::new()) };
        assert_eq!(ok.into_json().unwrap(), Value::Null);
        let bin = ApiResponse { status: 200, headers: HeaderMap::new(), body: ResponseBody::Binary(vec![1, 2]) };
        assert!(matches!(bin.into_json(), Err(ApiError::InvalidResponse { status: 200, .. })));
    }
}
