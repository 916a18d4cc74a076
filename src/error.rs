//! Unified client error model.
//! Every failure that crosses the gateway boundary is returned as an `ApiError` value:
//! transport failures, HTTP error statuses, client-side validation and local file saves
//! all share one tagged shape so callers have a single handling path.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiError {
    #[error("network: {message}")]
    Network { message: String },
    #[error("cancelled: {message}")]
    Cancelled { message: String },
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String },
    #[error("not_found: {message}")]
    NotFound { message: String },
    #[error("conflict: {message}")]
    Conflict { message: String },
    #[error("client_error ({status}): {message}")]
    Client { status: u16, message: String, #[serde(default)] body: Option<Value> },
    #[error("server_error ({status}): {message}")]
    Server { status: u16, message: String, #[serde(default)] body: Option<Value> },
    #[error("validation ({field}): {message}")]
    Validation { field: String, message: String },
    #[error("invalid_response ({status}): {message}")]
    InvalidResponse { status: u16, message: String },
    #[error("io: {message}")]
    Io { message: String },
}

impl ApiError {
    pub fn network<S: Into<String>>(msg: S) -> Self { ApiError::Network { message: msg.into() } }
    pub fn cancelled<S: Into<String>>(msg: S) -> Self { ApiError::Cancelled { message: msg.into() } }
    pub fn validation<S: Into<String>>(field: S, msg: S) -> Self { ApiError::Validation { field: field.into(), message: msg.into() } }
    pub fn invalid_response<S: Into<String>>(status: u16, msg: S) -> Self { ApiError::InvalidResponse { status, message: msg.into() } }
    pub fn io<S: Into<String>>(msg: S) -> Self { ApiError::Io { message: msg.into() } }

    /// Classify a non-2xx HTTP status. `body` is the interpreted response body (if any) and
    /// is kept on the generic client/server variants so callers can render field errors.
    pub fn from_status(status: u16, message: String, body: Option<Value>) -> Self {
        match status {
            401 => ApiError::Unauthorized { message },
            403 => ApiError::Forbidden { message },
            404 => ApiError::NotFound { message },
            409 => ApiError::Conflict { message },
            500..=599 => ApiError::Server { status, message, body },
            _ => ApiError::Client { status, message, body },
        }
    }

    /// HTTP status carried by the error. Failures with no HTTP exchange report 0,
    /// client-side validation reports 400.
    pub fn status(&self) -> u16 {
        match self {
            ApiError::Network { .. } | ApiError::Cancelled { .. } | ApiError::Io { .. } => 0,
            ApiError::Unauthorized { .. } => 401,
            ApiError::Forbidden { .. } => 403,
            ApiError::NotFound { .. } => 404,
            ApiError::Conflict { .. } => 409,
            ApiError::Validation { .. } => 400,
            ApiError::Client { status, .. }
            | ApiError::Server { status, .. }
            | ApiError::InvalidResponse { status, .. } => *status,
        }
    }

    pub fn code_str(&self) -> &'static str {
        match self {
            ApiError::Network { .. } => "network",
            ApiError::Cancelled { .. } => "cancelled",
            ApiError::Unauthorized { .. } => "unauthorized",
            ApiError::Forbidden { .. } => "forbidden",
            ApiError::NotFound { .. } => "not_found",
            ApiError::Conflict { .. } => "conflict",
            ApiError::Client { .. } => "client_error",
            ApiError::Server { .. } => "server_error",
            ApiError::Validation { .. } => "validation",
            ApiError::InvalidResponse { .. } => "invalid_response",
            ApiError::Io { .. } => "io",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::Network { message }
            | ApiError::Cancelled { message }
            | ApiError::Unauthorized { message }
            | ApiError::Forbidden { message }
            | ApiError::NotFound { message }
            | ApiError::Conflict { message }
            | ApiError::Client { message, .. }
            | ApiError::Server { message, .. }
            | ApiError::Validation { message, .. }
            | ApiError::InvalidResponse { message, .. }
            | ApiError::Io { message } => message.as_str(),
        }
    }

    pub fn is_unauthorized(&self) -> bool { matches!(self, ApiError::Unauthorized { .. }) }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self { ApiError::io(err.to_string()) }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        // Only local plumbing (storage, file saves) reports through anyhow
        ApiError::io(format!("{:#}", err))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ApiError::network("down").status(), 0);
        assert_eq!(ApiError::cancelled("stop").status(), 0);
        assert_eq!(ApiError::validation("email", "required").status(), 400);
        assert_eq!(ApiError::from_status(401, "no".into(), None).status(), 401);
        assert_eq!(ApiError::from_status(403, "no".into(), None).status(), 403);
        assert_eq!(ApiError::from_status(404, "gone".into(), None).status(), 404);
        assert_eq!(ApiError::from_status(409, "dup".into(), None).status(), 409);
        assert_eq!(ApiError::from_status(422, "bad".into(), None).status(), 422);
        assert_eq!(ApiError::from_status(502, "bad gateway".into(), None).status(), 502);
        assert_eq!(ApiError::invalid_response(200, "no token").status(), 200);
    }

    #[test]
    fn classification_by_status() {
        assert!(ApiError::from_status(401, "x".into(), None).is_unauthorized());
        assert_eq!(ApiError::from_status(418, "tea".into(), None).code_str(), "client_error");
        assert_eq!(ApiError::from_status(503, "busy".into(), None).code_str(), "server_error");
        assert_eq!(ApiError::from_status(404, "missing".into(), None).message(), "missing");
    }

    #[test]
    fn serializes_as_tagged_value() {
        let err = ApiError::validation("title", "title is required");
        let v = serde_json::to_value(&err).unwrap();
        assert_eq!(v["type"], "validation");
        assert_eq!(v["field"], "title");
        assert_eq!(err.to_string(), "validation (title): title is required");
    }
}
