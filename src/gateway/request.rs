use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Raw { bytes: Vec<u8>, content_type: String },
}

impl RequestBody {
    pub fn content_type(&self) -> &str {
        match self {
            RequestBody::Json(_) => "application/json",
            RequestBody::Raw { content_type, .. } => content_type.as_str(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            RequestBody::Json(v) => v.to_string().into_bytes(),
            RequestBody::Raw { bytes, .. } => bytes.clone(),
        }
    }
}

/// Descriptor for one API call. `path` is resolved against the gateway base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), query: Vec::new(), headers: HeaderMap::new(), body: None }
    }

    pub fn get(path: impl Into<String>) -> Self { Self::new(Method::GET, path) }
    pub fn post(path: impl Into<String>) -> Self { Self::new(Method::POST, path) }
    pub fn put(path: impl Into<String>) -> Self { Self::new(Method::PUT, path) }
    pub fn patch(path: impl Into<String>) -> Self { Self::new(Method::PATCH, path) }
    pub fn delete(path: impl Into<String>) -> Self { Self::new(Method::DELETE, path) }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn raw(mut self, bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Raw { bytes, content_type: content_type.into() });
        self
    }
}
