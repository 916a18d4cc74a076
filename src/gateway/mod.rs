//!
//! Authenticated request gateway
//! -----------------------------
//! Single choke point for API calls. The gateway attaches the bearer token from the
//! session store, hands the request to a `Transport`, resolves the response body once by
//! content type and turns non-2xx statuses into `ApiError` values.
//!
//! A 401 clears the session before the error is returned, so code that runs after the
//! call already sees a logged-out session. Nothing is retried.

use std::sync::Arc;

use futures_util::future::{AbortRegistration, Abortable};
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::error::{ApiError, ApiResult};
use crate::identity::SessionStore;

pub mod request;
pub mod response;
pub mod transport;

pub use futures_util::future::AbortHandle;
pub use request::{ApiRequest, RequestBody};
pub use response::{error_message, ApiResponse, ResponseBody, ResponseKind};
pub use transport::{ReqwestTransport, Transport, TransportError, TransportRequest, TransportResponse};

const DEFAULT_ACCEPT: &str = "application/json, application/pdf;q=0.9, */*;q=0.8";

#[derive(Clone)]
pub struct Gateway {
    base: Url,
    transport: Arc<dyn Transport>,
    session: Arc<SessionStore>,
}

impl Gateway {
    pub fn new(base: Url, transport: Arc<dyn Transport>, session: Arc<SessionStore>) -> Self {
        Self { base, transport, session }
    }

    /// Gateway over reqwest using the configured base URL and timeout.
    pub fn from_config(cfg: &ClientConfig, session: Arc<SessionStore>) -> anyhow::Result<Self> {
        let transport = ReqwestTransport::new(cfg)?;
        Ok(Self::new(cfg.base_url.clone(), Arc::new(transport), session))
    }

    pub fn base_url(&self) -> &Url { &self.base }

    pub fn session(&self) -> &Arc<SessionStore> { &self.session }

    /// Resolve a request path against the base URL. Absolute http(s) URLs are accepted only
    /// on the base URL's origin, since every request carries the session token.
    pub fn resolve_url(&self, req: &ApiRequest) -> ApiResult<Url> {
        let path = req.path.trim();
        if path.is_empty() {
            return Err(ApiError::validation("path", "request path must not be empty"));
        }
        let mut url = match Url::parse(path) {
            Ok(abs) if abs.scheme() == "http" || abs.scheme() == "https" => abs,
            _ => self
                .base
                .join(path.trim_start_matches('/'))
                .map_err(|e| ApiError::validation("path".to_string(), format!("invalid request path {:?}: {}", path, e)))?,
        };
        if url.origin() != self.base.origin() {
            warn!(target: "gateway", host = ?url.host_str(), "refusing request outside the API origin");
            return Err(ApiError::validation("path".to_string(), format!("{} is outside the API origin {}", url, self.base.origin().ascii_serialization())));
        }
        if !req.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &req.query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    fn build(&self, req: ApiRequest) -> ApiResult<TransportRequest> {
        let url = self.resolve_url(&req)?;
        let mut headers = req.headers;
        if !headers.contains_key(ACCEPT) {
            headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
        }
        let body = match req.body {
            Some(b) => {
                if !headers.contains_key(CONTENT_TYPE) {
                    let ct = HeaderValue::from_str(b.content_type())
                        .map_err(|_| ApiError::validation("content_type".to_string(), format!("invalid content type {:?}", b.content_type())))?;
                    headers.insert(CONTENT_TYPE, ct);
                }
                Some(b.to_bytes())
            }
            None => None,
        };
        if let Some(token) = self.session.current_token() {
            match HeaderValue::from_str(&format!("Bearer {}", token)) {
                Ok(mut v) => {
                    v.set_sensitive(true);
                    headers.insert(AUTHORIZATION, v);
                }
                Err(_) => warn!(target: "gateway", "stored token is not a valid header value; sending request without it"),
            }
        }
        Ok(TransportRequest { method: req.method, url, headers, body })
    }

    /// Send a request. Any non-2xx status comes back as `Err`.
    pub async fn send(&self, req: ApiRequest) -> ApiResult<ApiResponse> {
        let request_id = Uuid::new_v4();
        let treq = self.build(req)?;
        debug!(target: "gateway", %request_id, method = %treq.method, url = %treq.url, "request");
        match self.transport.execute(treq).await {
            Ok(resp) => self.interpret(request_id, resp),
            Err(e) => {
                warn!(target: "gateway", %request_id, timeout = e.timeout, "transport failure: {}", e.message);
                Err(ApiError::network(e.message))
            }
        }
    }

    /// Like `send`, but the call resolves to `ApiError::Cancelled` once the paired
    /// `AbortHandle` is aborted. A cancelled call never touches the session.
    pub async fn send_abortable(&self, req: ApiRequest, registration: AbortRegistration) -> ApiResult<ApiResponse> {
        match Abortable::new(self.send(req), registration).await {
            Ok(res) => res,
            Err(_aborted) => {
                debug!(target: "gateway", "request cancelled by caller");
                Err(ApiError::cancelled("request cancelled"))
            }
        }
    }

    fn interpret(&self, request_id: Uuid, resp: TransportResponse) -> ApiResult<ApiResponse> {
        let TransportResponse { status, headers, body } = resp;
        let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
        let kind = ResponseKind::from_content_type(content_type);
        let body = ResponseBody::negotiate(kind, body);
        debug!(target: "gateway", %request_id, status, kind = ?kind, "response");

        if status == 401 {
            warn!(target: "gateway", %request_id, "authentication rejected; clearing session");
            if let Err(e) = self.session.logout() {
                warn!(target: "gateway", %request_id, "session storage not fully cleared: {}", e);
            }
        }
        if !(200..300).contains(&status) {
            let message = error_message(status, &body);
            let details = body.as_json().cloned();
            return Err(ApiError::from_status(status, message, details));
        }
        Ok(ApiResponse { status, headers, body })
    }

    pub async fn get_json(&self, path: &str) -> ApiResult<Value> {
        self.send(ApiRequest::get(path)).await?.into_json()
    }

    pub async fn post_json(&self, path: &str, body: Value) -> ApiResult<Value> {
        self.send(ApiRequest::post(path).json(body)).await?.into_json()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::identity::{encode_test_token, PROFILE_KEY, TOKEN_KEY};
    use crate::local_store::{LocalStore, MemoryStore};
    use serde_json::json;

    fn setup() -> (Gateway, Arc<ScriptedTransport>, Arc<MemoryStore>) {
        let storage = Arc::new(MemoryStore::new());
        let session = SessionStore::open(storage.clone());
        let transport = ScriptedTransport::new();
        let base = Url::parse("https://ops.example.com/api/").unwrap();
        (Gateway::new(base, transport.clone(), session), transport, storage)
    }

    #[tokio::test]
    async fn attaches_bearer_token() {
        let (gw, tx, _) = setup();
        let token = encode_test_token(&json!({"role": "ADMIN"}));
        gw.session().set_credentials(&token, None).unwrap();
        tx.respond_json(200, json!([]));
        gw.send(ApiRequest::get("/invoices").query("page", 0)).await.unwrap();
        let seen = tx.requests();
        assert_eq!(seen[0].url.as_str(), "https://ops.example.com/api/invoices?page=0");
        assert_eq!(seen[0].headers.get(AUTHORIZATION).unwrap().to_str().unwrap(), format!("Bearer {}", token));
    }

    #[tokio::test]
    async fn foreign_origin_never_sees_token() {
        let (gw, tx, _) = setup();
        gw.session().set_credentials("a.b.c", None).unwrap();
        for url in ["https://elsewhere.example.net/collect", "http://ops.example.com/api/x", "https://ops.example.com:8443/api/x"] {
            let err = gw.send(ApiRequest::get(url)).await.unwrap_err();
            assert_eq!(err.code_str(), "validation");
        }
        assert!(tx.requests().is_empty());

        tx.respond_json(200, json!({}));
        gw.send(ApiRequest::get("https://ops.example.com/api/files/1")).await.unwrap();
        let seen = tx.requests();
        assert_eq!(seen[0].url.host_str(), Some("ops.example.com"));
        assert_eq!(seen[0].headers.get(AUTHORIZATION).unwrap(), "Bearer a.b.c");
        assert!(gw.session().snapshot().is_authenticated());
    }

    #[tokio::test]
    async fn no_token_no_authorization_header() {
        let (gw, tx, _) = setup();
        tx.respond_json(200, json!({}));
        gw.send(ApiRequest::get("customers")).await.unwrap();
        assert!(tx.requests()[0].headers.get(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn unhydrated_store_uses_stored_token() {
        let storage = Arc::new(MemoryStore::new());
        storage.set(TOKEN_KEY, "a.b.c").unwrap();
        let session = Arc::new(SessionStore::new(storage));
        let tx = ScriptedTransport::new();
        let gw = Gateway::new(Url::parse("http://localhost/").unwrap(), tx.clone(), session);
        tx.respond_json(200, json!({}));
        gw.send(ApiRequest::get("x")).await.unwrap();
        assert_eq!(tx.requests()[0].headers.get(AUTHORIZATION).unwrap(), "Bearer a.b.c");
    }

    #[tokio::test]
    async fn unauthorized_clears_session_before_returning() {
        let (gw, tx, storage) = setup();
        gw.session().set_credentials("a.b.c", Some(json!({"name": "x"}).as_object().cloned().unwrap())).unwrap();
        tx.respond_json(401, json!({"message": "token expired"}));
        let err = gw.send(ApiRequest::get("work-orders")).await.unwrap_err();
        assert_eq!(err, ApiError::Unauthorized { message: "token expired".into() });
        let s = gw.session().snapshot();
        assert!(s.token.is_none());
        assert!(s.role().is_none() && s.tenant_id().is_none() && s.profile().is_none());
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
        assert_eq!(storage.get(PROFILE_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn forbidden_keeps_session() {
        let (gw, tx, _) = setup();
        gw.session().set_credentials("a.b.c", None).unwrap();
        tx.respond_json(403, json!({"error": "not yours"}));
        let err = gw.send(ApiRequest::get("invoices/9")).await.unwrap_err();
        assert_eq!(err.status(), 403);
        assert!(gw.session().snapshot().is_authenticated());
    }

    #[tokio::test]
    async fn server_error_carries_body() {
        let (gw, tx, _) = setup();
        tx.respond_json(422, json!({"message": "invalid", "fields": {"title": "required"}}));
        match gw.send(ApiRequest::post("proposals").json(json!({}))).await {
            Err(ApiError::Client { status, message, body }) => {
                assert_eq!(status, 422);
                assert_eq!(message, "invalid");
                assert_eq!(body.unwrap()["fields"]["title"], "required");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn network_failure_is_status_zero() {
        let (gw, tx, _) = setup();
        tx.push(Scripted::Fail("connection refused".into()));
        let err = gw.send(ApiRequest::get("proposals")).await.unwrap_err();
        assert_eq!(err.status(), 0);
        assert_eq!(err.message(), "connection refused");
    }

    #[tokio::test]
    async fn pdf_is_returned_as_binary() {
        let (gw, tx, _) = setup();
        let pdf = b"%PDF-1.7\n\xff\xfe binary".to_vec();
        tx.respond(200, Some("application/pdf"), &pdf);
        let resp = gw.send(ApiRequest::get("invoices/1/pdf")).await.unwrap();
        assert_eq!(resp.body, ResponseBody::Binary(pdf));
    }

    #[tokio::test]
    async fn json_body_sets_content_type() {
        let (gw, tx, _) = setup();
        tx.respond_json(201, json!({"id": 5}));
        let v = gw.post_json("proposals", json!({"title": "Roof"})).await.unwrap();
        assert_eq!(v["id"], 5);
        let req = &tx.requests()[0];
        assert_eq!(req.headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(req.body.as_deref(), Some(br#"{"title":"Roof"}"#.as_slice()));
    }

    #[tokio::test]
    async fn empty_path_is_validation_error() {
        let (gw, tx, _) = setup();
        let err = gw.send(ApiRequest::get("  ")).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation { .. }));
        assert!(tx.requests().is_empty());
    }

    #[tokio::test]
    async fn abort_resolves_to_cancelled() {
        let (gw, tx, _) = setup();
        gw.session().set_credentials("a.b.c", None).unwrap();
        tx.push(Scripted::Hang);
        let (handle, reg) = AbortHandle::new_pair();
        let call = gw.send_abortable(ApiRequest::get("proposals"), reg);
        handle.abort();
        let err = call.await.unwrap_err();
        assert_eq!(err.code_str(), "cancelled");
        assert!(gw.session().snapshot().is_authenticated());
    }
}
