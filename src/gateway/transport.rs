use anyhow::{Context, Result};
use futures_util::future::BoxFuture;
use reqwest::header::HeaderMap;
use reqwest::{Method, Url};

use crate::config::ClientConfig;

/// Fully resolved outgoing request.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// Raw response: status, headers and undecoded bytes.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// The request never produced a response (DNS, refused connection, timeout, body read).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    pub timeout: bool,
}

impl TransportError {
    pub fn new<S: Into<String>>(msg: S) -> Self { Self { message: msg.into(), timeout: false } }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let mut message = err.to_string();
        // reqwest keeps the useful part (e.g. "connection refused") in the source chain
        let mut src = std::error::Error::source(&err);
        while let Some(s) = src {
            message.push_str(": ");
            message.push_str(&s.to_string());
            src = s.source();
        }
        Self { message, timeout: err.is_timeout() }
    }
}

/// Network seam of the gateway. Boxed futures keep the trait object-safe so the gateway
/// can hold `Arc<dyn Transport>` and tests can script responses.
pub trait Transport: Send + Sync {
    fn execute(&self, req: TransportRequest) -> BoxFuture<'_, Result<TransportResponse, TransportError>>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(cfg: &ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(cfg.user_agent.clone());
        if let Some(t) = cfg.timeout {
            builder = builder.timeout(t);
        }
        let client = builder.build().context("failed to build HTTP client")?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self { Self { client } }
}

impl Transport for ReqwestTransport {
    fn execute(&self, req: TransportRequest) -> BoxFuture<'_, Result<TransportResponse, TransportError>> {
        Box::pin(async move {
            let mut rb = self.client.request(req.method, req.url).headers(req.headers);
            if let Some(body) = req.body {
                rb = rb.body(body);
            }
            let resp = rb.send().await?;
            let status = resp.status().as_u16();
            let headers = resp.headers().clone();
            let body = resp.bytes().await?.to_vec();
            Ok(TransportResponse { status, headers, body })
        })
    }
}
