//! Client configuration
//! --------------------
//! Settings are read from the environment with defaults, then selectively overridden
//! by command-line flags in the binary.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8080/api";
pub const DEFAULT_STATE_DIR: &str = ".fieldops";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every request path is resolved against
    pub base_url: Url,
    /// Directory holding the durable session entries
    pub state_dir: PathBuf,
    /// Where downloaded documents are saved
    pub download_dir: PathBuf,
    /// Transport timeout; `None` leaves reqwest's default (no timeout)
    pub timeout: Option<Duration>,
    pub user_agent: String,
}

impl ClientConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            download_dir: PathBuf::from("."),
            timeout: None,
            user_agent: format!("fieldops/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Build configuration from FIELDOPS_* environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as `from_env` but with an injectable variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("FIELDOPS_API_URL").filter(|s| !s.trim().is_empty());
        let mut cfg = ClientConfig::new(parse_base_url(url.as_deref().unwrap_or(DEFAULT_API_URL))?);
        if let Some(dir) = lookup("FIELDOPS_STATE_DIR").filter(|s| !s.trim().is_empty()) {
            cfg.state_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("FIELDOPS_DOWNLOAD_DIR").filter(|s| !s.trim().is_empty()) {
            cfg.download_dir = PathBuf::from(dir);
        }
        if let Some(secs) = lookup("FIELDOPS_TIMEOUT_SECS").filter(|s| !s.trim().is_empty()) {
            let n: u64 = secs.trim().parse()
                .with_context(|| format!("FIELDOPS_TIMEOUT_SECS is not a number: {}", secs))?;
            // 0 disables the timeout
            cfg.timeout = if n == 0 { None } else { Some(Duration::from_secs(n)) };
        }
        Ok(cfg)
    }

    pub fn with_base_url(mut self, url: &str) -> Result<Self> {
        self.base_url = parse_base_url(url)?;
        Ok(self)
    }
}

/// Parse a base URL and make sure it ends with '/', so `Url::join` appends request paths
/// instead of replacing the last segment.
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let mut s = raw.trim().to_string();
    if !s.ends_with('/') { s.push('/'); }
    Url::parse(&s).with_context(|| format!("invalid base URL: {}", raw))
}
