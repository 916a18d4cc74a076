//! File transfer helpers
//! ---------------------
//! Turn response payloads into named files on disk and read filenames out of
//! `Content-Disposition` headers.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::ApiResult;
use crate::gateway::{ApiResponse, ResponseBody};

static EXTENDED_FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)filename\*\s*=\s*"?([^']*)'[^']*'([^;"]+)"#).expect("valid regex"));
static QUOTED_FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)filename\s*=\s*"([^"]*)""#).expect("valid regex"));
static BARE_FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)filename\s*=\s*([^;]+)"#).expect("valid regex"));

/// Filename from a `Content-Disposition` value.
///
/// Tries, in order: the RFC 5987 form `filename*=charset''percent-encoded`, a quoted
/// `filename="..."`, and a bare `filename=...` up to the next `;`. Undecodable percent
/// escapes fall back to the raw encoded text.
pub fn extract_filename(header: &str) -> Option<String> {
    if let Some(c) = EXTENDED_FILENAME.captures(header) {
        let encoded = c.get(2).map(|m| m.as_str().trim()).unwrap_or("");
        if !encoded.is_empty() {
            let decoded = urlencoding::decode(encoded)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| encoded.to_string());
            return Some(decoded);
        }
    }
    if let Some(c) = QUOTED_FILENAME.captures(header) {
        let name = c.get(1).map(|m| m.as_str()).unwrap_or("");
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }
    if let Some(c) = BARE_FILENAME.captures(header) {
        let name = c.get(1).map(|m| m.as_str()).unwrap_or("").trim().trim_matches(|ch| ch == '"' || ch == '\'');
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }
    None
}

pub const OCTET_STREAM: &str = "application/octet-stream";
const TEXT_PLAIN: &str = "text/plain;charset=utf-8";

/// Bytes plus the media type they should be saved as.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

/// Anything that can be saved as a file.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Blob(Blob),
    Bytes(Vec<u8>),
    Text(String),
    Json(Value),
}

impl From<Blob> for Payload { fn from(b: Blob) -> Self { Payload::Blob(b) } }
impl From<Vec<u8>> for Payload { fn from(b: Vec<u8>) -> Self { Payload::Bytes(b) } }
impl From<&[u8]> for Payload { fn from(b: &[u8]) -> Self { Payload::Bytes(b.to_vec()) } }
impl From<String> for Payload { fn from(s: String) -> Self { Payload::Text(s) } }
impl From<&str> for Payload { fn from(s: &str) -> Self { Payload::Text(s.to_string()) } }
impl From<Value> for Payload { fn from(v: Value) -> Self { Payload::Json(v) } }

impl From<ResponseBody> for Payload {
    fn from(b: ResponseBody) -> Self {
        match b {
            ResponseBody::Binary(bytes) => Payload::Bytes(bytes),
            ResponseBody::Text(s) => Payload::Text(s),
            ResponseBody::Json(v) => Payload::Json(v),
        }
    }
}

impl Payload {
    /// Coerce into a blob. An explicit media type wins; otherwise a blob keeps its own and
    /// the other forms get the obvious default.
    pub fn into_blob(self, media_type: Option<&str>) -> Blob {
        let given = media_type.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        match self {
            Payload::Blob(b) => {
                let mt = given.unwrap_or_else(|| if b.media_type.trim().is_empty() { OCTET_STREAM.to_string() } else { b.media_type });
                Blob { bytes: b.bytes, media_type: mt }
            }
            Payload::Bytes(bytes) => Blob { bytes, media_type: given.unwrap_or_else(|| OCTET_STREAM.to_string()) },
            Payload::Text(s) => Blob { bytes: s.into_bytes(), media_type: given.unwrap_or_else(|| TEXT_PLAIN.to_string()) },
            Payload::Json(v) => {
                let bytes = serde_json::to_vec_pretty(&v).unwrap_or_else(|_| v.to_string().into_bytes());
                Blob { bytes, media_type: given.unwrap_or_else(|| "application/json".to_string()) }
            }
        }
    }
}

/// Extension for a media type, if it is one we know.
pub fn extension_for(media_type: &str) -> Option<&'static str> {
    let essence = crate::gateway::response::essence(media_type);
    let ext = match essence.as_str() {
        "application/pdf" => "pdf",
        "application/json" => "json",
        "text/plain" => "txt",
        "text/csv" => "csv",
        "text/html" => "html",
        "application/xml" | "text/xml" => "xml",
        "application/zip" => "zip",
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        "application/vnd.ms-excel" => "xls",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => "xlsx",
        "application/msword" => "doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        _ => return None,
    };
    Some(ext)
}

/// Replace characters that are illegal in file names, collapse whitespace, and never
/// return an empty name.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c.is_whitespace() {
                ' '
            } else if matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches(|c: char| c == '.' || c == ' ');
    if trimmed.is_empty() { "download".to_string() } else { trimmed.to_string() }
}

/// A trailing `.ext` of 1–5 alphanumerics containing at least one letter.
pub fn has_extension(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
                && ext.chars().any(|c| c.is_ascii_alphabetic())
        }
        _ => false,
    }
}

pub fn final_file_name(suggested: &str, media_type: &str) -> String {
    let clean = sanitize_filename(suggested);
    if has_extension(&clean) {
        return clean;
    }
    match extension_for(media_type) {
        Some(ext) => format!("{}.{}", clean, ext),
        None => clean,
    }
}

/// One file ready to be handed to a `FileSaver`.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadFile {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub media_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SavedFile {
    pub path: PathBuf,
    pub file_name: String,
    pub media_type: String,
    pub size: usize,
}

/// Where downloads end up. The file is moved in and dropped once saved.
pub trait FileSaver: Send + Sync {
    fn save(&self, file: DownloadFile) -> Result<SavedFile>;
}

/// Saves into a directory, adding ` (1)`, ` (2)`, ... instead of overwriting.
#[derive(Debug, Clone)]
pub struct DirectorySaver {
    dir: PathBuf,
}

impl DirectorySaver {
    pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }

    pub fn dir(&self) -> &Path { &self.dir }
}

fn numbered(name: &str, n: u32) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{} ({}).{}", stem, n, ext),
        _ => format!("{} ({})", name, n),
    }
}

impl FileSaver for DirectorySaver {
    fn save(&self, file: DownloadFile) -> Result<SavedFile> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create download directory {}", self.dir.display()))?;
        for n in 0..10_000u32 {
            let name = if n == 0 { file.file_name.clone() } else { numbered(&file.file_name, n) };
            let path = self.dir.join(&name);
            let mut f = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(f) => f,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e).with_context(|| format!("failed to create {}", path.display())),
            };
            fill_or_discard(&mut f, &path, &file.bytes)?;
            return Ok(SavedFile { path, file_name: name, media_type: file.media_type, size: file.bytes.len() });
        }
        anyhow::bail!("too many files named {} in {}", file.file_name, self.dir.display())
    }
}

// A half-written download must not sit under its final name.
fn fill_or_discard<W: Write>(out: &mut W, path: &Path, bytes: &[u8]) -> Result<()> {
    let res = out.write_all(bytes).and_then(|_| out.flush());
    if let Err(e) = res {
        if let Err(rm) = std::fs::remove_file(path) {
            warn!(target: "files", path = %path.display(), "failed to remove partial file: {}", rm);
        }
        return Err(e).with_context(|| format!("failed to write {}", path.display()));
    }
    Ok(())
}

/// Save a payload under a cleaned-up name.
pub fn download_blob(
    payload: impl Into<Payload>,
    suggested_name: &str,
    media_type: Option<&str>,
    saver: &dyn FileSaver,
) -> ApiResult<SavedFile> {
    let blob = payload.into().into_blob(media_type);
    let file_name = final_file_name(suggested_name, &blob.media_type);
    let file = DownloadFile { bytes: blob.bytes, file_name, media_type: blob.media_type };
    let saved = saver.save(file)?;
    info!(target: "files", path = %saved.path.display(), size = saved.size, media_type = %saved.media_type, "file saved");
    Ok(saved)
}

/// Save a gateway response, naming it from `Content-Disposition` when the server sent one.
pub fn save_response(resp: ApiResponse, fallback_name: &str, saver: &dyn FileSaver) -> ApiResult<SavedFile> {
    let name = resp.filename().unwrap_or_else(|| fallback_name.to_string());
    let media_type = resp.content_type().map(|s| s.to_string());
    download_blob(resp.body, &name, media_type.as_deref(), saver)
}
