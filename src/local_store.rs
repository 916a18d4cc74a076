//! Durable key/value storage
//! -------------------------
//! The session layer persists its token and user profile through the `LocalStore` trait.
//! `MemoryStore` keeps entries in process (tests, embedded use); `FileStore` keeps one
//! file per key under a state directory so a session survives process restarts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::RwLock;

/// Minimal key/value contract mirroring browser local storage.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.entries.read().len() }

    pub fn is_empty(&self) -> bool { self.entries.read().is_empty() }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// File-per-key store. Keys are mapped to safe file names; values are written through a
/// temp file and renamed into place so a crash never leaves a half-written token.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

fn key_file_name(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect();
    name.push_str(".entry");
    name
}

impl FileStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create state directory: {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path { &self.root }

    fn path_for(&self, key: &str) -> PathBuf { self.root.join(key_file_name(key)) }
}

impl LocalStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let p = self.path_for(key);
        match std::fs::read_to_string(&p) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", p.display())),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let p = self.path_for(key);
        let tmp = p.with_extension("entry.tmp");
        std::fs::write(&tmp, value).with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &p).with_context(|| format!("failed to move {} into place", p.display()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let p = self.path_for(key);
        match std::fs::remove_file(&p) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to remove {}", p.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_set_get_remove() {
        let s = MemoryStore::new();
        assert_eq!(s.get("k").unwrap(), None);
        s.set("k", "v").unwrap();
        assert_eq!(s.get("k").unwrap().as_deref(), Some("v"));
        s.remove("k").unwrap();
        assert!(s.is_empty());
        // removing twice is fine
        s.remove("k").unwrap();
    }

    #[test]
    fn file_store_persists_between_instances() {
        let tmp = tempfile::tempdir().unwrap();
        let a = FileStore::open(tmp.path()).unwrap();
        a.set("fieldops.token", "abc.def.ghi").unwrap();
        let b = FileStore::open(tmp.path()).unwrap();
        assert_eq!(b.get("fieldops.token").unwrap().as_deref(), Some("abc.def.ghi"));
        b.remove("fieldops.token").unwrap();
        assert_eq!(a.get("fieldops.token").unwrap(), None);
    }

    #[test]
    fn unsafe_key_characters_are_mapped() {
        assert_eq!(key_file_name("a/b:c"), "a_b_c.entry");
    }
}
