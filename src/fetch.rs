//! Model binary retrieval.
//!
//! The viewer only knows a binary id. A [`ModelBinaryFetch`] turns that id
//! into bytes; failures surface as [`LoadError::Fetch`] and are not retried.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::LoadError;

/// Raw model bytes plus a content fingerprint.
#[derive(Debug, Clone)]
pub struct ModelPayload {
    pub binary_id: String,
    pub bytes: Vec<u8>,
    /// Lower-case hex SHA-256 of `bytes`.
    pub fingerprint: String,
}

impl ModelPayload {
    pub fn new(binary_id: impl Into<String>, bytes: Vec<u8>) -> Self {
        let fingerprint = format!("{:x}", Sha256::digest(&bytes));
        Self {
            binary_id: binary_id.into(),
            bytes,
            fingerprint,
        }
    }

    /// First 12 hex digits, for log lines and GPU labels.
    pub fn short_fingerprint(&self) -> &str {
        &self.fingerprint[..12.min(self.fingerprint.len())]
    }
}

pub trait ModelBinaryFetch {
    fn fetch(&self, binary_id: &str) -> Result<ModelPayload, LoadError>;
}

/// Binaries stored as files named by their id under one directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ModelBinaryFetch for DirectoryStore {
    fn fetch(&self, binary_id: &str) -> Result<ModelPayload, LoadError> {
        let fetch_error = |reason: String| LoadError::Fetch {
            binary_id: binary_id.to_string(),
            reason,
        };

        // Ids name a file directly inside the root, never a path
        if binary_id.is_empty()
            || binary_id == "."
            || binary_id == ".."
            || binary_id.contains(['/', '\\'])
        {
            return Err(fetch_error("binary id is not a plain file name".to_string()));
        }

        let path = self.root.join(binary_id);
        let bytes = std::fs::read(&path)
            .map_err(|e| fetch_error(format!("{}: {}", path.display(), e)))?;

        let payload = ModelPayload::new(binary_id, bytes);
        log::info!(
            "Fetched binary {} ({} bytes, sha256 {})",
            binary_id,
            payload.bytes.len(),
            payload.short_fingerprint()
        );
        Ok(payload)
    }
}

/// In-memory binaries keyed by id.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    binaries: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, binary_id: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.binaries.insert(binary_id.into(), bytes.into());
    }

    pub fn with(mut self, binary_id: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(binary_id, bytes);
        self
    }
}

impl ModelBinaryFetch for MemoryStore {
    fn fetch(&self, binary_id: &str) -> Result<ModelPayload, LoadError> {
        self.binaries
            .get(binary_id)
            .map(|bytes| ModelPayload::new(binary_id, bytes.clone()))
            .ok_or_else(|| LoadError::Fetch {
                binary_id: binary_id.to_string(),
                reason: "no such binary".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_sha256() {
        let payload = ModelPayload::new("1", b"abc".to_vec());
        assert_eq!(
            payload.fingerprint,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(payload.short_fingerprint(), "ba7816bf8f01");
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new().with("42", "v 0 0 0");
        assert_eq!(store.fetch("42").unwrap().bytes, b"v 0 0 0");
        assert!(matches!(store.fetch("43"), Err(LoadError::Fetch { .. })));
    }

    #[test]
    fn test_directory_store_rejects_paths() {
        let store = DirectoryStore::new(std::env::temp_dir());
        for id in ["../etc/passwd", "a/b", "a\\b", "..", ""] {
            assert!(store.fetch(id).is_err(), "{} should be rejected", id);
        }
    }

    #[test]
    fn test_directory_store_reads_file() {
        let dir = std::env::temp_dir().join(format!("model-viewer-fetch-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("7"), b"bytes").unwrap();

        let store = DirectoryStore::new(&dir);
        let payload = store.fetch("7").unwrap();
        assert_eq!(payload.bytes, b"bytes");
        assert_eq!(payload.binary_id, "7");
        assert!(store.fetch("8").is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
