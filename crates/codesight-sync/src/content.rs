//! Content and hash caching for bundle preparation

use codesight_types::{ContentProvider, FileHandle, ProjectId, Result};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

/// Cached text of one file together with its digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRecord {
    /// File text as last read
    pub content: Arc<str>,
    /// SHA-256 hex digest of `content`
    pub hash: Arc<str>,
}

impl ContentRecord {
    /// Create a record, computing the digest of `content`
    pub fn new(content: impl Into<Arc<str>>) -> Self {
        let content = content.into();
        let hash = Arc::from(sha256_hex(&content));
        Self { content, hash }
    }

    /// Content length in bytes
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Check if the content is empty
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// SHA-256 hex digest of a string
pub fn sha256_hex(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Lazily filled per-file cache of content and content digest
pub struct ContentHashStore {
    provider: Arc<dyn ContentProvider>,
    records: DashMap<FileHandle, ContentRecord>,
}

impl ContentHashStore {
    /// Create an empty store reading through `provider`
    pub fn new(provider: Arc<dyn ContentProvider>) -> Self {
        Self {
            provider,
            records: DashMap::new(),
        }
    }

    /// Cached record of a file, loading it on first access
    pub fn record(&self, file: &FileHandle) -> Result<ContentRecord> {
        if let Some(record) = self.records.get(file) {
            return Ok(record.clone());
        }

        let record = ContentRecord::new(self.provider.read_content(file)?);
        debug!(%file, hash = %record.hash, "Cached file content");
        self.records.insert(file.clone(), record.clone());
        Ok(record)
    }

    /// Cached text of a file
    pub fn get_content(&self, file: &FileHandle) -> Result<Arc<str>> {
        self.record(file).map(|record| record.content)
    }

    /// SHA-256 hex digest of the cached text
    pub fn get_hash(&self, file: &FileHandle) -> Result<Arc<str>> {
        self.record(file).map(|record| record.hash)
    }

    /// Re-read a file and report whether its digest moved.
    ///
    /// This is consume-once: the freshly read content replaces the stored record,
    /// so a second call without an intervening edit returns `false`. A file that
    /// was never hashed counts as changed.
    pub fn has_changed(&self, file: &FileHandle) -> Result<bool> {
        let fresh = ContentRecord::new(self.provider.read_content(file)?);
        let previous = self.records.insert(file.clone(), fresh.clone());

        let changed = previous.map_or(true, |old| old.hash != fresh.hash);
        if changed {
            debug!(%file, hash = %fresh.hash, "File content changed");
        }
        Ok(changed)
    }

    /// Drop the record of one file
    pub fn invalidate(&self, file: &FileHandle) -> bool {
        self.records.remove(file).is_some()
    }

    /// Drop the records of every file in a project
    pub fn invalidate_project(&self, project: &ProjectId) -> usize {
        let before = self.records.len();
        self.records.retain(|file, _| file.project() != project);
        let removed = before.saturating_sub(self.records.len());
        debug!(%project, removed, "Dropped cached content for project");
        removed
    }

    /// Check if a record is currently cached
    pub fn contains(&self, file: &FileHandle) -> bool {
        self.records.contains_key(file)
    }

    /// Number of cached records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl std::fmt::Debug for ContentHashStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentHashStore")
            .field("records", &self.records.len())
            .finish_non_exhaustive()
    }
}
