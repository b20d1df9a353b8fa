//! Byte-level persistence of the whole cache as a single JSON blob.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::cache::error::PersistenceError;
use crate::cache::store::Chunk;

/// Bumped whenever the serialized chunk layout changes; older blobs are
/// rejected rather than misread.
pub const FORMAT_VERSION: u32 = 1;

/// Where serialized cache bytes live.
pub trait PersistenceAdapter: Send + Sync {
    /// `Ok(None)` means nothing has been persisted yet.
    fn load(&self) -> Result<Option<Vec<u8>>, PersistenceError>;

    /// Must either replace the stored bytes completely or fail; a reader must
    /// never observe a partial write.
    fn save(&self, bytes: &[u8]) -> Result<(), PersistenceError>;

    fn describe(&self) -> String;
}

#[derive(Debug, Deserialize)]
pub struct CacheSnapshot {
    pub format_version: u32,
    pub saved_at: DateTime<Utc>,
    pub chunks: Vec<Option<Chunk>>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    format_version: u32,
    saved_at: DateTime<Utc>,
    chunks: &'a [Option<Chunk>],
}

pub fn encode(chunks: &[Option<Chunk>]) -> Result<Vec<u8>, PersistenceError> {
    let snapshot = SnapshotRef {
        format_version: FORMAT_VERSION,
        saved_at: Utc::now(),
        chunks,
    };
    serde_json::to_vec(&snapshot).map_err(PersistenceError::Encode)
}

/// Decodes and validates a blob. Every chunk is checked against its mapping
/// invariants so a damaged file cannot produce wrong patches.
pub fn decode(bytes: &[u8]) -> Result<CacheSnapshot, PersistenceError> {
    let snapshot: CacheSnapshot = serde_json::from_slice(bytes).map_err(PersistenceError::Decode)?;
    if snapshot.format_version != FORMAT_VERSION {
        return Err(PersistenceError::Version {
            found: snapshot.format_version,
            expected: FORMAT_VERSION,
        });
    }
    for (index, chunk) in snapshot.chunks.iter().enumerate() {
        if let Some(chunk) = chunk {
            chunk
                .verify()
                .map_err(|reason| PersistenceError::Invalid { chunk: index, reason })?;
        }
    }
    Ok(snapshot)
}

/// Stores the blob in a single file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct FileAdapter {
    path: PathBuf,
}

impl FileAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_err(&self, source: io::Error) -> PersistenceError {
        PersistenceError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

impl PersistenceAdapter for FileAdapter {
    fn load(&self) -> Result<Option<Vec<u8>>, PersistenceError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PersistenceError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn save(&self, bytes: &[u8]) -> Result<(), PersistenceError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|err| self.write_err(err))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|err| self.write_err(err))?;
        tmp.write_all(bytes).map_err(|err| self.write_err(err))?;
        tmp.as_file().sync_all().map_err(|err| self.write_err(err))?;
        tmp.persist(&self.path)
            .map_err(|err| self.write_err(err.error))?;

        debug!(path = %self.path.display(), bytes = bytes.len(), "cache file written");
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-process blob holder; clones share the same bytes.
#[derive(Debug, Clone, Default)]
pub struct MemoryAdapter {
    bytes: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(Some(bytes))),
        }
    }

    pub fn bytes(&self) -> Option<Vec<u8>> {
        self.bytes.lock().clone()
    }
}

impl PersistenceAdapter for MemoryAdapter {
    fn load(&self) -> Result<Option<Vec<u8>>, PersistenceError> {
        Ok(self.bytes.lock().clone())
    }

    fn save(&self, bytes: &[u8]) -> Result<(), PersistenceError> {
        *self.bytes.lock() = Some(bytes.to_vec());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
