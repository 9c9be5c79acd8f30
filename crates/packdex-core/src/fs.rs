//! File-system capability
//!
//! Every component reads the project through [`FileSystem`] with
//! project-relative, `/`-separated paths. Writes go through the separate
//! [`FileWriter`] capability so plugins can be handed a read-only view.

use crate::error::{PackdexError, Result};
use crate::model::{DirEntry, EntryKind, PermissionStatus, join_path};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Read-only access to the project tree.
pub trait FileSystem: Send + Sync {
    /// Read raw bytes of a file.
    fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    /// List the direct children of a directory.
    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>>;

    /// Modification time in milliseconds since the unix epoch.
    fn modified(&self, path: &str) -> Result<u64>;

    /// Access state of a path.
    fn permission(&self, path: &str) -> PermissionStatus;

    /// Read and parse a JSON document, tolerating comments and trailing commas.
    fn read_json(&self, path: &str) -> Result<serde_json::Value> {
        let bytes = self.read_file(path)?;
        parse_json(path, &bytes)
    }

    /// Recursively list every file below `path`.
    fn walk(&self, path: &str) -> Result<Vec<String>> {
        let mut files = Vec::new();
        let mut to_visit = vec![path.to_string()];
        while let Some(dir) = to_visit.pop() {
            for entry in self.read_dir(&dir)? {
                match entry.kind {
                    EntryKind::File => files.push(entry.path),
                    EntryKind::Directory => to_visit.push(entry.path),
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Write access to the project tree.
pub trait FileWriter: Send + Sync {
    fn write_file(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Remove a file; missing files are not an error.
    fn remove_file(&self, path: &str) -> Result<()>;

    /// Remove a directory and everything below it; missing is not an error.
    fn remove_dir_all(&self, path: &str) -> Result<()>;
}

/// Parse a JSON document with the tolerant JSON5 grammar.
pub fn parse_json(path: &str, bytes: &[u8]) -> Result<serde_json::Value> {
    let text = String::from_utf8_lossy(bytes);
    json5::from_str::<serde_json::Value>(&text).map_err(|e| PackdexError::Document {
        path: path.to_string(),
        message: e.to_string(),
    })
}

/// The real file system, rooted at a project directory.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl AsRef<Path>) -> Self {
        LocalFs {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let mut full = self.root.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            full.push(segment);
        }
        full
    }
}

impl FileSystem for LocalFs {
    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path);
        std::fs::read(&full).map_err(|e| PackdexError::from_io(full, e))
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let full = self.resolve(path);
        let entries = std::fs::read_dir(&full).map_err(|e| PackdexError::from_io(&full, e))?;

        let mut listing = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Cannot read entry in {}: {}", full.display(), e);
                    continue;
                }
            };
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(e) => {
                    tracing::warn!("Cannot stat {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            let kind = if file_type.is_dir() {
                EntryKind::Directory
            } else if file_type.is_file() {
                EntryKind::File
            } else {
                continue;
            };
            let name = entry.file_name().to_string_lossy().to_string();
            listing.push(DirEntry {
                path: join_path(path, &name),
                name,
                kind,
            });
        }
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    fn modified(&self, path: &str) -> Result<u64> {
        let full = self.resolve(path);
        let metadata = std::fs::metadata(&full).map_err(|e| PackdexError::from_io(&full, e))?;
        let modified = metadata
            .modified()
            .map_err(|e| PackdexError::from_io(&full, e))?;
        let timestamp = chrono::DateTime::<chrono::Utc>::from(modified).timestamp_millis();
        Ok(timestamp.max(0) as u64)
    }

    fn permission(&self, path: &str) -> PermissionStatus {
        let full = self.resolve(path);
        let result = if full.is_dir() {
            std::fs::read_dir(&full).map(|_| ())
        } else {
            std::fs::File::open(&full).map(|_| ())
        };
        match result {
            Ok(()) => PermissionStatus::Granted,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PermissionStatus::Missing,
            Err(_) => PermissionStatus::Denied,
        }
    }
}

impl FileWriter for LocalFs {
    fn write_file(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PackdexError::from_io(parent, e))?;
        }
        std::fs::write(&full, bytes).map_err(|e| PackdexError::from_io(full, e))
    }

    fn remove_file(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        match std::fs::remove_file(&full) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                Err(PackdexError::from_io(full, e))
            }
            _ => Ok(()),
        }
    }

    fn remove_dir_all(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        match std::fs::remove_dir_all(&full) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                Err(PackdexError::from_io(full, e))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryFile {
    bytes: Vec<u8>,
    modified: u64,
}

/// In-memory project tree with explicit modification times.
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: RwLock<BTreeMap<String, MemoryFile>>,
    denied: RwLock<Vec<String>>,
    writes: RwLock<Vec<String>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a file with the given modification time.
    pub fn insert(&self, path: &str, contents: impl Into<Vec<u8>>, modified: u64) {
        if let Ok(mut files) = self.files.write() {
            files.insert(
                path.trim_matches('/').to_string(),
                MemoryFile {
                    bytes: contents.into(),
                    modified,
                },
            );
        }
    }

    /// Change a file's timestamp without touching its bytes.
    pub fn touch(&self, path: &str, modified: u64) {
        if let Ok(mut files) = self.files.write() {
            if let Some(file) = files.get_mut(path) {
                file.modified = modified;
            }
        }
    }

    pub fn remove(&self, path: &str) {
        if let Ok(mut files) = self.files.write() {
            files.remove(path);
        }
    }

    /// Report `path` and everything below it as not accessible.
    pub fn deny(&self, path: &str) {
        if let Ok(mut denied) = self.denied.write() {
            denied.push(path.trim_matches('/').to_string());
        }
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.files
            .read()
            .ok()
            .and_then(|files| files.get(path).map(|f| f.bytes.clone()))
    }

    /// Paths written through [`FileWriter::write_file`], in write order.
    pub fn writes(&self) -> Vec<String> {
        self.writes.read().map(|w| w.clone()).unwrap_or_default()
    }

    fn is_denied(&self, path: &str) -> bool {
        self.denied.read().is_ok_and(|denied| {
            denied
                .iter()
                .any(|d| d.is_empty() || path == d || path.starts_with(&format!("{}/", d)))
        })
    }

    fn is_dir(&self, path: &str) -> bool {
        if path.is_empty() {
            return true;
        }
        let prefix = format!("{}/", path);
        self.files
            .read()
            .is_ok_and(|files| files.keys().any(|k| k.starts_with(&prefix)))
    }
}

impl FileSystem for MemoryFs {
    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        if self.is_denied(path) {
            return Err(PackdexError::PermissionDenied(path.to_string()));
        }
        self.contents(path)
            .ok_or_else(|| PackdexError::NotFound(path.to_string()))
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let path = path.trim_matches('/');
        if self.is_denied(path) {
            return Err(PackdexError::PermissionDenied(path.to_string()));
        }
        if !self.is_dir(path) {
            return Err(PackdexError::NotFound(path.to_string()));
        }
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };

        let files = self
            .files
            .read()
            .map_err(|_| PackdexError::Config("memory fs lock poisoned".to_string()))?;
        let mut listing: BTreeMap<String, EntryKind> = BTreeMap::new();
        for key in files.keys() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    listing.insert(dir.to_string(), EntryKind::Directory);
                }
                None => {
                    listing.entry(rest.to_string()).or_insert(EntryKind::File);
                }
            }
        }

        Ok(listing
            .into_iter()
            .map(|(name, kind)| DirEntry {
                path: join_path(path, &name),
                name,
                kind,
            })
            .collect())
    }

    fn modified(&self, path: &str) -> Result<u64> {
        self.files
            .read()
            .ok()
            .and_then(|files| files.get(path).map(|f| f.modified))
            .ok_or_else(|| PackdexError::NotFound(path.to_string()))
    }

    fn permission(&self, path: &str) -> PermissionStatus {
        let path = path.trim_matches('/');
        if self.is_denied(path) {
            PermissionStatus::Denied
        } else if self.is_dir(path) || self.contents(path).is_some() {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Missing
        }
    }
}

impl FileWriter for MemoryFs {
    fn write_file(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let modified = chrono::Utc::now().timestamp_millis().max(0) as u64;
        self.insert(path, bytes.to_vec(), modified);
        if let Ok(mut writes) = self.writes.write() {
            writes.push(path.to_string());
        }
        Ok(())
    }

    fn remove_file(&self, path: &str) -> Result<()> {
        self.remove(path);
        Ok(())
    }

    fn remove_dir_all(&self, path: &str) -> Result<()> {
        let prefix = format!("{}/", path.trim_matches('/'));
        if let Ok(mut files) = self.files.write() {
            files.retain(|k, _| !k.starts_with(&prefix));
        }
        Ok(())
    }
}
