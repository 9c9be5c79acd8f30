//! Core data structures for the pack index

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Extracted reference data: cache key -> ordered, deduplicated values.
pub type CacheData = BTreeMap<String, Vec<String>>;

/// Logical type assigned to paths no file-type definition matches.
pub const UNKNOWN_FILE_TYPE: &str = "unknown";

/// Identifier shown for graph nodes whose cache data carries none.
pub const UNKNOWN_IDENTIFIER: &str = "unknown";

/// Cache record stored per `(file type, file path)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Modification time in milliseconds since the unix epoch.
    #[serde(rename = "lastModified")]
    pub last_modified: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<CacheData>,
    /// Only written when the content-hash change detector is active.
    #[serde(rename = "contentHash", default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl FileRecord {
    /// Record with no extracted data, only the change fingerprint.
    pub fn timestamp_only(last_modified: u64) -> Self {
        FileRecord {
            last_modified,
            data: None,
            content_hash: None,
        }
    }

    pub fn with_data(last_modified: u64, data: CacheData) -> Self {
        FileRecord {
            last_modified,
            data: Some(data),
            content_hash: None,
        }
    }

    /// Values stored under `key`, empty when the record has no such key.
    pub fn values(&self, key: &str) -> &[String] {
        self.data
            .as_ref()
            .and_then(|data| data.get(key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Kind of a directory entry yielded by the file-system capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

/// One `(name, kind, handle)` triple from a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    /// Project-relative path, usable with every other capability call.
    pub path: String,
}

/// Access state of a resource, reported to callers instead of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionStatus {
    Granted,
    Denied,
    /// The resource does not exist (yet).
    Missing,
}

/// How the indexing cache decides whether a file changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeDetection {
    /// Modification time is the only fingerprint.
    #[default]
    Timestamp,
    /// SHA-256 of the file bytes; catches edits that preserve the mtime.
    ContentHash,
}

/// Join two project-relative path fragments with a single `/`.
pub fn join_path(base: &str, name: &str) -> String {
    let base = base.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", base, name)
    }
}

/// Extension of a project-relative path, without the dot.
pub fn extension(path: &str) -> Option<&str> {
    let file_name = path.rsplit('/').next()?;
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() { None } else { Some(ext) }
}
