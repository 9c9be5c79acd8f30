//! Durable mapping from `(file type, file path)` to a cache record

use crate::cache::CACHE_FILE;
use crate::error::Result;
use crate::fs::{FileSystem, FileWriter};
use crate::model::FileRecord;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Persisted document: file type -> file path -> record.
pub type CacheDocument = BTreeMap<String, BTreeMap<String, FileRecord>>;

/// Contract the indexing cache and graph builder rely on.
pub trait Store: Send + Sync {
    /// Load persisted state on first call and reset visited flags for a new pass.
    fn setup(&mut self) -> Result<()>;

    fn get(&self, path: &str, file_type: &str) -> Option<&FileRecord>;

    /// Insert or replace a record; the record counts as visited.
    fn add(&mut self, path: &str, file_type: &str, record: FileRecord);

    fn last_modified(&self, path: &str, file_type: &str) -> Option<u64> {
        self.get(path, file_type).map(|r| r.last_modified)
    }

    /// Refresh the timestamp of an existing record, keeping its data.
    fn set_last_modified(&mut self, path: &str, file_type: &str, last_modified: u64);

    fn set_visited(&mut self, path: &str, file_type: &str, visited: bool);

    fn visited_files(&self) -> usize;

    fn total_files(&self) -> usize;

    fn all_files(&self) -> Vec<String>;

    /// Paths of the given types whose `where_key` data intersects `accepted`.
    fn find_multiple(&self, file_types: &[String], where_key: &str, accepted: &[String]) -> Vec<String>;

    /// Write visited records back, dropping records not visited this pass.
    fn persist(&mut self) -> Result<()>;
}

/// Store persisted as one JSON document under the cache directory.
pub struct JsonStore<F> {
    fs: Arc<F>,
    path: String,
    records: CacheDocument,
    visited: HashSet<(String, String)>,
    loaded: bool,
}

impl<F: FileSystem + FileWriter> JsonStore<F> {
    pub fn new(fs: Arc<F>) -> Self {
        Self::with_path(fs, CACHE_FILE)
    }

    pub fn with_path(fs: Arc<F>, path: impl Into<String>) -> Self {
        JsonStore {
            fs,
            path: path.into(),
            records: BTreeMap::new(),
            visited: HashSet::new(),
            loaded: false,
        }
    }

    /// Snapshot of the in-memory document.
    pub fn document(&self) -> &CacheDocument {
        &self.records
    }
}

impl<F: FileSystem + FileWriter> Store for JsonStore<F> {
    fn setup(&mut self) -> Result<()> {
        self.visited.clear();
        if self.loaded {
            return Ok(());
        }
        self.loaded = true;

        match self.fs.read_file(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<CacheDocument>(&bytes) {
                Ok(records) => {
                    tracing::debug!(
                        "Loaded {} cache records from {}",
                        records.values().map(BTreeMap::len).sum::<usize>(),
                        self.path
                    );
                    self.records = records;
                }
                Err(e) => {
                    tracing::warn!("Discarding unreadable cache {}: {}", self.path, e);
                }
            },
            Err(e) if e.is_not_found() => {
                tracing::debug!("No cache at {}, starting fresh", self.path);
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn get(&self, path: &str, file_type: &str) -> Option<&FileRecord> {
        self.records.get(file_type)?.get(path)
    }

    fn add(&mut self, path: &str, file_type: &str, record: FileRecord) {
        self.records
            .entry(file_type.to_string())
            .or_default()
            .insert(path.to_string(), record);
        self.visited.insert((file_type.to_string(), path.to_string()));
    }

    fn set_last_modified(&mut self, path: &str, file_type: &str, last_modified: u64) {
        if let Some(record) = self
            .records
            .get_mut(file_type)
            .and_then(|records| records.get_mut(path))
        {
            record.last_modified = last_modified;
        }
    }

    fn set_visited(&mut self, path: &str, file_type: &str, visited: bool) {
        let key = (file_type.to_string(), path.to_string());
        if visited {
            if self.get(path, file_type).is_some() {
                self.visited.insert(key);
            }
        } else {
            self.visited.remove(&key);
        }
    }

    fn visited_files(&self) -> usize {
        self.visited.len()
    }

    fn total_files(&self) -> usize {
        self.records.values().map(BTreeMap::len).sum()
    }

    fn all_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self
            .records
            .values()
            .flat_map(|records| records.keys().cloned())
            .collect();
        files.sort();
        files.dedup();
        files
    }

    fn find_multiple(&self, file_types: &[String], where_key: &str, accepted: &[String]) -> Vec<String> {
        if accepted.is_empty() {
            return Vec::new();
        }
        let accepted: HashSet<&str> = accepted.iter().map(String::as_str).collect();

        let mut found = Vec::new();
        for file_type in file_types {
            let Some(records) = self.records.get(file_type) else {
                continue;
            };
            for (path, record) in records {
                if record
                    .values(where_key)
                    .iter()
                    .any(|value| accepted.contains(value.as_str()))
                {
                    found.push(path.clone());
                }
            }
        }
        found
    }

    fn persist(&mut self) -> Result<()> {
        let visited = &self.visited;
        for (file_type, records) in self.records.iter_mut() {
            records.retain(|path, _| visited.contains(&(file_type.clone(), path.clone())));
        }
        self.records.retain(|_, records| !records.is_empty());

        let bytes = serde_json::to_vec(&self.records)?;
        self.fs.write_file(&self.path, &bytes)?;
        tracing::debug!("Persisted {} cache records to {}", self.total_files(), self.path);
        Ok(())
    }
}
