//! Change-detecting indexing cache
//!
//! Walks the project, compares every file's fingerprint against the
//! store, re-extracts reference data for changed files and persists the
//! store when anything moved. File reads and parsing run in parallel; all
//! store writes happen afterwards on the calling thread.

use crate::instructions::InstructionEngine;
use crate::text_transforms::TextTransforms;
use packdex_core::cache::RESERVED_FOLDERS;
use packdex_core::fs::parse_json;
use packdex_core::model::extension;
use packdex_core::{
    ChangeDetection, EntryKind, FileRecord, FileSystem, FileTypeRegistry, InstructionSet,
    PackdexConfig, PermissionStatus, Result, Store,
};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Work counters observable while a scan runs.
#[derive(Debug, Default)]
pub struct ScanProgress {
    total: AtomicUsize,
    done: AtomicUsize,
}

impl ScanProgress {
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }
}

/// Result of one scan pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub status: PermissionStatus,
    pub all_files: Vec<String>,
    pub changed_files: Vec<String>,
    /// Whether the store was written back.
    pub persisted: bool,
}

impl ScanReport {
    fn empty(status: PermissionStatus) -> Self {
        ScanReport {
            status,
            all_files: Vec::new(),
            changed_files: Vec::new(),
            persisted: false,
        }
    }
}

enum Outcome {
    Unchanged,
    /// Same content under a new timestamp (content-hash mode only).
    Touched(u64),
    Changed(FileRecord),
    Failed,
}

pub struct IndexingCache<'a> {
    fs: &'a dyn FileSystem,
    store: &'a mut dyn Store,
    file_types: &'a FileTypeRegistry,
    config: &'a PackdexConfig,
    engine: InstructionEngine,
    text_transforms: TextTransforms,
    progress: Arc<ScanProgress>,
}

impl<'a> IndexingCache<'a> {
    pub fn new(
        fs: &'a dyn FileSystem,
        store: &'a mut dyn Store,
        file_types: &'a FileTypeRegistry,
        config: &'a PackdexConfig,
    ) -> Self {
        IndexingCache {
            fs,
            store,
            file_types,
            config,
            engine: InstructionEngine::new(),
            text_transforms: TextTransforms::new(),
            progress: Arc::new(ScanProgress::default()),
        }
    }

    /// Replace the map-function and text-transform tables.
    pub fn with_extractors(mut self, engine: InstructionEngine, text_transforms: TextTransforms) -> Self {
        self.engine = engine;
        self.text_transforms = text_transforms;
        self
    }

    pub fn progress(&self) -> Arc<ScanProgress> {
        Arc::clone(&self.progress)
    }

    /// Run one pass and return `(all files, changed files)`.
    pub fn start(&mut self) -> Result<ScanReport> {
        let status = self.fs.permission("");
        if status != PermissionStatus::Granted {
            tracing::warn!("Project root not accessible: {:?}", status);
            return Ok(ScanReport::empty(status));
        }
        self.store.setup()?;

        if self.config.fast_path && self.store.total_files() > 0 {
            tracing::info!("Fast path: trusting {} cached files", self.store.total_files());
            return Ok(ScanReport {
                status: PermissionStatus::Granted,
                all_files: self.store.all_files(),
                changed_files: Vec::new(),
                persisted: false,
            });
        }

        let ignored: HashSet<String> = self
            .config
            .ignore_folders
            .iter()
            .map(|f| f.trim_matches('/').to_string())
            .chain(RESERVED_FOLDERS.iter().map(|f| f.to_string()))
            .collect();
        let files = self.walk(&ignored);
        let previous_total = self.store.total_files();

        let outcomes: Vec<(String, String, Outcome)> = {
            let store: &dyn Store = &*self.store;
            files
                .par_iter()
                .map(|path| {
                    let file_type = self.file_types.id_for(path).to_string();
                    let outcome = self.process(path, &file_type, store.get(path, &file_type));
                    self.progress.done.fetch_add(1, Ordering::Relaxed);
                    (path.clone(), file_type, outcome)
                })
                .collect()
        };

        let mut all_files = Vec::with_capacity(outcomes.len());
        let mut changed_files = Vec::new();
        let mut touched = 0;
        for (path, file_type, outcome) in outcomes {
            match outcome {
                Outcome::Unchanged => self.store.set_visited(&path, &file_type, true),
                Outcome::Touched(modified) => {
                    self.store.set_last_modified(&path, &file_type, modified);
                    self.store.set_visited(&path, &file_type, true);
                    touched += 1;
                }
                Outcome::Changed(record) => {
                    tracing::debug!("Changed: {} ({})", path, file_type);
                    self.store.add(&path, &file_type, record);
                    changed_files.push(path.clone());
                }
                Outcome::Failed => continue,
            }
            all_files.push(path);
        }

        let persisted = !changed_files.is_empty()
            || touched > 0
            || self.store.visited_files() != previous_total;
        if persisted {
            self.store.persist()?;
        }

        tracing::info!(
            "Indexed {} files, {} changed{}",
            all_files.len(),
            changed_files.len(),
            if persisted { "" } else { " (cache untouched)" }
        );
        Ok(ScanReport {
            status,
            all_files,
            changed_files,
            persisted,
        })
    }

    fn walk(&self, ignored: &HashSet<String>) -> Vec<String> {
        let mut files = Vec::new();
        let mut to_visit = vec![String::new()];

        while let Some(dir) = to_visit.pop() {
            let entries = match self.fs.read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("Cannot read directory {:?}: {}", dir, e);
                    continue;
                }
            };
            for entry in entries.into_iter().rev() {
                match entry.kind {
                    EntryKind::Directory => {
                        if ignored.contains(&entry.path) {
                            tracing::debug!("Skipping ignored folder {}", entry.path);
                            continue;
                        }
                        to_visit.push(entry.path);
                    }
                    EntryKind::File => {
                        if entry.name.starts_with('.') {
                            continue;
                        }
                        self.progress.total.fetch_add(1, Ordering::Relaxed);
                        files.push(entry.path);
                    }
                }
            }
        }
        files.sort();
        files
    }

    fn process(&self, path: &str, file_type: &str, previous: Option<&FileRecord>) -> Outcome {
        let modified = match self.fs.modified(path) {
            Ok(modified) => modified,
            Err(e) => {
                tracing::warn!("Cannot stat {}: {}", path, e);
                return Outcome::Failed;
            }
        };

        match self.config.change_detection {
            ChangeDetection::Timestamp => {
                if previous.is_some_and(|r| r.last_modified == modified) {
                    return Outcome::Unchanged;
                }
                let ext = extension(path).unwrap_or_default();
                if !self.config.is_json_extension(ext) && !self.config.is_text_extension(ext) {
                    return Outcome::Changed(FileRecord::timestamp_only(modified));
                }
                match self.fs.read_file(path) {
                    Ok(bytes) => Outcome::Changed(self.extract(path, file_type, &bytes, modified)),
                    Err(e) => {
                        tracing::warn!("Cannot read {}: {}", path, e);
                        Outcome::Failed
                    }
                }
            }
            ChangeDetection::ContentHash => {
                let bytes = match self.fs.read_file(path) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!("Cannot read {}: {}", path, e);
                        return Outcome::Failed;
                    }
                };
                let hash = format!("{:x}", Sha256::digest(&bytes));
                if let Some(record) = previous {
                    if record.content_hash.as_deref() == Some(hash.as_str()) {
                        return if record.last_modified == modified {
                            Outcome::Unchanged
                        } else {
                            Outcome::Touched(modified)
                        };
                    }
                }
                let mut record = self.extract(path, file_type, &bytes, modified);
                record.content_hash = Some(hash);
                Outcome::Changed(record)
            }
        }
    }

    /// Build a fresh record from file bytes.
    fn extract(&self, path: &str, file_type: &str, bytes: &[u8], modified: u64) -> FileRecord {
        let ext = extension(path).unwrap_or_default();

        if self.config.is_json_extension(ext) {
            let doc = match parse_json(path, bytes) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::debug!("{}", e);
                    return FileRecord::timestamp_only(modified);
                }
            };
            return match self.file_types.instructions_for(file_type) {
                Some(InstructionSet::Json(instructions)) if !instructions.is_empty() => {
                    FileRecord::with_data(modified, self.engine.evaluate(&doc, &instructions))
                }
                _ => FileRecord::timestamp_only(modified),
            };
        }

        if self.config.is_text_extension(ext) {
            if let Some(InstructionSet::Script(name)) = self.file_types.instructions_for(file_type) {
                let text = String::from_utf8_lossy(bytes);
                if let Some(data) = self.text_transforms.run(&name, &text) {
                    return FileRecord::with_data(modified, data);
                }
            }
        }

        FileRecord::timestamp_only(modified)
    }
}
