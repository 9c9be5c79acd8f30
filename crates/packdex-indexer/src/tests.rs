//! Unit tests for the indexing cache

use crate::indexing_cache::IndexingCache;
use packdex_core::cache::CACHE_FILE;
use packdex_core::{
    ChangeDetection, FileTypeDefinition, FileTypeRegistry, Instruction, JsonStore, MemoryFs,
    PackdexConfig, PermissionStatus, Store, TargetPaths,
};
use std::sync::Arc;

const ZOMBIE: &str = r#"{
    "minecraft:entity": {
        "description": { "identifier": "test:zombie" },
        "components": { "minecraft:loot": { "table": "loot_tables/zombie.json" } },
    }, // trailing commas and comments are fine
}"#;

struct Fixture {
    fs: Arc<MemoryFs>,
    store: JsonStore<MemoryFs>,
    file_types: FileTypeRegistry,
    config: PackdexConfig,
}

impl Fixture {
    fn new() -> Self {
        let fs = Arc::new(MemoryFs::new());
        let config = PackdexConfig::default();
        Fixture {
            store: JsonStore::new(Arc::clone(&fs)),
            file_types: config.file_type_registry().unwrap(),
            fs,
            config,
        }
    }

    fn scan(&mut self) -> crate::ScanReport {
        IndexingCache::new(&*self.fs, &mut self.store, &self.file_types, &self.config)
            .start()
            .unwrap()
    }

    fn cache_writes(&self) -> usize {
        self.fs.writes().iter().filter(|p| p.as_str() == CACHE_FILE).count()
    }
}

#[test]
fn test_first_scan_extracts_and_persists() {
    let mut fx = Fixture::new();
    fx.fs.insert("BP/entities/zombie.json", ZOMBIE, 10);
    fx.fs.insert("BP/functions/tick.mcfunction", "say hi\nfunction boss/spawn", 10);
    fx.fs.insert("RP/textures/zombie.png", vec![0u8, 1, 2], 10);

    let report = fx.scan();
    assert_eq!(report.status, PermissionStatus::Granted);
    assert_eq!(
        report.all_files,
        vec![
            "BP/entities/zombie.json",
            "BP/functions/tick.mcfunction",
            "RP/textures/zombie.png"
        ]
    );
    assert_eq!(report.changed_files, report.all_files);
    assert!(report.persisted);
    assert_eq!(fx.cache_writes(), 1);

    let zombie = fx.store.get("BP/entities/zombie.json", "entity").unwrap();
    assert_eq!(zombie.last_modified, 10);
    assert_eq!(zombie.values("identifier"), &["test:zombie".to_string()]);
    assert_eq!(zombie.values("loot_table"), &["loot_tables/zombie.json".to_string()]);

    let tick = fx.store.get("BP/functions/tick.mcfunction", "function").unwrap();
    assert_eq!(tick.values("function"), &["boss/spawn".to_string()]);

    let texture = fx.store.get("RP/textures/zombie.png", "unknown").unwrap();
    assert!(texture.data.is_none());
}

#[test]
fn test_rescan_without_changes_is_idempotent() {
    let mut fx = Fixture::new();
    fx.fs.insert("BP/entities/zombie.json", ZOMBIE, 10);
    fx.fs.insert("BP/functions/tick.mcfunction", "say hi", 10);
    fx.scan();
    let writes = fx.cache_writes();

    let report = fx.scan();
    assert!(report.changed_files.is_empty());
    assert_eq!(report.all_files.len(), 2);
    assert!(!report.persisted);
    assert_eq!(fx.cache_writes(), writes);
}

#[test]
fn test_same_timestamp_is_not_reparsed() {
    let fs = Arc::new(MemoryFs::new());
    fs.insert(
        CACHE_FILE,
        r#"{"x": {"root/a.json": {"lastModified": 100, "data": {"identifier": ["cached"]}}}}"#,
        1,
    );
    fs.insert("root/a.json", r#"{"id": "fresh"}"#, 100);

    let file_types = FileTypeRegistry::new(vec![FileTypeDefinition {
        id: "x".to_string(),
        patterns: vec!["root/*.json".to_string()],
        instructions: vec![Instruction {
            target_paths: TargetPaths::One("id".to_string()),
            output_key: "identifier".to_string(),
            filter: Vec::new(),
            map_fn: None,
        }],
        script: None,
        connections: Default::default(),
    }])
    .unwrap();
    let config = PackdexConfig::default();
    let mut store = JsonStore::new(Arc::clone(&fs));

    let report = IndexingCache::new(&*fs, &mut store, &file_types, &config)
        .start()
        .unwrap();
    assert_eq!(report.all_files, vec!["root/a.json"]);
    assert!(report.changed_files.is_empty());
    assert!(!report.persisted);
    assert_eq!(
        store.get("root/a.json", "x").unwrap().values("identifier"),
        &["cached".to_string()]
    );

    // A new timestamp triggers extraction.
    fs.touch("root/a.json", 101);
    let report = IndexingCache::new(&*fs, &mut store, &file_types, &config)
        .start()
        .unwrap();
    assert_eq!(report.changed_files, vec!["root/a.json"]);
    assert_eq!(
        store.get("root/a.json", "x").unwrap().values("identifier"),
        &["fresh".to_string()]
    );
}

#[test]
fn test_malformed_json_stores_timestamp_only() {
    let mut fx = Fixture::new();
    fx.fs.insert("BP/entities/broken.json", "{ \"minecraft:entity\": ", 5);

    let report = fx.scan();
    assert_eq!(report.changed_files, vec!["BP/entities/broken.json"]);
    let record = fx.store.get("BP/entities/broken.json", "entity").unwrap();
    assert_eq!(record.last_modified, 5);
    assert!(record.data.is_none());
}

#[test]
fn test_json_without_instructions_stores_timestamp_only() {
    let mut fx = Fixture::new();
    fx.fs.insert("BP/manifest.json", r#"{"format_version": 2}"#, 5);
    fx.scan();
    assert!(fx.store.get("BP/manifest.json", "unknown").unwrap().data.is_none());
}

#[test]
fn test_ignored_folders_and_dot_files() {
    let mut fx = Fixture::new();
    fx.config.ignore_folders = vec!["RP/textures".to_string()];
    fx.fs.insert("RP/textures/a.png", vec![0u8], 1);
    fx.fs.insert("RP/textures_extra/b.png", vec![0u8], 1);
    fx.fs.insert("BP/.hidden.json", "{}", 1);
    fx.fs.insert("builds/dev/BP/out.json", "{}", 1);
    fx.fs.insert("BP/keep.json", "{}", 1);

    let report = fx.scan();
    assert_eq!(report.all_files, vec!["BP/keep.json", "RP/textures_extra/b.png"]);
}

#[test]
fn test_deleted_file_triggers_persist_and_prune() {
    let mut fx = Fixture::new();
    fx.fs.insert("BP/a.json", "{}", 1);
    fx.fs.insert("BP/b.json", "{}", 1);
    fx.scan();
    let writes = fx.cache_writes();

    fx.fs.remove("BP/b.json");
    let report = fx.scan();
    assert!(report.changed_files.is_empty());
    assert!(report.persisted);
    assert_eq!(fx.cache_writes(), writes + 1);
    assert_eq!(fx.store.all_files(), vec!["BP/a.json"]);
}

#[test]
fn test_fast_path_skips_walk() {
    let mut fx = Fixture::new();
    fx.fs.insert("BP/a.json", "{}", 1);
    fx.scan();

    fx.config.fast_path = true;
    fx.fs.insert("BP/new.json", "{}", 2);
    fx.fs.touch("BP/a.json", 3);
    let report = fx.scan();
    assert_eq!(report.all_files, vec!["BP/a.json"]);
    assert!(report.changed_files.is_empty());
    assert!(!report.persisted);
}

#[test]
fn test_fast_path_walks_when_cache_is_empty() {
    let mut fx = Fixture::new();
    fx.config.fast_path = true;
    fx.fs.insert("BP/a.json", "{}", 1);
    let report = fx.scan();
    assert_eq!(report.changed_files, vec!["BP/a.json"]);
}

#[test]
fn test_denied_root_reports_status() {
    let mut fx = Fixture::new();
    fx.fs.insert("BP/a.json", "{}", 1);
    fx.fs.deny("");
    let report = fx.scan();
    assert_eq!(report.status, PermissionStatus::Denied);
    assert!(report.all_files.is_empty());
    assert!(!report.persisted);
}

#[test]
fn test_content_hash_mode() {
    let mut fx = Fixture::new();
    fx.config.change_detection = ChangeDetection::ContentHash;
    fx.fs.insert("BP/entities/zombie.json", ZOMBIE, 10);
    fx.scan();
    assert!(fx
        .store
        .get("BP/entities/zombie.json", "entity")
        .unwrap()
        .content_hash
        .is_some());

    // Same bytes, new timestamp: unchanged but the timestamp follows.
    fx.fs.touch("BP/entities/zombie.json", 11);
    let report = fx.scan();
    assert!(report.changed_files.is_empty());
    assert_eq!(fx.store.last_modified("BP/entities/zombie.json", "entity"), Some(11));

    // New bytes, same timestamp: caught by the hash.
    fx.fs.insert(
        "BP/entities/zombie.json",
        ZOMBIE.replace("test:zombie", "test:husk"),
        11,
    );
    let report = fx.scan();
    assert_eq!(report.changed_files, vec!["BP/entities/zombie.json"]);
    assert_eq!(
        fx.store
            .get("BP/entities/zombie.json", "entity")
            .unwrap()
            .values("identifier"),
        &["test:husk".to_string()]
    );
}

#[test]
fn test_content_hash_touch_is_persisted() {
    let mut fx = Fixture::new();
    fx.config.change_detection = ChangeDetection::ContentHash;
    fx.fs.insert("BP/entities/zombie.json", ZOMBIE, 10);
    fx.scan();
    let writes = fx.cache_writes();

    fx.fs.touch("BP/entities/zombie.json", 11);
    let report = fx.scan();
    assert!(report.changed_files.is_empty());
    assert!(report.persisted);
    assert_eq!(fx.cache_writes(), writes + 1);

    let mut reopened = JsonStore::new(Arc::clone(&fx.fs));
    reopened.setup().unwrap();
    assert_eq!(reopened.last_modified("BP/entities/zombie.json", "entity"), Some(11));
}

#[test]
fn test_progress_counts_every_file() {
    let mut fx = Fixture::new();
    fx.fs.insert("BP/a.json", "{}", 1);
    fx.fs.insert("BP/b.json", "{}", 1);
    let mut cache = IndexingCache::new(&*fx.fs, &mut fx.store, &fx.file_types, &fx.config);
    let progress = cache.progress();
    cache.start().unwrap();
    assert_eq!(progress.total(), 2);
    assert_eq!(progress.done(), 2);
}
