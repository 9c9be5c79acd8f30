//! One open project: every registry a pass needs, owned in one place

use anyhow::{Context, Result};
use packdex_core::cache::{self, CACHE_FILE};
use packdex_core::config::CONFIG_FILE;
use packdex_core::model::join_path;
use packdex_core::{
    DependencyGraph, FileSystem, FileTypeRegistry, FileWriter, GraphContext, JsonStore,
    PackdexConfig, PermissionStatus,
};
use packdex_indexer::{IndexingCache, ScanReport};
use packdex_pipeline::{Pipeline, PluginRegistry};
use serde::Serialize;
use std::sync::Arc;

/// Summary of one scan + build pass.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub status: PermissionStatus,
    pub total_files: usize,
    pub changed_files: Vec<String>,
    pub graph_nodes: usize,
    pub graph_edges: usize,
    /// Output paths written, relative to the project root.
    pub written: Vec<String>,
    /// Output paths deleted.
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

impl PassReport {
    fn denied(scan: &ScanReport) -> Self {
        PassReport {
            status: scan.status,
            total_files: 0,
            changed_files: Vec::new(),
            graph_nodes: 0,
            graph_edges: 0,
            written: Vec::new(),
            deleted: Vec::new(),
            failed: Vec::new(),
        }
    }
}

pub struct ProjectSession<F> {
    fs: Arc<F>,
    config: PackdexConfig,
    file_types: FileTypeRegistry,
    store: JsonStore<F>,
    graph: DependencyGraph,
    graph_ready: bool,
    pipeline: Pipeline,
}

impl<F> ProjectSession<F>
where
    F: FileSystem + FileWriter + 'static,
{
    /// Open a project, reading `packdex.toml` through `fs`.
    pub fn open(fs: Arc<F>) -> Result<Self> {
        let config = PackdexConfig::load_from(&*fs).context("failed to load configuration")?;
        Self::with_config(fs, config, &PluginRegistry::with_builtins())
    }

    pub fn with_config(fs: Arc<F>, config: PackdexConfig, plugins: &PluginRegistry) -> Result<Self> {
        let file_types = config.file_type_registry()?;
        let project: Arc<dyn FileSystem> = fs.clone();
        let pipeline = Pipeline::from_config(project, &config, plugins)?;
        Ok(ProjectSession {
            store: JsonStore::with_path(Arc::clone(&fs), CACHE_FILE),
            fs,
            config,
            file_types,
            graph: DependencyGraph::new(),
            graph_ready: false,
            pipeline,
        })
    }

    pub fn config(&self) -> &PackdexConfig {
        &self.config
    }

    pub fn file_types(&self) -> &FileTypeRegistry {
        &self.file_types
    }

    pub fn store(&self) -> &JsonStore<F> {
        &self.store
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Scan only; the graph and build output are left alone.
    pub fn scan(&mut self) -> Result<ScanReport> {
        let mut cache = IndexingCache::new(&*self.fs, &mut self.store, &self.file_types, &self.config);
        Ok(cache.start()?)
    }

    /// Bring the graph up to date with a finished scan.
    fn update_graph(&mut self, scan: &ScanReport) {
        let ctx = GraphContext {
            store: &self.store,
            file_types: &self.file_types,
        };
        if !self.graph_ready {
            self.graph.setup(ctx, &scan.all_files);
            self.graph_ready = true;
            return;
        }
        let rebuilt = self.graph.refresh(ctx, &scan.changed_files);
        for path in &scan.changed_files {
            self.graph.create(ctx, path, false);
        }
        tracing::debug!("Graph: {} nodes rebuilt", rebuilt);
    }

    /// Scan and bring the graph up to date.
    pub fn index(&mut self) -> Result<ScanReport> {
        let scan = self.scan()?;
        if scan.status == PermissionStatus::Granted {
            self.update_graph(&scan);
        }
        Ok(scan)
    }

    /// Scan, relink and build; artifacts land under `output_dir`.
    pub fn run_pass(&mut self) -> Result<PassReport> {
        let scan = self.index()?;
        if scan.status != PermissionStatus::Granted {
            return Ok(PassReport::denied(&scan));
        }

        let sources: Vec<String> = scan
            .all_files
            .iter()
            .filter(|p| p.as_str() != CONFIG_FILE)
            .cloned()
            .collect();
        let build = self.pipeline.build(&sources, &scan.changed_files)?;

        let mut written = Vec::with_capacity(build.artifacts.len());
        for artifact in &build.artifacts {
            let out = join_path(&self.config.output_dir, &artifact.output_path);
            self.fs
                .write_file(&out, &artifact.bytes)
                .with_context(|| format!("failed to write {}", out))?;
            written.push(out);
        }

        let mut deleted = Vec::new();
        let stale = build
            .removed
            .iter()
            .filter_map(|r| r.output_path.as_deref())
            .chain(build.stale.iter().map(String::as_str));
        for output in stale {
            let out = join_path(&self.config.output_dir, output);
            if written.contains(&out) {
                continue;
            }
            match self.fs.remove_file(&out) {
                Ok(()) => deleted.push(out),
                Err(e) if e.is_not_found() => {}
                Err(e) => tracing::warn!("Cannot remove stale output {}: {}", out, e),
            }
        }

        Ok(PassReport {
            status: scan.status,
            total_files: scan.all_files.len(),
            changed_files: scan.changed_files,
            graph_nodes: self.graph.node_count(),
            graph_edges: self.graph.edge_count(),
            written,
            deleted,
            failed: build.failed.into_iter().map(|(path, _)| path).collect(),
        })
    }

    /// Drop the persisted cache and every in-memory registry built from it.
    pub fn clear(&mut self, with_builds: bool) -> Result<()> {
        if with_builds {
            cache::clear_all(&*self.fs)?;
        } else {
            cache::clear_cache(&*self.fs)?;
        }
        self.store = JsonStore::with_path(Arc::clone(&self.fs), CACHE_FILE);
        self.graph = DependencyGraph::new();
        self.graph_ready = false;
        self.pipeline.reset();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packdex_core::{MemoryFs, Store};

    fn project() -> Arc<MemoryFs> {
        let fs = Arc::new(MemoryFs::new());
        fs.insert(
            CONFIG_FILE,
            "[plugins.custom_commands]\nemit_definitions = false\n",
            1,
        );
        fs.insert(
            "BP/entities/zombie.json",
            r#"{ "minecraft:entity": { "description": { "identifier": "test:zombie" } } }"#,
            1,
        );
        fs.insert(
            "RP/entity/zombie.json",
            r#"{ "minecraft:client_entity": { "description": { "identifier": "test:zombie" } } }"#,
            1,
        );
        fs.insert("BP/commands/hello.json", r#"{ "name": "hello", "commands": ["say hello $1"] }"#, 1);
        fs.insert("BP/functions/main.mcfunction", "hello world\n", 1);
        fs
    }

    #[test]
    fn test_first_pass_builds_everything() {
        let fs = project();
        let mut session = ProjectSession::open(fs.clone()).unwrap();
        let report = session.run_pass().unwrap();

        assert_eq!(report.status, PermissionStatus::Granted);
        assert_eq!(report.total_files, 5);
        assert!(report.written.contains(&"builds/dev/BP/functions/main.mcfunction".to_string()));
        assert!(!report.written.iter().any(|p| p.contains("commands/hello.json")));
        assert!(!report.written.iter().any(|p| p.ends_with(CONFIG_FILE)));
        assert_eq!(
            fs.contents("builds/dev/BP/functions/main.mcfunction").unwrap(),
            b"say hello world\n".to_vec()
        );
        assert!(fs.contents(CACHE_FILE).is_some());

        let zombie = session.graph().lookup("entity", "BP/entities/zombie.json").unwrap();
        let client = session.graph().lookup("client_entity", "RP/entity/zombie.json").unwrap();
        assert_eq!(session.graph().children(zombie), vec![client]);
    }

    #[test]
    fn test_quiet_pass_writes_nothing() {
        let fs = project();
        let mut session = ProjectSession::open(fs.clone()).unwrap();
        session.run_pass().unwrap();

        let report = session.run_pass().unwrap();
        assert!(report.changed_files.is_empty());
        assert!(report.written.is_empty());
    }

    #[test]
    fn test_definition_edit_rebuilds_function() {
        let fs = project();
        let mut session = ProjectSession::open(fs.clone()).unwrap();
        session.run_pass().unwrap();

        fs.insert("BP/commands/hello.json", r#"{ "name": "hello", "commands": ["say hi $1"] }"#, 2);
        let report = session.run_pass().unwrap();
        assert_eq!(report.changed_files, vec!["BP/commands/hello.json"]);
        assert_eq!(report.written, vec!["builds/dev/BP/functions/main.mcfunction"]);
        assert_eq!(
            fs.contents("builds/dev/BP/functions/main.mcfunction").unwrap(),
            b"say hi world\n".to_vec()
        );
    }

    #[test]
    fn test_deleted_source_removes_output() {
        let fs = project();
        let mut session = ProjectSession::open(fs.clone()).unwrap();
        session.run_pass().unwrap();
        assert!(fs.contents("builds/dev/RP/entity/zombie.json").is_some());

        fs.remove("RP/entity/zombie.json");
        let report = session.run_pass().unwrap();
        assert_eq!(report.deleted, vec!["builds/dev/RP/entity/zombie.json"]);
        assert!(fs.contents("builds/dev/RP/entity/zombie.json").is_none());
        assert!(session.store().get("RP/entity/zombie.json", "client_entity").is_none());
    }

    #[test]
    fn test_source_deleted_after_failed_build_removes_output() {
        let fs = project();
        let mut session = ProjectSession::open(fs.clone()).unwrap();
        session.run_pass().unwrap();
        assert!(fs.contents("builds/dev/BP/entities/zombie.json").is_some());

        fs.insert("BP/entities/zombie.json", "{ not json", 2);
        let report = session.run_pass().unwrap();
        assert_eq!(report.failed, vec!["BP/entities/zombie.json"]);
        assert!(report.deleted.is_empty());

        fs.remove("BP/entities/zombie.json");
        let report = session.run_pass().unwrap();
        assert_eq!(report.deleted, vec!["builds/dev/BP/entities/zombie.json"]);
        assert!(fs.contents("builds/dev/BP/entities/zombie.json").is_none());
    }

    #[test]
    fn test_denied_project_reports_status() {
        let fs = project();
        fs.deny("");
        let mut session = ProjectSession::with_config(
            fs.clone(),
            PackdexConfig::default(),
            &PluginRegistry::with_builtins(),
        )
        .unwrap();
        let report = session.run_pass().unwrap();
        assert_eq!(report.status, PermissionStatus::Denied);
        assert!(report.written.is_empty());
    }

    #[test]
    fn test_clear_forces_full_rebuild() {
        let fs = project();
        let mut session = ProjectSession::open(fs.clone()).unwrap();
        session.run_pass().unwrap();

        session.clear(true).unwrap();
        assert!(fs.contents(CACHE_FILE).is_none());
        assert_eq!(session.store().total_files(), 0);

        let report = session.run_pass().unwrap();
        assert_eq!(report.changed_files.len(), 5);
        assert!(fs.contents("builds/dev/BP/functions/main.mcfunction").is_some());
    }

    #[test]
    fn test_unknown_plugin_fails_to_open() {
        let fs = Arc::new(MemoryFs::new());
        fs.insert(CONFIG_FILE, "[plugins.missing]\n", 1);
        assert!(ProjectSession::open(fs).is_err());
    }
}
