//! CLI command implementations

use packdex_core::{LocalFs, PermissionStatus};
use packdex_watcher::{PassReport, ProjectSession, WatcherService};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

fn open(root: &Path) -> anyhow::Result<ProjectSession<LocalFs>> {
    ProjectSession::open(Arc::new(LocalFs::new(root)))
}

fn ensure_granted(status: PermissionStatus, root: &Path) -> anyhow::Result<()> {
    match status {
        PermissionStatus::Granted => Ok(()),
        PermissionStatus::Denied => anyhow::bail!("permission denied: {}", root.display()),
        PermissionStatus::Missing => anyhow::bail!("project root not found: {}", root.display()),
    }
}

pub fn index(root: PathBuf) -> anyhow::Result<()> {
    tracing::info!("Indexing project: {}", root.display());

    let mut session = open(&root)?;
    let scan = session.index()?;
    ensure_granted(scan.status, &root)?;

    println!(
        "{} files indexed, {} changed, {} graph nodes",
        scan.all_files.len(),
        scan.changed_files.len(),
        session.graph().node_count()
    );
    Ok(())
}

pub fn graph(root: PathBuf, path: &str) -> anyhow::Result<()> {
    let mut session = open(&root)?;
    let scan = session.index()?;
    ensure_granted(scan.status, &root)?;

    let graph = session.graph();
    let file_type = session.file_types().id_for(path);
    let Some(id) = graph.lookup(file_type, path) else {
        anyhow::bail!("{} is not part of the graph", path);
    };
    let describe = |id| {
        graph
            .node(id)
            .map(|n| format!("{} ({}, {})", n.file_path, n.file_type, n.identifier))
            .unwrap_or_default()
    };

    println!("{}", describe(id));
    if graph.is_feature_folder(id) {
        println!("  feature folder");
    }
    for parent in graph.parents(id) {
        println!("  <- {}", describe(parent));
    }
    for child in graph.children(id) {
        println!("  -> {}", describe(child));
    }
    let directory = graph.to_directory(id);
    println!("directory ({} files):", directory.len());
    for member in directory {
        println!("  {}", describe(member));
    }
    Ok(())
}

pub fn build(root: PathBuf, json: bool) -> anyhow::Result<()> {
    tracing::info!("Building project: {}", root.display());

    let mut session = open(&root)?;
    let report = session.run_pass()?;
    ensure_granted(report.status, &root)?;
    print_report(&report, json)?;

    if !report.failed.is_empty() {
        anyhow::bail!("{} files failed to build", report.failed.len());
    }
    Ok(())
}

fn print_report(report: &PassReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!(
        "{} files, {} changed, {} written, {} deleted",
        report.total_files,
        report.changed_files.len(),
        report.written.len(),
        report.deleted.len()
    );
    for path in &report.failed {
        println!("  failed: {}", path);
    }
    Ok(())
}

pub async fn watch(root: PathBuf, debounce: u64) -> anyhow::Result<()> {
    let session = Arc::new(Mutex::new(open(&root)?));
    {
        let mut session = session.lock().await;
        let report = session.run_pass()?;
        ensure_granted(report.status, &root)?;
        print_report(&report, false)?;
    }

    tracing::info!("Starting file watcher for: {}", root.display());
    let mut watcher = WatcherService::new(&root, session)?.with_debounce(Duration::from_millis(debounce));
    watcher.start_watching()?;
    watcher.process_events().await
}

pub fn clear(root: PathBuf, all: bool) -> anyhow::Result<()> {
    tracing::info!("Clearing cache for: {}", root.display());

    let mut session = open(&root)?;
    session.clear(all)?;

    tracing::info!("Cache cleared");
    Ok(())
}
