//! Filesystem watcher driving incremental passes

use crate::session::{PassReport, ProjectSession};
use anyhow::Result;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use packdex_core::cache::RESERVED_FOLDERS;
use packdex_core::{FileSystem, FileWriter};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

/// Events emitted by the file watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
}

impl WatchEvent {
    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::Created(path) | WatchEvent::Modified(path) | WatchEvent::Removed(path) => path,
        }
    }
}

/// Recursive watch over a project root.
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    event_rx: mpsc::UnboundedReceiver<WatchEvent>,
    root_path: PathBuf,
}

impl FileWatcher {
    pub fn new(root_path: impl AsRef<Path>) -> Result<Self> {
        let root_path = root_path.as_ref().to_path_buf();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let root = root_path.clone();
        let watcher = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                debug!("File system event: {:?}", event);
                Self::handle_notify_event(&root, event, &event_tx);
            }
            Err(e) => error!("File system watch error: {}", e),
        })?;

        Ok(Self {
            watcher,
            event_rx,
            root_path,
        })
    }

    fn handle_notify_event(root: &Path, event: notify::Event, event_tx: &mpsc::UnboundedSender<WatchEvent>) {
        let wrap: fn(PathBuf) -> WatchEvent = match event.kind {
            notify::EventKind::Create(_) => WatchEvent::Created,
            notify::EventKind::Modify(_) => WatchEvent::Modified,
            notify::EventKind::Remove(_) => WatchEvent::Removed,
            _ => return,
        };
        for path in event.paths {
            if should_ignore_path(root, &path) {
                continue;
            }
            if let Err(e) = event_tx.send(wrap(path)) {
                warn!("Failed to forward watch event: {}", e);
            }
        }
    }

    pub fn start(&mut self) -> Result<()> {
        info!("Watching project directory: {:?}", self.root_path);
        self.watcher.watch(&self.root_path, RecursiveMode::Recursive)?;
        Ok(())
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn event_receiver(&mut self) -> &mut mpsc::UnboundedReceiver<WatchEvent> {
        &mut self.event_rx
    }
}

/// Debounces watch events and runs one session pass per batch.
pub struct WatcherService<F> {
    watcher: FileWatcher,
    session: Arc<Mutex<ProjectSession<F>>>,
    debounce: Duration,
}

impl<F> WatcherService<F>
where
    F: FileSystem + FileWriter + 'static,
{
    pub fn new(root_path: impl AsRef<Path>, session: Arc<Mutex<ProjectSession<F>>>) -> Result<Self> {
        Ok(Self {
            watcher: FileWatcher::new(root_path)?,
            session,
            debounce: Duration::from_millis(200),
        })
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn start_watching(&mut self) -> Result<()> {
        self.watcher.start()
    }

    /// Run until the event channel closes.
    pub async fn process_events(&mut self) -> Result<()> {
        while let Some(first) = self.watcher.event_receiver().recv().await {
            let mut batch = vec![first];
            let mut closed = false;
            loop {
                match tokio::time::timeout(self.debounce, self.watcher.event_receiver().recv()).await {
                    Ok(Some(event)) => batch.push(event),
                    Ok(None) => {
                        closed = true;
                        break;
                    }
                    Err(_) => break,
                }
            }

            match self.run_batch(batch).await {
                Ok(Some(report)) => info!(
                    "Pass complete: {} changed, {} written, {} deleted",
                    report.changed_files.len(),
                    report.written.len(),
                    report.deleted.len()
                ),
                Ok(None) => {}
                Err(e) => error!("Pass failed: {:#}", e),
            }
            if closed {
                break;
            }
        }
        Ok(())
    }

    /// One pass for a batch of events; `None` when nothing relevant moved.
    pub async fn run_batch(&self, events: Vec<WatchEvent>) -> Result<Option<PassReport>> {
        let root = self.watcher.root_path();
        let relevant = events.iter().filter(|e| !should_ignore_path(root, e.path())).count();
        if relevant == 0 {
            return Ok(None);
        }
        debug!("Running pass for {} events", relevant);

        let mut session = Arc::clone(&self.session).lock_owned().await;
        let report = tokio::task::spawn_blocking(move || session.run_pass()).await??;
        Ok(Some(report))
    }
}

/// Cache, build output and dot-folders never trigger a pass.
fn should_ignore_path(root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut components = relative.components().filter_map(|c| match c {
        Component::Normal(name) => name.to_str(),
        _ => None,
    });
    if let Some(first) = components.clone().next() {
        if RESERVED_FOLDERS.contains(&first) {
            return true;
        }
    }
    components.any(|name| name.starts_with('.') || name == "node_modules")
}

#[cfg(test)]
mod tests {
    use super::*;
    use packdex_core::LocalFs;
    use tempfile::TempDir;
    use tokio::time::{Duration, sleep};

    fn service(dir: &TempDir) -> WatcherService<LocalFs> {
        let fs = Arc::new(LocalFs::new(dir.path()));
        let session = ProjectSession::open(fs).unwrap();
        WatcherService::new(dir.path(), Arc::new(Mutex::new(session))).unwrap()
    }

    #[tokio::test]
    async fn test_file_watcher_creation() {
        let temp_dir = TempDir::new().unwrap();
        assert!(FileWatcher::new(temp_dir.path()).is_ok());
    }

    #[tokio::test]
    async fn test_watch_events() {
        let temp_dir = TempDir::new().unwrap();
        let mut watcher = FileWatcher::new(temp_dir.path()).unwrap();
        watcher.start().unwrap();

        let test_file = temp_dir.path().join("BP").join("pack.json");
        std::fs::create_dir_all(test_file.parent().unwrap()).unwrap();
        std::fs::write(&test_file, "{}").unwrap();
        sleep(Duration::from_millis(100)).await;

        // Delivery timing is platform dependent; only check what arrived.
        if let Ok(event) = watcher.event_receiver().try_recv() {
            assert!(!event.path().starts_with(temp_dir.path().join(".packdex")));
        }
    }

    #[test]
    fn test_ignored_paths() {
        let root = Path::new("/project");
        assert!(should_ignore_path(root, Path::new("/project/.packdex/cache.json")));
        assert!(should_ignore_path(root, Path::new("/project/builds/dev/BP/a.json")));
        assert!(should_ignore_path(root, Path::new("/project/BP/.git/HEAD")));
        assert!(!should_ignore_path(root, Path::new("/project/BP/entities/a.json")));
        assert!(!should_ignore_path(root, Path::new("/project/RP/builds/a.json")));
    }

    #[tokio::test]
    async fn test_batch_of_output_events_runs_no_pass() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir);
        let events = vec![WatchEvent::Modified(temp_dir.path().join("builds/dev/x.json"))];
        assert!(service.run_batch(events).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_batch_runs_pass_and_writes_output() {
        let temp_dir = TempDir::new().unwrap();
        let functions = temp_dir.path().join("BP/functions");
        std::fs::create_dir_all(&functions).unwrap();
        std::fs::write(functions.join("tick.mcfunction"), "say tick\n").unwrap();
        let service = service(&temp_dir);

        let events = vec![
            WatchEvent::Created(functions.join("tick.mcfunction")),
            WatchEvent::Modified(functions.join("tick.mcfunction")),
        ];
        let report = service.run_batch(events).await.unwrap().unwrap();
        assert_eq!(report.changed_files, vec!["BP/functions/tick.mcfunction"]);
        let out = temp_dir.path().join("builds/dev/BP/functions/tick.mcfunction");
        assert_eq!(std::fs::read_to_string(out).unwrap(), "say tick\n");
    }
}
