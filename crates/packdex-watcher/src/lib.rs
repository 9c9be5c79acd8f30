//! Project session and filesystem watching

pub mod session;
pub mod watcher;

pub use session::{PassReport, ProjectSession};
pub use watcher::{FileWatcher, WatchEvent, WatcherService};
