//! packdex core: data model, store contract, file types and dependency graph

pub mod cache;
pub mod config;
pub mod document_path;
pub mod error;
pub mod file_types;
pub mod fs;
pub mod graph;
pub mod model;
pub mod store;


pub use config::PackdexConfig;
pub use document_path::DocumentPath;
pub use error::{PackdexError, Result};
pub use file_types::{ConnectRule, ConnectionRules, FileTypeDefinition, FileTypeRegistry, Instruction, InstructionSet, TargetPaths};
pub use fs::{FileSystem, FileWriter, LocalFs, MemoryFs};
pub use graph::{DependencyGraph, FileNode, GraphContext, NodeId, seed_paths_in};
pub use model::{CacheData, ChangeDetection, DirEntry, EntryKind, FileRecord, PermissionStatus};
pub use store::{JsonStore, Store};
