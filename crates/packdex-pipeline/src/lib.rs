//! Transform pipeline: plugin hook contract and the orchestrator that runs it

pub mod commands;
pub mod orchestrator;
pub mod plugin;


pub use orchestrator::{Artifact, BuildReport, Pipeline, RemovedFile};
pub use plugin::{Dependency, DependencyResults, FileContent, PathAction, Plugin, PluginContext, PluginRegistry};
