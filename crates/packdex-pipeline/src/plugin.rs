//! Plugin hook contract
//!
//! Every hook has a pass-through default, so a plugin only implements the
//! stages it cares about. For one file the orchestrator calls the hooks in
//! this order: `build_start` (once per build), `transform_path`, `read`,
//! `load`, `register_aliases`, `require`, `transform`, `finalize_build`.
//! Nothing orders hooks of different files relative to each other.

use anyhow::Result;
use packdex_core::{FileSystem, PackdexError};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;

/// In-memory domain object passed between hooks.
#[derive(Debug, Clone, PartialEq)]
pub enum FileContent {
    Raw(Vec<u8>),
    Text(String),
    Json(serde_json::Value),
}

impl FileContent {
    /// Default serialization used when no plugin finalizes the file.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(match self {
            FileContent::Raw(bytes) => bytes.clone(),
            FileContent::Text(text) => text.clone().into_bytes(),
            FileContent::Json(value) => serde_json::to_vec_pretty(value)?,
        })
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            FileContent::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FileContent::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Decision of the `transform_path` hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathAction {
    Keep,
    Rename(String),
    /// Exclude the file from build output.
    Veto,
}

/// A required file's already-computed result.
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    pub path: String,
    pub content: FileContent,
}

/// Require pattern -> files it matched.
pub type DependencyResults = BTreeMap<String, Vec<Dependency>>;

pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Load shared configuration; runs once at the start of every build.
    fn build_start(&mut self) -> Result<()> {
        Ok(())
    }

    fn transform_path(&self, _path: &str) -> PathAction {
        PathAction::Keep
    }

    /// Parse raw bytes into a domain object this plugin understands.
    fn read(&self, _path: &str, _bytes: &[u8]) -> Result<Option<FileContent>> {
        Ok(None)
    }

    fn load(&self, _path: &str, _content: &FileContent) -> Result<Option<FileContent>> {
        Ok(None)
    }

    /// Alternate names other files may use to require this one.
    fn register_aliases(&self, _path: &str, _content: &FileContent) -> Vec<String> {
        Vec::new()
    }

    /// Glob patterns of files whose changes invalidate this file.
    fn require(&self, _path: &str, _content: &FileContent) -> Vec<String> {
        Vec::new()
    }

    fn transform(
        &self,
        _path: &str,
        _content: &FileContent,
        _dependencies: &DependencyResults,
    ) -> Result<Option<FileContent>> {
        Ok(None)
    }

    fn finalize_build(&self, _path: &str, _content: &FileContent) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// What a plugin is constructed from.
pub struct PluginContext {
    /// Read-only view of the project.
    pub fs: Arc<dyn FileSystem>,
    pub options: serde_json::Value,
}

impl PluginContext {
    /// Deserialize and validate this plugin's options.
    pub fn options<T: DeserializeOwned>(&self, plugin: &str) -> packdex_core::Result<T> {
        let options = if self.options.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            self.options.clone()
        };
        serde_json::from_value(options)
            .map_err(|e| PackdexError::Config(format!("invalid options for plugin `{}`: {}", plugin, e)))
    }
}

pub type PluginFactory = fn(PluginContext) -> packdex_core::Result<Box<dyn Plugin>>;

/// Plugin constructors keyed by name.
pub struct PluginRegistry {
    factories: BTreeMap<String, PluginFactory>,
}

impl PluginRegistry {
    pub fn empty() -> Self {
        PluginRegistry {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with the plugins shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(crate::commands::PLUGIN_NAME, crate::commands::create);
        registry
    }

    pub fn register(&mut self, name: &str, factory: PluginFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    pub fn create(&self, name: &str, ctx: PluginContext) -> packdex_core::Result<Box<dyn Plugin>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| PackdexError::Config(format!("unknown plugin `{}`", name)))?;
        factory(ctx)
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
