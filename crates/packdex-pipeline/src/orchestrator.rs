//! Incremental build orchestrator
//!
//! Keeps the compiled state of every file between builds. A build first
//! prepares every dirty file (path, read, load, aliases, require), grows the
//! dirty set through require matches until it stops changing, then
//! transforms dirty files so every dependency is transformed before the
//! files requiring it.

use crate::plugin::{Dependency, DependencyResults, FileContent, PathAction, Plugin, PluginContext, PluginRegistry};
use anyhow::{Context, Result};
use globset::GlobSet;
use packdex_core::PackdexConfig;
use packdex_core::file_types::compile_globs;
use packdex_core::{FileSystem, PackdexError};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

/// One emitted output file.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub source_path: String,
    pub output_path: String,
    pub bytes: Vec<u8>,
}

/// A file that left the project since the previous build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedFile {
    pub source_path: String,
    /// Where its artifact was emitted, if it ever was.
    pub output_path: Option<String>,
}

#[derive(Debug, Default)]
pub struct BuildReport {
    pub artifacts: Vec<Artifact>,
    /// Files whose transform chain ran, in execution order.
    pub transformed: Vec<String>,
    pub vetoed: Vec<String>,
    pub removed: Vec<RemovedFile>,
    /// Files that vanished between the scan and the read.
    pub skipped: Vec<String>,
    /// Earlier output paths no longer produced by their source.
    pub stale: Vec<String>,
    /// `(path, error)` for files a hook failed on.
    pub failed: Vec<(String, String)>,
}

struct CompiledFile {
    /// `None` when vetoed.
    output_path: Option<String>,
    loaded: FileContent,
    aliases: Vec<String>,
    requires: Vec<String>,
    require_set: GlobSet,
    transformed: Option<FileContent>,
    /// Output path of the last emitted artifact.
    emitted: Option<String>,
}

impl CompiledFile {
    fn result(&self) -> &FileContent {
        self.transformed.as_ref().unwrap_or(&self.loaded)
    }

    fn answers_to<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        std::iter::once(path).chain(self.aliases.iter().map(String::as_str))
    }
}

pub struct Pipeline {
    fs: Arc<dyn FileSystem>,
    plugins: Vec<Box<dyn Plugin>>,
    files: BTreeMap<String, CompiledFile>,
    /// Files a hook failed on; retried by the next build.
    retry: BTreeSet<String>,
}

impl Pipeline {
    pub fn new(fs: Arc<dyn FileSystem>, plugins: Vec<Box<dyn Plugin>>) -> Self {
        Pipeline {
            fs,
            plugins,
            files: BTreeMap::new(),
            retry: BTreeSet::new(),
        }
    }

    /// Instantiate the configured plugins, in name order.
    pub fn from_config(
        fs: Arc<dyn FileSystem>,
        config: &PackdexConfig,
        registry: &PluginRegistry,
    ) -> packdex_core::Result<Self> {
        let plugins = config
            .plugins
            .iter()
            .map(|(name, options)| {
                registry.create(
                    name,
                    PluginContext {
                        fs: Arc::clone(&fs),
                        options: options.clone(),
                    },
                )
            })
            .collect::<packdex_core::Result<Vec<_>>>()?;
        tracing::debug!("Pipeline with {} plugins", plugins.len());
        Ok(Self::new(fs, plugins))
    }

    /// Forget every compiled file; the next build starts from scratch.
    pub fn reset(&mut self) {
        self.files.clear();
        self.retry.clear();
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Require patterns the file declared in its last preparation.
    pub fn requires_of(&self, path: &str) -> Option<&[String]> {
        self.files.get(path).map(|f| f.requires.as_slice())
    }

    /// Latest transformed (or loaded) content of a file.
    pub fn content_of(&self, path: &str) -> Option<&FileContent> {
        self.files.get(path).map(CompiledFile::result)
    }

    pub fn build(&mut self, all_files: &[String], changed_files: &[String]) -> Result<BuildReport> {
        let mut report = BuildReport::default();

        for plugin in &mut self.plugins {
            let name = plugin.name().to_string();
            plugin.build_start().map_err(|e| PackdexError::Plugin {
                plugin: name,
                message: format!("{:#}", e),
            })?;
        }

        let present: HashSet<&str> = all_files.iter().map(String::as_str).collect();
        let gone: Vec<String> = self
            .files
            .keys()
            .filter(|path| !present.contains(path.as_str()))
            .cloned()
            .collect();
        let mut triggers: Vec<String> = Vec::new();
        for path in gone {
            if let Some(file) = self.files.remove(&path) {
                triggers.extend(file.answers_to(&path).map(str::to_string));
                report.removed.push(RemovedFile {
                    source_path: path,
                    output_path: file.emitted,
                });
            }
        }

        let mut dirty: BTreeSet<String> = changed_files
            .iter()
            .filter(|path| present.contains(path.as_str()))
            .cloned()
            .collect();
        dirty.extend(
            all_files
                .iter()
                .filter(|path| !self.files.contains_key(path.as_str()))
                .cloned(),
        );
        let retry = std::mem::take(&mut self.retry);
        dirty.extend(retry.into_iter().filter(|path| present.contains(path.as_str())));

        for path in dirty.clone() {
            let last = self.files.remove(&path);
            match self.prepare(&path) {
                Ok(Some(mut file)) => {
                    file.emitted = last.and_then(|f| f.emitted);
                    self.files.insert(path, file);
                }
                Ok(None) => {
                    tracing::debug!("Skipping {}: no longer readable", path);
                    dirty.remove(&path);
                    let previous = last.and_then(|f| f.emitted);
                    if previous.is_some() {
                        report.removed.push(RemovedFile {
                            source_path: path.clone(),
                            output_path: previous,
                        });
                    }
                    report.skipped.push(path);
                }
                Err(e) => {
                    tracing::error!("Failed to prepare {}: {:#}", path, e);
                    dirty.remove(&path);
                    // Last good state stays until the retry succeeds.
                    if let Some(last) = last {
                        self.files.insert(path.clone(), last);
                    }
                    self.retry.insert(path.clone());
                    report.failed.push((path, format!("{:#}", e)));
                }
            }
        }

        for path in &dirty {
            if let Some(file) = self.files.get(path) {
                triggers.extend(file.answers_to(path).map(str::to_string));
            }
        }
        self.invalidate(&mut dirty, triggers);

        let order = self.execution_order(&dirty);
        for path in order {
            let transformed = self.run_transform(&path);
            if let Ok((_, Some(stale))) = &transformed {
                report.stale.push(stale.clone());
            }
            match transformed.map(|(artifact, _)| artifact) {
                Ok(Some(artifact)) => {
                    report.transformed.push(path);
                    report.artifacts.push(artifact);
                }
                Ok(None) => {
                    report.transformed.push(path.clone());
                    report.vetoed.push(path);
                }
                Err(e) => {
                    tracing::error!("Failed to transform {}: {:#}", path, e);
                    self.retry.insert(path.clone());
                    report.failed.push((path, format!("{:#}", e)));
                }
            }
        }

        tracing::info!(
            "Build: {} transformed, {} emitted, {} removed",
            report.transformed.len(),
            report.artifacts.len(),
            report.removed.len()
        );
        Ok(report)
    }

    /// Phase A for one file; `None` if it can no longer be read.
    fn prepare(&self, path: &str) -> Result<Option<CompiledFile>> {
        let mut output_path = Some(path.to_string());
        for plugin in &self.plugins {
            let Some(current) = output_path.as_deref() else { break };
            match plugin.transform_path(current) {
                PathAction::Keep => {}
                PathAction::Rename(renamed) => output_path = Some(renamed),
                PathAction::Veto => output_path = None,
            }
        }

        let bytes = match self.fs.read_file(path) {
            Ok(bytes) => bytes,
            Err(PackdexError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut read = None;
        for plugin in &self.plugins {
            if let Some(content) = plugin
                .read(path, &bytes)
                .with_context(|| format!("read hook of `{}` on {}", plugin.name(), path))?
            {
                read = Some(content);
                break;
            }
        }
        let read = read.unwrap_or(FileContent::Raw(bytes));

        let mut loaded = None;
        for plugin in &self.plugins {
            if let Some(content) = plugin
                .load(path, &read)
                .with_context(|| format!("load hook of `{}` on {}", plugin.name(), path))?
            {
                loaded = Some(content);
                break;
            }
        }
        let loaded = loaded.unwrap_or(read);

        let mut aliases = Vec::new();
        let mut requires = Vec::new();
        for plugin in &self.plugins {
            for alias in plugin.register_aliases(path, &loaded) {
                if !aliases.contains(&alias) {
                    aliases.push(alias);
                }
            }
            for pattern in plugin.require(path, &loaded) {
                if !requires.contains(&pattern) {
                    requires.push(pattern);
                }
            }
        }
        let require_set = compile_globs(&requires)?;

        Ok(Some(CompiledFile {
            output_path,
            loaded,
            aliases,
            requires,
            require_set,
            transformed: None,
            emitted: None,
        }))
    }

    /// Grow `dirty` with every file requiring something already dirty.
    fn invalidate(&self, dirty: &mut BTreeSet<String>, mut triggers: Vec<String>) {
        loop {
            let newly: Vec<&String> = self
                .files
                .iter()
                .filter(|(path, file)| {
                    !dirty.contains(path.as_str())
                        && !file.requires.is_empty()
                        && triggers
                            .iter()
                            .any(|t| t != *path && file.require_set.is_match(t))
                })
                .map(|(path, _)| path)
                .collect();
            if newly.is_empty() {
                return;
            }
            for path in newly {
                tracing::debug!("Invalidated {} through its requires", path);
                dirty.insert(path.clone());
                if let Some(file) = self.files.get(path) {
                    triggers.extend(file.answers_to(path).map(str::to_string));
                }
            }
        }
    }

    /// `(pattern, dependency path)` for every other file a require matches.
    fn dependencies_of(&self, path: &str) -> Vec<(String, String)> {
        let Some(file) = self.files.get(path) else {
            return Vec::new();
        };
        if file.requires.is_empty() {
            return Vec::new();
        }
        let mut found = Vec::new();
        for (other, candidate) in &self.files {
            if other == path {
                continue;
            }
            let mut matched: BTreeSet<usize> = BTreeSet::new();
            for name in candidate.answers_to(other) {
                matched.extend(file.require_set.matches(name));
            }
            for idx in matched {
                found.push((file.requires[idx].clone(), other.clone()));
            }
        }
        found
    }

    /// Dirty files in dependency-first order; cycles are cut at the revisit.
    fn execution_order(&self, dirty: &BTreeSet<String>) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut order = Vec::with_capacity(dirty.len());
        for path in dirty {
            self.visit(path, dirty, &mut visited, &mut order);
        }
        order
    }

    fn visit(&self, path: &str, dirty: &BTreeSet<String>, visited: &mut HashSet<String>, order: &mut Vec<String>) {
        if !visited.insert(path.to_string()) {
            return;
        }
        for (_, dependency) in self.dependencies_of(path) {
            if dirty.contains(&dependency) {
                self.visit(&dependency, dirty, visited, order);
            }
        }
        order.push(path.to_string());
    }

    /// Phase B for one file: the artifact (`None` when vetoed) and the
    /// previous output path if it is no longer produced.
    fn run_transform(&mut self, path: &str) -> Result<(Option<Artifact>, Option<String>)> {
        let Some(file) = self.files.get(path) else {
            return Ok((None, None));
        };
        let previous = file.emitted.clone();

        let mut dependencies: DependencyResults =
            file.requires.iter().map(|p| (p.clone(), Vec::new())).collect();
        for (pattern, dependency) in self.dependencies_of(path) {
            if let Some(dep) = self.files.get(&dependency) {
                dependencies.entry(pattern).or_default().push(Dependency {
                    path: dependency,
                    content: dep.result().clone(),
                });
            }
        }

        let mut content = file.loaded.clone();
        for plugin in &self.plugins {
            if let Some(next) = plugin
                .transform(path, &content, &dependencies)
                .with_context(|| format!("transform hook of `{}` on {}", plugin.name(), path))?
            {
                content = next;
            }
        }

        let artifact = match &file.output_path {
            Some(output_path) => {
                let mut finalized = None;
                for plugin in &self.plugins {
                    if let Some(bytes) = plugin
                        .finalize_build(path, &content)
                        .with_context(|| format!("finalize_build of `{}` on {}", plugin.name(), path))?
                    {
                        finalized = Some(bytes);
                        break;
                    }
                }
                let bytes = match finalized {
                    Some(bytes) => bytes,
                    None => content.to_bytes()?,
                };
                Some(Artifact {
                    source_path: path.to_string(),
                    output_path: output_path.clone(),
                    bytes,
                })
            }
            None => None,
        };

        let emitted = artifact.as_ref().map(|a| a.output_path.clone());
        let stale = previous.filter(|p| emitted.as_ref() != Some(p));
        if let Some(file) = self.files.get_mut(path) {
            file.transformed = Some(content);
            file.emitted = emitted;
        }
        Ok((artifact, stale))
    }
}
