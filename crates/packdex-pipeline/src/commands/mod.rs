//! `custom_commands` plugin
//!
//! Command definitions (`{ "name": ..., "commands": [...] }`) under the
//! definitions folder expand wherever a statement calls them: every line of
//! a function file, and the document locations configured for JSON files.
//! Definitions are build inputs only and are not emitted unless asked.

mod transformer;

pub use transformer::{CommandSet, CommandTransformer, MacroExpander};

use crate::plugin::{DependencyResults, FileContent, PathAction, Plugin, PluginContext};
use anyhow::{Context, Result};
use globset::GlobSet;
use packdex_core::file_types::compile_globs;
use packdex_core::fs::parse_json;
use packdex_core::{DocumentPath, FileSystem, PackdexError, TargetPaths};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const PLUGIN_NAME: &str = "custom_commands";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CustomCommandsOptions {
    pub definitions_folder: String,
    pub functions_folder: String,
    /// Also emit the definition files themselves.
    pub emit_definitions: bool,
    /// Glob -> document path(s) holding commands; overrides the defaults.
    pub command_locations: BTreeMap<String, TargetPaths>,
    /// Project file with more `command_locations`, re-read every build.
    pub locations_file: Option<String>,
}

impl Default for CustomCommandsOptions {
    fn default() -> Self {
        CustomCommandsOptions {
            definitions_folder: "BP/commands".to_string(),
            functions_folder: "BP/functions".to_string(),
            emit_definitions: false,
            command_locations: BTreeMap::new(),
            locations_file: None,
        }
    }
}

/// One custom command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDefinition {
    pub name: String,
    #[serde(default)]
    pub commands: Vec<String>,
}

/// Where embedded commands live in JSON files.
pub fn default_locations() -> BTreeMap<String, TargetPaths> {
    let mut locations = BTreeMap::new();
    locations.insert(
        "BP/entities/**/*.json".to_string(),
        TargetPaths::One("minecraft:entity/events/*/run_command/command".to_string()),
    );
    locations.insert(
        "BP/animation_controllers/**/*.json".to_string(),
        TargetPaths::Many(vec![
            "animation_controllers/*/states/*/on_entry".to_string(),
            "animation_controllers/*/states/*/on_exit".to_string(),
        ]),
    );
    locations.insert(
        "BP/animations/**/*.json".to_string(),
        TargetPaths::One("animations/*/timeline/*".to_string()),
    );
    locations
}

struct Location {
    files: GlobSet,
    paths: Vec<DocumentPath>,
}

fn compile_locations(locations: &BTreeMap<String, TargetPaths>) -> packdex_core::Result<Vec<Location>> {
    locations
        .iter()
        .map(|(glob, paths)| -> packdex_core::Result<Location> {
            Ok(Location {
                files: compile_globs(std::slice::from_ref(glob))?,
                paths: paths.iter().map(DocumentPath::parse).collect(),
            })
        })
        .collect()
}

pub struct CustomCommandsPlugin {
    fs: Arc<dyn FileSystem>,
    options: CustomCommandsOptions,
    locations: Vec<Location>,
    transformer: Box<dyn CommandTransformer>,
}

/// Registry constructor.
pub fn create(ctx: PluginContext) -> packdex_core::Result<Box<dyn Plugin>> {
    let options = ctx.options::<CustomCommandsOptions>(PLUGIN_NAME)?;
    Ok(Box::new(CustomCommandsPlugin::new(ctx.fs, options)?))
}

impl CustomCommandsPlugin {
    pub fn new(fs: Arc<dyn FileSystem>, options: CustomCommandsOptions) -> packdex_core::Result<Self> {
        let mut merged = default_locations();
        merged.extend(options.command_locations.clone());
        let locations = compile_locations(&merged)?;
        Ok(CustomCommandsPlugin {
            fs,
            options,
            locations,
            transformer: Box::new(MacroExpander),
        })
    }

    pub fn with_transformer(mut self, transformer: Box<dyn CommandTransformer>) -> Self {
        self.transformer = transformer;
        self
    }

    fn is_definition(&self, path: &str) -> bool {
        in_folder(path, &self.options.definitions_folder) && path.ends_with(".json")
    }

    fn is_function(&self, path: &str) -> bool {
        in_folder(path, &self.options.functions_folder) && path.ends_with(".mcfunction")
    }

    fn locations_for(&self, path: &str) -> Vec<&DocumentPath> {
        if !path.ends_with(".json") || self.is_definition(path) {
            return Vec::new();
        }
        self.locations
            .iter()
            .filter(|l| l.files.is_match(path))
            .flat_map(|l| l.paths.iter())
            .collect()
    }

    fn embeds_statements(&self, path: &str, content: &FileContent) -> bool {
        match content {
            FileContent::Text(text) if self.is_function(path) => text.lines().any(|l| statement(l).is_some()),
            FileContent::Json(doc) => self.locations_for(path).iter().any(|location| {
                location.resolve(doc).into_iter().any(|found| match found {
                    Value::String(_) => true,
                    Value::Array(items) => items.iter().any(Value::is_string),
                    _ => false,
                })
            }),
            _ => false,
        }
    }

    fn rewrite_text(&self, text: &str, commands: &CommandSet) -> String {
        let mut lines = Vec::new();
        for line in text.lines() {
            match statement(line) {
                Some(stmt) if calls_custom(stmt, commands) => {
                    lines.extend(self.transformer.transform(stmt, commands))
                }
                _ => lines.push(line.to_string()),
            }
        }
        let mut out = lines.join("\n");
        if text.ends_with('\n') {
            out.push('\n');
        }
        out
    }

    fn rewrite_json_command(&self, command: &str, commands: &CommandSet) -> Vec<String> {
        let trimmed = command.trim();
        let marked = trimmed.starts_with('/');
        let stmt = trimmed.trim_start_matches('/');
        if !calls_custom(stmt, commands) {
            return vec![command.to_string()];
        }
        self.transformer
            .transform(stmt, commands)
            .into_iter()
            .map(|c| if marked { format!("/{}", c) } else { c })
            .collect()
    }

    fn rewrite_value(&self, value: &mut Value, commands: &CommandSet) {
        match value {
            Value::String(command) => {
                let mut out = self.rewrite_json_command(command, commands);
                *value = if out.len() == 1 {
                    Value::String(out.remove(0))
                } else {
                    Value::Array(out.into_iter().map(Value::String).collect())
                };
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items.drain(..) {
                    match item {
                        Value::String(command) => out.extend(
                            self.rewrite_json_command(&command, commands)
                                .into_iter()
                                .map(Value::String),
                        ),
                        other => out.push(other),
                    }
                }
                *items = out;
            }
            _ => {}
        }
    }
}

impl Plugin for CustomCommandsPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn build_start(&mut self) -> Result<()> {
        let mut merged = default_locations();
        if let Some(file) = &self.options.locations_file {
            match self.fs.read_json(file) {
                Ok(doc) => {
                    let extra: BTreeMap<String, TargetPaths> = serde_json::from_value(doc)
                        .map_err(|e| PackdexError::Config(format!("{}: {}", file, e)))?;
                    merged.extend(extra);
                }
                Err(e) if e.is_not_found() => {
                    tracing::warn!("Command locations file {} not found", file);
                }
                Err(e) => return Err(e.into()),
            }
        }
        merged.extend(self.options.command_locations.clone());
        self.locations = compile_locations(&merged)?;
        Ok(())
    }

    fn transform_path(&self, path: &str) -> PathAction {
        if self.is_definition(path) && !self.options.emit_definitions {
            PathAction::Veto
        } else {
            PathAction::Keep
        }
    }

    fn read(&self, path: &str, bytes: &[u8]) -> Result<Option<FileContent>> {
        if self.is_function(path) {
            return Ok(Some(FileContent::Text(String::from_utf8_lossy(bytes).into_owned())));
        }
        if self.is_definition(path) || !self.locations_for(path).is_empty() {
            return Ok(Some(FileContent::Json(parse_json(path, bytes)?)));
        }
        Ok(None)
    }

    fn load(&self, path: &str, content: &FileContent) -> Result<Option<FileContent>> {
        if !self.is_definition(path) {
            return Ok(None);
        }
        let Some(doc) = content.as_json() else {
            return Ok(None);
        };
        let mut definition: CommandDefinition = serde_json::from_value(doc.clone())
            .with_context(|| format!("invalid command definition {}", path))?;
        definition.name = definition.name.trim().to_string();
        for command in &mut definition.commands {
            *command = command.trim().trim_start_matches('/').to_string();
        }
        Ok(Some(FileContent::Json(serde_json::to_value(definition)?)))
    }

    fn require(&self, path: &str, content: &FileContent) -> Vec<String> {
        if self.embeds_statements(path, content) {
            vec![format!("{}/**/*.json", self.options.definitions_folder.trim_end_matches('/'))]
        } else {
            Vec::new()
        }
    }

    fn transform(
        &self,
        path: &str,
        content: &FileContent,
        dependencies: &DependencyResults,
    ) -> Result<Option<FileContent>> {
        let mut commands = CommandSet::new();
        for dependency in dependencies.values().flatten() {
            if !self.is_definition(&dependency.path) {
                continue;
            }
            let Some(doc) = dependency.content.as_json() else { continue };
            match serde_json::from_value::<CommandDefinition>(doc.clone()) {
                Ok(definition) => commands.insert(definition.name, definition.commands),
                Err(e) => tracing::warn!("Ignoring definition {}: {}", dependency.path, e),
            }
        }
        if commands.is_empty() {
            return Ok(None);
        }

        match content {
            FileContent::Text(text) if self.is_function(path) => {
                Ok(Some(FileContent::Text(self.rewrite_text(text, &commands))))
            }
            FileContent::Json(doc) => {
                let locations = self.locations_for(path);
                if locations.is_empty() {
                    return Ok(None);
                }
                let mut doc = doc.clone();
                for location in locations {
                    location.for_each_mut(&mut doc, &mut |value: &mut Value| self.rewrite_value(value, &commands));
                }
                Ok(Some(FileContent::Json(doc)))
            }
            _ => Ok(None),
        }
    }
}

fn in_folder(path: &str, folder: &str) -> bool {
    let folder = folder.trim_matches('/');
    path.strip_prefix(folder).is_some_and(|rest| rest.starts_with('/'))
}

/// The statement on a function line, without a leading `/`.
fn statement(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        None
    } else {
        Some(line.trim_start_matches('/'))
    }
}

fn calls_custom(stmt: &str, commands: &CommandSet) -> bool {
    stmt.split_whitespace()
        .next()
        .is_some_and(|name| commands.get(name).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::Dependency;
    use packdex_core::MemoryFs;
    use serde_json::json;

    fn plugin() -> CustomCommandsPlugin {
        CustomCommandsPlugin::new(Arc::new(MemoryFs::new()), CustomCommandsOptions::default()).unwrap()
    }

    fn definitions(defs: &[(&str, Vec<&str>)]) -> DependencyResults {
        let mut deps = DependencyResults::new();
        deps.insert(
            "BP/commands/**/*.json".to_string(),
            defs.iter()
                .map(|(name, commands)| Dependency {
                    path: format!("BP/commands/{}.json", name),
                    content: FileContent::Json(json!({"name": name, "commands": commands})),
                })
                .collect(),
        );
        deps
    }

    #[test]
    fn test_definitions_are_vetoed_unless_emitted() {
        assert_eq!(plugin().transform_path("BP/commands/greet.json"), PathAction::Veto);
        assert_eq!(plugin().transform_path("BP/functions/a.mcfunction"), PathAction::Keep);

        let options = CustomCommandsOptions {
            emit_definitions: true,
            ..Default::default()
        };
        let emitting = CustomCommandsPlugin::new(Arc::new(MemoryFs::new()), options).unwrap();
        assert_eq!(emitting.transform_path("BP/commands/greet.json"), PathAction::Keep);
    }

    #[test]
    fn test_load_normalizes_definition() {
        let p = plugin();
        let loaded = p
            .load(
                "BP/commands/greet.json",
                &FileContent::Json(json!({"name": " greet ", "commands": ["/say hi"]})),
            )
            .unwrap()
            .unwrap();
        assert_eq!(loaded, FileContent::Json(json!({"name": "greet", "commands": ["say hi"]})));

        let bad = p.load("BP/commands/bad.json", &FileContent::Json(json!({"commands": []})));
        assert!(bad.is_err());
    }

    #[test]
    fn test_function_requires_definitions() {
        let p = plugin();
        let text = FileContent::Text("# comment\ngreet Steve\n".to_string());
        assert_eq!(p.require("BP/functions/a.mcfunction", &text), vec!["BP/commands/**/*.json"]);

        let empty = FileContent::Text("# only a comment\n".to_string());
        assert!(p.require("BP/functions/b.mcfunction", &empty).is_empty());
    }

    #[test]
    fn test_function_expansion() {
        let p = plugin();
        let text = FileContent::Text("# start\n/greet Steve\n  /say done\n".to_string());
        let out = p
            .transform(
                "BP/functions/a.mcfunction",
                &text,
                &definitions(&[("greet", vec!["say Hello $1", "give $1 apple"])]),
            )
            .unwrap()
            .unwrap();
        assert_eq!(
            out,
            FileContent::Text("# start\nsay Hello Steve\ngive Steve apple\n  /say done\n".to_string())
        );
    }

    #[test]
    fn test_entity_event_commands_keep_slash_marker() {
        let p = plugin();
        let doc = json!({
            "minecraft:entity": {
                "events": {
                    "spawn": {"run_command": {"command": ["/greet Alex", "say plain"]}},
                    "boom": {"run_command": {"command": "/greet Bob"}}
                }
            }
        });
        let path = "BP/entities/zombie.json";
        assert_eq!(p.require(path, &FileContent::Json(doc.clone())).len(), 1);

        let out = p
            .transform(path, &FileContent::Json(doc), &definitions(&[("greet", vec!["say hi $1", "tp $1 ~ ~1 ~"])]))
            .unwrap()
            .unwrap();
        let doc = out.as_json().unwrap();
        assert_eq!(
            doc["minecraft:entity"]["events"]["spawn"]["run_command"]["command"],
            json!(["/say hi Alex", "/tp Alex ~ ~1 ~", "say plain"])
        );
        assert_eq!(
            doc["minecraft:entity"]["events"]["boom"]["run_command"]["command"],
            json!(["/say hi Bob", "/tp Bob ~ ~1 ~"])
        );
    }

    #[test]
    fn test_locations_file_is_merged_at_build_start() {
        let fs = Arc::new(MemoryFs::new());
        fs.insert(
            "locations.json",
            r#"{ "BP/items/**/*.json": "minecraft:item/events/*/run_command/command" }"#,
            1,
        );
        let options = CustomCommandsOptions {
            locations_file: Some("locations.json".to_string()),
            ..Default::default()
        };
        let mut p = CustomCommandsPlugin::new(fs, options).unwrap();
        let path = "BP/items/wand.json";
        let doc = FileContent::Json(json!({
            "minecraft:item": {"events": {"use": {"run_command": {"command": "zap"}}}}
        }));
        assert!(p.require(path, &doc).is_empty());

        p.build_start().unwrap();
        assert_eq!(p.require(path, &doc).len(), 1);
    }

    #[test]
    fn test_unknown_option_is_rejected() {
        let ctx = PluginContext {
            fs: Arc::new(MemoryFs::new()),
            options: json!({"definition_folder": "typo"}),
        };
        assert!(create(ctx).is_err());
    }
}
