//! Logical file types
//!
//! A definition maps glob patterns to a type id and carries everything the
//! indexer and graph need to know about that type: extraction instructions
//! (or a text transform name) and connection rules.

use crate::error::{PackdexError, Result};
use crate::model::UNKNOWN_FILE_TYPE;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

/// One or several document paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetPaths {
    One(String),
    Many(Vec<String>),
}

impl TargetPaths {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let paths: &[String] = match self {
            TargetPaths::One(path) => std::slice::from_ref(path),
            TargetPaths::Many(paths) => paths,
        };
        paths.iter().map(String::as_str)
    }
}

/// Declarative extraction rule evaluated against a parsed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    #[serde(alias = "targetPaths", alias = "path")]
    pub target_paths: TargetPaths,
    #[serde(alias = "outputKey", alias = "cacheKey")]
    pub output_key: String,
    /// Literal values to exclude.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<String>,
    /// Name of a registered map function applied per value.
    #[serde(default, alias = "mapFn", skip_serializing_if = "Option::is_none")]
    pub map_fn: Option<String>,
}

/// What the indexer runs for a file type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstructionSet {
    Json(Vec<Instruction>),
    /// Name of a registered text transform.
    Script(String),
}

/// Dynamic link: files of type `find` whose `where` data intersects this
/// file's `matches` data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRule {
    pub find: Vec<String>,
    #[serde(rename = "where")]
    pub where_key: String,
    pub matches: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionRules {
    /// Cache keys whose values are paths relative to the pack root.
    #[serde(alias = "includeFiles")]
    pub include_files: Vec<String>,
    pub connect: Vec<ConnectRule>,
    /// Project-relative paths always linked.
    #[serde(alias = "sharedFiles")]
    pub shared_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTypeDefinition {
    pub id: String,
    pub patterns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instructions: Vec<Instruction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default)]
    pub connections: ConnectionRules,
}

/// Compiled set of file-type definitions.
#[derive(Debug, Clone)]
pub struct FileTypeRegistry {
    definitions: Vec<FileTypeDefinition>,
    matchers: Vec<GlobSet>,
}

impl FileTypeRegistry {
    pub fn new(definitions: Vec<FileTypeDefinition>) -> Result<Self> {
        let mut matchers = Vec::with_capacity(definitions.len());
        for definition in &definitions {
            matchers.push(compile_globs(&definition.patterns)?);
        }
        Ok(FileTypeRegistry {
            definitions,
            matchers,
        })
    }

    /// Logical type of a project-relative path; first matching definition wins.
    pub fn id_for(&self, path: &str) -> &str {
        self.matchers
            .iter()
            .position(|m| m.is_match(path))
            .map(|idx| self.definitions[idx].id.as_str())
            .unwrap_or(UNKNOWN_FILE_TYPE)
    }

    pub fn definition(&self, id: &str) -> Option<&FileTypeDefinition> {
        self.definitions.iter().find(|d| d.id == id)
    }

    pub fn definitions(&self) -> &[FileTypeDefinition] {
        &self.definitions
    }

    pub fn instructions_for(&self, id: &str) -> Option<InstructionSet> {
        let definition = self.definition(id)?;
        if let Some(script) = &definition.script {
            return Some(InstructionSet::Script(script.clone()));
        }
        if definition.instructions.is_empty() {
            None
        } else {
            Some(InstructionSet::Json(definition.instructions.clone()))
        }
    }

    pub fn connections_for(&self, id: &str) -> Option<&ConnectionRules> {
        self.definition(id).map(|d| &d.connections)
    }
}

/// Compile glob patterns; `/` is a literal separator so `*` stays in one folder.
pub fn compile_globs(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|source| PackdexError::Glob {
                pattern: pattern.clone(),
                source,
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| PackdexError::Glob {
        pattern: patterns.join(", "),
        source,
    })
}

fn instruction(path: &str, key: &str) -> Instruction {
    Instruction {
        target_paths: TargetPaths::One(path.to_string()),
        output_key: key.to_string(),
        filter: Vec::new(),
        map_fn: None,
    }
}

/// Built-in definitions for a `BP/` + `RP/` add-on layout.
pub fn default_definitions() -> Vec<FileTypeDefinition> {
    vec![
        FileTypeDefinition {
            id: "entity".to_string(),
            patterns: vec!["BP/entities/**/*.json".to_string()],
            instructions: vec![
                instruction("minecraft:entity/description/identifier", "identifier"),
                Instruction {
                    target_paths: TargetPaths::Many(vec![
                        "minecraft:entity/components/minecraft:loot/table".to_string(),
                        "minecraft:entity/component_groups/*/minecraft:loot/table".to_string(),
                    ]),
                    output_key: "loot_table".to_string(),
                    filter: Vec::new(),
                    map_fn: None,
                },
                Instruction {
                    target_paths: TargetPaths::One("minecraft:entity/component_groups".to_string()),
                    output_key: "component_group".to_string(),
                    filter: Vec::new(),
                    map_fn: None,
                },
            ],
            script: None,
            connections: ConnectionRules {
                include_files: vec!["loot_table".to_string()],
                connect: vec![ConnectRule {
                    find: vec!["client_entity".to_string()],
                    where_key: "identifier".to_string(),
                    matches: "identifier".to_string(),
                }],
                shared_files: Vec::new(),
            },
        },
        FileTypeDefinition {
            id: "client_entity".to_string(),
            patterns: vec!["RP/entity/**/*.json".to_string()],
            instructions: vec![
                instruction("minecraft:client_entity/description/identifier", "identifier"),
                instruction("minecraft:client_entity/description/animations/*", "animation"),
                instruction("minecraft:client_entity/description/render_controllers[]", "render_controller"),
            ],
            script: None,
            connections: ConnectionRules {
                include_files: Vec::new(),
                connect: vec![
                    ConnectRule {
                        find: vec!["animation".to_string()],
                        where_key: "identifier".to_string(),
                        matches: "animation".to_string(),
                    },
                    ConnectRule {
                        find: vec!["render_controller".to_string()],
                        where_key: "identifier".to_string(),
                        matches: "render_controller".to_string(),
                    },
                ],
                shared_files: Vec::new(),
            },
        },
        FileTypeDefinition {
            id: "animation".to_string(),
            patterns: vec!["RP/animations/**/*.json".to_string()],
            instructions: vec![instruction("animations", "identifier")],
            script: None,
            connections: ConnectionRules::default(),
        },
        FileTypeDefinition {
            id: "render_controller".to_string(),
            patterns: vec!["RP/render_controllers/**/*.json".to_string()],
            instructions: vec![instruction("render_controllers", "identifier")],
            script: None,
            connections: ConnectionRules::default(),
        },
        FileTypeDefinition {
            id: "loot_table".to_string(),
            patterns: vec!["BP/loot_tables/**/*.json".to_string()],
            instructions: vec![Instruction {
                target_paths: TargetPaths::One("pools[].entries[].name".to_string()),
                output_key: "item".to_string(),
                filter: vec!["minecraft:air".to_string()],
                map_fn: None,
            }],
            script: None,
            connections: ConnectionRules::default(),
        },
        FileTypeDefinition {
            id: "function".to_string(),
            patterns: vec!["BP/functions/**/*.mcfunction".to_string()],
            instructions: Vec::new(),
            script: Some("mcfunction".to_string()),
            connections: ConnectionRules::default(),
        },
        FileTypeDefinition {
            id: "lang".to_string(),
            patterns: vec!["BP/texts/*.lang".to_string(), "RP/texts/*.lang".to_string()],
            instructions: Vec::new(),
            script: Some("lang".to_string()),
            connections: ConnectionRules::default(),
        },
        FileTypeDefinition {
            id: "custom_command".to_string(),
            patterns: vec!["BP/commands/**/*.json".to_string()],
            instructions: vec![instruction("name", "identifier")],
            script: None,
            connections: ConnectionRules::default(),
        },
    ]
}
