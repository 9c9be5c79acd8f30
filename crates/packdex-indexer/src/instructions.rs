//! Instruction engine
//!
//! Evaluates declarative extraction rules against a parsed document. Map
//! functions come from a registered native table keyed by name.

use indexmap::{IndexMap, IndexSet};
use packdex_core::{CacheData, DocumentPath, Instruction};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Per-value normalizer; `None` drops the value.
pub type MapFn = fn(&str) -> Option<String>;

pub struct InstructionEngine {
    map_fns: HashMap<String, MapFn>,
}

impl InstructionEngine {
    /// Engine with the built-in map functions registered.
    pub fn new() -> Self {
        let mut engine = InstructionEngine {
            map_fns: HashMap::new(),
        };
        engine.register("strip_namespace", strip_namespace);
        engine.register("lowercase", lowercase);
        engine.register("strip_slash", strip_slash);
        engine.register("file_stem", file_stem);
        engine.register("non_empty", non_empty);
        engine
    }

    pub fn register(&mut self, name: &str, map_fn: MapFn) {
        self.map_fns.insert(name.to_string(), map_fn);
    }

    /// Run every instruction and merge results per output key.
    pub fn evaluate(&self, doc: &Value, instructions: &[Instruction]) -> CacheData {
        let mut collected: IndexMap<&str, IndexSet<String>> = IndexMap::new();

        for instruction in instructions {
            let map_fn = match instruction.map_fn.as_deref() {
                Some(name) => match self.map_fns.get(name) {
                    Some(map_fn) => Some(*map_fn),
                    None => {
                        tracing::warn!("Unknown map function `{}`, values pass through", name);
                        None
                    }
                },
                None => None,
            };
            let filter: HashSet<&str> = instruction.filter.iter().map(String::as_str).collect();
            let values = collected.entry(instruction.output_key.as_str()).or_default();

            for target in instruction.target_paths.iter() {
                for found in DocumentPath::parse(target).resolve(doc) {
                    for raw in normalize(found) {
                        if filter.contains(raw.as_str()) {
                            continue;
                        }
                        let mapped = match map_fn {
                            Some(map_fn) => map_fn(&raw),
                            None => Some(raw),
                        };
                        if let Some(value) = mapped {
                            values.insert(value);
                        }
                    }
                }
            }
        }

        collected
            .into_iter()
            .map(|(key, values)| (key.to_string(), values.into_iter().collect()))
            .collect()
    }
}

impl Default for InstructionEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Array -> its elements, object -> its keys, scalar -> itself.
/// Nested arrays and multi-key objects inside arrays contribute nothing.
fn normalize(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(scalar_to_string).collect(),
        Value::Object(map) => map.keys().cloned().collect(),
        Value::Null => Vec::new(),
        scalar => scalar_to_string(scalar).into_iter().collect(),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Object(map) => {
            // `[{"controller.render.a": "query.x"}]` style entries
            let mut keys = map.keys();
            match (keys.next(), keys.next()) {
                (Some(key), None) => Some(key.clone()),
                _ => None,
            }
        }
        Value::Array(_) => None,
    }
}

fn strip_namespace(value: &str) -> Option<String> {
    Some(match value.split_once(':') {
        Some((_, rest)) => rest.to_string(),
        None => value.to_string(),
    })
}

fn lowercase(value: &str) -> Option<String> {
    Some(value.to_lowercase())
}

fn strip_slash(value: &str) -> Option<String> {
    Some(value.trim_start_matches('/').to_string())
}

fn file_stem(value: &str) -> Option<String> {
    let name = value.rsplit('/').next().unwrap_or(value);
    let stem = name.split('.').next().unwrap_or(name);
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
