//! Native extraction functions for plain-text files

use indexmap::{IndexMap, IndexSet};
use packdex_core::CacheData;
use std::collections::HashMap;

/// Extracts cache data from raw text; `None` or an empty map means no data.
pub type TextTransform = fn(&str) -> Option<CacheData>;

/// Registered text transforms keyed by name.
pub struct TextTransforms {
    transforms: HashMap<String, TextTransform>,
}

impl TextTransforms {
    pub fn new() -> Self {
        let mut transforms = TextTransforms {
            transforms: HashMap::new(),
        };
        transforms.register("mcfunction", mcfunction);
        transforms.register("lang", lang);
        transforms
    }

    pub fn register(&mut self, name: &str, transform: TextTransform) {
        self.transforms.insert(name.to_string(), transform);
    }

    /// Run `name` against `text`; empty output is normalized to `None`.
    pub fn run(&self, name: &str, text: &str) -> Option<CacheData> {
        let Some(transform) = self.transforms.get(name) else {
            tracing::warn!("No text transform registered as `{}`", name);
            return None;
        };
        transform(text).filter(|data| !data.is_empty())
    }
}

impl Default for TextTransforms {
    fn default() -> Self {
        Self::new()
    }
}

fn collect(entries: IndexMap<&'static str, IndexSet<String>>) -> Option<CacheData> {
    let data: CacheData = entries
        .into_iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(key, values)| (key.to_string(), values.into_iter().collect()))
        .collect();
    if data.is_empty() { None } else { Some(data) }
}

/// Statements of a function file: command names, called functions, tags.
fn mcfunction(text: &str) -> Option<CacheData> {
    let mut entries: IndexMap<&'static str, IndexSet<String>> = IndexMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.trim_start_matches('/');
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };
        entries
            .entry("command")
            .or_default()
            .insert(command.to_string());

        match command {
            "function" => {
                if let Some(name) = words.next() {
                    entries.entry("function").or_default().insert(name.to_string());
                }
            }
            "tag" => {
                let rest: Vec<&str> = words.collect();
                if let [_, "add" | "remove", tag, ..] = rest.as_slice() {
                    entries.entry("tag").or_default().insert(tag.to_string());
                }
            }
            _ => {}
        }
    }
    collect(entries)
}

/// Translation keys of a `.lang` file.
fn lang(text: &str) -> Option<CacheData> {
    let mut entries: IndexMap<&'static str, IndexSet<String>> = IndexMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("##") {
            continue;
        }
        if let Some((key, _)) = line.split_once('=') {
            let key = key.trim();
            if !key.is_empty() {
                entries.entry("lang_key").or_default().insert(key.to_string());
            }
        }
    }
    collect(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mcfunction_extraction() {
        let transforms = TextTransforms::new();
        let data = transforms
            .run(
                "mcfunction",
                "# setup\nsay hi\nfunction setup/init\n/tag @s add boss\nfunction setup/init\n",
            )
            .unwrap();
        assert_eq!(data["command"], vec!["say", "function", "tag"]);
        assert_eq!(data["function"], vec!["setup/init"]);
        assert_eq!(data["tag"], vec!["boss"]);
    }

    #[test]
    fn test_lang_keys() {
        let transforms = TextTransforms::new();
        let data = transforms
            .run("lang", "## header\nitem.test:sword.name=Sword\n\nentity.test:zombie.name = Zombie")
            .unwrap();
        assert_eq!(data["lang_key"], vec!["item.test:sword.name", "entity.test:zombie.name"]);
    }

    #[test]
    fn test_empty_output_is_none() {
        let transforms = TextTransforms::new();
        assert!(transforms.run("mcfunction", "# only comments\n").is_none());
        assert!(transforms.run("missing", "say hi").is_none());
    }
}
