//! Project configuration
//!
//! Loaded from `packdex.toml` at the project root. Every key is optional.

use crate::cache::BUILDS_DIR;
use crate::error::{PackdexError, Result};
use crate::file_types::{FileTypeDefinition, FileTypeRegistry, default_definitions};
use crate::fs::FileSystem;
use crate::model::ChangeDetection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Config file name, looked up in the project root.
pub const CONFIG_FILE: &str = "packdex.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackdexConfig {
    /// Relative folder paths the indexer skips.
    pub ignore_folders: Vec<String>,
    /// Trust the cache and skip the walk when it already has entries.
    pub fast_path: bool,
    pub change_detection: ChangeDetection,
    /// Extensions parsed as (tolerant) JSON.
    pub json_extensions: Vec<String>,
    /// Extensions handed to text transforms.
    pub text_extensions: Vec<String>,
    /// Where the pipeline writes artifacts, relative to the project root.
    pub output_dir: String,
    /// File-type definitions; the built-in layout is used when empty.
    pub file_types: Vec<FileTypeDefinition>,
    /// Plugin name -> options. Plugins run in name order.
    pub plugins: BTreeMap<String, serde_json::Value>,
}

impl Default for PackdexConfig {
    fn default() -> Self {
        PackdexConfig {
            ignore_folders: Vec::new(),
            fast_path: false,
            change_detection: ChangeDetection::Timestamp,
            json_extensions: vec!["json".to_string()],
            text_extensions: vec!["mcfunction".to_string(), "lang".to_string()],
            output_dir: format!("{}/dev", BUILDS_DIR),
            file_types: Vec::new(),
            plugins: BTreeMap::new(),
        }
    }
}

impl PackdexConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| PackdexError::Config(e.to_string()))
    }

    /// Read `packdex.toml` through the project capability; defaults if absent.
    pub fn load_from(fs: &dyn FileSystem) -> Result<Self> {
        match fs.read_file(CONFIG_FILE) {
            Ok(bytes) => {
                tracing::debug!("Loading config from {}", CONFIG_FILE);
                Self::from_toml(&String::from_utf8_lossy(&bytes))
            }
            Err(e) if e.is_not_found() => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    pub fn file_type_registry(&self) -> Result<FileTypeRegistry> {
        if self.file_types.is_empty() {
            FileTypeRegistry::new(default_definitions())
        } else {
            FileTypeRegistry::new(self.file_types.clone())
        }
    }

    pub fn is_json_extension(&self, ext: &str) -> bool {
        self.json_extensions.iter().any(|e| e == ext)
    }

    pub fn is_text_extension(&self, ext: &str) -> bool {
        self.text_extensions.iter().any(|e| e == ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PackdexConfig::from_toml("").unwrap();
        assert!(!config.fast_path);
        assert_eq!(config.change_detection, ChangeDetection::Timestamp);
        assert!(config.is_json_extension("json"));
        assert!(config.is_text_extension("mcfunction"));
        assert_eq!(config.output_dir, "builds/dev");
        assert_eq!(
            config.file_type_registry().unwrap().id_for("BP/entities/a.json"),
            "entity"
        );
    }

    #[test]
    fn test_full_config() {
        let config = PackdexConfig::from_toml(
            r#"
ignore_folders = ["RP/textures"]
fast_path = true
change_detection = "content_hash"

[[file_types]]
id = "item"
patterns = ["BP/items/**/*.json"]
instructions = [{ target_paths = "minecraft:item/description/identifier", output_key = "identifier" }]

[file_types.connections]
shared_files = ["BP/manifest.json"]

[plugins.custom_commands]
definitions_folder = "BP/cmds"
"#,
        )
        .unwrap();

        assert_eq!(config.ignore_folders, vec!["RP/textures".to_string()]);
        assert!(config.fast_path);
        assert_eq!(config.change_detection, ChangeDetection::ContentHash);

        let registry = config.file_type_registry().unwrap();
        assert_eq!(registry.id_for("BP/items/sword.json"), "item");
        assert_eq!(registry.id_for("BP/entities/a.json"), "unknown");
        assert_eq!(
            registry.connections_for("item").unwrap().shared_files,
            vec!["BP/manifest.json".to_string()]
        );
        assert_eq!(
            config.plugins["custom_commands"]["definitions_folder"],
            serde_json::json!("BP/cmds")
        );
    }

    #[test]
    fn test_invalid_config() {
        let err = PackdexConfig::from_toml("fast_path = \"yes\"").unwrap_err();
        assert!(matches!(err, PackdexError::Config(_)));
    }

    #[test]
    fn test_load_from_capability() {
        let fs = crate::fs::MemoryFs::new();
        assert!(!PackdexConfig::load_from(&fs).unwrap().fast_path);

        fs.insert(CONFIG_FILE, "fast_path = true\noutput_dir = \"out\"", 1);
        let config = PackdexConfig::load_from(&fs).unwrap();
        assert!(config.fast_path);
        assert_eq!(config.output_dir, "out");
    }
}
