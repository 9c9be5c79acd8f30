//! Cache and build output locations

use crate::error::Result;
use crate::fs::FileWriter;

/// Cache directory: .packdex/
pub const CACHE_DIR: &str = ".packdex";

/// Persisted store document
pub const CACHE_FILE: &str = ".packdex/cache.json";

/// Folder that receives pipeline output
pub const BUILDS_DIR: &str = "builds";

/// Folders the indexer never walks, whatever the configuration says.
pub const RESERVED_FOLDERS: [&str; 2] = [CACHE_DIR, BUILDS_DIR];

/// Clear cache directory
pub fn clear_cache(fs: &dyn FileWriter) -> Result<()> {
    fs.remove_dir_all(CACHE_DIR)
}

/// Clear cache and build output
pub fn clear_all(fs: &dyn FileWriter) -> Result<()> {
    clear_cache(fs)?;
    fs.remove_dir_all(BUILDS_DIR)
}
