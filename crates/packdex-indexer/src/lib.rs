//! Change detection and reference extraction

pub mod indexing_cache;
pub mod instructions;
pub mod text_transforms;

#[cfg(test)]
mod tests;

pub use indexing_cache::{IndexingCache, ScanProgress, ScanReport};
pub use instructions::{InstructionEngine, MapFn};
pub use text_transforms::{TextTransform, TextTransforms};
