//! Blobpatch: chunk-based binary patch files with suffix-array matching.
//!
//! The crate provides:
//! - An escape transform for terminator-reserving suffix indexers (`escape`)
//! - Longest-match queries and greedy segmentation (`matching`)
//! - The patch model and its bit-exact file format (`patch`)
//! - High-level diff/apply APIs (`engine`)
//! - File-oriented helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```
//! use blobpatch::engine;
//!
//! let old = b"the quick brown fox jumps over the lazy dog";
//! let new = b"the quick red fox jumps over the lazy dog!";
//!
//! let patch = engine::diff(old, new).unwrap();
//! let restored = engine::apply(old, &patch).unwrap();
//! assert_eq!(restored, new);
//! ```

pub mod engine;
pub mod escape;
pub mod io;
pub mod matching;
pub mod patch;

#[cfg(feature = "cli")]
pub mod cli;
