// Old-file matching for patch construction.
//
// This module provides:
// - `oracle`  — suffix-array backed longest-match queries against the old file
// - `segment` — greedy segmentation of the new file into patch chunks

pub mod oracle;
pub mod segment;

pub use oracle::MatchOracle;
pub use segment::{MIN_REFERENCE_LEN, segment};
