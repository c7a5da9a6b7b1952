// High-level diff/apply orchestration.
//
// `diff` ties the components together: choose the escape alphabet from the
// old file, index the old file for longest-match queries, segment the new
// file greedily, and assemble the resulting `PatchData`. `apply` is the
// inverse: materialize every chunk against the old file.

use std::path::{Path, PathBuf};

use crate::escape;
use crate::matching::{MatchOracle, segment};
use crate::patch::chunk::LengthOverflowError;
use crate::patch::{DataChunk, PATCH_VERSION, PatchData};

/// Byte the escape alphabet is chosen against; suffix-structure indexers
/// conventionally reserve the zero byte as their terminator.
const FORBIDDEN_BYTE: u8 = 0;

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

/// Build a patch transforming `old` into `new`, with empty recorded paths.
pub fn diff(old: &[u8], new: &[u8]) -> Result<PatchData, DiffError> {
    diff_with_paths(old, new, Path::new(""), Path::new(""))
}

/// Build a patch transforming `old` into `new`, recording the given file
/// names in the patch header.
pub fn diff_with_paths(
    old: &[u8],
    new: &[u8],
    old_path: &Path,
    new_path: &Path,
) -> Result<PatchData, DiffError> {
    // The wire format carries 32-bit positions and lengths.
    for len in [old.len(), new.len()] {
        if len as u64 > u64::from(u32::MAX) {
            return Err(DiffError::LengthOverflow(LengthOverflowError {
                field: "input length",
                value: len as u64,
            }));
        }
    }

    let escape = escape::choose_escape(old, FORBIDDEN_BYTE);
    log::debug!(
        "escape alphabet: substitute={:#04X} escape={:#04X} escape2={:#04X}, escaped old would be {} bytes",
        escape.substitute,
        escape.escape,
        escape.escape2,
        escape.estimated_new_size
    );

    let oracle = MatchOracle::new(old);
    let chunks = segment(&oracle, new)?;
    log::debug!(
        "segmented {} bytes into {} chunks ({} references)",
        new.len(),
        chunks.len(),
        chunks.iter().filter(|chunk| !chunk.is_literal()).count()
    );

    Ok(PatchData {
        version: PATCH_VERSION,
        old_path: PathBuf::from(old_path),
        new_path: PathBuf::from(new_path),
        escape,
        chunks,
    })
}

// ---------------------------------------------------------------------------
// Apply
// ---------------------------------------------------------------------------

/// Reconstruct the new file from `old` and a patch.
pub fn apply(old: &[u8], patch: &PatchData) -> Result<Vec<u8>, ApplyError> {
    let mut out = Vec::with_capacity(patch.new_file_len() as usize);
    for chunk in &patch.chunks {
        match chunk {
            DataChunk::Reference {
                source_position,
                length,
            } => {
                let end = u64::from(*source_position) + u64::from(*length);
                if end > old.len() as u64 {
                    return Err(ApplyError::ReferenceOutOfBounds {
                        source_position: *source_position,
                        length: *length,
                        old_len: old.len() as u64,
                    });
                }
                let start = *source_position as usize;
                out.extend_from_slice(&old[start..start + *length as usize]);
            }
            DataChunk::Literal { bytes } => out.extend_from_slice(bytes),
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error building a patch.
#[derive(Debug)]
pub enum DiffError {
    /// An input or chunk field does not fit the 32-bit wire format.
    LengthOverflow(LengthOverflowError),
}

impl std::fmt::Display for DiffError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LengthOverflow(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for DiffError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::LengthOverflow(e) => Some(e),
        }
    }
}

impl From<LengthOverflowError> for DiffError {
    fn from(e: LengthOverflowError) -> Self {
        Self::LengthOverflow(e)
    }
}

/// Error applying a patch.
#[derive(Debug)]
pub enum ApplyError {
    /// A reference chunk points past the end of the old file.
    ReferenceOutOfBounds {
        source_position: u32,
        length: u32,
        old_len: u64,
    },
}

impl std::fmt::Display for ApplyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReferenceOutOfBounds {
                source_position,
                length,
                old_len,
            } => write!(
                f,
                "reference chunk {source_position}+{length} exceeds old file length {old_len}"
            ),
        }
    }
}

impl std::error::Error for ApplyError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(old: &[u8], new: &[u8]) -> PatchData {
        let patch = diff(old, new).expect("diff failed");
        let reconstructed = apply(old, &patch).expect("apply failed");
        assert_eq!(
            reconstructed,
            new,
            "roundtrip mismatch (old={}, new={}, chunks={})",
            old.len(),
            new.len(),
            patch.chunks.len()
        );
        patch
    }

    #[test]
    fn empty_old_produces_one_literal() {
        let patch = roundtrip(b"", b"hello");
        assert_eq!(
            patch.chunks,
            vec![DataChunk::Literal {
                bytes: b"hello".to_vec()
            }]
        );
    }

    #[test]
    fn identical_64_byte_run_produces_one_reference() {
        let data = vec![0x41u8; 64];
        let patch = roundtrip(&data, &data);
        assert_eq!(
            patch.chunks,
            vec![DataChunk::Reference {
                source_position: 0,
                length: 64
            }]
        );
    }

    #[test]
    fn edit_around_shared_run() {
        let old = vec![b'X'; 100];
        let mut new = vec![b'Y'];
        new.extend_from_slice(&vec![b'X'; 64]);
        new.push(b'Z');
        let patch = roundtrip(&old, &new);
        assert_eq!(patch.chunks.len(), 3);
        assert!(patch.chunks[0].is_literal());
        assert!(!patch.chunks[1].is_literal());
        assert_eq!(patch.chunks[1].len(), 64);
        assert!(patch.chunks[2].is_literal());
    }

    #[test]
    fn roundtrip_empty_new() {
        let patch = roundtrip(b"some old data", b"");
        assert!(patch.chunks.is_empty());
    }

    #[test]
    fn roundtrip_both_empty() {
        roundtrip(b"", b"");
    }

    #[test]
    fn roundtrip_binary_data_with_edits() {
        let old: Vec<u8> = (0..8192u32).map(|i| (i % 256) as u8).collect();
        let mut new = old.clone();
        new[100] = 0xFF;
        new[4000] ^= 0x80;
        new.extend_from_slice(b"appended tail");
        let patch = roundtrip(&old, &new);
        assert!(patch.reference_chunks() > 0);
    }

    #[test]
    fn roundtrip_zero_heavy_data() {
        let old = vec![0u8; 500];
        let mut new = vec![0u8; 200];
        new.extend_from_slice(b"\x01\x02\x03");
        new.extend_from_slice(&vec![0u8; 300]);
        roundtrip(&old, &new);
    }

    #[test]
    fn patch_records_escape_params_of_old() {
        let old: Vec<u8> = b"\x00\x00\x01\x02\x02\x02\x02\x03\x03\x03\x03\x03".to_vec();
        let patch = diff(&old, b"whatever").unwrap();
        assert_eq!(patch.escape.to_be_escaped, 0x00);
        assert_eq!(patch.escape.substitute, 0x04);
        assert_eq!(patch.escape.escape, 0x05);
        assert_eq!(patch.escape.escape2, 0x06);
    }

    #[test]
    fn patch_records_paths() {
        let patch = diff_with_paths(
            b"old",
            b"new",
            Path::new("data/old.bin"),
            Path::new("data/new.bin"),
        )
        .unwrap();
        assert_eq!(patch.old_path, PathBuf::from("data/old.bin"));
        assert_eq!(patch.new_path, PathBuf::from("data/new.bin"));
    }

    #[test]
    fn references_stay_within_old_file() {
        let old: Vec<u8> = (0..2048u32).map(|i| (i * 7 % 251) as u8).collect();
        let mut new = old[512..1536].to_vec();
        new.extend_from_slice(b"unmatched suffix data");
        let patch = roundtrip(&old, &new);
        for chunk in &patch.chunks {
            if let DataChunk::Reference {
                source_position,
                length,
            } = chunk
            {
                assert!(*length >= 32);
                assert!(*source_position as usize + *length as usize <= old.len());
            }
        }
    }

    #[test]
    fn apply_rejects_out_of_bounds_reference() {
        let patch = PatchData {
            version: PATCH_VERSION,
            old_path: PathBuf::new(),
            new_path: PathBuf::new(),
            escape: crate::escape::choose_escape(b"", 0),
            chunks: vec![DataChunk::Reference {
                source_position: 10,
                length: 32,
            }],
        };
        let err = apply(b"too short", &patch).unwrap_err();
        assert!(matches!(err, ApplyError::ReferenceOutOfBounds { .. }));
    }
}
