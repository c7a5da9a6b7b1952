// File-level pipeline around the diff/apply engine.
//
// `diff_files()` and `apply_files()` read both inputs fully into memory (the
// old file must be fully indexable for matching), run the engine, and stream
// the result through buffered I/O. Patch and output files are written to a
// temporary sibling and renamed into place, so a crashed run never leaves a
// partial file under the final name.
//
// When the `file-io` feature is enabled, SHA-256 digests of the inputs and
// outputs are included in the returned stats.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[cfg(feature = "file-io")]
use sha2::Digest;

use crate::engine::{self, ApplyError, DiffError};
use crate::patch::codec::{self, ReadError, WriteError};

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `diff_files()`.
#[derive(Debug, Clone)]
pub struct DiffStats {
    /// Old file size in bytes.
    pub old_size: u64,
    /// New file size in bytes.
    pub new_size: u64,
    /// Patch output size in bytes.
    pub patch_size: u64,
    /// Total chunks in the patch.
    pub chunk_count: usize,
    /// Reference chunks in the patch.
    pub reference_chunks: usize,
    /// Literal chunks in the patch.
    pub literal_chunks: usize,
    /// Bytes carried inline by literal chunks.
    pub literal_bytes: u64,
    /// SHA-256 of the old file (if the `file-io` feature is enabled).
    pub old_sha256: Option<[u8; 32]>,
    /// SHA-256 of the new file (if the `file-io` feature is enabled).
    pub new_sha256: Option<[u8; 32]>,
}

/// Statistics returned by `apply_files()`.
#[derive(Debug, Clone)]
pub struct ApplyStats {
    /// Old file size in bytes.
    pub old_size: u64,
    /// Patch file size in bytes.
    pub patch_size: u64,
    /// Reconstructed output size in bytes.
    pub output_size: u64,
    /// Total chunks in the patch.
    pub chunk_count: usize,
    /// SHA-256 of the reconstructed output (if the `file-io` feature is enabled).
    pub output_sha256: Option<[u8; 32]>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error type for file pipeline operations.
#[derive(Debug)]
pub enum IoError {
    /// I/O error (file open, read, write, rename).
    Io(io::Error),
    /// Patch construction error.
    Diff(DiffError),
    /// Patch application error.
    Apply(ApplyError),
    /// Patch deserialization error.
    Read(ReadError),
    /// Patch serialization error.
    Write(WriteError),
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Diff(e) => write!(f, "diff error: {e}"),
            Self::Apply(e) => write!(f, "apply error: {e}"),
            Self::Read(e) => write!(f, "patch read error: {e}"),
            Self::Write(e) => write!(f, "patch write error: {e}"),
        }
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Diff(e) => Some(e),
            Self::Apply(e) => Some(e),
            Self::Read(e) => Some(e),
            Self::Write(e) => Some(e),
        }
    }
}

impl From<io::Error> for IoError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<DiffError> for IoError {
    fn from(e: DiffError) -> Self {
        Self::Diff(e)
    }
}

impl From<ApplyError> for IoError {
    fn from(e: ApplyError) -> Self {
        Self::Apply(e)
    }
}

impl From<ReadError> for IoError {
    fn from(e: ReadError) -> Self {
        Self::Read(e)
    }
}

impl From<WriteError> for IoError {
    fn from(e: WriteError) -> Self {
        Self::Write(e)
    }
}

// ---------------------------------------------------------------------------
// Default buffer size
// ---------------------------------------------------------------------------

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

// ---------------------------------------------------------------------------
// diff_files
// ---------------------------------------------------------------------------

/// Build a patch from `old_path` to `new_path` and write it to `patch_path`.
///
/// Both inputs are read fully into memory. The patch is written through a
/// `BufWriter` onto a temporary sibling of `patch_path` and renamed into
/// place once complete.
pub fn diff_files(
    old_path: &Path,
    new_path: &Path,
    patch_path: &Path,
) -> Result<DiffStats, IoError> {
    let old = fs::read(old_path)?;
    let new = fs::read(new_path)?;

    let patch = engine::diff_with_paths(&old, &new, old_path, new_path)?;

    let patch_size = write_file_atomically(patch_path, |sink| {
        codec::write_patch(sink, &patch)
    })?;

    log::info!(
        "patched {} -> {}: {} chunks, {} patch bytes for {} new bytes",
        old_path.display(),
        new_path.display(),
        patch.chunks.len(),
        patch_size,
        new.len()
    );

    Ok(DiffStats {
        old_size: old.len() as u64,
        new_size: new.len() as u64,
        patch_size,
        chunk_count: patch.chunks.len(),
        reference_chunks: patch.reference_chunks(),
        literal_chunks: patch.literal_chunks(),
        literal_bytes: patch.literal_bytes(),
        old_sha256: sha256(&old),
        new_sha256: sha256(&new),
    })
}

// ---------------------------------------------------------------------------
// apply_files
// ---------------------------------------------------------------------------

/// Reconstruct the new file from `old_path` and `patch_path` into
/// `output_path`.
pub fn apply_files(
    old_path: &Path,
    patch_path: &Path,
    output_path: &Path,
) -> Result<ApplyStats, IoError> {
    let old = fs::read(old_path)?;

    let patch_file = File::open(patch_path)?;
    let patch_size = patch_file.metadata()?.len();
    let mut patch_reader = BufReader::with_capacity(BUF_SIZE, patch_file);
    let patch = codec::read_patch(&mut patch_reader)?;

    let output = engine::apply(&old, &patch)?;

    write_file_atomically(output_path, |sink| {
        sink.write_all(&output).map_err(IoError::Io)
    })?;

    log::info!(
        "applied {}: {} chunks, reconstructed {} bytes",
        patch_path.display(),
        patch.chunks.len(),
        output.len()
    );

    Ok(ApplyStats {
        old_size: old.len() as u64,
        patch_size,
        output_size: output.len() as u64,
        chunk_count: patch.chunks.len(),
        output_sha256: sha256(&output),
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Write through a `BufWriter` to a temporary sibling of `path`, then rename
/// over the final name. Returns the written size in bytes.
fn write_file_atomically<E, F>(path: &Path, fill: F) -> Result<u64, IoError>
where
    IoError: From<E>,
    F: FnOnce(&mut BufWriter<File>) -> Result<(), E>,
{
    let tmp_path = temporary_sibling(path);
    let mut writer = BufWriter::with_capacity(BUF_SIZE, File::create(&tmp_path)?);

    let outcome: Result<u64, IoError> = (|| {
        fill(&mut writer)?;
        writer.flush()?;
        let size = writer.get_ref().metadata()?.len();
        Ok(size)
    })();

    match outcome {
        Ok(size) => {
            drop(writer);
            fs::rename(&tmp_path, path)?;
            Ok(size)
        }
        Err(e) => {
            drop(writer);
            let _ = fs::remove_file(&tmp_path);
            Err(e)
        }
    }
}

fn temporary_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(feature = "file-io")]
fn sha256(data: &[u8]) -> Option<[u8; 32]> {
    let mut hasher = sha2::Sha256::new();
    hasher.update(data);
    Some(hasher.finalize().into())
}

#[cfg(not(feature = "file-io"))]
fn sha256(_data: &[u8]) -> Option<[u8; 32]> {
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
