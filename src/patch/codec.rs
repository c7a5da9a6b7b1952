// Patch file reader/writer, format version 1000.
//
// The layout mixes textual and binary framing: an UTF-8 magic string, then
// ASCII-decimal metadata fields each terminated by CRLF, then raw
// little-endian chunk records with no padding. Decimal fields are parsed a
// byte at a time and stop exactly at the CRLF; the parser never skips
// whitespace, accepts no sign, and treats the byte after the chunk-count
// CRLF as the first chunk record byte.
//
// Read state progression: magic -> version -> old path -> new path ->
// four escape bytes -> chunk count -> chunk records -> EOF. Any token
// mismatch fails the whole read.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use super::chunk::{DataChunk, LITERAL_SENTINEL, MAX_CHUNK_LEN};
use super::{PATCH_VERSION, PatchData};
use crate::escape::EscapeParams;

// ---------------------------------------------------------------------------
// Wire constants
// ---------------------------------------------------------------------------

/// Magic string opening every patch file (no BOM, no terminator).
pub const PATCH_MAGIC: &str = "红警3吧装甲冲击更新描述文件";

const DELIMITER: &[u8] = b"\r\n";

/// Hard cap on path fields, enforced on both read and write.
const MAX_PATH_BYTES: u64 = 4096;

/// Chunk vector preallocation cap; protects against forged chunk counts.
const CHUNK_PREALLOC_CAP: u64 = 1 << 16;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error reading a patch file.
#[derive(Debug)]
pub enum ReadError {
    /// Transport failure other than a premature end of stream.
    Io(io::Error),
    /// The stream ended in the middle of a field or chunk payload.
    TruncatedInput,
    /// Magic, delimiter, or token mismatch.
    MalformedHeader(String),
    /// The patch declares a version this crate does not read.
    UnsupportedVersion(u64),
    /// A numeric field is outside its declared range.
    DomainError(String),
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::TruncatedInput => write!(f, "patch stream ended mid-field"),
            Self::MalformedHeader(msg) => write!(f, "malformed patch header: {msg}"),
            Self::UnsupportedVersion(version) => {
                write!(
                    f,
                    "unsupported patch version {version}, expected {PATCH_VERSION}"
                )
            }
            Self::DomainError(msg) => write!(f, "field out of range: {msg}"),
        }
    }
}

impl std::error::Error for ReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Error writing a patch file.
#[derive(Debug)]
pub enum WriteError {
    /// Transport failure.
    Io(io::Error),
    /// The patch carries a version this crate does not write.
    UnsupportedVersion(u32),
    /// A field cannot be represented in the format.
    DomainError(String),
}

impl std::fmt::Display for WriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::UnsupportedVersion(version) => {
                write!(
                    f,
                    "unsupported patch version {version}, expected {PATCH_VERSION}"
                )
            }
            Self::DomainError(msg) => write!(f, "field not representable: {msg}"),
        }
    }
}

impl std::error::Error for WriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WriteError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// Write
// ---------------------------------------------------------------------------

/// Serialize `patch` to `sink` in the version-1000 layout.
///
/// Everything buffered by `sink` is flushed before returning; writing to a
/// temporary sink and renaming into place is the caller's concern.
pub fn write_patch<W: Write>(sink: &mut W, patch: &PatchData) -> Result<(), WriteError> {
    if patch.version != PATCH_VERSION {
        return Err(WriteError::UnsupportedVersion(patch.version));
    }

    sink.write_all(PATCH_MAGIC.as_bytes())?;
    write!(sink, "{}", patch.version)?;
    sink.write_all(DELIMITER)?;

    write_path_field(sink, &patch.old_path)?;
    write_path_field(sink, &patch.new_path)?;

    for byte in [
        patch.escape.to_be_escaped,
        patch.escape.substitute,
        patch.escape.escape,
        patch.escape.escape2,
    ] {
        write!(sink, "{byte}")?;
        sink.write_all(DELIMITER)?;
    }

    write!(sink, "{}", patch.chunks.len())?;
    sink.write_all(DELIMITER)?;

    for chunk in &patch.chunks {
        match chunk {
            DataChunk::Reference {
                source_position,
                length,
            } => {
                sink.write_all(&length.to_le_bytes())?;
                sink.write_all(&source_position.to_le_bytes())?;
            }
            DataChunk::Literal { bytes } => {
                if bytes.is_empty() || bytes.len() as u64 > u64::from(MAX_CHUNK_LEN) {
                    return Err(WriteError::DomainError(format!(
                        "literal chunk of {} bytes is not representable",
                        bytes.len()
                    )));
                }
                sink.write_all(&(bytes.len() as u32).to_le_bytes())?;
                sink.write_all(&LITERAL_SENTINEL.to_le_bytes())?;
                sink.write_all(bytes)?;
            }
        }
    }

    sink.flush()?;
    Ok(())
}

fn write_path_field<W: Write>(sink: &mut W, path: &Path) -> Result<(), WriteError> {
    let utf8 = path.to_str().ok_or_else(|| {
        WriteError::DomainError(format!("path {} is not valid UTF-8", path.display()))
    })?;
    if utf8.len() as u64 > MAX_PATH_BYTES {
        return Err(WriteError::DomainError(format!(
            "path field of {} bytes exceeds max {MAX_PATH_BYTES}",
            utf8.len()
        )));
    }
    write!(sink, "{}", utf8.len())?;
    sink.write_all(DELIMITER)?;
    sink.write_all(utf8.as_bytes())?;
    sink.write_all(DELIMITER)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// Parse a version-1000 patch from `source`.
///
/// The stream must end immediately after the final chunk; trailing bytes
/// are rejected.
pub fn read_patch<R: Read>(source: &mut R) -> Result<PatchData, ReadError> {
    expect_token(source, PATCH_MAGIC.as_bytes(), "patch file magic")?;

    let version = read_decimal(source)?;
    if version != u64::from(PATCH_VERSION) {
        return Err(ReadError::UnsupportedVersion(version));
    }

    let old_path = read_path_field(source)?;
    let new_path = read_path_field(source)?;

    let to_be_escaped = read_escape_byte(source)?;
    let substitute = read_escape_byte(source)?;
    let escape = read_escape_byte(source)?;
    let escape2 = read_escape_byte(source)?;

    let chunk_count = read_decimal(source)?;
    let mut chunks = Vec::with_capacity(chunk_count.min(CHUNK_PREALLOC_CAP) as usize);
    for _ in 0..chunk_count {
        chunks.push(read_chunk(source)?);
    }

    expect_eof(source)?;

    Ok(PatchData {
        version: PATCH_VERSION,
        old_path,
        new_path,
        escape: EscapeParams {
            to_be_escaped,
            substitute,
            escape,
            escape2,
            // Derived from the old file, not carried on the wire.
            estimated_new_size: 0,
        },
        chunks,
    })
}

fn read_u8<R: Read>(source: &mut R) -> Result<u8, ReadError> {
    let mut buf = [0u8; 1];
    read_exact(source, &mut buf)?;
    Ok(buf[0])
}

fn read_exact<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<(), ReadError> {
    source.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ReadError::TruncatedInput,
        _ => ReadError::Io(e),
    })
}

fn expect_token<R: Read>(
    source: &mut R,
    expected: &[u8],
    what: &str,
) -> Result<(), ReadError> {
    for &want in expected {
        let got = read_u8(source)?;
        if got != want {
            return Err(ReadError::MalformedHeader(format!(
                "{what}: expected byte {want:#04X}, got {got:#04X}"
            )));
        }
    }
    Ok(())
}

/// Parse an ASCII-decimal field terminated by CRLF, consuming the CRLF.
///
/// Digits only; an empty field or any other byte is a header error, a value
/// past 64 bits is a domain error.
fn read_decimal<R: Read>(source: &mut R) -> Result<u64, ReadError> {
    let mut value: u64 = 0;
    let mut digits = 0usize;
    loop {
        let byte = read_u8(source)?;
        match byte {
            b'0'..=b'9' => {
                digits += 1;
                value = value
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(u64::from(byte - b'0')))
                    .ok_or_else(|| {
                        ReadError::DomainError("decimal field overflows 64 bits".into())
                    })?;
            }
            b'\r' => {
                if digits == 0 {
                    return Err(ReadError::MalformedHeader("empty decimal field".into()));
                }
                let lf = read_u8(source)?;
                if lf != b'\n' {
                    return Err(ReadError::MalformedHeader(format!(
                        "expected LF after CR, got {lf:#04X}"
                    )));
                }
                return Ok(value);
            }
            other => {
                return Err(ReadError::MalformedHeader(format!(
                    "unexpected byte {other:#04X} in decimal field"
                )));
            }
        }
    }
}

fn read_escape_byte<R: Read>(source: &mut R) -> Result<u8, ReadError> {
    let value = read_decimal(source)?;
    if value > u64::from(u8::MAX) {
        return Err(ReadError::DomainError(format!(
            "escape byte value {value} exceeds 255"
        )));
    }
    Ok(value as u8)
}

fn read_path_field<R: Read>(source: &mut R) -> Result<PathBuf, ReadError> {
    let len = read_decimal(source)?;
    if len > MAX_PATH_BYTES {
        return Err(ReadError::DomainError(format!(
            "path field of {len} bytes exceeds max {MAX_PATH_BYTES}"
        )));
    }
    let mut bytes = vec![0u8; len as usize];
    read_exact(source, &mut bytes)?;
    expect_token(source, DELIMITER, "path field delimiter")?;
    let utf8 = String::from_utf8(bytes)
        .map_err(|_| ReadError::MalformedHeader("path field is not valid UTF-8".into()))?;
    Ok(PathBuf::from(utf8))
}

fn read_chunk<R: Read>(source: &mut R) -> Result<DataChunk, ReadError> {
    let mut word = [0u8; 4];
    read_exact(source, &mut word)?;
    let length = u32::from_le_bytes(word);
    read_exact(source, &mut word)?;
    let source_position = u32::from_le_bytes(word);

    // The segmenter never emits empty chunks, so none may appear on the wire.
    if length == 0 {
        return Err(ReadError::MalformedHeader("zero-length chunk".into()));
    }

    if source_position == LITERAL_SENTINEL {
        let mut bytes = vec![0u8; length as usize];
        read_exact(source, &mut bytes)?;
        Ok(DataChunk::Literal { bytes })
    } else {
        Ok(DataChunk::Reference {
            source_position,
            length,
        })
    }
}

fn expect_eof<R: Read>(source: &mut R) -> Result<(), ReadError> {
    let mut probe = [0u8; 1];
    loop {
        match source.read(&mut probe) {
            Ok(0) => return Ok(()),
            Ok(_) => {
                return Err(ReadError::MalformedHeader(
                    "trailing bytes after final chunk".into(),
                ));
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ReadError::Io(e)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
