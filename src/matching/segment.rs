// Greedy segmentation of the new file into patch chunks.
//
// Walks the new file left to right. At each position the oracle reports the
// longest match against the old file; matches at or above the profitability
// threshold become reference chunks, everything else accumulates into a
// pending literal run that is flushed as a single chunk. Greedy
// longest-match-first is the standard choice for LZ77-style back-reference
// schemes once every emitted reference amortizes its fixed overhead.

use super::oracle::MatchOracle;
use crate::patch::chunk::{DataChunk, LengthOverflowError, MAX_CHUNK_LEN};

/// Minimum match length worth emitting as a reference chunk.
///
/// A reference costs an 8-byte chunk header, and the literal bytes it
/// replaces may carry escaping overhead; 32 bytes is where a reference
/// reliably wins.
pub const MIN_REFERENCE_LEN: usize = 32;

/// Segment `new` into chunks whose concatenation reproduces it.
///
/// Zero-length and short matches advance the pending literal run by one
/// byte; the run is flushed before every reference chunk and at end of
/// input. Runs and matches longer than the 32-bit chunk cap are split into
/// consecutive chunks, arranged so no reference tail drops below the
/// profitability threshold.
pub fn segment(
    oracle: &MatchOracle<'_>,
    new: &[u8],
) -> Result<Vec<DataChunk>, LengthOverflowError> {
    let mut chunks = Vec::new();
    let mut literal_run = Vec::new();
    let mut pos = 0usize;

    while pos < new.len() {
        let (source_position, match_len) = oracle.longest_match(&new[pos..]);
        if match_len >= MIN_REFERENCE_LEN {
            flush_literal_run(&mut chunks, &mut literal_run)?;
            push_reference(&mut chunks, source_position, match_len)?;
            pos += match_len;
        } else {
            literal_run.push(new[pos]);
            pos += 1;
            if literal_run.len() == MAX_CHUNK_LEN as usize {
                flush_literal_run(&mut chunks, &mut literal_run)?;
            }
        }
    }

    flush_literal_run(&mut chunks, &mut literal_run)?;
    Ok(chunks)
}

fn flush_literal_run(
    chunks: &mut Vec<DataChunk>,
    literal_run: &mut Vec<u8>,
) -> Result<(), LengthOverflowError> {
    if !literal_run.is_empty() {
        chunks.push(DataChunk::literal(std::mem::take(literal_run))?);
    }
    Ok(())
}

/// Emit one match as one or more reference chunks.
///
/// A match longer than the chunk cap is emitted in cap-sized pieces; the
/// final piece is kept at least `MIN_REFERENCE_LEN` long by shortening its
/// predecessor.
fn push_reference(
    chunks: &mut Vec<DataChunk>,
    source_position: usize,
    match_len: usize,
) -> Result<(), LengthOverflowError> {
    let mut offset = 0usize;
    let mut remaining = match_len;
    while remaining > 0 {
        let mut piece = remaining.min(MAX_CHUNK_LEN as usize);
        if piece < remaining && remaining - piece < MIN_REFERENCE_LEN {
            piece = remaining - MIN_REFERENCE_LEN;
        }
        chunks.push(DataChunk::reference(
            (source_position + offset) as u64,
            piece as u64,
        )?);
        offset += piece;
        remaining -= piece;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
