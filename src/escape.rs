// Escape transform: reversibly removes a forbidden byte from a stream.
//
// Suffix-structure indexers commonly reserve one byte value as a terminator
// (conventionally 0x00) and refuse input containing it. The transform
// replaces the forbidden byte with the least frequent byte of the source and
// escapes the resulting collisions with two-byte sequences, keeping the
// output uniquely decodable:
//
//   to_be_escaped         -> [substitute]
//   substitute (literal)  -> [escape, escape2]
//   escape (literal)      -> [escape, escape]
//   anything else         -> [byte]
//
// Picking the three rarest bytes of the source as substitute/escape/escape2
// minimizes the expansion; the exact output length is known up front.

use rayon::prelude::*;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Escape alphabet chosen for one source blob.
///
/// The three chosen bytes are pairwise distinct and distinct from
/// `to_be_escaped`. `estimated_new_size` is the exact length of
/// `encode(source)` for the blob the parameters were chosen from; it is
/// derived state and takes no part in equality or the patch file format.
#[derive(Debug, Clone, Copy)]
pub struct EscapeParams {
    /// Byte that must not appear in the escaped output.
    pub to_be_escaped: u8,
    /// Stand-in emitted for every occurrence of `to_be_escaped`.
    pub substitute: u8,
    /// Prefix byte introducing a two-byte escape sequence.
    pub escape: u8,
    /// Second byte of the sequence representing a literal `substitute`.
    pub escape2: u8,
    /// Exact post-escape length of the source the parameters came from.
    pub estimated_new_size: usize,
}

impl PartialEq for EscapeParams {
    fn eq(&self, other: &Self) -> bool {
        // The size estimate is derived from the source, not carried by the
        // patch file; two parameter sets with the same alphabet are the same.
        self.to_be_escaped == other.to_be_escaped
            && self.substitute == other.substitute
            && self.escape == other.escape
            && self.escape2 == other.escape2
    }
}

impl Eq for EscapeParams {}

// ---------------------------------------------------------------------------
// Parameter selection
// ---------------------------------------------------------------------------

/// Slab size for the parallel frequency reduction.
const FREQ_SLAB: usize = 1 << 16;

/// Per-slab histograms summed element-wise; addition is associative and
/// commutative, so the split into slabs never changes the result.
fn byte_frequencies(source: &[u8]) -> [usize; 256] {
    source
        .par_chunks(FREQ_SLAB)
        .fold(
            || [0usize; 256],
            |mut histogram, slab| {
                for &byte in slab {
                    histogram[byte as usize] += 1;
                }
                histogram
            },
        )
        .reduce(
            || [0usize; 256],
            |mut total, histogram| {
                for (sum, count) in total.iter_mut().zip(histogram.iter()) {
                    *sum += count;
                }
                total
            },
        )
}

/// Pop the least frequent byte value, masking it out of further picks.
/// Ties resolve to the smallest byte value.
fn take_rarest(frequencies: &mut [usize; 256]) -> (u8, usize) {
    let mut best = 0usize;
    for value in 1..frequencies.len() {
        if frequencies[value] < frequencies[best] {
            best = value;
        }
    }
    let count = frequencies[best];
    frequencies[best] = usize::MAX;
    (best as u8, count)
}

/// Choose the escape alphabet for `source`.
///
/// `to_be_escaped` is masked to infinite frequency so it can never be chosen;
/// the substitute, escape, and escape2 bytes are then the three least
/// frequent byte values in ascending order of frequency.
pub fn choose_escape(source: &[u8], to_be_escaped: u8) -> EscapeParams {
    let mut frequencies = byte_frequencies(source);
    frequencies[to_be_escaped as usize] = usize::MAX;

    let (substitute, substitute_count) = take_rarest(&mut frequencies);
    let (escape, escape_count) = take_rarest(&mut frequencies);
    let (escape2, _) = take_rarest(&mut frequencies);

    EscapeParams {
        to_be_escaped,
        substitute,
        escape,
        escape2,
        // Substitutes expand to two bytes, as do literal escapes; everything
        // else stays a single byte.
        estimated_new_size: source.len() + substitute_count + escape_count,
    }
}

// ---------------------------------------------------------------------------
// Encode / decode
// ---------------------------------------------------------------------------

/// Escape `source` so the output contains no `params.to_be_escaped` byte.
///
/// The output length always equals `choose_escape(source, ..).estimated_new_size`.
pub fn encode(source: &[u8], params: &EscapeParams) -> Vec<u8> {
    let mut out = Vec::with_capacity(source.len());
    for &byte in source {
        if byte == params.to_be_escaped {
            out.push(params.substitute);
        } else if byte == params.substitute {
            out.push(params.escape);
            out.push(params.escape2);
        } else if byte == params.escape {
            out.push(params.escape);
            out.push(params.escape);
        } else {
            out.push(byte);
        }
    }
    out
}

/// Invert [`encode`].
///
/// Fails on input that could not have been produced by `encode` with the
/// same parameters: an escape byte followed by anything other than
/// `escape`/`escape2`, or an escape byte at end of input.
pub fn decode(escaped: &[u8], params: &EscapeParams) -> Result<Vec<u8>, EscapeDecodeError> {
    let mut out = Vec::with_capacity(escaped.len());
    let mut escape_pending = false;
    for &byte in escaped {
        if escape_pending {
            escape_pending = false;
            if byte == params.escape {
                out.push(params.escape);
            } else if byte == params.escape2 {
                out.push(params.substitute);
            } else {
                return Err(EscapeDecodeError::InvalidPair(byte));
            }
        } else if byte == params.escape {
            escape_pending = true;
        } else if byte == params.substitute {
            out.push(params.to_be_escaped);
        } else {
            out.push(byte);
        }
    }
    if escape_pending {
        return Err(EscapeDecodeError::DanglingEscape);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Malformed escaped input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeDecodeError {
    /// The stream ended directly after an escape byte.
    DanglingEscape,
    /// An escape byte was followed by a byte that completes no sequence.
    InvalidPair(u8),
}

impl std::fmt::Display for EscapeDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DanglingEscape => write!(f, "escape byte at end of input"),
            Self::InvalidPair(byte) => {
                write!(f, "invalid byte {byte:#04X} after escape byte")
            }
        }
    }
}

impl std::error::Error for EscapeDecodeError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn params(to_be_escaped: u8, substitute: u8, escape: u8, escape2: u8) -> EscapeParams {
        EscapeParams {
            to_be_escaped,
            substitute,
            escape,
            escape2,
            estimated_new_size: 0,
        }
    }

    #[test]
    fn chooses_three_rarest_bytes() {
        // Frequencies excluding 0x00: {0x01: 1, 0x02: 4, 0x03: 5}; every
        // other value has count zero, so the picks are 0x04, 0x05, 0x06.
        let source = [
            0x00, 0x00, 0x01, 0x02, 0x02, 0x02, 0x02, 0x03, 0x03, 0x03, 0x03, 0x03,
        ];
        let chosen = choose_escape(&source, 0x00);
        assert_eq!(chosen.substitute, 0x04);
        assert_eq!(chosen.escape, 0x05);
        assert_eq!(chosen.escape2, 0x06);
        assert_eq!(chosen.estimated_new_size, 12);
    }

    #[test]
    fn chosen_bytes_are_distinct_when_all_values_occur() {
        let source: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let chosen = choose_escape(&source, 0);
        assert_ne!(chosen.substitute, 0);
        assert_ne!(chosen.escape, 0);
        assert_ne!(chosen.escape2, 0);
        assert_ne!(chosen.substitute, chosen.escape);
        assert_ne!(chosen.substitute, chosen.escape2);
        assert_ne!(chosen.escape, chosen.escape2);
    }

    #[test]
    fn ties_resolve_to_smallest_byte() {
        // Every byte value is absent, so the picks walk up from 0x01.
        let chosen = choose_escape(&[], 0x00);
        assert_eq!(chosen.substitute, 0x01);
        assert_eq!(chosen.escape, 0x02);
        assert_eq!(chosen.escape2, 0x03);
        assert_eq!(chosen.estimated_new_size, 0);
    }

    #[test]
    fn encode_matches_worked_example() {
        let p = params(0x00, 0x04, 0x05, 0x06);
        let input = [0x00, 0x04, 0x05, 0x05, 0x04, 0x00];
        let escaped = encode(&input, &p);
        assert_eq!(
            escaped,
            [0x04, 0x05, 0x06, 0x05, 0x05, 0x05, 0x06, 0x04]
        );
        assert_eq!(decode(&escaped, &p).unwrap(), input);
    }

    #[test]
    fn encoded_output_never_contains_forbidden_byte() {
        let source: Vec<u8> = (0..=255u8).cycle().take(2048).collect();
        let chosen = choose_escape(&source, 0x00);
        let escaped = encode(&source, &chosen);
        assert!(!escaped.contains(&0x00));
    }

    #[test]
    fn encoded_length_equals_estimate() {
        let source: Vec<u8> = b"\x00\x00abcabc\x00zzz".repeat(37);
        let chosen = choose_escape(&source, 0x00);
        let escaped = encode(&source, &chosen);
        assert_eq!(escaped.len(), chosen.estimated_new_size);
    }

    #[test]
    fn roundtrip_preserves_input() {
        let source: Vec<u8> = b"\x00\x01\x01\x02mixed \x00 payload".repeat(11);
        let chosen = choose_escape(&source, 0x00);
        let decoded = decode(&encode(&source, &chosen), &chosen).unwrap();
        assert_eq!(decoded, source);
    }

    #[test]
    fn roundtrip_nonzero_forbidden_byte() {
        let source: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let chosen = choose_escape(&source, 0x41);
        let escaped = encode(&source, &chosen);
        assert!(!escaped.contains(&0x41));
        assert_eq!(decode(&escaped, &chosen).unwrap(), source);
    }

    #[test]
    fn decode_rejects_dangling_escape() {
        let p = params(0x00, 0x04, 0x05, 0x06);
        assert_eq!(
            decode(&[0x01, 0x05], &p),
            Err(EscapeDecodeError::DanglingEscape)
        );
    }

    #[test]
    fn decode_rejects_invalid_pair() {
        let p = params(0x00, 0x04, 0x05, 0x06);
        assert_eq!(
            decode(&[0x05, 0x07], &p),
            Err(EscapeDecodeError::InvalidPair(0x07))
        );
    }

    #[test]
    fn empty_input_roundtrips() {
        let p = params(0x00, 0x04, 0x05, 0x06);
        assert_eq!(encode(&[], &p), Vec::<u8>::new());
        assert_eq!(decode(&[], &p).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn equality_ignores_size_estimate() {
        let mut a = params(0x00, 0x04, 0x05, 0x06);
        let b = params(0x00, 0x04, 0x05, 0x06);
        a.estimated_new_size = 99;
        assert_eq!(a, b);
    }
}
