// Longest-match oracle over the old file.
//
// Answers "what is the longest prefix of this query that occurs anywhere in
// the old file?" via binary search on a suffix array (divsufsort). Suffixes
// sharing the longest prefix with the query sit next to its insertion point
// in suffix order, so narrowing to two neighbouring suffixes and comparing
// prefix lengths at both is sufficient.

// ---------------------------------------------------------------------------
// Oracle
// ---------------------------------------------------------------------------

/// Read-only longest-match index over one source blob.
pub struct MatchOracle<'a> {
    source: &'a [u8],
    suffix_array: Vec<i32>,
}

/// Count matching prefix bytes between two slices.
fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

impl<'a> MatchOracle<'a> {
    /// Index `source` for longest-match queries.
    pub fn new(source: &'a [u8]) -> Self {
        let suffix_array = if source.is_empty() {
            Vec::new()
        } else {
            let mut sa = vec![0i32; source.len()];
            divsufsort::sort_in_place(source, &mut sa);
            sa
        };
        Self {
            source,
            suffix_array,
        }
    }

    /// Length of the indexed source.
    pub fn source_len(&self) -> usize {
        self.source.len()
    }

    /// Longest prefix of `query` occurring anywhere in the source.
    ///
    /// Returns `(source_position, length)`; length is 0 when not even the
    /// first query byte occurs. Between positions of equal length, which one
    /// is returned is unspecified.
    pub fn longest_match(&self, query: &[u8]) -> (usize, usize) {
        if self.suffix_array.is_empty() || query.is_empty() {
            return (0, 0);
        }

        let mut lo = 0usize;
        let mut hi = self.suffix_array.len() - 1;

        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            let suffix_start = self.suffix_array[mid] as usize;
            let suffix = &self.source[suffix_start..];
            let shared = common_prefix_len(suffix, query);

            // Move towards the query's insertion point: the probe suffix is
            // lexicographically below the query iff it is exhausted or its
            // first differing byte is smaller.
            let below = shared == query.len()
                || (shared < suffix.len() && suffix[shared] < query[shared]);
            if below {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        let lo_start = self.suffix_array[lo] as usize;
        let hi_start = self.suffix_array[hi] as usize;
        let lo_len = common_prefix_len(&self.source[lo_start..], query);
        let hi_len = common_prefix_len(&self.source[hi_start..], query);

        if lo_len >= hi_len {
            (lo_start, lo_len)
        } else {
            (hi_start, hi_len)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_prefix_len_basic() {
        assert_eq!(common_prefix_len(b"hello", b"hello"), 5);
        assert_eq!(common_prefix_len(b"hello", b"help"), 3);
        assert_eq!(common_prefix_len(b"hello", b"world"), 0);
        assert_eq!(common_prefix_len(b"", b"hello"), 0);
    }

    #[test]
    fn empty_source_matches_nothing() {
        let oracle = MatchOracle::new(b"");
        assert_eq!(oracle.longest_match(b"anything"), (0, 0));
    }

    #[test]
    fn empty_query_matches_nothing() {
        let oracle = MatchOracle::new(b"source bytes");
        assert_eq!(oracle.longest_match(b""), (0, 0));
    }

    #[test]
    fn finds_embedded_substring() {
        let source = b"the quick brown fox jumps over the lazy dog";
        let oracle = MatchOracle::new(source);
        let (pos, len) = oracle.longest_match(b"brown fox!");
        assert_eq!(len, 9);
        assert_eq!(&source[pos..pos + len], b"brown fox");
    }

    #[test]
    fn finds_full_query() {
        let source = b"abcdefghijklmnop";
        let oracle = MatchOracle::new(source);
        let (pos, len) = oracle.longest_match(b"ghijk");
        assert_eq!((pos, len), (6, 5));
    }

    #[test]
    fn absent_first_byte_gives_zero() {
        let oracle = MatchOracle::new(b"aaaa");
        assert_eq!(oracle.longest_match(b"zzz").1, 0);
    }

    #[test]
    fn single_byte_source() {
        let oracle = MatchOracle::new(b"x");
        assert_eq!(oracle.longest_match(b"xy"), (0, 1));
        assert_eq!(oracle.longest_match(b"y").1, 0);
    }

    #[test]
    fn prefers_longest_over_first() {
        // "abc" appears early but the query continues as "abcd", which only
        // occurs near the end.
        let source = b"abcx________abcd";
        let oracle = MatchOracle::new(source);
        let (pos, len) = oracle.longest_match(b"abcd");
        assert_eq!(len, 4);
        assert_eq!(&source[pos..pos + len], b"abcd");
    }

    #[test]
    fn repetitive_source_matches_run() {
        let source = vec![0x41u8; 64];
        let oracle = MatchOracle::new(&source);
        let (pos, len) = oracle.longest_match(&source);
        assert_eq!((pos, len), (0, 64));
    }

    #[test]
    fn matches_against_binary_data() {
        let source: Vec<u8> = (0..=255u8).cycle().take(1024).collect();
        let oracle = MatchOracle::new(&source);
        let query = &source[100..180];
        let (pos, len) = oracle.longest_match(query);
        assert!(len >= 80);
        assert_eq!(&source[pos..pos + 80], query);
    }
}
