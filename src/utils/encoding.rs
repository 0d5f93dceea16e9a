/// Number of bytes needed to store `value` (never less than one)
#[inline]
pub fn byte_width_for(value: u32) -> u8 {
    let bits = u32::BITS - value.leading_zeros();
    bits.div_ceil(8).max(1) as u8
}

/// Largest value representable in `width` bytes
#[inline]
pub fn max_for_width(width: u8) -> u32 {
    if width >= 4 {
        u32::MAX
    } else {
        (1u32 << (width as u32 * 8)) - 1
    }
}

/// Write `value` little-endian into slot `index` of a `width`-byte packed buffer
#[inline]
pub fn write_packed(buf: &mut [u8], index: usize, width: u8, value: u32) {
    let width = width as usize;
    let offset = index * width;
    buf[offset..offset + width].copy_from_slice(&value.to_le_bytes()[..width]);
}

/// Read slot `index` of a `width`-byte packed buffer
#[inline]
pub fn read_packed(buf: &[u8], index: usize, width: u8) -> u32 {
    let width = width as usize;
    let offset = index * width;
    let mut bytes = [0u8; 4];
    bytes[..width].copy_from_slice(&buf[offset..offset + width]);
    u32::from_le_bytes(bytes)
}

/// Code reserved for a span starting at the same offset as the one before it
pub const SAME_START: u32 = 0;

/// Walks a run of spans in order, converting absolute starts to delta codes
/// and back.
///
/// A code of [`SAME_START`] means "same start as the previous span". Any
/// other code `c` means the span starts `c - 1` bytes after the previous
/// span's end. Spans that start inside the previous span (but not at its
/// start) have no code; callers keep absolute starts for such runs.
#[derive(Debug, Clone, Copy)]
pub struct DeltaCursor {
    prev_start: u32,
    prev_end: u32,
}

impl DeltaCursor {
    /// Start a walk whose virtual predecessor is the empty span at `base`
    pub fn new(base: u32) -> Self {
        Self {
            prev_start: base,
            prev_end: base,
        }
    }

    /// Encode the next span. Returns `None` when the start cannot be coded.
    pub fn encode(&mut self, start: u32, length: u32) -> Option<u32> {
        let end = start.checked_add(length)?;
        let code = if start == self.prev_start {
            SAME_START
        } else if start < self.prev_end {
            return None;
        } else {
            (start - self.prev_end).checked_add(1)?
        };

        self.prev_start = start;
        self.prev_end = end;
        Some(code)
    }

    /// Decode the next span's absolute start from its code
    pub fn decode(&mut self, code: u32, length: u32) -> u32 {
        let start = if code == SAME_START {
            self.prev_start
        } else {
            self.prev_end.wrapping_add(code - 1)
        };

        self.prev_start = start;
        self.prev_end = start.wrapping_add(length);
        start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_all(base: u32, spans: &[(u32, u32)]) -> Option<Vec<u32>> {
        let mut cursor = DeltaCursor::new(base);
        spans.iter().map(|&(s, l)| cursor.encode(s, l)).collect()
    }

    fn decode_all(base: u32, codes: &[u32], lengths: &[u32]) -> Vec<u32> {
        let mut cursor = DeltaCursor::new(base);
        codes
            .iter()
            .zip(lengths)
            .map(|(&c, &l)| cursor.decode(c, l))
            .collect()
    }

    #[test]
    fn test_byte_width_for() {
        assert_eq!(byte_width_for(0), 1);
        assert_eq!(byte_width_for(255), 1);
        assert_eq!(byte_width_for(256), 2);
        assert_eq!(byte_width_for(65_535), 2);
        assert_eq!(byte_width_for(65_536), 3);
        assert_eq!(byte_width_for(u32::MAX), 4);
    }

    #[test]
    fn test_packed_slots() {
        let mut buf = vec![0u8; 9];
        write_packed(&mut buf, 0, 3, 0x010203);
        write_packed(&mut buf, 2, 3, 0xFFFFFF);
        assert_eq!(read_packed(&buf, 0, 3), 0x010203);
        assert_eq!(read_packed(&buf, 1, 3), 0);
        assert_eq!(read_packed(&buf, 2, 3), 0xFFFFFF);
        assert_eq!(max_for_width(3), 0xFFFFFF);
    }

    #[test]
    fn test_first_span_in_segment() {
        // The first span sits on the base, so it is a same-start run of one
        assert_eq!(encode_all(100, &[(100, 4)]), Some(vec![SAME_START]));
        // A first span past the base is coded relative to the base
        assert_eq!(encode_all(100, &[(103, 4)]), Some(vec![4]));
        assert_eq!(decode_all(100, &[4], &[4]), vec![103]);
    }

    #[test]
    fn test_single_span() {
        let codes = encode_all(0, &[(0, 7)]).unwrap();
        assert_eq!(codes, vec![0]);
        assert_eq!(decode_all(0, &codes, &[7]), vec![0]);
    }

    #[test]
    fn test_same_start_runs() {
        let spans = [(10, 5), (10, 2), (10, 0), (12, 1), (20, 3), (20, 3)];
        let codes = encode_all(10, &spans).unwrap();
        assert_eq!(codes, vec![0, 0, 0, 3, 8, 0]);

        let lengths: Vec<u32> = spans.iter().map(|s| s.1).collect();
        let starts: Vec<u32> = spans.iter().map(|s| s.0).collect();
        assert_eq!(decode_all(10, &codes, &lengths), starts);
    }

    #[test]
    fn test_adjacent_and_empty_spans() {
        let spans = [(0, 5), (5, 3), (8, 0), (8, 2)];
        let codes = encode_all(0, &spans).unwrap();
        // Adjacent span is code 1; empty span at the previous end too
        assert_eq!(codes, vec![0, 1, 1, 0]);
        assert_eq!(decode_all(0, &codes, &[5, 3, 0, 2]), vec![0, 5, 8, 8]);
    }

    #[test]
    fn test_overlap_has_no_code() {
        assert_eq!(encode_all(10, &[(10, 5), (12, 3)]), None);
        // One byte before the previous end would collide with the sentinel
        assert_eq!(encode_all(10, &[(10, 5), (14, 1)]), None);
    }
}
