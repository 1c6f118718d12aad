//! Block codec for the robot's compressed occupancy grid.
//!
//! The robot ships its grid as a single LZ4-style block: a sequence of
//! `token | literal-length* | literals | offset(le16) | match-length*`
//! records, where a length nibble of 15 is extended by continuation bytes
//! (each added, continuing while the byte is 255).
//!
//! Decoding is fail-soft. A short or garbled payload never aborts the
//! render: whatever prefix was decoded is returned together with a
//! [`DecodeStatus`] saying how far the decoder got.

/// Smallest match the format can express (a zero match nibble means 4).
const MIN_MATCH: usize = 4;

/// Trailing bytes always emitted as literals by the encoder.
const LAST_LITERALS: usize = 5;

/// No match may start within this many bytes of the end.
const MATCH_SEARCH_LIMIT: usize = 12;

const HASH_LOG: u32 = 12;
const MAX_OFFSET: usize = u16::MAX as usize;
const NIBBLE_MAX: usize = 15;

/// How far decompression got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// The output buffer was filled completely.
    Complete,

    /// Input ran out before the output was filled.
    Truncated,

    /// A back-reference pointed outside the decoded prefix.
    Corrupt {
        /// The offending back-reference distance
        offset: u16,
        /// Output cursor when the sequence was rejected
        position: usize,
    },
}

/// Result of [`decompress`]: always a buffer of the requested size.
#[derive(Debug, Clone)]
pub struct Decompressed {
    /// Output buffer, exactly `expected_size` long
    pub bytes: Vec<u8>,

    /// Number of leading bytes actually produced by the stream
    pub written: usize,

    /// Number of input bytes consumed
    pub consumed: usize,

    pub status: DecodeStatus,
}

impl Decompressed {
    pub fn is_complete(&self) -> bool {
        self.status == DecodeStatus::Complete
    }
}

/// Forward-only cursor over the compressed input.
struct BlockReader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> BlockReader<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.input.len() - self.pos
    }

    #[inline]
    fn next_byte(&mut self) -> Option<u8> {
        let byte = *self.input.get(self.pos)?;
        self.pos += 1;
        Some(byte)
    }

    #[inline]
    fn take(&mut self, len: usize) -> &'a [u8] {
        let slice = &self.input[self.pos..self.pos + len];
        self.pos += len;
        slice
    }

    /// Reads the little-endian back-reference distance.
    fn read_offset(&mut self) -> Option<u16> {
        if self.remaining() < 2 {
            return None;
        }
        let bytes = self.take(2);
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Adds continuation bytes to `base` until one is not 255.
    ///
    /// Returns `None` if the input ends inside the extension.
    fn read_extended(&mut self, base: usize) -> Option<usize> {
        let mut len = base;
        loop {
            let byte = self.next_byte()?;
            len += byte as usize;
            if byte != u8::MAX {
                return Some(len);
            }
        }
    }
}

/// Decompresses `input` into a buffer of exactly `expected_size` bytes.
///
/// Never reads past `input` and never writes past `expected_size`. Literal
/// and match copies are clamped to the space that is left. An invalid
/// back-reference stops decoding with [`DecodeStatus::Corrupt`] and the
/// prefix decoded so far is kept.
pub fn decompress(input: &[u8], expected_size: usize) -> Decompressed {
    let mut out = vec![0u8; expected_size];
    let mut dst = 0usize;
    let mut reader = BlockReader::new(input);
    let mut corrupt = None;

    while reader.remaining() > 0 && dst < expected_size {
        let Some(token) = reader.next_byte() else {
            break;
        };

        let mut literal_len = (token >> 4) as usize;
        if literal_len == NIBBLE_MAX {
            match reader.read_extended(literal_len) {
                Some(len) => literal_len = len,
                None => break,
            }
        }

        let literal_len = literal_len
            .min(reader.remaining())
            .min(expected_size - dst);
        out[dst..dst + literal_len].copy_from_slice(reader.take(literal_len));
        dst += literal_len;

        if reader.remaining() == 0 || dst >= expected_size {
            break;
        }

        let Some(offset) = reader.read_offset() else {
            break;
        };
        if offset == 0 || offset as usize > dst {
            corrupt = Some(DecodeStatus::Corrupt {
                offset,
                position: dst,
            });
            break;
        }

        let mut match_len = (token & 0x0F) as usize + MIN_MATCH;
        if match_len == NIBBLE_MAX + MIN_MATCH {
            match reader.read_extended(match_len) {
                Some(len) => match_len = len,
                None => break,
            }
        }

        // Byte-wise so that overlapping references (offset < length) repeat.
        let match_len = match_len.min(expected_size - dst);
        let start = dst - offset as usize;
        for i in 0..match_len {
            out[dst] = out[start + i];
            dst += 1;
        }
    }

    let status = match corrupt {
        Some(status) => status,
        None if dst == expected_size => DecodeStatus::Complete,
        None => DecodeStatus::Truncated,
    };

    Decompressed {
        bytes: out,
        written: dst,
        consumed: reader.pos,
        status,
    }
}

/// Compresses `input` into the same block format the robot produces.
///
/// Greedy single-probe hash matcher. The last [`LAST_LITERALS`] bytes are
/// always literals so every block ends with a literal-only sequence.
pub fn compress(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() + input.len() / 255 + 16);
    let mut table = vec![usize::MAX; 1 << HASH_LOG];
    let mut anchor = 0usize;
    let mut pos = 0usize;

    if input.len() >= MATCH_SEARCH_LIMIT {
        let search_end = input.len() - MATCH_SEARCH_LIMIT;
        let match_end = input.len() - LAST_LITERALS;

        while pos <= search_end {
            let sequence = read_u32(input, pos);
            let slot = hash(sequence);
            let candidate = table[slot];
            table[slot] = pos;

            let is_match = candidate != usize::MAX
                && pos - candidate <= MAX_OFFSET
                && read_u32(input, candidate) == sequence;

            if !is_match {
                pos += 1;
                continue;
            }

            let mut len = MIN_MATCH;
            while pos + len < match_end && input[candidate + len] == input[pos + len] {
                len += 1;
            }

            emit_sequence(&mut out, &input[anchor..pos], (pos - candidate) as u16, len);
            pos += len;
            anchor = pos;
        }
    }

    emit_last_literals(&mut out, &input[anchor..]);
    out
}

#[inline]
fn read_u32(input: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([input[pos], input[pos + 1], input[pos + 2], input[pos + 3]])
}

#[inline]
fn hash(sequence: u32) -> usize {
    (sequence.wrapping_mul(2_654_435_761) >> (32 - HASH_LOG)) as usize
}

fn write_length(out: &mut Vec<u8>, mut len: usize) {
    while len >= u8::MAX as usize {
        out.push(u8::MAX);
        len -= u8::MAX as usize;
    }
    out.push(len as u8);
}

fn emit_sequence(out: &mut Vec<u8>, literals: &[u8], offset: u16, match_len: usize) {
    let lit = literals.len();
    let ml = match_len - MIN_MATCH;
    let token = ((lit.min(NIBBLE_MAX) as u8) << 4) | ml.min(NIBBLE_MAX) as u8;
    out.push(token);
    if lit >= NIBBLE_MAX {
        write_length(out, lit - NIBBLE_MAX);
    }
    out.extend_from_slice(literals);
    out.extend_from_slice(&offset.to_le_bytes());
    if ml >= NIBBLE_MAX {
        write_length(out, ml - NIBBLE_MAX);
    }
}

fn emit_last_literals(out: &mut Vec<u8>, literals: &[u8]) {
    let lit = literals.len();
    out.push((lit.min(NIBBLE_MAX) as u8) << 4);
    if lit >= NIBBLE_MAX {
        write_length(out, lit - NIBBLE_MAX);
    }
    out.extend_from_slice(literals);
}
