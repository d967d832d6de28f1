//! The types shared between the storage primitives and the engine: the value
//! union, the block size ladder, and the record codec.
//!
//! A *block* is a contiguous, size-classed region of the backing file that
//! holds at most one record. A *record* is the flags byte, the two length
//! prefixes, the key bytes and the value bytes; every unused byte after it
//! is explicitly zero-filled up to the block size, so bytes from a previous
//! occupant of a recycled block can never leak into a read.
//!
//! Block sizes form a discrete ladder: `2^(e+4)` bytes, or `1.5 * 2^(e+4)`
//! when the half step is set, for exponents `e` from 0 through 31. The
//! smallest block is 16 bytes and the largest `1.5 * 2^35`. The whole class
//! fits in one byte together with the record flags:
//!
//! | bit 7 | bit 6 | bit 5 | bits 0-4 |
//! |-------|-------|-------|----------|
//! | FREE  | LARGE | half step | exponent |
//!
//! Length prefixes are big-endian and come in two forms. The small form is
//! a 1-byte key length and a 2-byte value length; the large form (LARGE set)
//! widens them to 2 and 4 bytes for keys past 255 bytes or values past
//! 65535 bytes. The key and value bytes follow immediately, in that order.

use std::fmt;
use std::ops::Range;

use bit_field::BitField;

use super::error::{Result, StoreError};

/// Bit position of the FREE flag: the block holds no record and may be
/// recycled by the allocator. Free blocks keep their size fields so the
/// load scan can step over them; their length prefixes are undefined.
pub const FREE_BIT: usize = 7;
/// Bit position of the LARGE flag: the record uses the extended length
/// prefixes (2-byte key length, 4-byte value length).
pub const LARGE_BIT: usize = 6;
/// Bit position of the half-step flag of the size ladder.
pub const HALF_BIT: usize = 5;
/// The bits of the flags byte that hold the size exponent.
pub const EXPONENT_BITS: Range<usize> = 0..5;
/// Largest encodable exponent.
pub const MAX_EXPONENT: u8 = 31;

/// Smallest representable block: `2^4` bytes.
pub const MIN_BLOCK_SIZE: u64 = 16;
/// Largest representable block: `1.5 * 2^35` bytes (exponent 31, half step).
pub const MAX_BLOCK_SIZE: u64 = 3 << 34;

/// Record header length when both length prefixes use the small form.
pub const SMALL_HEADER: u64 = 4;
/// Record header length when the extended length prefixes are in use.
pub const LARGE_HEADER: u64 = 7;
/// Worst-case number of leading bytes needed to decode any block header.
/// Always available: no block is shorter than [`MIN_BLOCK_SIZE`].
pub const PREFIX_LEN: usize = LARGE_HEADER as usize;

/// Largest key length encodable in the small form.
pub const SMALL_KEY_MAX: usize = u8::MAX as usize;
/// Largest value length encodable in the small form.
pub const SMALL_VALUE_MAX: usize = u16::MAX as usize;
/// Largest key length the record format can represent at all.
pub const KEY_MAX: usize = u16::MAX as usize;
/// Largest value length the record format can represent at all.
pub const VALUE_MAX: u64 = u32::MAX as u64;

/// A stored value: UTF-8 text or an opaque byte sequence. Which of the two
/// a store holds is configured per instance by
/// [`StoreOptions::buffer_values`](crate::kv::StoreOptions); inputs of the
/// other kind are collapsed to the configured one by [`Value::normalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// UTF-8 text (`buffer_values = false`, the default).
    Text(String),
    /// Raw bytes (`buffer_values = true`).
    Bytes(Vec<u8>),
}

impl Value {
    /// Collapse this value to the kind the store is configured for: text
    /// becomes its UTF-8 bytes, and bytes become text by UTF-8 decoding
    /// (invalid sequences are replaced, never rejected).
    pub fn normalize(self, buffer_values: bool) -> Value {
        match (self, buffer_values) {
            (Value::Text(s), true) => Value::Bytes(s.into_bytes()),
            (Value::Bytes(b), false) => {
                Value::Text(String::from_utf8_lossy(&b).into_owned())
            }
            (v, _) => v,
        }
    }

    /// Rebuild a value of the configured kind from raw block bytes.
    pub fn from_raw(bytes: Vec<u8>, buffer_values: bool) -> Value {
        Value::Bytes(bytes).normalize(buffer_values)
    }

    /// The underlying bytes, whichever kind this is.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Value::Text(s) => s.as_bytes(),
            Value::Bytes(b) => b,
        }
    }

    /// Byte length of the encoded value.
    pub fn byte_len(&self) -> usize {
        self.as_bytes().len()
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Value {
        Value::Bytes(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Value {
        Value::Bytes(b.to_vec())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Value {
        Value::Text(n.to_string())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Value {
        Value::Text(n.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
        }
    }
}

/// One rung of the block size ladder, i.e. the sizing half of a flags byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockClass {
    exponent: u8,
    half: bool,
}

impl BlockClass {
    /// The smallest ladder size that holds `n` bytes, or `BlockTooLarge`
    /// when even the top rung does not.
    ///
    /// For an `n` that is itself a ladder size, this returns exactly that
    /// size, so it doubles as the size-to-class decoder for block sizes
    /// recorded in the index.
    pub fn for_capacity(n: u64) -> Result<BlockClass> {
        if n > MAX_BLOCK_SIZE {
            return Err(StoreError::BlockTooLarge(n));
        }
        let need = n.max(MIN_BLOCK_SIZE);
        let full = need.next_power_of_two();
        // The only ladder value between full/2 and full is 1.5 * full/2.
        let half = full / 2 + full / 4;
        if half >= need {
            Ok(BlockClass {
                exponent: (full.trailing_zeros() - 5) as u8,
                half: true,
            })
        } else {
            Ok(BlockClass {
                exponent: (full.trailing_zeros() - 4) as u8,
                half: false,
            })
        }
    }

    /// Decode the class from a flags byte. Every flags byte decodes to a
    /// representable class; corrupt blocks are caught by comparing the
    /// decoded size against the file, not here.
    pub fn from_flags(flags: u8) -> BlockClass {
        BlockClass {
            exponent: flags.get_bits(EXPONENT_BITS),
            half: flags.get_bit(HALF_BIT),
        }
    }

    /// Physical size of blocks of this class, in bytes.
    pub fn size(&self) -> u64 {
        if self.half {
            3u64 << (self.exponent + 3)
        } else {
            1u64 << (self.exponent + 4)
        }
    }

    /// Pack this class into a flags byte together with the record flags.
    pub fn flags(&self, free: bool, large: bool) -> u8 {
        let mut flags = 0u8;
        flags.set_bits(EXPONENT_BITS, self.exponent);
        flags.set_bit(HALF_BIT, self.half);
        flags.set_bit(LARGE_BIT, large);
        flags.set_bit(FREE_BIT, free);
        flags
    }
}

/// Whether this key/value pair needs the extended length prefixes.
pub fn needs_large(key: &[u8], value: &[u8]) -> bool {
    key.len() > SMALL_KEY_MAX || value.len() > SMALL_VALUE_MAX
}

/// Byte length of the record encoding this pair: header, key and value.
pub fn record_len(key: &[u8], value: &[u8]) -> u64 {
    let header = if needs_large(key, value) {
        LARGE_HEADER
    } else {
        SMALL_HEADER
    };
    header + key.len() as u64 + value.len() as u64
}

/// Offset of the value bytes within a block encoding this pair.
pub fn value_offset(key: &[u8], value: &[u8]) -> u64 {
    let header = if needs_large(key, value) {
        LARGE_HEADER
    } else {
        SMALL_HEADER
    };
    header + key.len() as u64
}

/// Capacity to size a fresh placement for: 20% headroom over the record so
/// the next few in-place updates do not force a relocation.
pub fn grown_capacity(record_len: u64) -> u64 {
    record_len + (record_len + 4) / 5
}

/// Encode a live record into a zeroed block of class `class`. The caller
/// guarantees the record fits `class.size()`.
pub fn encode_record(key: &[u8], value: &[u8], class: BlockClass) -> Vec<u8> {
    let large = needs_large(key, value);
    let mut block = vec![0u8; class.size() as usize];
    block[0] = class.flags(false, large);
    let header = if large {
        block[1..3].copy_from_slice(&(key.len() as u16).to_be_bytes());
        block[3..7].copy_from_slice(&(value.len() as u32).to_be_bytes());
        LARGE_HEADER as usize
    } else {
        block[1] = key.len() as u8;
        block[2..4].copy_from_slice(&(value.len() as u16).to_be_bytes());
        SMALL_HEADER as usize
    };
    block[header..header + key.len()].copy_from_slice(key);
    block[header + key.len()..header + key.len() + value.len()].copy_from_slice(value);
    block
}

/// Encode a free block of class `class`: the flags byte announces FREE and
/// preserves the size, everything after it is zero.
pub fn encode_free(class: BlockClass) -> Vec<u8> {
    let mut block = vec![0u8; class.size() as usize];
    block[0] = class.flags(true, false);
    block
}

/// Decoded form of a block's leading bytes.
///
/// For free blocks only `class` and `free` are meaningful; the length
/// fields decode whatever padding bytes were there and must be ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Size class decoded from the flags byte.
    pub class: BlockClass,
    /// FREE flag.
    pub free: bool,
    /// LARGE flag.
    pub large: bool,
    /// Key byte length.
    pub key_len: u32,
    /// Value byte length.
    pub value_len: u32,
}

impl RecordHeader {
    /// Decode a block prefix. `prefix` must hold at least [`PREFIX_LEN`]
    /// bytes.
    pub fn parse(prefix: &[u8]) -> RecordHeader {
        let flags = prefix[0];
        let large = flags.get_bit(LARGE_BIT);
        let (key_len, value_len) = if large {
            (
                u16::from_be_bytes([prefix[1], prefix[2]]) as u32,
                u32::from_be_bytes([prefix[3], prefix[4], prefix[5], prefix[6]]),
            )
        } else {
            (
                prefix[1] as u32,
                u16::from_be_bytes([prefix[2], prefix[3]]) as u32,
            )
        };
        RecordHeader {
            class: BlockClass::from_flags(flags),
            free: flags.get_bit(FREE_BIT),
            large,
            key_len,
            value_len,
        }
    }

    /// Header length of this record's prefix form.
    pub fn header_len(&self) -> u64 {
        if self.large {
            LARGE_HEADER
        } else {
            SMALL_HEADER
        }
    }

    /// Offset of the value bytes within the block.
    pub fn value_offset(&self) -> u64 {
        self.header_len() + self.key_len as u64
    }

    /// Total record length: header, key bytes and value bytes.
    pub fn record_len(&self) -> u64 {
        self.value_offset() + self.value_len as u64
    }
}
