//! Sparse boolean column.
//!
//! Set positions live in a roaring bitmap, so a segment with a handful of
//! flagged spans costs a few bytes. A column is only materialized when at
//! least one bit is set; callers treat a missing column as all-false.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use roaring::RoaringBitmap;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de, ser};

/// Fixed-length bit vector
#[derive(Clone, Debug, PartialEq)]
pub struct BitVector {
    bits: RoaringBitmap,
    /// Number of logical bits
    len: usize,
}

impl BitVector {
    /// Create an all-false vector of `len` bits
    pub fn new(len: usize) -> Self {
        Self {
            bits: RoaringBitmap::new(),
            len,
        }
    }

    /// Build from a sequence of flags, or `None` if no flag is set
    pub fn from_flags<I>(flags: I) -> Option<Self>
    where
        I: IntoIterator<Item = bool>,
        I::IntoIter: ExactSizeIterator,
    {
        let flags = flags.into_iter();
        let mut vector = Self::new(flags.len());

        for (i, flag) in flags.enumerate() {
            if flag {
                vector.set(i);
            }
        }

        (!vector.bits.is_empty()).then_some(vector)
    }

    #[inline]
    pub fn set(&mut self, index: usize) {
        debug_assert!(index < self.len);
        self.bits.insert(index as u32);
    }

    /// Bits past the end read as false
    #[inline]
    pub fn get(&self, index: usize) -> bool {
        index < self.len && self.bits.contains(index as u32)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn count_ones(&self) -> usize {
        self.bits.len() as usize
    }

    /// Size of the serialized bitmap in bytes
    pub fn byte_len(&self) -> usize {
        self.bits.serialized_size()
    }
}

/// Persisted shape: logical length plus the portable roaring encoding
#[derive(Serialize, Deserialize)]
struct BitVectorRecord {
    len: usize,
    bits: String,
}

impl Serialize for BitVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut bytes = Vec::with_capacity(self.byte_len());
        self.bits
            .serialize_into(&mut bytes)
            .map_err(ser::Error::custom)?;

        BitVectorRecord {
            len: self.len,
            bits: STANDARD.encode(bytes),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BitVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = BitVectorRecord::deserialize(deserializer)?;
        let bytes = STANDARD.decode(record.bits).map_err(de::Error::custom)?;
        let bits = RoaringBitmap::deserialize_from(bytes.as_slice()).map_err(de::Error::custom)?;

        if bits.max().is_some_and(|max| max as usize >= record.len) {
            return Err(de::Error::custom(format!(
                "bit set past the end of a {}-bit vector",
                record.len
            )));
        }
        Ok(Self {
            bits,
            len: record.len,
        })
    }
}
