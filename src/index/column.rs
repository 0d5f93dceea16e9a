//! Packed integer column.
//!
//! Values are stored as `value - min_value` in the smallest little-endian
//! byte width that fits the column's range. A column is either *expanded*
//! (raw packed bytes, random access) or *stored* (a persisted payload that
//! is either the raw bytes or their zstd compression). The two forms are
//! never held at the same time.

use crate::error::{CodecError, Result};
use crate::index::types::CodecContext;
use crate::utils::{byte_width_for, max_for_width, read_packed, write_packed};
use serde::{Deserialize, Serialize};

/// How a stored payload is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    /// Packed bytes kept as-is because compression did not shrink them
    Raw,
    Zstd,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Payload {
    Raw(Vec<u8>),
    Zstd {
        data: Vec<u8>,
        decompressed_len: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Storage {
    Expanded(Vec<u8>),
    Stored(Payload),
}

/// Fixed-width column of u32 values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "ColumnRecord", try_from = "ColumnRecord")]
pub struct PackedColumn {
    byte_width: u8,
    min_value: u32,
    len: usize,
    storage: Storage,
}

impl PackedColumn {
    /// Pack `values` using their own minimum as the base
    pub fn from_values(values: &[u32]) -> Self {
        Self::with_min_tolerance(values, 0)
    }

    /// Pack `values` with a base `min_tolerance` below their minimum, so
    /// later writes down to that base still fit.
    pub fn with_min_tolerance(values: &[u32], min_tolerance: u32) -> Self {
        let min = values.iter().copied().min().unwrap_or(0);
        let max = values.iter().copied().max().unwrap_or(0);
        let min_value = min.saturating_sub(min_tolerance);
        let byte_width = byte_width_for(max - min_value);

        let mut data = vec![0u8; values.len() * byte_width as usize];
        for (i, &value) in values.iter().enumerate() {
            write_packed(&mut data, i, byte_width, value - min_value);
        }

        Self {
            byte_width,
            min_value,
            len: values.len(),
            storage: Storage::Expanded(data),
        }
    }

    /// Pack `values`, or return `None` when every value is zero.
    ///
    /// Readers substitute zero for every element of a missing column.
    pub fn from_values_or_none(values: &[u32]) -> Option<Self> {
        if values.iter().all(|&v| v == 0) {
            None
        } else {
            Some(Self::from_values(values))
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn byte_width(&self) -> u8 {
        self.byte_width
    }

    pub fn min_value(&self) -> u32 {
        self.min_value
    }

    pub fn is_expanded(&self) -> bool {
        matches!(self.storage, Storage::Expanded(_))
    }

    /// Encoding of the stored payload, or `None` while expanded
    pub fn payload_encoding(&self) -> Option<PayloadEncoding> {
        match &self.storage {
            Storage::Expanded(_) => None,
            Storage::Stored(Payload::Raw(_)) => Some(PayloadEncoding::Raw),
            Storage::Stored(Payload::Zstd { .. }) => Some(PayloadEncoding::Zstd),
        }
    }

    fn raw(&self) -> &[u8] {
        match &self.storage {
            Storage::Expanded(data) => data,
            Storage::Stored(_) => panic!("packed column read while optimized; expand it first"),
        }
    }

    /// Value at `index`. The column must be expanded.
    #[inline]
    pub fn get(&self, index: usize) -> u32 {
        self.min_value.wrapping_add(read_packed(self.raw(), index, self.byte_width))
    }

    /// Overwrite the value at `index`. The column must be expanded and the
    /// value must fit the width chosen at construction.
    pub fn set(&mut self, index: usize, value: u32) -> Result<()> {
        let (width, min_value) = (self.byte_width, self.min_value);
        let out_of_range = || CodecError::ValueOutOfRange {
            value,
            width,
            min_value,
        };

        let delta = value.checked_sub(min_value).ok_or_else(out_of_range)?;
        if delta > max_for_width(width) {
            return Err(out_of_range());
        }

        match &mut self.storage {
            Storage::Expanded(data) => write_packed(data, index, width, delta),
            Storage::Stored(_) => panic!("packed column written while optimized; expand it first"),
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.len).map(move |i| self.get(i))
    }

    pub fn to_vec(&self) -> Vec<u32> {
        self.iter().collect()
    }

    /// Size of the packed values when expanded
    pub fn raw_len(&self) -> usize {
        self.len * self.byte_width as usize
    }

    /// Bytes currently held: the raw buffer or the stored payload
    pub fn stored_len(&self) -> usize {
        match &self.storage {
            Storage::Expanded(data) => data.len(),
            Storage::Stored(Payload::Raw(data)) => data.len(),
            Storage::Stored(Payload::Zstd { data, .. }) => data.len(),
        }
    }

    /// Replace the raw buffer with its compressed payload. Compression is
    /// only kept when strictly smaller; otherwise the raw bytes become the
    /// payload. No-op when already optimized.
    pub fn optimize(&mut self, ctx: &mut CodecContext) -> Result<()> {
        let Storage::Expanded(raw) = &mut self.storage else {
            return Ok(());
        };

        let compressed = ctx.compress(raw)?;
        let payload = if compressed.len() < raw.len() {
            ctx.stats.columns_compressed += 1;
            Payload::Zstd {
                data: compressed,
                decompressed_len: raw.len(),
            }
        } else {
            ctx.stats.columns_stored_raw += 1;
            tracing::trace!(
                raw_len = raw.len(),
                compressed_len = compressed.len(),
                "column kept raw"
            );
            Payload::Raw(std::mem::take(raw))
        };

        self.storage = Storage::Stored(payload);
        Ok(())
    }

    /// Restore the raw buffer from the stored payload. No-op when expanded.
    pub fn expand(&mut self, ctx: &mut CodecContext) -> Result<()> {
        let raw = match &mut self.storage {
            Storage::Expanded(_) => return Ok(()),
            Storage::Stored(Payload::Raw(data)) => std::mem::take(data),
            Storage::Stored(Payload::Zstd {
                data,
                decompressed_len,
            }) => ctx.decompress(data, *decompressed_len)?,
        };

        self.storage = Storage::Expanded(raw);
        Ok(())
    }
}

/// Persisted shape of a column
#[derive(Serialize, Deserialize)]
struct ColumnRecord {
    byte_width: u8,
    min_value: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encoding: Option<PayloadEncoding>,
    /// Zero unless the payload is compressed
    #[serde(default)]
    decompressed_length: usize,
    #[serde(default)]
    compressed_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    data: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    compressed_data: Option<Vec<u8>>,
}

impl From<PackedColumn> for ColumnRecord {
    fn from(column: PackedColumn) -> Self {
        let mut record = ColumnRecord {
            byte_width: column.byte_width,
            min_value: column.min_value,
            encoding: None,
            decompressed_length: 0,
            compressed_length: 0,
            data: None,
            compressed_data: None,
        };

        match column.storage {
            Storage::Expanded(data) => record.data = Some(data),
            Storage::Stored(Payload::Raw(data)) => {
                record.encoding = Some(PayloadEncoding::Raw);
                record.compressed_length = data.len();
                record.compressed_data = Some(data);
            }
            Storage::Stored(Payload::Zstd {
                data,
                decompressed_len,
            }) => {
                record.encoding = Some(PayloadEncoding::Zstd);
                record.decompressed_length = decompressed_len;
                record.compressed_length = data.len();
                record.compressed_data = Some(data);
            }
        }
        record
    }
}

impl TryFrom<ColumnRecord> for PackedColumn {
    type Error = CodecError;

    fn try_from(record: ColumnRecord) -> Result<Self> {
        if !(1..=4).contains(&record.byte_width) {
            return Err(CodecError::Corrupt(format!(
                "byte width {} outside 1..=4",
                record.byte_width
            )));
        }

        let storage = match (record.data, record.compressed_data) {
            (Some(_), Some(_)) => {
                return Err(CodecError::Corrupt(
                    "column holds both raw and compressed data".to_string(),
                ));
            }
            (Some(data), None) => Storage::Expanded(data),
            (None, None) => Storage::Expanded(Vec::new()),
            (None, Some(data)) => {
                // Records without an explicit encoding are compressed exactly
                // when a decompressed length was recorded
                let encoding = record.encoding.unwrap_or(if record.decompressed_length == 0 {
                    PayloadEncoding::Raw
                } else {
                    PayloadEncoding::Zstd
                });
                match encoding {
                    PayloadEncoding::Raw => Storage::Stored(Payload::Raw(data)),
                    PayloadEncoding::Zstd if record.decompressed_length == 0 => {
                        return Err(CodecError::Corrupt(
                            "compressed column without decompressed length".to_string(),
                        ));
                    }
                    PayloadEncoding::Zstd => Storage::Stored(Payload::Zstd {
                        data,
                        decompressed_len: record.decompressed_length,
                    }),
                }
            }
        };

        let raw_len = match &storage {
            Storage::Expanded(data) | Storage::Stored(Payload::Raw(data)) => data.len(),
            Storage::Stored(Payload::Zstd {
                decompressed_len, ..
            }) => *decompressed_len,
        };
        let width = record.byte_width as usize;
        if raw_len % width != 0 {
            return Err(CodecError::Corrupt(format!(
                "{raw_len} bytes is not a multiple of width {width}"
            )));
        }

        Ok(Self {
            byte_width: record.byte_width,
            min_value: record.min_value,
            len: raw_len / width,
            storage,
        })
    }
}

mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|text| STANDARD.decode(text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic pseudo-random bytes that zstd cannot shrink
    fn noise(len: usize) -> Vec<u32> {
        let mut state = 0x9e37_79b9u32;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state
            })
            .collect()
    }

    #[test]
    fn test_width_and_base() {
        let column = PackedColumn::from_values(&[1000, 1001, 1255]);
        assert_eq!(column.min_value(), 1000);
        assert_eq!(column.byte_width(), 1);
        assert_eq!(column.to_vec(), vec![1000, 1001, 1255]);

        let column = PackedColumn::from_values(&[0, 70_000]);
        assert_eq!(column.byte_width(), 3);
        assert_eq!(column.get(1), 70_000);
    }

    #[test]
    fn test_uniform_column_has_width_one() {
        let column = PackedColumn::from_values(&[42; 10]);
        assert_eq!(column.byte_width(), 1);
        assert_eq!(column.raw_len(), 10);
        assert!(column.iter().all(|v| v == 42));
    }

    #[test]
    fn test_empty_column() {
        let column = PackedColumn::from_values(&[]);
        assert!(column.is_empty());
        assert_eq!(column.raw_len(), 0);
    }

    #[test]
    fn test_degenerate_column_is_elided() {
        assert!(PackedColumn::from_values_or_none(&[0, 0, 0]).is_none());
        assert!(PackedColumn::from_values_or_none(&[]).is_none());
        assert!(PackedColumn::from_values_or_none(&[0, 3]).is_some());
    }

    #[test]
    fn test_min_tolerance() {
        let mut column = PackedColumn::with_min_tolerance(&[500, 510], 500);
        assert_eq!(column.min_value(), 0);
        assert_eq!(column.byte_width(), 2);
        column.set(0, 3).unwrap();
        assert_eq!(column.get(0), 3);
    }

    #[test]
    fn test_set_is_checked() {
        let mut column = PackedColumn::from_values(&[100, 200]);
        column.set(1, 355).unwrap();
        assert_eq!(column.get(1), 355);

        assert!(matches!(
            column.set(0, 99),
            Err(CodecError::ValueOutOfRange { value: 99, .. })
        ));
        assert!(matches!(
            column.set(0, 356),
            Err(CodecError::ValueOutOfRange { value: 356, .. })
        ));
        assert_eq!(column.to_vec(), vec![100, 355]);
    }

    #[test]
    fn test_compressible_column() {
        let values: Vec<u32> = (0..4096).map(|i| i % 7).collect();
        let mut column = PackedColumn::from_values(&values);
        let mut ctx = CodecContext::default();

        column.optimize(&mut ctx).unwrap();
        assert_eq!(column.payload_encoding(), Some(PayloadEncoding::Zstd));
        assert!(column.stored_len() < column.raw_len());
        assert_eq!(ctx.stats.columns_compressed, 1);

        column.expand(&mut ctx).unwrap();
        assert!(column.is_expanded());
        assert_eq!(column.to_vec(), values);
    }

    #[test]
    fn test_incompressible_column_is_never_larger() {
        let values = noise(64);
        let mut column = PackedColumn::from_values(&values);
        let mut ctx = CodecContext::default();

        column.optimize(&mut ctx).unwrap();
        assert_eq!(column.payload_encoding(), Some(PayloadEncoding::Raw));
        assert_eq!(column.stored_len(), column.raw_len());
        assert_eq!(ctx.stats.columns_stored_raw, 1);

        column.expand(&mut ctx).unwrap();
        assert_eq!(column.to_vec(), values);
    }

    #[test]
    fn test_optimize_and_expand_are_idempotent() {
        let values: Vec<u32> = (0..1000).collect();
        let mut column = PackedColumn::from_values(&values);
        let mut ctx = CodecContext::default();

        column.optimize(&mut ctx).unwrap();
        let stored = column.clone();
        column.optimize(&mut ctx).unwrap();
        assert_eq!(column, stored);

        column.expand(&mut ctx).unwrap();
        column.expand(&mut ctx).unwrap();
        assert_eq!(column.to_vec(), values);
    }

    #[test]
    #[should_panic(expected = "optimized")]
    fn test_get_on_optimized_column_panics() {
        let mut column = PackedColumn::from_values(&[1, 2, 3]);
        column.optimize(&mut CodecContext::default()).unwrap();
        column.get(0);
    }

    #[test]
    fn test_serde_expanded_and_stored() {
        let values: Vec<u32> = (0..2000).map(|i| 300 + i % 11).collect();
        let mut column = PackedColumn::from_values(&values);

        let json = serde_json::to_string(&column).unwrap();
        assert!(json.contains("\"data\""));
        let parsed: PackedColumn = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, column);

        let mut ctx = CodecContext::default();
        column.optimize(&mut ctx).unwrap();
        let json = serde_json::to_string(&column).unwrap();
        assert!(json.contains("\"encoding\":\"zstd\""));
        assert!(!json.contains("\"data\""));

        let mut parsed: PackedColumn = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), values.len());
        parsed.expand(&mut ctx).unwrap();
        assert_eq!(parsed.to_vec(), values);
    }

    #[test]
    fn test_record_without_encoding_uses_decompressed_length() {
        let json = r#"{"byte_width":1,"min_value":5,"compressed_data":"AQID"}"#;
        let mut column: PackedColumn = serde_json::from_str(json).unwrap();
        assert_eq!(column.payload_encoding(), Some(PayloadEncoding::Raw));
        column.expand(&mut CodecContext::default()).unwrap();
        assert_eq!(column.to_vec(), vec![6, 7, 8]);
    }

    #[test]
    fn test_corrupt_records_are_rejected() {
        let both = r#"{"byte_width":1,"min_value":0,"data":"AQ==","compressed_data":"AQ=="}"#;
        assert!(serde_json::from_str::<PackedColumn>(both).is_err());

        let bad_width = r#"{"byte_width":5,"min_value":0,"data":"AQ=="}"#;
        assert!(serde_json::from_str::<PackedColumn>(bad_width).is_err());

        let ragged = r#"{"byte_width":2,"min_value":0,"data":"AQID"}"#;
        assert!(serde_json::from_str::<PackedColumn>(ragged).is_err());

        let no_len = r#"{"byte_width":1,"min_value":0,"encoding":"zstd","compressed_data":"AQID"}"#;
        assert!(serde_json::from_str::<PackedColumn>(no_len).is_err());
    }

    #[test]
    fn test_corrupt_payload_fails_on_expand() {
        let json = r#"{"byte_width":1,"min_value":0,"encoding":"zstd","decompressed_length":16,"compressed_data":"AQIDBA=="}"#;
        let mut column: PackedColumn = serde_json::from_str(json).unwrap();
        assert!(column.expand(&mut CodecContext::default()).is_err());
        assert!(!column.is_expanded());
    }
}
