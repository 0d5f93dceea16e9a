//! Error types for span table encoding and decoding.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("span index {index} out of range for table of {count} spans")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("value {value} does not fit a {width}-byte column with base {min_value}")]
    ValueOutOfRange { value: u32, width: u8, min_value: u32 },

    #[error("compression failed: {0}")]
    Compression(#[source] io::Error),

    #[error("decompression failed: {0}")]
    Decompression(#[source] io::Error),

    #[error("corrupt table data: {0}")]
    Corrupt(String),

    #[error("segment {0} is optimized and must be expanded before shared reads")]
    SegmentOptimized(usize),
}

pub type Result<T> = std::result::Result<T, CodecError>;
