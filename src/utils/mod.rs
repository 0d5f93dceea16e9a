//! Utility functions and data structures.
//!
//! This module provides shared utilities used throughout spantab:
//!
//! ## Modules
//!
//! - [`app_data`] - Configuration file and app data directory (XDG-compliant)
//! - [`bitset`] - Sparse boolean column
//! - [`encoding`] - Fixed-width little-endian packing and start-delta codes
//! - [`progress`] - Progress bars that compile away without the `progress` feature
//!
//! ## Start-delta codes
//!
//! ```
//! use spantab::utils::DeltaCursor;
//!
//! // Spans (10,5) (10,2) (12,3) (20,0) relative to segment start 10
//! let mut cursor = DeltaCursor::new(10);
//! let codes: Vec<u32> = [(10, 5), (10, 2), (12, 3), (20, 0)]
//!     .iter()
//!     .map(|&(start, len)| cursor.encode(start, len).unwrap())
//!     .collect();
//! assert_eq!(codes, vec![0, 0, 1, 6]);
//! ```

pub mod app_data;
pub mod bitset;
pub mod encoding;
pub mod progress;

pub use app_data::*;
pub use bitset::BitVector;
pub use encoding::*;
