//! # spantab - compact span tables for source indexing
//!
//! spantab stores the spans an analyzer attaches to a document (syntax
//! classifications, symbol references, line context) in a form that is
//! small on disk and cheap to query. Spans are deduplicated by tag into a
//! value pool and cut into segments of 4096, each stored as minimal-width
//! integer columns. Optimizing a segment delta-encodes its starts and
//! compresses every column with zstd; reads expand segments on demand.
//!
//! ## Architecture
//!
//! - [`index`] - The codec: packed columns, segments, the generic
//!   [`SpanTable`](index::SpanTable), persistence and bulk builds
//! - [`tables`] - Classification, reference and line-context tables
//! - [`output`] - Terminal rendering of decoded spans
//! - [`utils`] - Packing helpers, bit vectors, configuration, progress bars
//!
//! ## Quick Start
//!
//! ```
//! use spantab::tables::{Classification, ClassificationTable, ClassifiedSpan};
//!
//! let keyword = Classification::new("keyword", "#569cd6");
//! let spans: Vec<ClassifiedSpan> = [(0, 2), (3, 4), (8, 0)]
//!     .iter()
//!     .map(|&(start, length)| ClassifiedSpan {
//!         start,
//!         length,
//!         classification: keyword.clone(),
//!         local_scope_id: 0,
//!         local_scope_depth: 0,
//!     })
//!     .collect();
//!
//! let mut table = ClassificationTable::from_spans(&spans);
//! table.optimize().unwrap();
//!
//! assert_eq!(table.value_pool().len(), 1);
//! assert_eq!(table.get(1).unwrap(), spans[1]);
//! assert_eq!(table.get_range(4, 1).unwrap(), vec![spans[1].clone()]);
//! ```

pub mod error;
pub mod index;
pub mod output;
pub mod tables;
pub mod utils;

pub use error::{CodecError, Result};
