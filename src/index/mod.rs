pub mod build;
pub mod column;
pub mod reader;
pub mod segment;
pub mod stats;
pub mod table;
pub mod types;
pub mod writer;

pub use column::{PackedColumn, PayloadEncoding};
pub use reader::TableReader;
pub use segment::{Segment, SegmentCore, SideColumns};
pub use stats::TableStats;
pub use table::{SpanCodec, SpanTable};
pub use types::*;
pub use writer::{StoredTable, TableWriter};
