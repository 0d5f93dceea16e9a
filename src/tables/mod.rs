//! Span table specializations

pub mod classification;
pub mod line_context;
pub mod reference;

pub use classification::{Classification, ClassificationTable, ClassifiedSpan};
pub use line_context::{LineContextMode, LineContextTable, LineMap, LineSpan, SharedLine};
pub use reference::{ReferenceKind, ReferenceSpan, ReferenceSymbol, ReferenceTable};
