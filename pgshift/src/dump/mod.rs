//! Schema dumps of the source database.

mod document;
mod extractor;

pub use document::{DumpDocument, DumpSection};
pub use extractor::{DumpExtractor, PgDumpExtractor};
