//! Consolidates plot geometry for regulatory submission: merges GeoJSON
//! folders into one deduplicated collection, turns vertex tables into
//! features, and digs GeoJSON payloads out of spreadsheet containers.

pub mod bbox;
pub mod columns;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod logging;
pub mod merge;
pub mod normalize;
pub mod output;
pub mod scratch;
pub mod tabular;

pub use error::{Error, ItemError, Result};
pub use extract::{extract, list_containers, ExtractSummary};
pub use merge::{count_inputs, merge, MergeSummary};
pub use tabular::{batch_convert, convert, count_csv_inputs, BatchSummary};
