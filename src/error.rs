use std::path::PathBuf;
use serde::Serialize;
use thiserror::Error;

/// Errors raised by the pipelines.
///
/// `InvalidInput`, `NotFound` and `EmptyResult` abort a whole run. The rest
/// describe a single file and are usually folded into a summary as an
/// [`ItemError`] so the batch can keep going.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Input is not a directory: {}", .0.display())]
    InvalidInput(PathBuf),

    #[error("No {what} files found in {}", .dir.display())]
    NotFound { what: &'static str, dir: PathBuf },

    #[error("No features collected from {}", .0.display())]
    EmptyResult(PathBuf),

    #[error("Missing required column(s): {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to read {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Not a readable zip archive {}: {source}", .path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("No GeoJSON payload found in {}", .0.display())]
    NoPayload(PathBuf),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A per-file failure recorded in a summary instead of aborting the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    pub item: PathBuf,
    pub message: String,
}

impl ItemError {
    pub fn new(item: impl Into<PathBuf>, error: &Error) -> Self {
        ItemError {
            item: item.into(),
            message: error.to_string(),
        }
    }
}
