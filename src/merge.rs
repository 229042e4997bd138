use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use chrono::Local;
use geojson::FeatureCollection;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::bbox::envelope_of;
use crate::error::{Error, ItemError, Result};
use crate::fingerprint::Deduplicator;
use crate::output::{has_extension, unique_file, with_geojson_suffix, write_collection};
use crate::normalize::{to_features, Provenance};

/// What a merge run did.
#[derive(Debug, Clone, Serialize)]
pub struct MergeSummary {
    pub files_scanned: usize,
    pub unique_features: usize,
    pub errors: Vec<ItemError>,
    pub producer_country: String,
    pub included_bbox: bool,
    pub timestamp: String,
}

/// Every `.geojson` file below `input_folder`, sorted by full path.
fn discover(input_folder: &Path) -> Result<Vec<PathBuf>> {
    if !input_folder.is_dir() {
        return Err(Error::InvalidInput(input_folder.to_path_buf()));
    }
    let mut paths: Vec<PathBuf> = WalkDir::new(input_folder)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", input_folder.display(), e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && has_extension(entry.path(), "geojson"))
        .map(|entry| entry.into_path())
        .collect();
    paths.sort();
    Ok(paths)
}

/// Number of files a merge of `input_folder` would scan.
pub fn count_inputs(input_folder: impl AsRef<Path>) -> Result<usize> {
    discover(input_folder.as_ref()).map(|paths| paths.len())
}

fn load_document(path: &Path) -> Result<JsonValue> {
    let file = File::open(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Merges every GeoJSON file under `input_folder` into one deduplicated
/// FeatureCollection.
///
/// Files that fail to read or parse are listed in the summary and skipped.
/// The output never overwrites an existing file: `merged.geojson` becomes
/// `merged_1.geojson`, `merged_2.geojson`, ... as needed. Returns the path
/// actually written.
pub fn merge(
    input_folder: impl AsRef<Path>,
    output_file: impl AsRef<Path>,
    producer_country: &str,
    add_bbox: bool,
) -> Result<(PathBuf, MergeSummary)> {
    let input_folder = input_folder.as_ref();
    let paths = discover(input_folder)?;
    if paths.is_empty() {
        return Err(Error::NotFound {
            what: ".geojson",
            dir: input_folder.to_path_buf(),
        });
    }
    info!("Merging {} GeoJSON files from {}", paths.len(), input_folder.display());

    let mut dedup = Deduplicator::new();
    let mut errors = Vec::new();

    for path in &paths {
        let document = match load_document(path) {
            Ok(document) => document,
            Err(e) => {
                warn!("{}", e);
                errors.push(ItemError::new(path, &e));
                continue;
            }
        };
        let provenance = Provenance::new(path, producer_country);
        let features = to_features(document, &provenance);
        debug!("{}: {} features", path.display(), features.len());
        for feature in features {
            dedup.push(feature);
        }
    }

    if dedup.is_empty() {
        return Err(Error::EmptyResult(input_folder.to_path_buf()));
    }
    info!(
        "Kept {} unique features, dropped {} duplicates",
        dedup.len(),
        dedup.duplicates()
    );

    let features = dedup.into_features();
    let unique_features = features.len();
    let bbox = if add_bbox {
        envelope_of(&features).map(|envelope| envelope.to_bbox())
    } else {
        None
    };
    let included_bbox = bbox.is_some();
    let collection = FeatureCollection {
        bbox,
        features,
        foreign_members: None,
    };

    let final_path = unique_file(&with_geojson_suffix(output_file.as_ref()));
    write_collection(&final_path, &collection)?;
    info!("Wrote {}", final_path.display());

    let summary = MergeSummary {
        files_scanned: paths.len(),
        unique_features,
        errors,
        producer_country: producer_country.to_string(),
        included_bbox,
        timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
    };
    Ok((final_path, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn rejects_missing_folder() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(count_inputs(&missing), Err(Error::InvalidInput(_))));
        assert!(matches!(
            merge(&missing, dir.path().join("out"), "NZ", false),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn discovers_recursively_in_path_order() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b/inner")).unwrap();
        fs::write(dir.path().join("b/inner/z.geojson"), "{}").unwrap();
        fs::write(dir.path().join("a.GEOJSON"), "{}").unwrap();
        fs::write(dir.path().join("notes.json"), "{}").unwrap();

        let paths = discover(dir.path()).unwrap();
        assert_eq!(paths, vec![dir.path().join("a.GEOJSON"), dir.path().join("b/inner/z.geojson")]);
    }
}
