use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::output::{has_extension, unique_dir, unique_file};
use crate::scratch::{remove_tree, ScratchDir};

/// Start of an embedded GeoJSON object.
const OPENING_MARKER: &str = r#"{"type":"#;
/// How the payloads we see end: the last Polygon feature closing the collection.
const POLYGON_CLOSING_MARKER: &str = r#""type":"Polygon"}}]}"#;
/// Spreadsheet printer settings are stored as `.bin` parts too.
const SKIPPED_BIN_PREFIX: &str = "printerSettings";

/// One file written by an extraction, with the container it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub source: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractSummary {
    pub xlsx: usize,
    pub zip: usize,
    pub nested_zips: usize,
    pub bin_processed: usize,
    pub zip_bins_extracted: usize,
    pub json_cleaned: usize,
    pub errors: usize,
    pub outputs_root: PathBuf,
    pub outputs: Vec<Artifact>,
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn name_of(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Containers directly inside `source_folder`: `.xlsx` files first, then
/// `.zip` files, each group sorted by name.
pub fn list_containers(source_folder: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let source_folder = source_folder.as_ref();
    if !source_folder.is_dir() {
        return Err(Error::InvalidInput(source_folder.to_path_buf()));
    }
    let entries = fs::read_dir(source_folder).map_err(|source| Error::Read {
        path: source_folder.to_path_buf(),
        source,
    })?;
    let files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();

    let mut containers = Vec::new();
    for extension in ["xlsx", "zip"] {
        let mut group: Vec<PathBuf> = files
            .iter()
            .filter(|path| has_extension(path, extension))
            .cloned()
            .collect();
        group.sort();
        containers.extend(group);
    }
    Ok(containers)
}

/// Unpacks `archive_path` into `dest` and returns the files it wrote.
fn unzip(archive_path: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    let archive_err = |source: zip::result::ZipError| Error::Archive {
        path: archive_path.to_path_buf(),
        source,
    };
    let file = File::open(archive_path).map_err(|source| Error::Read {
        path: archive_path.to_path_buf(),
        source,
    })?;
    let mut archive = ZipArchive::new(BufReader::new(file)).map_err(archive_err)?;

    let mut written = Vec::new();
    for index in 0..archive.len() {
        let entry = archive.by_index(index).map_err(archive_err)?;
        if entry.is_file() {
            if let Some(name) = entry.enclosed_name() {
                written.push(dest.join(name));
            }
        }
    }
    archive.extract(dest).map_err(archive_err)?;
    Ok(written)
}

/// Every file under `root` with the given extension, in a stable order.
fn find_files(root: &Path, extension: &str) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && has_extension(entry.path(), extension))
        .map(|entry| entry.into_path())
        .collect()
}

/// `Some` whenever both markers occur, even if the slice they bound is empty.
fn marker_slice(text: &str) -> Option<&str> {
    let start = text.find(OPENING_MARKER)?;
    let end = text.rfind(POLYGON_CLOSING_MARKER)? + POLYGON_CLOSING_MARKER.len();
    Some(text.get(start..end).unwrap_or(""))
}

fn brace_slice(text: &str) -> Option<&str> {
    let first = text.find('{')?;
    let last = text.rfind('}')?;
    (last > first && text[first..last].contains(r#""type""#)).then(|| &text[first..=last])
}

/// Pulls GeoJSON text out of an opaque binary blob.
///
/// The bytes are decoded lossily. The text between the first `{"type":` and
/// the last Polygon collection ending is taken whenever both markers occur,
/// and nothing is recovered if the closing marker comes first. Only when a
/// marker is absent is the outermost pair of braces tried, and only if it
/// contains a `"type"` key. The recovered text is not validated.
pub fn recover_geojson(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let recovered = match marker_slice(&text) {
        Some(slice) => slice,
        None => brace_slice(&text)?,
    };
    (!recovered.is_empty()).then(|| recovered.to_string())
}

fn recover_bin(bin: &Path, final_dir: &Path) -> Result<PathBuf> {
    let bytes = fs::read(bin).map_err(|source| Error::Read {
        path: bin.to_path_buf(),
        source,
    })?;
    let text = recover_geojson(&bytes).ok_or_else(|| Error::NoPayload(bin.to_path_buf()))?;
    let out_path = unique_file(&final_dir.join(format!("{}.geojson", stem_of(bin))));
    fs::write(&out_path, text).map_err(|source| Error::Write {
        path: out_path.clone(),
        source,
    })?;
    Ok(out_path)
}

struct Extraction {
    output_root: PathBuf,
    scratch_root: PathBuf,
    summary: ExtractSummary,
}

impl Extraction {
    fn container(&mut self, container: &Path) -> Result<()> {
        let stem = stem_of(container);
        let work = self.scratch_root.join(&stem);
        fs::create_dir_all(&work).map_err(|source| Error::Write {
            path: work.clone(),
            source,
        })?;
        let result = self.unpack(container, &stem, &work);
        remove_tree(&work);
        result
    }

    fn unpack(&mut self, container: &Path, stem: &str, work: &Path) -> Result<()> {
        unzip(container, work)?;
        if has_extension(container, "xlsx") {
            self.summary.xlsx += 1;
        } else {
            self.summary.zip += 1;
        }

        let final_dir = unique_dir(&self.output_root.join(stem));
        fs::create_dir_all(&final_dir).map_err(|source| Error::Write {
            path: final_dir.clone(),
            source,
        })?;

        self.nested_zips(work);
        self.binaries(container, work, &final_dir);
        Ok(())
    }

    /// Best effort: each nested archive lands beside itself in `<stem>_inner`.
    fn nested_zips(&mut self, work: &Path) {
        for nested in find_files(work, "zip") {
            let inner = nested.with_file_name(format!("{}_inner", stem_of(&nested)));
            if let Err(e) = fs::create_dir_all(&inner) {
                debug!("Skipping nested archive {}: {}", nested.display(), e);
                continue;
            }
            match unzip(&nested, &inner) {
                Ok(_) => self.summary.nested_zips += 1,
                Err(e) => debug!("Skipping nested archive: {}", e),
            }
        }
    }

    fn binaries(&mut self, container: &Path, work: &Path, final_dir: &Path) {
        let source = name_of(container);
        let bins = find_files(work, "bin")
            .into_iter()
            .filter(|bin| !name_of(bin).starts_with(SKIPPED_BIN_PREFIX));

        for bin in bins {
            self.summary.bin_processed += 1;

            match unzip(&bin, final_dir) {
                Ok(files) => {
                    self.summary.zip_bins_extracted += 1;
                    self.summary.outputs.extend(files.into_iter().map(|path| Artifact {
                        source: source.clone(),
                        path,
                    }));
                    continue;
                }
                Err(e) => debug!("Scanning {} for JSON text ({})", bin.display(), e),
            }

            match recover_bin(&bin, final_dir) {
                Ok(path) => {
                    self.summary.json_cleaned += 1;
                    self.summary.outputs.push(Artifact {
                        source: source.clone(),
                        path,
                    });
                }
                Err(e) => {
                    warn!("{}", e);
                    self.summary.errors += 1;
                }
            }
        }
    }
}

/// Recovers geometry payloads from the `.xlsx` and `.zip` containers in
/// `source_folder`.
///
/// Each container is unpacked into a scratch folder, nested archives are
/// opened beside themselves, and every `.bin` part is either unpacked (if it
/// is an archive) or scanned for embedded GeoJSON text. Results for a
/// container go to a fresh `<output_folder>/<stem>` directory. A container
/// that cannot be opened counts as one error and produces no output. Scratch
/// space is always removed before returning.
pub fn extract(
    source_folder: impl AsRef<Path>,
    output_folder: impl AsRef<Path>,
) -> Result<ExtractSummary> {
    let output_folder = output_folder.as_ref();
    let containers = list_containers(source_folder.as_ref())?;

    fs::create_dir_all(output_folder).map_err(|source| Error::Write {
        path: output_folder.to_path_buf(),
        source,
    })?;
    let output_root = fs::canonicalize(output_folder).map_err(|source| Error::Read {
        path: output_folder.to_path_buf(),
        source,
    })?;
    if containers.is_empty() {
        info!("No containers found in {}", source_folder.as_ref().display());
        return Ok(ExtractSummary {
            outputs_root: output_root,
            ..ExtractSummary::default()
        });
    }
    info!("Extracting {} containers into {}", containers.len(), output_root.display());

    let scratch = ScratchDir::new_in(&output_root)?;
    let mut run = Extraction {
        output_root: output_root.clone(),
        scratch_root: scratch.path().to_path_buf(),
        summary: ExtractSummary {
            outputs_root: output_root,
            ..ExtractSummary::default()
        },
    };

    for container in &containers {
        if let Err(e) = run.container(container) {
            warn!("{}", e);
            run.summary.errors += 1;
        }
    }
    drop(scratch);

    let summary = run.summary;
    info!(
        "Processed {} binaries: {} archives, {} JSON payloads, {} errors",
        summary.bin_processed, summary.zip_bins_extracted, summary.json_cleaned, summary.errors
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_polygon_collection_between_markers() {
        let payload = r#"{"type":"FeatureCollection","features":[{"type":"Feature","properties":{},"geometry":{"coordinates":[[[1,2],[3,4],[5,6],[1,2]]],"type":"Polygon"}}]}"#;
        let mut bytes = vec![0xFF, 0x00, b'{', b'x', 0xC3];
        bytes.extend_from_slice(payload.as_bytes());
        bytes.extend_from_slice(&[0x00, b'}', 0xFE, b'}']);

        assert_eq!(recover_geojson(&bytes).as_deref(), Some(payload));
    }

    #[test]
    fn falls_back_to_outer_braces() {
        let bytes = b"\x01\x02junk {\"type\": \"Point\", \"coordinates\": [1, 2]} tail";
        assert_eq!(
            recover_geojson(bytes).as_deref(),
            Some("{\"type\": \"Point\", \"coordinates\": [1, 2]}")
        );
    }

    #[test]
    fn inverted_markers_recover_nothing() {
        let text = r#"x"type":"Polygon"}}]} then {"type":"Point"} end"#;
        assert_eq!(recover_geojson(text.as_bytes()), None);
    }

    #[test]
    fn rejects_blobs_without_type() {
        assert_eq!(recover_geojson(b"\x00\x01{\"name\": 1}\x02"), None);
        assert_eq!(recover_geojson(b"no braces here"), None);
        assert_eq!(recover_geojson(b"} \"type\" {"), None);
    }
}
