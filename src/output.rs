use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use geojson::FeatureCollection;

use crate::error::{Error, Result};

/// Writes `collection` as pretty-printed GeoJSON, creating parent folders.
/// An existing file at `path` is replaced.
pub fn write_collection(path: &Path, collection: &FeatureCollection) -> Result<()> {
    let write_err = |source: std::io::Error| Error::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let file = File::create(path).map_err(write_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, collection).map_err(|e| write_err(e.into()))?;
    writer.flush().map_err(write_err)
}

/// Returns `base` if nothing exists there, otherwise the first free
/// `<stem>_<n>.<ext>` next to it.
pub fn unique_file(base: &Path) -> PathBuf {
    if !base.exists() {
        return base.to_path_buf();
    }
    let stem = base.file_stem().map(OsString::from).unwrap_or_default();
    let extension = base.extension();
    (1..)
        .map(|n| {
            let mut name = stem.clone();
            name.push(format!("_{}", n));
            if let Some(ext) = extension {
                name.push(".");
                name.push(ext);
            }
            base.with_file_name(name)
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| base.to_path_buf())
}

/// Like [`unique_file`], but the suffix goes after the whole directory name.
pub fn unique_dir(base: &Path) -> PathBuf {
    if !base.exists() {
        return base.to_path_buf();
    }
    let name = base.file_name().map(OsString::from).unwrap_or_default();
    (1..)
        .map(|n| {
            let mut candidate = name.clone();
            candidate.push(format!("_{}", n));
            base.with_file_name(candidate)
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| base.to_path_buf())
}

/// Appends `.geojson` unless the name already ends with it (any case).
pub fn with_geojson_suffix(path: &Path) -> PathBuf {
    let has_suffix = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("geojson"))
        .unwrap_or(false);
    if has_suffix {
        return path.to_path_buf();
    }
    let mut name = path.as_os_str().to_owned();
    name.push(".geojson");
    PathBuf::from(name)
}

pub(crate) fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case(wanted))
        .unwrap_or(false)
}
