use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use geo::{LineString, Point, Polygon};
use geojson::{Feature, FeatureCollection, Geometry, Value as GeoJsonValue};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, info, warn};

use crate::columns::{ColumnMap, Field};
use crate::error::{Error, ItemError, Result};
use crate::normalize::PRODUCER_COUNTRY;
use crate::output::{has_extension, write_collection};

/// Spellings read as missing, on top of the empty string.
const MISSING_MARKERS: [&str; 10] = ["NA", "N/A", "n/a", "NaN", "nan", "null", "NULL", "None", "#N/A", "<NA>"];

/// Output property written for each descriptive field, in output order.
const DESCRIPTIVE_PROPERTIES: [(Field, &str); 6] = [
    (Field::Producer, "ProducerName"),
    (Field::Forest, "ProductionPlace"),
    (Field::DateStart, "date start"),
    (Field::DateEnd, "date end"),
    (Field::PercentSupply, "% of Supply"),
    (Field::Under4Ha, "Under 4Ha?"),
];

const POLYGON_ID_PROPERTY: &str = "Polygon #";

/// A typed table cell. Types are inferred per column from its non-missing
/// cells: integer, then float, then boolean, else text.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Bool,
    Int,
    Float,
    Text,
}

fn is_missing(raw: &str) -> bool {
    let raw = raw.trim();
    raw.is_empty() || MISSING_MARKERS.contains(&raw)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "True" | "TRUE" | "true" => Some(true),
        "False" | "FALSE" | "false" => Some(false),
        _ => None,
    }
}

fn infer_kind<'a>(values: impl Iterator<Item = &'a str> + Clone) -> Kind {
    let mut present = values.filter(|raw| !is_missing(raw));
    if present.clone().all(|raw| raw.trim().parse::<i64>().is_ok()) {
        Kind::Int
    } else if present.clone().all(|raw| raw.trim().parse::<f64>().is_ok()) {
        Kind::Float
    } else if present.all(|raw| parse_bool(raw).is_some()) {
        Kind::Bool
    } else {
        Kind::Text
    }
}

impl Cell {
    fn parse(raw: &str, kind: Kind) -> Cell {
        if is_missing(raw) {
            return Cell::Null;
        }
        let trimmed = raw.trim();
        let typed = match kind {
            Kind::Int => trimmed.parse().ok().map(Cell::Int),
            Kind::Float => trimmed
                .parse::<f64>()
                .ok()
                .map(|f| if f.is_nan() { Cell::Null } else { Cell::Float(f) }),
            Kind::Bool => parse_bool(trimmed).map(Cell::Bool),
            Kind::Text => None,
        };
        typed.unwrap_or_else(|| Cell::Text(raw.to_string()))
    }

    /// Numeric value for coordinates. Text is parsed leniently; anything
    /// that is not a finite number yields `None`.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            Cell::Int(i) => *i as f64,
            Cell::Float(f) => *f,
            Cell::Text(s) => s.trim().parse().ok()?,
            Cell::Null | Cell::Bool(_) => return None,
        };
        value.is_finite().then_some(value)
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Cell::Null => JsonValue::Null,
            Cell::Bool(b) => JsonValue::Bool(*b),
            Cell::Int(i) => JsonValue::from(*i),
            Cell::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Cell::Text(s) => JsonValue::String(s.clone()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Cell::Bool(_) => 0,
            Cell::Int(_) | Cell::Float(_) => 1,
            Cell::Text(_) => 2,
            Cell::Null => 3,
        }
    }

    /// Total order: numbers numerically, text lexically, nulls last.
    pub fn compare(&self, other: &Cell) -> Ordering {
        match (self, other) {
            (Cell::Int(a), Cell::Int(b)) => a.cmp(b),
            (Cell::Bool(a), Cell::Bool(b)) => a.cmp(b),
            (Cell::Text(a), Cell::Text(b)) => a.cmp(b),
            (Cell::Int(_) | Cell::Float(_), Cell::Int(_) | Cell::Float(_)) => {
                let a = self.as_f64().unwrap_or(f64::NAN);
                let b = other.as_f64().unwrap_or(f64::NAN);
                a.total_cmp(&b)
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Ordering wrapper so polygon identifiers can key a `BTreeMap`.
#[derive(Debug, Clone)]
struct GroupKey(Cell);

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.compare(&other.0) == Ordering::Equal
    }
}

impl Eq for GroupKey {}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.compare(&other.0)
    }
}

/// A CSV file with a header row and column-typed cells.
#[derive(Debug, Clone)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn read(path: &Path) -> Result<Table> {
        let file = File::open(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Table::from_reader(file).map_err(|source| Error::Csv {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> std::result::Result<Table, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        let mut raw_rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(headers.len(), String::new());
            raw_rows.push(row);
        }

        let kinds: Vec<Kind> = (0..headers.len())
            .map(|col| infer_kind(raw_rows.iter().map(|row| row[col].as_str())))
            .collect();
        let rows = raw_rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&kinds)
                    .map(|(raw, kind)| Cell::parse(raw, *kind))
                    .collect()
            })
            .collect();

        Ok(Table { headers, rows })
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }
}

fn geometry_for(coords: &[(f64, f64)]) -> Option<GeoJsonValue> {
    match coords.len() {
        0 => None,
        1 | 2 => Some(GeoJsonValue::from(&Point::from(coords[0]))),
        // `Polygon::new` closes the exterior ring.
        _ => Some(GeoJsonValue::from(&Polygon::new(
            LineString::from(coords.to_vec()),
            vec![],
        ))),
    }
}

/// One feature per polygon identifier, in ascending identifier order.
///
/// Groups without a single numeric coordinate pair are skipped. When
/// `order_col` names a column, rows are sorted by it before the vertices are
/// read, which fixes the ring's winding.
pub fn features_from_table(
    table: &Table,
    columns: &ColumnMap,
    country: &str,
    order_col: Option<usize>,
) -> Result<Vec<Feature>> {
    let missing = columns.missing_required();
    let (id_col, lon_col, lat_col) = match (
        columns.get(Field::PolygonId),
        columns.get(Field::Longitude),
        columns.get(Field::Latitude),
    ) {
        (Some(id), Some(lon), Some(lat)) if missing.is_empty() => (id, lon, lat),
        _ => return Err(Error::MissingColumns(missing)),
    };

    let mut groups: BTreeMap<GroupKey, Vec<usize>> = BTreeMap::new();
    for (index, row) in table.rows.iter().enumerate() {
        match &row[id_col] {
            Cell::Null => continue,
            id => groups.entry(GroupKey(id.clone())).or_default().push(index),
        }
    }

    let mut features = Vec::with_capacity(groups.len());
    for (GroupKey(id), mut rows) in groups {
        if let Some(col) = order_col {
            rows.sort_by(|a, b| table.rows[*a][col].compare(&table.rows[*b][col]));
        }

        let coords: Vec<(f64, f64)> = rows
            .iter()
            .filter_map(|&r| {
                let row = &table.rows[r];
                Some((row[lon_col].as_f64()?, row[lat_col].as_f64()?))
            })
            .collect();
        let geometry = match geometry_for(&coords) {
            Some(geometry) => geometry,
            None => {
                debug!("Polygon {:?} has no usable coordinates", id);
                continue;
            }
        };

        let first = &table.rows[rows[0]];
        let mut properties = Map::new();
        properties.insert(POLYGON_ID_PROPERTY.to_string(), id.to_json());
        for (field, key) in DESCRIPTIVE_PROPERTIES {
            let value = columns
                .get(field)
                .map(|col| first[col].to_json())
                .unwrap_or(JsonValue::Null);
            properties.insert(key.to_string(), value);
        }
        properties.insert(PRODUCER_COUNTRY.to_string(), JsonValue::from(country));

        features.push(Feature {
            bbox: None,
            geometry: Some(Geometry::new(geometry)),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        });
    }
    Ok(features)
}

/// Converts one CSV file into a FeatureCollection at `out_path`, replacing
/// any existing file. Returns the number of features written.
pub fn convert(
    csv_path: impl AsRef<Path>,
    out_path: impl AsRef<Path>,
    country: &str,
    vertex_order_col: Option<&str>,
) -> Result<usize> {
    let table = Table::read(csv_path.as_ref())?;
    let columns = ColumnMap::resolve(&table.headers);
    debug!("{}: columns {}", csv_path.as_ref().display(), columns.describe());
    let order_col = vertex_order_col.and_then(|name| table.column(name));
    let features = features_from_table(&table, &columns, country, order_col)?;
    let count = features.len();

    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };
    write_collection(out_path.as_ref(), &collection)?;
    Ok(count)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Written {
    pub source: String,
    pub dest: String,
    pub features: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub inputs: usize,
    pub outputs: usize,
    pub country: String,
    pub vertex_order_col: Option<String>,
    pub written: Vec<Written>,
    pub errors: Vec<ItemError>,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Every `.csv` file directly inside `input_folder`, sorted by name.
fn discover(input_folder: &Path) -> Result<Vec<PathBuf>> {
    if !input_folder.is_dir() {
        return Err(Error::InvalidInput(input_folder.to_path_buf()));
    }
    let entries = fs::read_dir(input_folder).map_err(|source| Error::Read {
        path: input_folder.to_path_buf(),
        source,
    })?;
    let mut csv_files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && has_extension(path, "csv"))
        .collect();
    csv_files.sort();
    Ok(csv_files)
}

/// Number of files a batch conversion of `input_folder` would read.
pub fn count_csv_inputs(input_folder: impl AsRef<Path>) -> Result<usize> {
    discover(input_folder.as_ref()).map(|paths| paths.len())
}

/// Converts every `.csv` directly inside `input_folder` into
/// `<output_folder>/<stem>.geojson`. A file that fails is recorded in the
/// summary and the rest still run.
pub fn batch_convert(
    input_folder: impl AsRef<Path>,
    output_folder: impl AsRef<Path>,
    country: &str,
    vertex_order_col: Option<&str>,
) -> Result<BatchSummary> {
    let input_folder = input_folder.as_ref();
    let output_folder = output_folder.as_ref();
    let csv_files = discover(input_folder)?;
    if csv_files.is_empty() {
        return Err(Error::NotFound {
            what: ".csv",
            dir: input_folder.to_path_buf(),
        });
    }
    info!("Converting {} CSV files from {}", csv_files.len(), input_folder.display());

    let mut written = Vec::new();
    let mut errors = Vec::new();
    for csv_path in &csv_files {
        let stem = csv_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let out_path = output_folder.join(format!("{}.geojson", stem));
        match convert(csv_path, &out_path, country, vertex_order_col) {
            Ok(features) => {
                debug!("{} -> {} ({} features)", csv_path.display(), out_path.display(), features);
                written.push(Written {
                    source: file_name(csv_path),
                    dest: file_name(&out_path),
                    features,
                });
            }
            Err(e) => {
                warn!("{}: {}", csv_path.display(), e);
                errors.push(ItemError::new(file_name(csv_path), &e));
            }
        }
    }

    info!("Converted {}/{} CSV files", written.len(), csv_files.len());
    Ok(BatchSummary {
        inputs: csv_files.len(),
        outputs: written.len(),
        country: country.to_string(),
        vertex_order_col: vertex_order_col.map(str::to_string),
        written,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(text: &str) -> Table {
        Table::from_reader(text.as_bytes()).unwrap()
    }

    fn features(text: &str, order: Option<&str>) -> Vec<Feature> {
        let table = table(text);
        let columns = ColumnMap::resolve(&table.headers);
        let order_col = order.and_then(|name| table.column(name));
        features_from_table(&table, &columns, "NZ", order_col).unwrap()
    }

    fn ring(feature: &Feature) -> Vec<Vec<f64>> {
        match &feature.geometry.as_ref().unwrap().value {
            GeoJsonValue::Polygon(rings) => rings[0].clone(),
            other => panic!("expected polygon, got {:?}", other),
        }
    }

    #[test]
    fn types_columns() {
        let t = table("a,b,c,d\n1,1.5,x,True\n2,,y,false\nNA,3,,\n");
        assert_eq!(t.rows[0], vec![Cell::Int(1), Cell::Float(1.5), Cell::Text("x".into()), Cell::Bool(true)]);
        assert_eq!(t.rows[1][1], Cell::Null);
        assert_eq!(t.rows[2][0], Cell::Null);
        assert_eq!(t.rows[2][1], Cell::Float(3.0));
    }

    #[test]
    fn picks_geometry_by_vertex_count() {
        let csv = "Polygon #,Longitude,Latitude\n\
                   1,170.0,-40.0\n\
                   2,171.0,-41.0\n2,171.5,-41.5\n\
                   3,172.0,-42.0\n3,172.5,-42.0\n3,172.5,-42.5\n\
                   4,abc,-43.0\n4,,\n";
        let features = features(csv, None);
        assert_eq!(features.len(), 3);

        let polygons: Vec<bool> = features
            .iter()
            .map(|f| matches!(f.geometry.as_ref().unwrap().value, GeoJsonValue::Polygon(_)))
            .collect();
        assert_eq!(polygons, vec![false, false, true]);

        assert_eq!(
            features[1].geometry.as_ref().unwrap().value,
            GeoJsonValue::Point(vec![171.0, -41.0])
        );
        let ring = ring(&features[2]);
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.first(), ring.last());
    }

    #[test]
    fn groups_in_ascending_identifier_order() {
        let csv = "Polygon #,Longitude,Latitude\n10,1,1\n9,2,2\n100,3,3\n";
        let ids: Vec<JsonValue> = features(csv, None)
            .iter()
            .map(|f| f.property(POLYGON_ID_PROPERTY).cloned().unwrap())
            .collect();
        assert_eq!(ids, vec![json!(9), json!(10), json!(100)]);
    }

    #[test]
    fn order_column_changes_vertex_sequence() {
        let csv = "Polygon #,Longitude,Latitude,Seq\n\
                   1,0,0,1\n1,1,1,3\n1,1,0,2\n1,0,1,4\n";
        let natural = ring(&features(csv, None)[0]);
        let ordered = ring(&features(csv, Some("Seq"))[0]);
        assert_ne!(natural, ordered);
        assert_eq!(
            ordered,
            vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![1.0, 1.0], vec![0.0, 1.0], vec![0.0, 0.0]]
        );
    }

    #[test]
    fn unknown_order_column_is_ignored() {
        let csv = "Polygon #,Longitude,Latitude\n1,0,0\n1,1,0\n1,1,1\n";
        assert_eq!(ring(&features(csv, Some("Seq"))[0]), ring(&features(csv, None)[0]));
    }

    #[test]
    fn copies_descriptive_fields_from_first_row() {
        let csv = "Polygon #,Longitude,Latitude,Log Supplier,Forest Name,% of Supply,Seq\n\
                   7,0,0,Second,Beta,20,2\n\
                   7,1,0,First,Alpha,10,1\n";
        let feature = &features(csv, Some("Seq"))[0];
        let props = feature.properties.as_ref().unwrap();
        assert_eq!(props["ProducerName"], json!("First"));
        assert_eq!(props["ProductionPlace"], json!("Alpha"));
        assert_eq!(props["% of Supply"], json!(10));
        assert_eq!(props["date start"], JsonValue::Null);
        assert_eq!(props["Under 4Ha?"], JsonValue::Null);
        assert_eq!(props["ProducerCountry"], json!("NZ"));
    }

    #[test]
    fn reports_missing_columns() {
        let t = table("Polygon #,Lat\n1,2\n");
        let columns = ColumnMap::resolve(&t.headers);
        match features_from_table(&t, &columns, "NZ", None) {
            Err(Error::MissingColumns(missing)) => assert_eq!(missing, vec!["Longitude"]),
            other => panic!("unexpected {:?}", other.map(|f| f.len())),
        }
    }
}
