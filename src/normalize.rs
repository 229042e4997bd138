use std::path::Path;
use geojson::feature::Id;
use geojson::{Feature, Geometry, JsonObject};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

pub const PRODUCTION_PLACE: &str = "ProductionPlace";
pub const PRODUCER_COUNTRY: &str = "ProducerCountry";

const GEOMETRY_TYPES: [&str; 7] = [
    "Point",
    "MultiPoint",
    "LineString",
    "MultiLineString",
    "Polygon",
    "MultiPolygon",
    "GeometryCollection",
];

fn is_geometry_type(kind: &str) -> bool {
    GEOMETRY_TYPES.contains(&kind)
}

fn type_of(value: &JsonValue) -> Option<&str> {
    value.get("type").and_then(JsonValue::as_str)
}

/// Keeps what can be kept of a `"Feature"` object that does not parse as one:
/// a geometry that parses on its own, an object-valued `properties`, a string
/// or numeric `id`, and any foreign members.
fn salvage_feature(mut object: JsonObject) -> Feature {
    let geometry = object
        .remove("geometry")
        .filter(|value| !value.is_null())
        .and_then(|value| Geometry::from_json_value(value).ok());
    let properties = match object.remove("properties") {
        Some(JsonValue::Object(properties)) => properties,
        _ => JsonObject::new(),
    };
    let id = match object.remove("id") {
        Some(JsonValue::String(id)) => Some(Id::String(id)),
        Some(JsonValue::Number(id)) => Some(Id::Number(id)),
        _ => None,
    };
    object.remove("type");
    object.remove("bbox");
    Feature {
        bbox: None,
        geometry,
        id,
        properties: Some(properties),
        foreign_members: (!object.is_empty()).then_some(object),
    }
}

/// Provenance stamped onto every feature read from one file.
pub struct Provenance<'a> {
    pub place: String,
    pub country: &'a str,
}

impl<'a> Provenance<'a> {
    /// The production place is the source file's stem.
    pub fn new(source: &Path, country: &'a str) -> Self {
        let place = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Unknown".to_string());
        Provenance { place, country }
    }

    fn annotate(&self, feature: &mut Feature) {
        feature.set_property(PRODUCTION_PLACE, self.place.clone());
        feature.set_property(PRODUCER_COUNTRY, self.country);
    }

    fn wrap(&self, geometry: Geometry) -> Feature {
        let mut feature = Feature {
            bbox: None,
            geometry: Some(geometry),
            id: None,
            properties: Some(serde_json::Map::new()),
            foreign_members: None,
        };
        self.annotate(&mut feature);
        feature
    }

    fn member(&self, value: JsonValue, out: &mut Vec<Feature>) {
        let kind = type_of(&value).map(str::to_owned);
        match kind.as_deref() {
            Some("Feature") => {
                let mut feature = match Feature::from_json_value(value.clone()) {
                    Ok(feature) => feature,
                    Err(e) => {
                        warn!("Keeping malformed feature from {} as-is: {}", self.place, e);
                        match value {
                            JsonValue::Object(object) => salvage_feature(object),
                            _ => return,
                        }
                    }
                };
                self.annotate(&mut feature);
                out.push(feature);
            }
            Some(kind) if is_geometry_type(kind) => match Geometry::from_json_value(value) {
                Ok(geometry) => out.push(self.wrap(geometry)),
                Err(e) => warn!("Skipping malformed geometry from {}: {}", self.place, e),
            },
            other => debug!("Dropping non-feature member {:?} from {}", other, self.place),
        }
    }
}

/// Turns a parsed GeoJSON-like document into a flat list of features.
///
/// Collections are flattened, bare geometries are wrapped, and every feature
/// gets `ProductionPlace` and `ProducerCountry` written into its properties,
/// overwriting any existing values. Documents of any other type yield an empty
/// list rather than an error.
pub fn to_features(document: JsonValue, provenance: &Provenance) -> Vec<Feature> {
    let mut features = Vec::new();
    let kind = type_of(&document).map(str::to_owned);
    match kind.as_deref() {
        Some("FeatureCollection") => {
            let members = match document {
                JsonValue::Object(mut object) => match object.remove("features") {
                    Some(JsonValue::Array(members)) => members,
                    _ => Vec::new(),
                },
                _ => Vec::new(),
            };
            for member in members {
                provenance.member(member, &mut features);
            }
        }
        Some(_) => provenance.member(document, &mut features),
        None => debug!("Document from {} has no type", provenance.place),
    }
    features
}
