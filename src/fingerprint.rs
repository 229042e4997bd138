use std::collections::HashSet;
use std::fmt;
use geojson::Feature;
use serde_json::{json, Map, Value as JsonValue};
use sha2::{Digest, Sha256};

use crate::normalize::{PRODUCER_COUNTRY, PRODUCTION_PLACE};

/// SHA-256 over a feature's geometry and its non-provenance properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(feature: &Feature) -> Self {
        let geometry = serde_json::to_value(&feature.geometry).unwrap_or(JsonValue::Null);
        let properties: Map<String, JsonValue> = feature
            .properties
            .iter()
            .flatten()
            .filter(|(key, _)| key.as_str() != PRODUCTION_PLACE && key.as_str() != PRODUCER_COUNTRY)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let canonical = canonicalize(&json!({
            "geometry": geometry,
            "properties": properties,
        }));
        // Serializing a `Value` cannot fail: every key is a string.
        let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
        Fingerprint(Sha256::digest(&bytes).into())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Rebuilds every object with its keys in lexicographic order, so the
/// serialized form does not depend on the order keys were written in.
fn canonicalize(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(object) => {
            let mut keys: Vec<&String> = object.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&object[key.as_str()]));
            }
            JsonValue::Object(sorted)
        }
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Keeps the first feature seen for each fingerprint.
#[derive(Default)]
pub struct Deduplicator {
    seen: HashSet<Fingerprint>,
    kept: Vec<Feature>,
    duplicates: usize,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the feature was new and has been kept.
    pub fn push(&mut self, feature: Feature) -> bool {
        if self.seen.insert(Fingerprint::of(&feature)) {
            self.kept.push(feature);
            true
        } else {
            self.duplicates += 1;
            false
        }
    }

    pub fn len(&self) -> usize {
        self.kept.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn into_features(self) -> Vec<Feature> {
        self.kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(value: JsonValue) -> Feature {
        Feature::from_json_value(value).unwrap()
    }

    #[test]
    fn ignores_property_order() {
        let a = feature(json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [1.0, 2.0]},
            "properties": {"a": 1, "b": {"x": 1, "y": 2}}
        }));
        let b = feature(json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [1.0, 2.0]},
            "properties": {"b": {"y": 2, "x": 1}, "a": 1}
        }));
        assert_eq!(Fingerprint::of(&a), Fingerprint::of(&b));
    }

    #[test]
    fn ignores_provenance() {
        let a = feature(json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [1.0, 2.0]},
            "properties": {"ProductionPlace": "north", "ProducerCountry": "NZ"}
        }));
        let b = feature(json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [1.0, 2.0]},
            "properties": {"ProductionPlace": "south", "ProducerCountry": "AU"}
        }));
        let c = feature(json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [1.0, 2.0]},
            "properties": {}
        }));
        assert_eq!(Fingerprint::of(&a), Fingerprint::of(&b));
        assert_eq!(Fingerprint::of(&a), Fingerprint::of(&c));
    }

    #[test]
    fn distinguishes_geometry_and_properties() {
        let base = feature(json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [1.0, 2.0]},
            "properties": {"name": "a"}
        }));
        let moved = feature(json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [1.0, 2.5]},
            "properties": {"name": "a"}
        }));
        let renamed = feature(json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [1.0, 2.0]},
            "properties": {"name": "b"}
        }));
        assert_ne!(Fingerprint::of(&base), Fingerprint::of(&moved));
        assert_ne!(Fingerprint::of(&base), Fingerprint::of(&renamed));
        assert_eq!(Fingerprint::of(&base).to_string().len(), 64);
    }

    #[test]
    fn deduplicator_keeps_first() {
        let mut dedup = Deduplicator::new();
        let first = feature(json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [1.0, 2.0]},
            "properties": {"ProductionPlace": "first"}
        }));
        let second = feature(json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [1.0, 2.0]},
            "properties": {"ProductionPlace": "second"}
        }));
        assert!(dedup.push(first));
        assert!(!dedup.push(second));
        assert_eq!(dedup.len(), 1);
        assert_eq!(dedup.duplicates(), 1);
        let kept = dedup.into_features();
        assert_eq!(kept[0].property("ProductionPlace"), Some(&json!("first")));
    }
}
