use geojson::{Feature, Value as GeoJsonValue};

/// Axis-aligned envelope accumulated over every position of a geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    fn point(x: f64, y: f64) -> Self {
        Envelope { min_x: x, min_y: y, max_x: x, max_y: y }
    }

    fn expand(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// `[minX, minY, maxX, maxY]`, the GeoJSON `bbox` layout.
    pub fn to_bbox(self) -> Vec<f64> {
        vec![self.min_x, self.min_y, self.max_x, self.max_y]
    }
}

#[derive(Default)]
struct EnvelopeVisitor {
    envelope: Option<Envelope>,
}

impl EnvelopeVisitor {
    fn position(&mut self, position: &[f64]) {
        // Anything shorter than an x/y pair carries no extent.
        let (x, y) = match position {
            [x, y, ..] => (*x, *y),
            _ => return,
        };
        match self.envelope.as_mut() {
            Some(envelope) => envelope.expand(x, y),
            None => self.envelope = Some(Envelope::point(x, y)),
        }
    }

    fn positions<'a>(&mut self, positions: impl IntoIterator<Item = &'a Vec<f64>>) {
        for position in positions {
            self.position(position);
        }
    }

    fn value(&mut self, value: &GeoJsonValue) {
        match value {
            GeoJsonValue::Point(position) => self.position(position),
            GeoJsonValue::MultiPoint(positions) | GeoJsonValue::LineString(positions) => {
                self.positions(positions)
            }
            GeoJsonValue::MultiLineString(lines) | GeoJsonValue::Polygon(lines) => {
                lines.iter().for_each(|line| self.positions(line))
            }
            GeoJsonValue::MultiPolygon(polygons) => polygons
                .iter()
                .flatten()
                .for_each(|ring| self.positions(ring)),
            GeoJsonValue::GeometryCollection(geometries) => {
                geometries.iter().for_each(|geometry| self.value(&geometry.value))
            }
        }
    }
}

/// Tight envelope over every feature's geometry, or `None` when no feature
/// carries a single coordinate.
pub fn envelope_of(features: &[Feature]) -> Option<Envelope> {
    let mut visitor = EnvelopeVisitor::default();
    for geometry in features.iter().filter_map(|f| f.geometry.as_ref()) {
        visitor.value(&geometry.value);
    }
    visitor.envelope
}
