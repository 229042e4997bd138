/// Logical fields a plot table can carry, whatever its headers are called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    PolygonId,
    Longitude,
    Latitude,
    Producer,
    Forest,
    DateStart,
    DateEnd,
    PercentSupply,
    Under4Ha,
}

impl Field {
    pub const ALL: [Field; 9] = [
        Field::PolygonId,
        Field::Longitude,
        Field::Latitude,
        Field::Producer,
        Field::Forest,
        Field::DateStart,
        Field::DateEnd,
        Field::PercentSupply,
        Field::Under4Ha,
    ];

    pub const REQUIRED: [Field; 3] = [Field::PolygonId, Field::Longitude, Field::Latitude];

    pub fn canonical_name(self) -> &'static str {
        match self {
            Field::PolygonId => "polygon_id",
            Field::Longitude => "longitude",
            Field::Latitude => "latitude",
            Field::Producer => "producer",
            Field::Forest => "forest",
            Field::DateStart => "date_start",
            Field::DateEnd => "date_end",
            Field::PercentSupply => "percent_supply",
            Field::Under4Ha => "under_4ha",
        }
    }

    /// Accepted header spellings. Matching is exact and case-sensitive; the
    /// first entry is the one the supplier template uses.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Field::PolygonId => &["Polygon #", "Polygon", "Polygon ID", "PolygonID", "polygon_id", "Plot ID"],
            Field::Longitude => &["Longitude", "longitude", "Long", "Lon", "lon", "lng", "X"],
            Field::Latitude => &["Latitude", "latitude", "Lat", "lat", "Y"],
            Field::Producer => &["Log Supplier", "ProducerName", "Producer", "Supplier"],
            Field::Forest => &["Forest Name", "Forest", "ProductionPlace"],
            Field::DateStart => &["Harvest Start Date", "date start", "Start Date"],
            Field::DateEnd => &["Latest supplied Harvest Date", "date end", "End Date"],
            Field::PercentSupply => &["% of Supply", "Percent of Supply", "Supply %"],
            Field::Under4Ha => &["Under 4Ha?", "Under 4Ha", "Under4Ha"],
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// Header index for each field, `None` where no header matched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    indices: [Option<usize>; 9],
}

impl ColumnMap {
    /// Walks the header row left to right; the first header listed among a
    /// field's aliases is taken for that field.
    pub fn resolve<S: AsRef<str>>(headers: &[S]) -> Self {
        let mut map = ColumnMap::default();
        for field in Field::ALL {
            map.indices[field.slot()] = headers
                .iter()
                .position(|header| field.aliases().contains(&header.as_ref()));
        }
        map
    }

    pub fn get(&self, field: Field) -> Option<usize> {
        self.indices[field.slot()]
    }

    /// Display names of the required fields that did not resolve.
    pub fn missing_required(&self) -> Vec<String> {
        Field::REQUIRED
            .iter()
            .filter(|field| self.get(**field).is_none())
            .map(|field| field.aliases()[0].to_string())
            .collect()
    }

    /// `field=index` for every resolved field, for logging.
    pub fn describe(&self) -> String {
        Field::ALL
            .iter()
            .filter_map(|field| Some(format!("{}={}", field.canonical_name(), self.get(*field)?)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
