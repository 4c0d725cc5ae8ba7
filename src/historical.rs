//! Fixed historical dataset: records per year, loaded in bulk at maximum zoom.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::filter::FilterState;
use crate::geo::{haversine_km, vertex_centroid, LatLng};
use crate::zone::{Category, TierKind, Zone, ZoneIdAllocator, ZoneSpec};

pub const DEFAULT_NEARBY_KM: f64 = 50.0;
pub const DEFAULT_GROUP_KM: f64 = 0.5;

/// One already-scored zone descriptor as supplied by the data provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    #[serde(alias = "coords")]
    pub polygon: Vec<[f64; 2]>,
    pub intensity: f64,
    #[serde(default, alias = "dataType")]
    pub category: Category,
    #[serde(default, alias = "source")]
    pub source_label: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl HistoricalRecord {
    pub fn vertices(&self) -> Vec<LatLng> {
        self.polygon.iter().copied().map(LatLng::from).collect()
    }

    pub fn centroid(&self) -> Option<LatLng> {
        vertex_centroid(&self.vertices())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoricalDataset {
    years: BTreeMap<i32, Vec<HistoricalRecord>>,
}

impl HistoricalDataset {
    pub fn new(years: BTreeMap<i32, Vec<HistoricalRecord>>) -> Self {
        Self { years }
    }

    pub fn push(&mut self, year: i32, record: HistoricalRecord) {
        self.years.entry(year).or_default().push(record);
    }

    pub fn len(&self) -> usize {
        self.years.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn years(&self) -> impl Iterator<Item = i32> + '_ {
        self.years.keys().copied()
    }

    pub fn records(&self) -> impl Iterator<Item = (i32, &HistoricalRecord)> {
        self.years
            .iter()
            .flat_map(|(year, records)| records.iter().map(move |r| (*year, r)))
    }

    /// Records whose centroid lies within `max_km` of `center`, nearest first.
    pub fn events_near(&self, center: &LatLng, max_km: f64) -> Vec<NearbyEvent<'_>> {
        let mut events: Vec<NearbyEvent<'_>> = self
            .records()
            .filter_map(|(year, record)| {
                let centroid = record.centroid()?;
                let distance_km = haversine_km(center, &centroid);
                (distance_km <= max_km).then_some(NearbyEvent {
                    year,
                    record,
                    centroid,
                    distance_km,
                })
            })
            .collect();
        events.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        events
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NearbyEvent<'a> {
    pub year: i32,
    pub record: &'a HistoricalRecord,
    pub centroid: LatLng,
    pub distance_km: f64,
}

/// Greedy clustering: each ungrouped event opens a group and absorbs every
/// later ungrouped event within `max_km` of it.
pub fn group_nearby<'a>(events: &[NearbyEvent<'a>], max_km: f64) -> Vec<Vec<NearbyEvent<'a>>> {
    let mut taken = vec![false; events.len()];
    let mut groups = Vec::new();
    for (i, event) in events.iter().enumerate() {
        if taken[i] {
            continue;
        }
        taken[i] = true;
        let mut group = vec![*event];
        for (j, other) in events.iter().enumerate().skip(i + 1) {
            if !taken[j] && haversine_km(&event.centroid, &other.centroid) <= max_km {
                taken[j] = true;
                group.push(*other);
            }
        }
        groups.push(group);
    }
    groups
}

#[derive(Debug, Clone, Default)]
pub struct HistoricalLoad {
    pub zones: Vec<Zone>,
    pub filtered_out: usize,
    pub invalid: usize,
}

/// Maps the dataset into microzone-tier zones, applying the threshold and
/// category filter. No collision avoidance: records are assumed distinct.
pub fn load_fixed(
    dataset: &HistoricalDataset,
    filter: &FilterState,
    ids: &mut ZoneIdAllocator,
) -> HistoricalLoad {
    let mut load = HistoricalLoad::default();
    for (year, record) in dataset.records() {
        if !filter.admits(record.category, record.intensity) {
            load.filtered_out += 1;
            continue;
        }
        let spec = ZoneSpec {
            tier: TierKind::Microzone,
            year,
            category: record.category,
            intensity: record.intensity,
            polygon: record.vertices(),
            centroid: None,
            source_label: record.source_label.clone(),
            name: record.name.clone(),
        };
        match ids.create(spec) {
            Ok(zone) => load.zones.push(zone),
            Err(err) => {
                warn!(
                    year,
                    name = ?record.name,
                    error = %err,
                    "skipping malformed historical record"
                );
                load.invalid += 1;
            }
        }
    }
    info!(
        loaded = load.zones.len(),
        filtered = load.filtered_out,
        invalid = load.invalid,
        "historical dataset loaded"
    );
    load
}

pub struct DatasetLoader {
    base_dir: PathBuf,
}

impl DatasetLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// Reads a `{year: [records]}` document; `.json` files are parsed as JSON,
    /// anything else as YAML.
    pub fn load(&self, file: impl AsRef<Path>) -> Result<HistoricalDataset> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read dataset {}", path.display()))?;
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let dataset: HistoricalDataset = if is_json {
            serde_json::from_str(&data)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            serde_yaml::from_str(&data)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        };
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn record(lat: f64, lng: f64, intensity: f64, category: Category) -> HistoricalRecord {
        let d = 0.002;
        HistoricalRecord {
            polygon: vec![[lat, lng], [lat + d, lng], [lat + d, lng + d], [lat, lng + d]],
            intensity,
            category,
            source_label: Some("Rio Rimac".into()),
            name: None,
        }
    }

    fn dataset() -> HistoricalDataset {
        let mut data = HistoricalDataset::default();
        data.push(2017, record(-12.04, -77.03, 0.95, Category::Flood));
        data.push(2017, record(-12.00, -76.99, 0.70, Category::Flood));
        data.push(2023, record(-11.94, -76.70, 0.90, Category::Moisture));
        data
    }

    #[test]
    fn load_applies_threshold_and_categories() {
        let filter = FilterState::default();
        let mut ids = ZoneIdAllocator::new();
        let load = load_fixed(&dataset(), &filter, &mut ids);
        assert_eq!(load.zones.len(), 1);
        assert_eq!(load.filtered_out, 2);
        let zone = &load.zones[0];
        assert_eq!(zone.tier(), TierKind::Microzone);
        assert_eq!(zone.year(), 2017);
        assert_eq!(zone.source_label(), Some("Rio Rimac"));

        let open = FilterState {
            intensity_threshold: 0.0,
            visible_categories: BTreeSet::from(Category::ALL),
            ..FilterState::default()
        };
        assert_eq!(load_fixed(&dataset(), &open, &mut ids).zones.len(), 3);
    }

    #[test]
    fn malformed_records_are_skipped() {
        let mut data = dataset();
        data.push(
            2018,
            HistoricalRecord {
                polygon: vec![[0.0, 0.0], [0.0, 0.0]],
                intensity: 0.99,
                category: Category::Flood,
                source_label: None,
                name: None,
            },
        );
        let mut ids = ZoneIdAllocator::new();
        let load = load_fixed(&data, &FilterState::default(), &mut ids);
        assert_eq!(load.invalid, 1);
        assert_eq!(load.zones.len(), 1);
    }

    #[test]
    fn parses_original_field_names() {
        let yaml = r#"
2017:
  - name: Desborde Rio Rimac
    coords: [[-11.945, -76.935], [-11.940, -76.930], [-11.948, -76.928]]
    intensity: 0.95
    dataType: moisture
    source: Rio Rimac
  - coords: [[-12.0, -77.0], [-12.0, -77.01], [-12.01, -77.0]]
    intensity: 0.5
"#;
        let data: HistoricalDataset = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(data.len(), 2);
        let records: Vec<_> = data.records().collect();
        assert_eq!(records[0].1.category, Category::Moisture);
        assert_eq!(records[0].1.source_label.as_deref(), Some("Rio Rimac"));
        assert_eq!(records[1].1.category, Category::Flood);
    }

    #[test]
    fn nearby_events_sorted_and_grouped() {
        let data = dataset();
        let center = LatLng::new(-12.0464, -77.0428);
        let near = data.events_near(&center, 10.0);
        assert_eq!(near.len(), 2);
        assert!(near[0].distance_km <= near[1].distance_km);
        assert_eq!(near[0].year, 2017);

        let all = data.events_near(&center, DEFAULT_NEARBY_KM);
        assert_eq!(all.len(), 3);
        assert_eq!(group_nearby(&all, DEFAULT_GROUP_KM).len(), 3);
        assert_eq!(group_nearby(&all, 100.0).len(), 1);
    }
}
