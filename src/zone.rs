use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::{vertex_centroid, LatLng};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ZoneId(u64);

impl ZoneId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "z{}", self.0)
    }
}

/// Hands out zone ids that stay unique for the lifetime of an engine.
#[derive(Debug, Default)]
pub struct ZoneIdAllocator {
    next: u64,
}

impl ZoneIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> ZoneId {
        let id = ZoneId(self.next);
        self.next += 1;
        id
    }

    /// Builds a zone under the next id. A rejected spec does not consume
    /// an id, so accepted zones stay densely numbered.
    pub fn create(&mut self, spec: ZoneSpec) -> Result<Zone, InvalidZoneError> {
        let zone = Zone::new(ZoneId(self.next), spec)?;
        self.next += 1;
        Ok(zone)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Flood,
    Moisture,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Flood, Category::Moisture];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Flood => "flood",
            Category::Moisture => "moisture",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Detail tier, ordered from coarsest to finest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierKind {
    Regional,
    District,
    Microzone,
}

impl TierKind {
    pub const ALL: [TierKind; 3] = [TierKind::Regional, TierKind::District, TierKind::Microzone];

    pub fn as_str(self) -> &'static str {
        match self {
            TierKind::Regional => "regional",
            TierKind::District => "district",
            TierKind::Microzone => "microzone",
        }
    }

    pub(crate) fn stream_id(self) -> u32 {
        match self {
            TierKind::Regional => 1,
            TierKind::District => 2,
            TierKind::Microzone => 3,
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidZoneError {
    #[error("zone polygon needs at least 3 distinct vertices, got {count}")]
    TooFewVertices { count: usize },
    #[error("zone intensity {0} is outside [0, 1]")]
    IntensityOutOfRange(f64),
    #[error("zone geometry contains a non-finite coordinate")]
    NonFiniteCoordinate,
}

/// Everything needed to build a [`Zone`]. `centroid: None` means the vertex
/// mean is used.
#[derive(Debug, Clone)]
pub struct ZoneSpec {
    pub tier: TierKind,
    pub year: i32,
    pub category: Category,
    pub intensity: f64,
    pub polygon: Vec<LatLng>,
    pub centroid: Option<LatLng>,
    pub source_label: Option<String>,
    pub name: Option<String>,
}

/// A tagged risk polygon. Fields are private so tier, year and intensity
/// cannot change after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Zone {
    id: ZoneId,
    tier: TierKind,
    year: i32,
    category: Category,
    intensity: f64,
    polygon: Vec<LatLng>,
    centroid: LatLng,
    source_label: Option<String>,
    name: Option<String>,
}

impl Zone {
    pub fn new(id: ZoneId, spec: ZoneSpec) -> Result<Self, InvalidZoneError> {
        if !spec.intensity.is_finite() || !(0.0..=1.0).contains(&spec.intensity) {
            return Err(InvalidZoneError::IntensityOutOfRange(spec.intensity));
        }
        if spec.polygon.iter().any(|p| !p.is_finite()) {
            return Err(InvalidZoneError::NonFiniteCoordinate);
        }

        let polygon = dedup_ring(spec.polygon);
        if polygon.len() < 3 {
            return Err(InvalidZoneError::TooFewVertices {
                count: polygon.len(),
            });
        }

        let centroid = match spec.centroid {
            Some(c) if c.is_finite() => c,
            Some(_) => return Err(InvalidZoneError::NonFiniteCoordinate),
            None => vertex_centroid(&polygon).ok_or(InvalidZoneError::TooFewVertices { count: 0 })?,
        };

        Ok(Self {
            id,
            tier: spec.tier,
            year: spec.year,
            category: spec.category,
            intensity: spec.intensity,
            polygon,
            centroid,
            source_label: spec.source_label,
            name: spec.name,
        })
    }

    pub fn id(&self) -> ZoneId {
        self.id
    }

    pub fn tier(&self) -> TierKind {
        self.tier
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn intensity(&self) -> f64 {
        self.intensity
    }

    pub fn polygon(&self) -> &[LatLng] {
        &self.polygon
    }

    pub fn centroid(&self) -> LatLng {
        self.centroid
    }

    pub fn source_label(&self) -> Option<&str> {
        self.source_label.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

// Drops consecutive repeats, including a closing vertex equal to the first.
fn dedup_ring(mut points: Vec<LatLng>) -> Vec<LatLng> {
    points.dedup();
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(polygon: Vec<LatLng>, intensity: f64) -> ZoneSpec {
        ZoneSpec {
            tier: TierKind::District,
            year: 2020,
            category: Category::Flood,
            intensity,
            polygon,
            centroid: None,
            source_label: None,
            name: None,
        }
    }

    fn triangle() -> Vec<LatLng> {
        vec![
            LatLng::new(0.0, 0.0),
            LatLng::new(0.0, 1.0),
            LatLng::new(1.0, 0.0),
        ]
    }

    #[test]
    fn builds_valid_zone() {
        let mut ids = ZoneIdAllocator::new();
        let zone = Zone::new(ids.allocate(), spec(triangle(), 0.5)).unwrap();
        assert_eq!(zone.polygon().len(), 3);
        assert_eq!(zone.tier(), TierKind::District);
        assert!((zone.centroid().lat - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_out_of_range_intensity() {
        let mut ids = ZoneIdAllocator::new();
        let err = Zone::new(ids.allocate(), spec(triangle(), 1.2)).unwrap_err();
        assert_eq!(err, InvalidZoneError::IntensityOutOfRange(1.2));
        assert!(Zone::new(ids.allocate(), spec(triangle(), f64::NAN)).is_err());
    }

    #[test]
    fn rejects_degenerate_polygon_after_dedup() {
        let mut ids = ZoneIdAllocator::new();
        let polygon = vec![
            LatLng::new(0.0, 0.0),
            LatLng::new(0.0, 0.0),
            LatLng::new(1.0, 1.0),
            LatLng::new(0.0, 0.0),
        ];
        let err = Zone::new(ids.allocate(), spec(polygon, 0.5)).unwrap_err();
        assert_eq!(err, InvalidZoneError::TooFewVertices { count: 2 });
    }

    #[test]
    fn closing_vertex_is_dropped() {
        let mut ids = ZoneIdAllocator::new();
        let mut ring = triangle();
        ring.push(ring[0]);
        let zone = Zone::new(ids.allocate(), spec(ring, 0.9)).unwrap();
        assert_eq!(zone.polygon().len(), 3);
    }

    #[test]
    fn allocator_is_monotonic() {
        let mut ids = ZoneIdAllocator::new();
        let a = ids.allocate();
        let b = ids.allocate();
        assert!(a < b);
        assert_eq!(b.raw(), 1);
    }

    #[test]
    fn rejected_spec_does_not_consume_an_id() {
        let mut ids = ZoneIdAllocator::new();
        let first = ids.create(spec(triangle(), 0.5)).unwrap();
        assert!(ids.create(spec(triangle(), 1.5)).is_err());
        let second = ids.create(spec(triangle(), 0.5)).unwrap();
        assert_eq!(first.id().raw(), 0);
        assert_eq!(second.id().raw(), 1);
    }
}
