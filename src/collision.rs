//! Per-year centroid cache for a single synthesis pass.

use std::collections::HashMap;

use crate::geo::LatLng;

#[derive(Debug, Default)]
pub struct CollisionIndex {
    placed: HashMap<i32, Vec<LatLng>>,
}

impl CollisionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when a centroid of the same year lies strictly closer than
    /// `min_separation`. Linear in the number of zones placed for that year.
    pub fn has_collision(&self, point: &LatLng, year: i32, min_separation: f64) -> bool {
        self.placed
            .get(&year)
            .map(|points| points.iter().any(|p| p.distance(point) < min_separation))
            .unwrap_or(false)
    }

    pub fn record(&mut self, point: LatLng, year: i32) {
        self.placed.entry(year).or_default().push(point);
    }

    pub fn reset(&mut self) {
        self.placed.clear();
    }

    pub fn len(&self) -> usize {
        self.placed.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn placed_for(&self, year: i32) -> &[LatLng] {
        self.placed.get(&year).map(Vec::as_slice).unwrap_or(&[])
    }
}
