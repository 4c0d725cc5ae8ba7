use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::Engine;
use crate::filter::FilterState;
use crate::geo::LatLng;
use crate::style::ZoneStyle;
use crate::surface::MapSurface;
use crate::zone::{Category, TierKind, Zone};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub pass: u64,
    pub zoom: Option<u8>,
    pub tier: Option<TierKind>,
    pub filter: FilterState,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneProperties {
    pub id: String,
    pub tier: TierKind,
    pub year: i32,
    pub category: Category,
    pub intensity: f64,
    pub opacity: f64,
    pub colour: String,
    pub source: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolygonGeometry {
    #[serde(rename = "type")]
    pub kind: String,
    /// One closed `[lng, lat]` ring.
    pub coordinates: Vec<Vec<[f64; 2]>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneFeature {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: PolygonGeometry,
    pub properties: ZoneProperties,
}

impl ZoneFeature {
    pub fn new(zone: &Zone, style: &ZoneStyle) -> Self {
        let mut ring: Vec<[f64; 2]> = zone.polygon().iter().map(lng_lat).collect();
        if let Some(first) = ring.first().copied() {
            ring.push(first);
        }
        Self {
            kind: "Feature".to_string(),
            geometry: PolygonGeometry {
                kind: "Polygon".to_string(),
                coordinates: vec![ring],
            },
            properties: ZoneProperties {
                id: zone.id().to_string(),
                tier: zone.tier(),
                year: zone.year(),
                category: zone.category(),
                intensity: zone.intensity(),
                opacity: style.opacity,
                colour: style.color.clone(),
                source: zone.source_label().map(str::to_string),
                name: zone.name().map(str::to_string),
            },
        }
    }
}

fn lng_lat(point: &LatLng) -> [f64; 2] {
    [point.lng, point.lat]
}

/// GeoJSON `FeatureCollection` of the zones attached at one instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub metadata: FrameMetadata,
    pub features: Vec<ZoneFeature>,
}

impl ZoneFrame {
    pub fn capture<S: MapSurface>(engine: &Engine<S>, pass: u64) -> Self {
        let features = engine
            .attached_zones()
            .map(|(zone, style)| ZoneFeature::new(zone, style))
            .collect();
        Self {
            kind: "FeatureCollection".to_string(),
            metadata: FrameMetadata {
                pass,
                zoom: engine.current_zoom(),
                tier: engine.current_tier(),
                filter: engine.filter().clone(),
                generated_at: Utc::now(),
            },
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Writes a frame every `interval` passes under `dir/<session>/`.
pub struct SnapshotWriter {
    dir: PathBuf,
    interval: u64,
}

impl SnapshotWriter {
    pub fn new(dir: impl AsRef<Path>, interval: u64) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            interval,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.interval > 0
    }

    pub fn maybe_write<S: MapSurface>(
        &self,
        engine: &Engine<S>,
        pass: u64,
        session: &str,
    ) -> Result<Option<PathBuf>, SnapshotError> {
        if self.interval == 0 || pass == 0 || pass % self.interval != 0 {
            return Ok(None);
        }
        let frame = ZoneFrame::capture(engine, pass);
        self.write(&frame, session).map(Some)
    }

    pub fn write(&self, frame: &ZoneFrame, session: &str) -> Result<PathBuf, SnapshotError> {
        let dir = self.dir.join(session);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("pass_{:06}.json", frame.metadata.pass));
        let json = serde_json::to_string_pretty(frame)?;
        fs::write(&path, json)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineBuilder, EngineSettings};
    use crate::lod::SettleKind;
    use crate::surface::RecordingSurface;
    use std::time::Duration;

    fn settled_engine() -> Engine<RecordingSurface> {
        let mut engine = EngineBuilder::new(EngineSettings::default())
            .build(RecordingSurface::default())
            .unwrap();
        engine.on_viewport_changed(SettleKind::Zoom, 12, Duration::ZERO);
        engine.advance_to(Duration::from_millis(300)).unwrap();
        engine
    }

    #[test]
    fn frame_contains_attached_zones_as_closed_rings() {
        let engine = settled_engine();
        let frame = ZoneFrame::capture(&engine, 1);
        assert_eq!(frame.len(), engine.surface().attached().len());
        for feature in &frame.features {
            let ring = &feature.geometry.coordinates[0];
            assert_eq!(ring.first(), ring.last());
            assert!(ring.len() >= 4);
            assert!(feature.properties.opacity >= 0.0 && feature.properties.opacity <= 1.0);
        }
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "FeatureCollection");
        assert_eq!(json["metadata"]["tier"], "district");
    }

    #[test]
    fn writer_respects_interval() {
        let dir = tempfile::tempdir().unwrap();
        let engine = settled_engine();
        let writer = SnapshotWriter::new(dir.path(), 2);
        assert!(writer.maybe_write(&engine, 1, "demo").unwrap().is_none());
        let path = writer.maybe_write(&engine, 2, "demo").unwrap().unwrap();
        assert!(path.ends_with("demo/pass_000002.json"));
        let text = fs::read_to_string(path).unwrap();
        let frame: ZoneFrame = serde_json::from_str(&text).unwrap();
        assert_eq!(frame.metadata.pass, 2);

        let disabled = SnapshotWriter::new(dir.path(), 0);
        assert!(disabled.maybe_write(&engine, 2, "demo").unwrap().is_none());
    }
}
