//! Boundary to the hosting map surface.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::geo::{LatLng, Viewport};
use crate::style::ZoneStyle;
use crate::zone::{Zone, ZoneId};

/// What the engine needs from the map: read bounds and zoom, draw and erase
/// zones.
pub trait MapSurface {
    fn bounds(&self) -> Viewport;
    fn zoom(&self) -> u8;
    fn add_zone(&mut self, zone: &Zone, style: &ZoneStyle);
    fn remove_zone(&mut self, zone: &Zone);
    fn set_zone_style(&mut self, zone: &Zone, style: &ZoneStyle);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SurfaceOp {
    Add { zone: ZoneId, style: ZoneStyle },
    Remove { zone: ZoneId },
    Style { zone: ZoneId, style: ZoneStyle },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SurfaceCounters {
    pub added: usize,
    pub removed: usize,
    pub restyled: usize,
}

/// In-memory surface that remembers what is drawn and logs every call.
#[derive(Debug, Clone)]
pub struct RecordingSurface {
    bounds: Viewport,
    zoom: u8,
    attached: BTreeMap<ZoneId, ZoneStyle>,
    log: Vec<SurfaceOp>,
    counters: SurfaceCounters,
}

impl RecordingSurface {
    pub fn new(bounds: Viewport, zoom: u8) -> Self {
        Self {
            bounds,
            zoom,
            attached: BTreeMap::new(),
            log: Vec::new(),
            counters: SurfaceCounters::default(),
        }
    }

    pub fn set_view(&mut self, bounds: Viewport, zoom: u8) {
        self.bounds = bounds;
        self.zoom = zoom;
    }

    pub fn set_bounds(&mut self, bounds: Viewport) {
        self.bounds = bounds;
    }

    pub fn set_zoom(&mut self, zoom: u8) {
        self.zoom = zoom;
    }

    pub fn attached(&self) -> &BTreeMap<ZoneId, ZoneStyle> {
        &self.attached
    }

    pub fn is_attached(&self, id: ZoneId) -> bool {
        self.attached.contains_key(&id)
    }

    pub fn log(&self) -> &[SurfaceOp] {
        &self.log
    }

    pub fn drain_log(&mut self) -> Vec<SurfaceOp> {
        std::mem::take(&mut self.log)
    }

    pub fn counters(&self) -> SurfaceCounters {
        self.counters
    }
}

impl Default for RecordingSurface {
    fn default() -> Self {
        Self::new(
            Viewport::new(LatLng::new(-12.10, -77.10), LatLng::new(-11.99, -76.95)),
            11,
        )
    }
}

impl MapSurface for RecordingSurface {
    fn bounds(&self) -> Viewport {
        self.bounds
    }

    fn zoom(&self) -> u8 {
        self.zoom
    }

    fn add_zone(&mut self, zone: &Zone, style: &ZoneStyle) {
        self.attached.insert(zone.id(), style.clone());
        self.counters.added += 1;
        self.log.push(SurfaceOp::Add {
            zone: zone.id(),
            style: style.clone(),
        });
    }

    fn remove_zone(&mut self, zone: &Zone) {
        self.attached.remove(&zone.id());
        self.counters.removed += 1;
        self.log.push(SurfaceOp::Remove { zone: zone.id() });
    }

    fn set_zone_style(&mut self, zone: &Zone, style: &ZoneStyle) {
        if let Some(current) = self.attached.get_mut(&zone.id()) {
            *current = style.clone();
        }
        self.counters.restyled += 1;
        self.log.push(SurfaceOp::Style {
            zone: zone.id(),
            style: style.clone(),
        });
    }
}
