//! Temporal visibility and intensity-driven opacity.
//!
//! The resolver remembers which zones it has attached to the surface so that
//! recomputing with unchanged inputs issues no surface calls at all.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::config::PaletteConfig;
use crate::filter::FilterState;
use crate::surface::MapSurface;
use crate::zone::{Category, Zone, ZoneId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneStyle {
    pub visible: bool,
    pub opacity: f64,
    pub color: String,
}

/// Linear map of `intensity` from `[threshold, 1]` onto `[0, 1]`.
/// A threshold of 1 leaves no range, so any zone shown is fully opaque.
pub fn opacity_for(intensity: f64, threshold: f64) -> f64 {
    let range = 1.0 - threshold;
    if range > 0.0 {
        ((intensity - threshold) / range).clamp(0.0, 1.0)
    } else {
        1.0
    }
}

#[derive(Debug, Clone)]
pub struct Palette {
    config: PaletteConfig,
}

impl Palette {
    pub fn new(config: PaletteConfig) -> Self {
        Self { config }
    }

    pub fn color_for(&self, category: Category, year: i32) -> &str {
        let recent = year >= self.config.recent_since;
        match (category, recent) {
            (Category::Flood, true) => &self.config.flood_recent,
            (Category::Flood, false) => &self.config.flood_older,
            (Category::Moisture, true) => &self.config.moisture_recent,
            (Category::Moisture, false) => &self.config.moisture_older,
        }
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::new(PaletteConfig::default())
    }
}

/// Surface calls issued by one recompute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StyleDelta {
    pub attached: usize,
    pub detached: usize,
    pub restyled: usize,
}

impl StyleDelta {
    pub fn is_empty(&self) -> bool {
        self.attached == 0 && self.detached == 0 && self.restyled == 0
    }
}

#[derive(Debug, Default)]
pub struct TemporalStyleResolver {
    palette: Palette,
    attached: HashSet<ZoneId>,
    styles: BTreeMap<ZoneId, ZoneStyle>,
}

impl TemporalStyleResolver {
    pub fn new(palette: Palette) -> Self {
        Self {
            palette,
            attached: HashSet::new(),
            styles: BTreeMap::new(),
        }
    }

    pub fn style_for(&self, zone: &Zone, filter: &FilterState) -> ZoneStyle {
        let visible = filter.shows(zone);
        let opacity = if visible {
            opacity_for(zone.intensity(), filter.intensity_threshold)
        } else {
            0.0
        };
        ZoneStyle {
            visible,
            opacity,
            color: self.palette.color_for(zone.category(), zone.year()).to_string(),
        }
    }

    /// Pure part of the recompute: the style every zone should have.
    pub fn compute<'a, I>(&self, zones: I, filter: &FilterState) -> BTreeMap<ZoneId, ZoneStyle>
    where
        I: IntoIterator<Item = &'a Zone>,
    {
        zones
            .into_iter()
            .map(|zone| (zone.id(), self.style_for(zone, filter)))
            .collect()
    }

    /// Restyles every zone and attaches/detaches against the surface.
    pub fn recompute<'a, I, S>(
        &mut self,
        zones: I,
        filter: &FilterState,
        surface: &mut S,
    ) -> StyleDelta
    where
        I: IntoIterator<Item = &'a Zone>,
        S: MapSurface + ?Sized,
    {
        let mut delta = StyleDelta::default();
        for zone in zones {
            let id = zone.id();
            let style = self.style_for(zone, filter);
            let was_attached = self.attached.contains(&id);

            match (was_attached, style.visible) {
                (false, true) => {
                    surface.add_zone(zone, &style);
                    self.attached.insert(id);
                    delta.attached += 1;
                }
                (true, false) => {
                    surface.remove_zone(zone);
                    self.attached.remove(&id);
                    delta.detached += 1;
                }
                (true, true) if self.styles.get(&id) != Some(&style) => {
                    surface.set_zone_style(zone, &style);
                    delta.restyled += 1;
                }
                _ => {}
            }
            self.styles.insert(id, style);
        }
        delta
    }

    /// Detaches and forgets zones that are being destroyed.
    pub fn release<'a, I, S>(&mut self, zones: I, surface: &mut S) -> usize
    where
        I: IntoIterator<Item = &'a Zone>,
        S: MapSurface + ?Sized,
    {
        let mut detached = 0;
        for zone in zones {
            if self.attached.remove(&zone.id()) {
                surface.remove_zone(zone);
                detached += 1;
            }
            self.styles.remove(&zone.id());
        }
        detached
    }

    pub fn styles(&self) -> &BTreeMap<ZoneId, ZoneStyle> {
        &self.styles
    }

    pub fn is_attached(&self, id: ZoneId) -> bool {
        self.attached.contains(&id)
    }

    pub fn attached_count(&self) -> usize {
        self.attached.len()
    }
}
