//! Zoom → tier mapping and the level-of-detail state machine.
//!
//! The controller only decides *what* should happen; the engine owns the zone
//! sets and performs the clearing, synthesis and bulk loading.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{ConfigError, DebounceConfig, EngineConfig, TierSpec};
use crate::timer::Debouncer;
use crate::zone::TierKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettleKind {
    Move,
    Zoom,
}

/// Validated tier table sorted by zoom.
#[derive(Debug, Clone)]
pub struct TierTable {
    tiers: Vec<TierSpec>,
}

impl TierTable {
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut tiers = config.tiers.clone();
        tiers.sort_by_key(|t| t.min_zoom);
        Ok(Self { tiers })
    }

    /// First tier whose range contains `zoom`. Zooms outside the configured
    /// span clamp to the nearest end.
    pub fn tier_for_zoom(&self, zoom: u8) -> TierKind {
        if let Some(tier) = self.tiers.iter().find(|t| t.contains(zoom)) {
            return tier.kind;
        }
        match (self.tiers.first(), self.tiers.last()) {
            (Some(first), _) if zoom < first.min_zoom => first.kind,
            (_, Some(last)) => last.kind,
            _ => TierKind::Regional,
        }
    }

    pub fn spec(&self, kind: TierKind) -> Option<&TierSpec> {
        self.tiers.iter().find(|t| t.kind == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TierSpec> {
        self.tiers.iter()
    }
}

/// A debounced pass waiting for its timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingPass {
    pub kind: SettleKind,
    pub zoom: u8,
    pub tier: TierKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A different tier was entered; every tier's zone set must be cleared.
    Entered { from: Option<TierKind>, to: TierKind },
    Stayed(TierKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassAction {
    Synthesize(TierKind),
    BulkLoad,
    /// Microzone data is already loaded for this tier entry.
    Skip,
}

pub struct LodController {
    table: TierTable,
    debounce: DebounceConfig,
    current: Option<TierKind>,
    current_zoom: Option<u8>,
    timer: Debouncer<PendingPass>,
    bulk_loaded: bool,
}

impl LodController {
    pub fn new(table: TierTable, debounce: DebounceConfig) -> Self {
        Self {
            table,
            debounce,
            current: None,
            current_zoom: None,
            timer: Debouncer::new(),
            bulk_loaded: false,
        }
    }

    pub fn table(&self) -> &TierTable {
        &self.table
    }

    pub fn current_tier(&self) -> Option<TierKind> {
        self.current
    }

    pub fn current_zoom(&self) -> Option<u8> {
        self.current_zoom
    }

    pub fn pending(&self) -> Option<&PendingPass> {
        self.timer.peek()
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.timer.deadline()
    }

    pub fn superseded(&self) -> u64 {
        self.timer.superseded()
    }

    /// Handles a raw move/zoom notification and (re)schedules the pass.
    pub fn on_viewport_changed(&mut self, kind: SettleKind, zoom: u8, now: Duration) -> Transition {
        let tier = self.table.tier_for_zoom(zoom);
        self.current_zoom = Some(zoom);
        let pass = PendingPass { kind, zoom, tier };

        if self.current != Some(tier) {
            let from = self.current.replace(tier);
            self.bulk_loaded = false;
            info!(from = ?from, to = %tier, zoom, "entering detail tier");
            self.timer
                .schedule(now, self.debounce.tier_change_delay(), pass);
            return Transition::Entered { from, to: tier };
        }

        let delay = match kind {
            SettleKind::Move => self.debounce.move_delay(),
            SettleKind::Zoom => self.debounce.same_tier_delay(),
        };
        if self.timer.schedule(now, delay, pass).is_some() {
            debug!(zoom, "superseded pending pass");
        }
        Transition::Stayed(tier)
    }

    /// Takes the pending pass if its debounce window has elapsed.
    pub fn poll(&mut self, now: Duration) -> Option<PendingPass> {
        self.timer.poll(now)
    }

    pub fn action_for(&mut self, tier: TierKind, zone_set_empty: bool) -> PassAction {
        match tier {
            TierKind::Microzone if zone_set_empty && !self.bulk_loaded => {
                self.bulk_loaded = true;
                PassAction::BulkLoad
            }
            TierKind::Microzone => PassAction::Skip,
            other => PassAction::Synthesize(other),
        }
    }

    /// Forget that the microzone dataset was loaded, e.g. after a filter
    /// change cleared the tier.
    pub fn invalidate(&mut self) {
        self.bulk_loaded = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> LodController {
        let table = TierTable::from_config(&EngineConfig::default()).unwrap();
        LodController::new(table, DebounceConfig::default())
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn zoom_maps_to_tiers() {
        let table = TierTable::from_config(&EngineConfig::default()).unwrap();
        assert_eq!(table.tier_for_zoom(6), TierKind::Regional);
        assert_eq!(table.tier_for_zoom(10), TierKind::Regional);
        assert_eq!(table.tier_for_zoom(11), TierKind::District);
        assert_eq!(table.tier_for_zoom(13), TierKind::District);
        assert_eq!(table.tier_for_zoom(14), TierKind::Microzone);
        assert_eq!(table.tier_for_zoom(18), TierKind::Microzone);
        assert_eq!(table.tier_for_zoom(2), TierKind::Regional);
        assert_eq!(table.tier_for_zoom(22), TierKind::Microzone);
    }

    #[test]
    fn invalid_table_is_rejected() {
        let mut config = EngineConfig::default();
        config.tiers[0].max_zoom = 11;
        assert!(TierTable::from_config(&config).is_err());
    }

    #[test]
    fn tier_change_uses_short_window() {
        let mut lod = controller();
        let transition = lod.on_viewport_changed(SettleKind::Zoom, 12, ms(0));
        assert_eq!(
            transition,
            Transition::Entered {
                from: None,
                to: TierKind::District
            }
        );
        assert_eq!(lod.next_deadline(), Some(ms(300)));
        assert!(lod.poll(ms(299)).is_none());
        let pass = lod.poll(ms(300)).unwrap();
        assert_eq!(pass.tier, TierKind::District);
    }

    #[test]
    fn same_tier_events_reschedule() {
        let mut lod = controller();
        lod.on_viewport_changed(SettleKind::Zoom, 12, ms(0));
        lod.poll(ms(300));
        let transition = lod.on_viewport_changed(SettleKind::Move, 12, ms(1000));
        assert_eq!(transition, Transition::Stayed(TierKind::District));
        assert_eq!(lod.next_deadline(), Some(ms(1500)));
    }

    #[test]
    fn microzone_bulk_loads_once_per_entry() {
        let mut lod = controller();
        lod.on_viewport_changed(SettleKind::Zoom, 16, ms(0));
        assert_eq!(lod.action_for(TierKind::Microzone, true), PassAction::BulkLoad);
        assert_eq!(lod.action_for(TierKind::Microzone, false), PassAction::Skip);
        assert_eq!(lod.action_for(TierKind::Microzone, true), PassAction::Skip);

        lod.on_viewport_changed(SettleKind::Zoom, 12, ms(10));
        lod.on_viewport_changed(SettleKind::Zoom, 15, ms(20));
        assert_eq!(lod.action_for(TierKind::Microzone, true), PassAction::BulkLoad);
        assert_eq!(
            lod.action_for(TierKind::District, true),
            PassAction::Synthesize(TierKind::District)
        );
    }
}
