use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::collision::CollisionIndex;
use crate::config::{ConfigError, EngineConfig};
use crate::filter::{FilterChange, FilterError, FilterState, FilterUpdate};
use crate::historical::{load_fixed, HistoricalDataset};
use crate::lod::{LodController, PassAction, PendingPass, SettleKind, TierTable, Transition};
use crate::rng::RngManager;
use crate::style::{Palette, StyleDelta, TemporalStyleResolver, ZoneStyle};
use crate::surface::MapSurface;
use crate::synth::{SynthesisReport, ViewportZoneSynthesizer};
use crate::zone::{TierKind, Zone, ZoneId, ZoneIdAllocator};

pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Filter(#[from] FilterError),
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub seed: u64,
    pub config: EngineConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            config: EngineConfig::default(),
        }
    }
}

pub struct EngineBuilder {
    settings: EngineSettings,
    dataset: HistoricalDataset,
}

impl EngineBuilder {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            dataset: HistoricalDataset::default(),
        }
    }

    pub fn with_dataset(mut self, dataset: HistoricalDataset) -> Self {
        self.dataset = dataset;
        self
    }

    /// Validates the configuration; a bad tier table is fatal here.
    pub fn build<S: MapSurface>(self, surface: S) -> Result<Engine<S>, EngineError> {
        let EngineSettings { seed, config } = self.settings;
        let table = TierTable::from_config(&config)?;
        let lod = LodController::new(table, config.debounce.clone());
        let synthesizer =
            ViewportZoneSynthesizer::new(config.synthesis.clone(), config.years.clone());
        let resolver = TemporalStyleResolver::new(Palette::new(config.palette.clone()));
        let state = EngineState {
            filter: config.filter.clone(),
            zone_sets: BTreeMap::new(),
        };

        Ok(Engine {
            rng: RngManager::new(seed),
            ids: ZoneIdAllocator::new(),
            dataset: self.dataset,
            stats: EngineStats::default(),
            config,
            lod,
            synthesizer,
            resolver,
            state,
            surface,
        })
    }
}

/// Everything the engine mutates in response to viewport and filter events.
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub filter: FilterState,
    pub zone_sets: BTreeMap<TierKind, Vec<Zone>>,
}

impl EngineState {
    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.zone_sets.values().flatten()
    }

    pub fn zone_count(&self) -> usize {
        self.zone_sets.values().map(Vec::len).sum()
    }

    pub fn tier_zones(&self, tier: TierKind) -> &[Zone] {
        self.zone_sets.get(&tier).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PassKind {
    Synthesized {
        requested: usize,
        placed: usize,
        attempts: usize,
    },
    BulkLoaded {
        loaded: usize,
        filtered_out: usize,
        invalid: usize,
    },
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub pass: u64,
    pub zoom: u8,
    pub tier: TierKind,
    pub kind: PassKind,
    pub cleared: usize,
    pub style: StyleDelta,
    #[serde(skip)]
    pub synthesis: Option<SynthesisReport>,
}

impl PassReport {
    pub fn is_incomplete(&self) -> bool {
        self.synthesis
            .as_ref()
            .and_then(SynthesisReport::incomplete)
            .is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub passes: u64,
    pub synthesized: u64,
    pub bulk_loads: u64,
    pub skipped: u64,
    pub incomplete: u64,
    pub tier_changes: u64,
    pub zones_cleared: u64,
}

#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub change: FilterChange,
    pub repopulated: Option<PassReport>,
    pub style: StyleDelta,
}

pub struct Engine<S: MapSurface> {
    config: EngineConfig,
    lod: LodController,
    synthesizer: ViewportZoneSynthesizer,
    resolver: TemporalStyleResolver,
    rng: RngManager,
    ids: ZoneIdAllocator,
    dataset: HistoricalDataset,
    state: EngineState,
    stats: EngineStats,
    surface: S,
}

impl<S: MapSurface> Engine<S> {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn filter(&self) -> &FilterState {
        &self.state.filter
    }

    pub fn dataset(&self) -> &HistoricalDataset {
        &self.dataset
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn tier_table(&self) -> &TierTable {
        self.lod.table()
    }

    pub fn current_tier(&self) -> Option<TierKind> {
        self.lod.current_tier()
    }

    pub fn current_zoom(&self) -> Option<u8> {
        self.lod.current_zoom()
    }

    pub fn pending(&self) -> Option<&PendingPass> {
        self.lod.pending()
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.lod.next_deadline()
    }

    pub fn superseded(&self) -> u64 {
        self.lod.superseded()
    }

    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.state.zones()
    }

    pub fn styles(&self) -> &BTreeMap<ZoneId, ZoneStyle> {
        self.resolver.styles()
    }

    pub fn is_attached(&self, id: ZoneId) -> bool {
        self.resolver.is_attached(id)
    }

    pub fn attached_count(&self) -> usize {
        self.resolver.attached_count()
    }

    /// Zones currently drawn on the surface, with their styles.
    pub fn attached_zones(&self) -> impl Iterator<Item = (&Zone, &ZoneStyle)> {
        let resolver = &self.resolver;
        self.state
            .zones()
            .filter(move |zone| resolver.is_attached(zone.id()))
            .filter_map(move |zone| resolver.styles().get(&zone.id()).map(|style| (zone, style)))
    }

    /// Raw move/zoom notification from the surface. Entering a new tier
    /// clears every tier's zones right away; the pass itself waits for the
    /// debounce window.
    pub fn on_viewport_changed(&mut self, kind: SettleKind, zoom: u8, now: Duration) -> Transition {
        let transition = self.lod.on_viewport_changed(kind, zoom, now);
        if let Transition::Entered { .. } = transition {
            self.stats.tier_changes += 1;
            let cleared = self.clear_all_tiers();
            if cleared > 0 {
                debug!(cleared, "cleared zone sets on tier change");
            }
        }
        transition
    }

    /// Fires the pending pass if its window has elapsed by `now`.
    pub fn advance_to(&mut self, now: Duration) -> Option<PassReport> {
        let pending = self.lod.poll(now)?;
        Some(self.run_pass(pending))
    }

    pub fn run_pass(&mut self, pending: PendingPass) -> PassReport {
        self.stats.passes += 1;
        let pass = self.stats.passes;
        let tier = pending.tier;
        let empty = self.state.tier_zones(tier).is_empty();

        let mut cleared = 0;
        let mut synthesis = None;
        let kind = match self.lod.action_for(tier, empty) {
            PassAction::Synthesize(kind) => {
                cleared = self.clear_tier(kind);
                let report = self.synthesize(kind);
                synthesis = report;
                match report {
                    Some(r) => {
                        self.stats.synthesized += 1;
                        PassKind::Synthesized {
                            requested: r.requested,
                            placed: r.placed,
                            attempts: r.attempts,
                        }
                    }
                    None => {
                        self.stats.skipped += 1;
                        PassKind::Skipped
                    }
                }
            }
            PassAction::BulkLoad => {
                cleared = self.clear_tier(TierKind::Microzone);
                let load = load_fixed(&self.dataset, &self.state.filter, &mut self.ids);
                let kind = PassKind::BulkLoaded {
                    loaded: load.zones.len(),
                    filtered_out: load.filtered_out,
                    invalid: load.invalid,
                };
                info!(zones = load.zones.len(), "bulk loaded historical zones");
                self.state.zone_sets.insert(TierKind::Microzone, load.zones);
                self.stats.bulk_loads += 1;
                kind
            }
            PassAction::Skip => {
                self.stats.skipped += 1;
                PassKind::Skipped
            }
        };

        let style = self.recompute_styles();
        debug!(pass, zoom = pending.zoom, tier = %tier, ?kind, ?style, "pass complete");
        PassReport {
            pass,
            zoom: pending.zoom,
            tier,
            kind,
            cleared,
            style,
            synthesis,
        }
    }

    /// Applies a partial filter update. A change that widens the filter
    /// (lower threshold, added category) clears and repopulates the active
    /// tier; anything else only restyles the zones already built.
    pub fn set_filter_state(
        &mut self,
        update: &FilterUpdate,
    ) -> Result<FilterOutcome, EngineError> {
        let change = self.state.filter.apply(update)?;

        let mut repopulated = None;
        if change.widened {
            if let Some(tier) = self.lod.current_tier() {
                self.clear_tier(tier);
                self.lod.invalidate();
                let zoom = self.surface.zoom();
                info!(tier = %tier, zoom, "widened filter invalidated zones");
                repopulated = Some(self.run_pass(PendingPass {
                    kind: SettleKind::Zoom,
                    zoom,
                    tier,
                }));
            }
        }

        let style = self.recompute_styles();
        Ok(FilterOutcome {
            change,
            repopulated,
            style,
        })
    }

    pub fn recompute_styles(&mut self) -> StyleDelta {
        self.resolver.recompute(
            self.state.zone_sets.values().flatten(),
            &self.state.filter,
            &mut self.surface,
        )
    }

    fn synthesize(&mut self, tier: TierKind) -> Option<SynthesisReport> {
        let spec = self.lod.table().spec(tier)?.clone();
        let viewport = self.surface.bounds();
        let mut index = CollisionIndex::new();
        let mut rng = self.rng.next_pass(tier);
        let outcome = self.synthesizer.populate(
            &spec,
            &viewport,
            &self.state.filter,
            &mut index,
            &mut rng,
            &mut self.ids,
        );
        if outcome.report.incomplete().is_some() {
            self.stats.incomplete += 1;
        }
        self.state.zone_sets.insert(tier, outcome.zones);
        Some(outcome.report)
    }

    fn clear_tier(&mut self, tier: TierKind) -> usize {
        let zones = self.state.zone_sets.remove(&tier).unwrap_or_default();
        self.resolver.release(&zones, &mut self.surface);
        self.stats.zones_cleared += zones.len() as u64;
        zones.len()
    }

    fn clear_all_tiers(&mut self) -> usize {
        let sets = std::mem::take(&mut self.state.zone_sets);
        let mut cleared = 0;
        for zones in sets.values() {
            self.resolver.release(zones, &mut self.surface);
            cleared += zones.len();
        }
        self.stats.zones_cleared += cleared as u64;
        cleared
    }
}
