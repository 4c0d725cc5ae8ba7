use std::collections::BTreeSet;
use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use lodzones::{
    collision::CollisionIndex,
    config::{EngineConfig, SynthesisConfig, TierSpec},
    engine::{Engine, EngineBuilder, EngineSettings, PassKind},
    filter::FilterState,
    geo::{LatLng, Viewport},
    historical::{DatasetLoader, HistoricalDataset},
    lod::SettleKind,
    style::TemporalStyleResolver,
    surface::RecordingSurface,
    synth::ViewportZoneSynthesizer,
    zone::{Category, TierKind, Zone, ZoneId, ZoneIdAllocator, ZoneSpec},
};

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

fn lima_dataset() -> HistoricalDataset {
    DatasetLoader::new(env!("CARGO_MANIFEST_DIR"))
        .load("scenarios/lima_historical.yaml")
        .expect("dataset parses")
}

fn engine(seed: u64) -> Engine<RecordingSurface> {
    EngineBuilder::new(EngineSettings {
        seed,
        config: EngineConfig::default(),
    })
    .with_dataset(lima_dataset())
    .build(RecordingSurface::default())
    .expect("default config is valid")
}

#[test]
fn dense_microzone_fill_reaches_target() {
    let tier = TierSpec {
        kind: TierKind::Microzone,
        min_zoom: 14,
        max_zoom: 18,
        target_size: 0.00008,
        target_count: 150,
        min_separation: 1e-9,
    };
    let filter = FilterState {
        intensity_threshold: 0.0,
        visible_categories: BTreeSet::from(Category::ALL),
        ..FilterState::default()
    };
    let synth = ViewportZoneSynthesizer::new(
        SynthesisConfig::default(),
        vec![2015, 2018, 2020, 2023, 2024, 2025],
    );
    let viewport = Viewport::new(LatLng::new(-12.06, -77.05), LatLng::new(-12.04, -77.03));
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut index = CollisionIndex::new();
    let mut ids = ZoneIdAllocator::new();

    let outcome = synth.populate(&tier, &viewport, &filter, &mut index, &mut rng, &mut ids);
    assert_eq!(outcome.zones.len(), 150);
    assert!(outcome.report.incomplete().is_none());
    assert!(outcome.zones.iter().all(|z| z.tier() == TierKind::Microzone));
    assert!(outcome.zones.iter().all(|z| viewport.contains(&z.centroid())));
}

#[test]
fn opacity_follows_threshold_range() {
    let mut ids = ZoneIdAllocator::new();
    let zones: Vec<Zone> = [0.5, 0.79, 0.81, 1.0]
        .into_iter()
        .map(|intensity| {
            Zone::new(
                ids.allocate(),
                ZoneSpec {
                    tier: TierKind::District,
                    year: 2020,
                    category: Category::Flood,
                    intensity,
                    polygon: vec![
                        LatLng::new(-12.0, -77.0),
                        LatLng::new(-12.0, -77.01),
                        LatLng::new(-12.01, -77.0),
                    ],
                    centroid: None,
                    source_label: None,
                    name: None,
                },
            )
            .unwrap()
        })
        .collect();

    let filter = FilterState::default();
    let mut resolver = TemporalStyleResolver::default();
    let mut surface = RecordingSurface::default();
    let delta = resolver.recompute(&zones, &filter, &mut surface);
    assert_eq!(delta.attached, 2);

    let styles = resolver.styles();
    assert!(!styles[&zones[0].id()].visible);
    assert!(!styles[&zones[1].id()].visible);
    assert!((styles[&zones[2].id()].opacity - 0.05).abs() < 1e-9);
    assert!((styles[&zones[3].id()].opacity - 1.0).abs() < 1e-9);
}

#[test]
fn entering_microzone_clears_district_and_bulk_loads() {
    let mut engine = engine(42);
    engine.surface_mut().set_zoom(12);
    engine.on_viewport_changed(SettleKind::Zoom, 12, ms(0));
    let report = engine.advance_to(ms(300)).expect("district pass fires");
    assert!(matches!(report.kind, PassKind::Synthesized { .. }));
    let district: Vec<ZoneId> = engine
        .state()
        .tier_zones(TierKind::District)
        .iter()
        .map(Zone::id)
        .collect();
    assert!(!district.is_empty());

    engine.surface_mut().set_zoom(16);
    engine.on_viewport_changed(SettleKind::Zoom, 16, ms(1000));
    assert!(engine.state().tier_zones(TierKind::District).is_empty());
    for id in &district {
        assert!(!engine.surface().is_attached(*id));
    }

    let report = engine.advance_to(ms(1300)).expect("microzone pass fires");
    assert_eq!(report.tier, TierKind::Microzone);
    assert!(matches!(
        report.kind,
        PassKind::BulkLoaded {
            loaded: 4,
            filtered_out: 2,
            ..
        }
    ));
    assert_eq!(engine.stats().synthesized, 1);
    assert_eq!(engine.stats().bulk_loads, 1);
    assert!(engine
        .zones()
        .all(|z| z.tier() == TierKind::Microzone && z.source_label().is_some()));
}

#[test]
fn burst_of_zoom_events_runs_one_pass() {
    let mut engine = engine(42);
    engine.on_viewport_changed(SettleKind::Zoom, 12, ms(0));
    engine.advance_to(ms(300)).expect("initial pass");

    engine.on_viewport_changed(SettleKind::Zoom, 12, ms(1000));
    engine.on_viewport_changed(SettleKind::Zoom, 13, ms(1100));
    assert!(engine.advance_to(ms(1550)).is_none());
    let report = engine.advance_to(ms(1600)).expect("settled pass");
    assert_eq!(report.zoom, 13);
    assert!(engine.advance_to(ms(10_000)).is_none());
    assert_eq!(engine.stats().passes, 2);
    assert_eq!(engine.superseded(), 1);
}

#[test]
fn same_seed_replays_identical_geometry() {
    let run = |seed| {
        let mut engine = engine(seed);
        engine.on_viewport_changed(SettleKind::Zoom, 12, ms(0));
        engine.advance_to(ms(300));
        engine
            .zones()
            .map(|z| (z.year(), z.intensity(), z.polygon().to_vec()))
            .collect::<Vec<_>>()
    };
    assert_eq!(run(42), run(42));
    assert_ne!(run(42), run(43));
}
