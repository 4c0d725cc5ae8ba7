//! Scripted viewport and filter sessions, replayed against a
//! [`RecordingSurface`] on a manual clock.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{ConfigLoader, EngineConfig};
use crate::engine::{Engine, EngineBuilder, EngineSettings, PassReport, DEFAULT_SEED};
use crate::filter::FilterUpdate;
use crate::geo::{LatLng, Viewport};
use crate::historical::{DatasetLoader, HistoricalDataset};
use crate::lod::SettleKind;
use crate::snapshot::SnapshotWriter;
use crate::surface::{MapSurface, RecordingSurface, SurfaceCounters};
use crate::timer::{Clock, ManualClock};

fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn default_zoom() -> u8 {
    11
}

fn default_viewport() -> Viewport {
    Viewport::new(LatLng::new(-12.10, -77.10), LatLng::new(-11.99, -76.95))
}

#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Engine config path, relative to the session's base directory.
    #[serde(default)]
    pub config: Option<PathBuf>,
    #[serde(default)]
    pub dataset: Option<PathBuf>,
    #[serde(default = "default_viewport")]
    pub viewport: Viewport,
    #[serde(default = "default_zoom")]
    pub zoom: u8,
    #[serde(default)]
    pub steps: Vec<SessionStep>,
}

/// One scripted input, applied `after_ms` after the previous step.
/// A step with no zoom, move or filter is a plain wait.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionStep {
    #[serde(default)]
    pub after_ms: u64,
    #[serde(default)]
    pub zoom: Option<u8>,
    #[serde(default, rename = "move")]
    pub pan: Option<Viewport>,
    #[serde(default)]
    pub filter: Option<FilterUpdate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub name: String,
    pub seed: u64,
    pub passes: u64,
    pub synthesized: u64,
    pub bulk_loads: u64,
    pub skipped: u64,
    pub incomplete: u64,
    pub superseded: u64,
    pub rejected_filters: usize,
    pub zones: usize,
    pub attached: usize,
    pub surface: SurfaceCounters,
    pub elapsed_ms: u128,
    pub snapshots: Vec<PathBuf>,
    #[serde(skip)]
    pub reports: Vec<PassReport>,
}

pub struct SessionLoader {
    base_dir: PathBuf,
}

impl SessionLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Session> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read session file {}", path.display()))?;
        let session: Session = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(session)
    }
}

impl Session {
    pub fn load_config(&self, base_dir: &Path) -> Result<EngineConfig> {
        match &self.config {
            Some(path) => ConfigLoader::new(base_dir).load(path),
            None => Ok(EngineConfig::default()),
        }
    }

    pub fn load_dataset(&self, base_dir: &Path) -> Result<HistoricalDataset> {
        match &self.dataset {
            Some(path) => DatasetLoader::new(base_dir).load(path),
            None => Ok(HistoricalDataset::default()),
        }
    }

    pub fn build_engine(&self, base_dir: &Path) -> Result<Engine<RecordingSurface>> {
        let settings = EngineSettings {
            seed: self.seed,
            config: self.load_config(base_dir)?,
        };
        let engine = EngineBuilder::new(settings)
            .with_dataset(self.load_dataset(base_dir)?)
            .build(RecordingSurface::new(self.viewport, self.zoom))
            .with_context(|| format!("Invalid engine configuration for session '{}'", self.name))?;
        Ok(engine)
    }

    /// Replays every step, firing due timers before each one and draining
    /// all pending work after the last.
    pub fn run(
        &self,
        base_dir: &Path,
        snapshots: Option<&SnapshotWriter>,
    ) -> Result<SessionSummary> {
        let mut engine = self.build_engine(base_dir)?;
        let mut clock = ManualClock::new();
        let mut replay = Replay {
            name: &self.name,
            snapshots,
            reports: Vec::new(),
            written: Vec::new(),
        };

        engine.on_viewport_changed(SettleKind::Zoom, self.zoom, clock.now());

        let mut rejected_filters = 0;
        for step in &self.steps {
            clock.advance(Duration::from_millis(step.after_ms));
            replay.fire_due(&mut engine, clock.now())?;

            if let Some(bounds) = step.pan {
                engine.surface_mut().set_bounds(bounds);
            }
            if let Some(zoom) = step.zoom {
                engine.surface_mut().set_zoom(zoom);
                engine.on_viewport_changed(SettleKind::Zoom, zoom, clock.now());
            } else if step.pan.is_some() {
                let zoom = engine.surface().zoom();
                engine.on_viewport_changed(SettleKind::Move, zoom, clock.now());
            }

            if let Some(update) = &step.filter {
                match engine.set_filter_state(update) {
                    Ok(outcome) => {
                        if let Some(report) = outcome.repopulated {
                            replay.record(&engine, report)?;
                        }
                    }
                    Err(err) => {
                        warn!(session = %self.name, error = %err, "rejected filter update");
                        rejected_filters += 1;
                    }
                }
            }
        }

        clock.advance(engine.config().debounce.longest());
        replay.fire_due(&mut engine, clock.now())?;

        let stats = engine.stats();
        let summary = SessionSummary {
            name: self.name.clone(),
            seed: self.seed,
            passes: stats.passes,
            synthesized: stats.synthesized,
            bulk_loads: stats.bulk_loads,
            skipped: stats.skipped,
            incomplete: stats.incomplete,
            superseded: engine.superseded(),
            rejected_filters,
            zones: engine.state().zone_count(),
            attached: engine.surface().attached().len(),
            surface: engine.surface().counters(),
            elapsed_ms: clock.now().as_millis(),
            snapshots: replay.written,
            reports: replay.reports,
        };
        info!(
            session = %summary.name,
            passes = summary.passes,
            attached = summary.attached,
            "session replay finished"
        );
        Ok(summary)
    }
}

struct Replay<'a> {
    name: &'a str,
    snapshots: Option<&'a SnapshotWriter>,
    reports: Vec<PassReport>,
    written: Vec<PathBuf>,
}

impl Replay<'_> {
    fn fire_due(&mut self, engine: &mut Engine<RecordingSurface>, now: Duration) -> Result<()> {
        while let Some(report) = engine.advance_to(now) {
            self.record(engine, report)?;
        }
        Ok(())
    }

    fn record(&mut self, engine: &Engine<RecordingSurface>, report: PassReport) -> Result<()> {
        if let Some(writer) = self.snapshots {
            let written = writer
                .maybe_write(engine, report.pass, self.name)
                .with_context(|| format!("Failed to write snapshot for pass {}", report.pass))?;
            self.written.extend(written);
        }
        self.reports.push(report);
        Ok(())
    }
}
