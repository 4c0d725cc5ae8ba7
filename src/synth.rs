//! Rejection-sampling placement of synthetic zones inside a viewport.

use rand::Rng;
use tracing::{debug, info, warn};

use crate::collision::CollisionIndex;
use crate::config::{SynthesisConfig, TierSpec};
use crate::filter::FilterState;
use crate::geo::Viewport;
use crate::polygon::PolygonSynthesizer;
use crate::zone::{Category, TierKind, Zone, ZoneIdAllocator, ZoneSpec};

/// A pass stopped at its attempt budget before reaching the target count.
/// Observable through [`SynthesisReport::incomplete`], never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthesisIncomplete {
    pub tier: TierKind,
    pub placed: usize,
    pub requested: usize,
    pub attempts: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthesisReport {
    pub tier: TierKind,
    pub requested: usize,
    pub placed: usize,
    pub attempts: usize,
    pub max_attempts: usize,
    pub rejected_collision: usize,
    pub rejected_filter: usize,
    pub rejected_invalid: usize,
}

impl SynthesisReport {
    pub fn incomplete(&self) -> Option<SynthesisIncomplete> {
        (self.placed < self.requested).then_some(SynthesisIncomplete {
            tier: self.tier,
            placed: self.placed,
            requested: self.requested,
            attempts: self.attempts,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisOutcome {
    pub zones: Vec<Zone>,
    pub report: SynthesisReport,
}

#[derive(Debug, Clone)]
pub struct ViewportZoneSynthesizer {
    policy: SynthesisConfig,
    years: Vec<i32>,
    polygons: PolygonSynthesizer,
}

impl ViewportZoneSynthesizer {
    pub fn new(policy: SynthesisConfig, years: Vec<i32>) -> Self {
        let polygons = PolygonSynthesizer::from_config(&policy);
        Self {
            policy,
            years,
            polygons,
        }
    }

    pub fn populate<R: Rng + ?Sized>(
        &self,
        tier: &TierSpec,
        viewport: &Viewport,
        filter: &FilterState,
        index: &mut CollisionIndex,
        rng: &mut R,
        ids: &mut ZoneIdAllocator,
    ) -> SynthesisOutcome {
        let max_attempts = tier.max_attempts(self.policy.attempts_per_zone);
        let mut report = SynthesisReport {
            tier: tier.kind,
            requested: tier.target_count,
            placed: 0,
            attempts: 0,
            max_attempts,
            rejected_collision: 0,
            rejected_filter: 0,
            rejected_invalid: 0,
        };
        let mut zones = Vec::with_capacity(tier.target_count);

        if self.years.is_empty() {
            return SynthesisOutcome { zones, report };
        }

        while zones.len() < tier.target_count && report.attempts < max_attempts {
            report.attempts += 1;

            let center = viewport.sample_point(rng);
            let year = self.years[rng.gen_range(0..self.years.len())];
            if index.has_collision(&center, year, tier.min_separation) {
                report.rejected_collision += 1;
                continue;
            }

            let intensity = if self.policy.intensity_max > self.policy.intensity_min {
                rng.gen_range(self.policy.intensity_min..self.policy.intensity_max)
            } else {
                self.policy.intensity_min
            };
            let category = if rng.gen_bool(self.policy.flood_share) {
                Category::Flood
            } else {
                Category::Moisture
            };
            if !filter.admits(category, intensity) {
                report.rejected_filter += 1;
                continue;
            }

            let jitter = self.policy.size_jitter;
            let size = tier.target_size * rng.gen_range(1.0 - jitter..=1.0 + jitter);
            let polygon = self.polygons.synthesize(center, size, rng);
            let spec = ZoneSpec {
                tier: tier.kind,
                year,
                category,
                intensity,
                polygon,
                centroid: Some(center),
                source_label: None,
                name: None,
            };
            match ids.create(spec) {
                Ok(zone) => {
                    index.record(center, year);
                    zones.push(zone);
                }
                Err(err) => {
                    warn!(tier = %tier.kind, error = %err, "skipping malformed synthesized zone");
                    report.rejected_invalid += 1;
                }
            }
        }

        report.placed = zones.len();
        debug!(
            tier = %tier.kind,
            placed = report.placed,
            attempts = report.attempts,
            collisions = report.rejected_collision,
            filtered = report.rejected_filter,
            "synthesis pass finished"
        );
        if let Some(incomplete) = report.incomplete() {
            info!(
                tier = %incomplete.tier,
                placed = incomplete.placed,
                requested = incomplete.requested,
                attempts = incomplete.attempts,
                "synthesis stopped at attempt budget"
            );
        }
        SynthesisOutcome { zones, report }
    }
}
