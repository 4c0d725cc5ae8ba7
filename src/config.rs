//! Engine configuration: tier table, synthesis policy, debounce windows and
//! initial filter. Every field has a default so a partial YAML file is enough.

use std::collections::BTreeSet;
use std::f64::consts::TAU;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filter::FilterState;
use crate::zone::TierKind;

fn default_min_zoom() -> u8 {
    6
}

fn default_max_zoom() -> u8 {
    18
}

fn default_years() -> Vec<i32> {
    vec![2015, 2018, 2020, 2023, 2024, 2025]
}

fn default_tiers() -> Vec<TierSpec> {
    vec![
        TierSpec {
            kind: TierKind::Regional,
            min_zoom: 6,
            max_zoom: 10,
            target_size: 0.015,
            target_count: 30,
            min_separation: 0.025,
        },
        TierSpec {
            kind: TierKind::District,
            min_zoom: 11,
            max_zoom: 13,
            target_size: 0.0015,
            target_count: 70,
            min_separation: 0.0025,
        },
        TierSpec {
            kind: TierKind::Microzone,
            min_zoom: 14,
            max_zoom: 18,
            target_size: 0.00008,
            target_count: 150,
            min_separation: 0.00012,
        },
    ]
}

fn default_flood_share() -> f64 {
    0.6
}

fn default_intensity_min() -> f64 {
    0.3
}

fn default_intensity_max() -> f64 {
    0.9
}

fn default_size_jitter() -> f64 {
    0.2
}

fn default_attempts_per_zone() -> usize {
    5
}

fn default_min_vertices() -> usize {
    4
}

fn default_max_vertices() -> usize {
    6
}

fn default_angular_jitter() -> f64 {
    0.25
}

fn default_radial_min() -> f64 {
    0.7
}

fn default_radial_max() -> f64 {
    1.3
}

fn default_move_ms() -> u64 {
    500
}

fn default_same_tier_ms() -> u64 {
    500
}

fn default_tier_change_ms() -> u64 {
    300
}

fn default_recent_since() -> i32 {
    2023
}

fn default_flood_recent() -> String {
    "#5B9AA9".to_string()
}

fn default_flood_older() -> String {
    "#AAD3DF".to_string()
}

fn default_moisture_recent() -> String {
    "#654321".to_string()
}

fn default_moisture_older() -> String {
    "#D2B48C".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("tier {kind} has min_zoom {min} above max_zoom {max}")]
    InvalidTier { kind: TierKind, min: u8, max: u8 },
    #[error("tier {kind} must have positive size, count and separation")]
    NonPositiveTier { kind: TierKind },
    #[error("tier {kind} is configured more than once")]
    DuplicateTier { kind: TierKind },
    #[error("tier {kind} is missing from the tier table")]
    MissingTier { kind: TierKind },
    #[error("tiers {first} and {second} overlap at zoom {zoom}")]
    TierOverlap {
        first: TierKind,
        second: TierKind,
        zoom: u8,
    },
    #[error("no tier covers zoom {from}..={to}")]
    TierGap { from: u8, to: u8 },
    #[error("tiers cover {covered_min}..={covered_max} but the map spans {map_min}..={map_max}")]
    TierCoverage {
        covered_min: u8,
        covered_max: u8,
        map_min: u8,
        map_max: u8,
    },
    #[error("synthesis config invalid: {0}")]
    InvalidSynthesis(String),
    #[error("debounce windows must be non-zero")]
    InvalidDebounce,
    #[error("initial filter invalid: {0}")]
    InvalidFilter(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    #[serde(default = "default_min_zoom")]
    pub min_zoom: u8,
    #[serde(default = "default_max_zoom")]
    pub max_zoom: u8,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            min_zoom: default_min_zoom(),
            max_zoom: default_max_zoom(),
        }
    }
}

/// Static per-tier configuration. Sizes and separations are in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierSpec {
    pub kind: TierKind,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub target_size: f64,
    pub target_count: usize,
    pub min_separation: f64,
}

impl TierSpec {
    pub fn contains(&self, zoom: u8) -> bool {
        zoom >= self.min_zoom && zoom <= self.max_zoom
    }

    pub fn max_attempts(&self, attempts_per_zone: usize) -> usize {
        self.target_count.saturating_mul(attempts_per_zone)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Probability that a synthesized zone is tagged Flood.
    #[serde(default = "default_flood_share")]
    pub flood_share: f64,
    #[serde(default = "default_intensity_min")]
    pub intensity_min: f64,
    #[serde(default = "default_intensity_max")]
    pub intensity_max: f64,
    /// Relative variance applied to the tier's target size.
    #[serde(default = "default_size_jitter")]
    pub size_jitter: f64,
    #[serde(default = "default_attempts_per_zone")]
    pub attempts_per_zone: usize,
    #[serde(default = "default_min_vertices")]
    pub min_vertices: usize,
    #[serde(default = "default_max_vertices")]
    pub max_vertices: usize,
    #[serde(default = "default_angular_jitter")]
    pub angular_jitter: f64,
    #[serde(default = "default_radial_min")]
    pub radial_min: f64,
    #[serde(default = "default_radial_max")]
    pub radial_max: f64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            flood_share: default_flood_share(),
            intensity_min: default_intensity_min(),
            intensity_max: default_intensity_max(),
            size_jitter: default_size_jitter(),
            attempts_per_zone: default_attempts_per_zone(),
            min_vertices: default_min_vertices(),
            max_vertices: default_max_vertices(),
            angular_jitter: default_angular_jitter(),
            radial_min: default_radial_min(),
            radial_max: default_radial_max(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebounceConfig {
    #[serde(default = "default_move_ms")]
    pub move_ms: u64,
    #[serde(default = "default_same_tier_ms")]
    pub same_tier_zoom_ms: u64,
    #[serde(default = "default_tier_change_ms")]
    pub tier_change_ms: u64,
}

impl DebounceConfig {
    pub fn move_delay(&self) -> Duration {
        Duration::from_millis(self.move_ms)
    }

    pub fn same_tier_delay(&self) -> Duration {
        Duration::from_millis(self.same_tier_zoom_ms)
    }

    pub fn tier_change_delay(&self) -> Duration {
        Duration::from_millis(self.tier_change_ms)
    }

    pub fn longest(&self) -> Duration {
        self.move_delay()
            .max(self.same_tier_delay())
            .max(self.tier_change_delay())
    }
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            move_ms: default_move_ms(),
            same_tier_zoom_ms: default_same_tier_ms(),
            tier_change_ms: default_tier_change_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaletteConfig {
    #[serde(default = "default_recent_since")]
    pub recent_since: i32,
    #[serde(default = "default_flood_recent")]
    pub flood_recent: String,
    #[serde(default = "default_flood_older")]
    pub flood_older: String,
    #[serde(default = "default_moisture_recent")]
    pub moisture_recent: String,
    #[serde(default = "default_moisture_older")]
    pub moisture_older: String,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        Self {
            recent_since: default_recent_since(),
            flood_recent: default_flood_recent(),
            flood_older: default_flood_older(),
            moisture_recent: default_moisture_recent(),
            moisture_older: default_moisture_older(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default = "default_tiers")]
    pub tiers: Vec<TierSpec>,
    #[serde(default = "default_years")]
    pub years: Vec<i32>,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub debounce: DebounceConfig,
    #[serde(default)]
    pub filter: FilterState,
    #[serde(default)]
    pub palette: PaletteConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            map: MapConfig::default(),
            tiers: default_tiers(),
            years: default_years(),
            synthesis: SynthesisConfig::default(),
            debounce: DebounceConfig::default(),
            filter: FilterState::default(),
            palette: PaletteConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_yaml::from_str(text).context("Failed to parse engine config")?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn tier(&self, kind: TierKind) -> Option<&TierSpec> {
        self.tiers.iter().find(|t| t.kind == kind)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_tiers()?;
        self.validate_synthesis()?;

        let debounce = &self.debounce;
        if debounce.move_ms == 0 || debounce.same_tier_zoom_ms == 0 || debounce.tier_change_ms == 0
        {
            return Err(ConfigError::InvalidDebounce);
        }

        self.filter
            .validate()
            .map_err(|err| ConfigError::InvalidFilter(err.to_string()))?;
        Ok(())
    }

    fn validate_tiers(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for tier in &self.tiers {
            if !seen.insert(tier.kind) {
                return Err(ConfigError::DuplicateTier { kind: tier.kind });
            }
            if tier.min_zoom > tier.max_zoom {
                return Err(ConfigError::InvalidTier {
                    kind: tier.kind,
                    min: tier.min_zoom,
                    max: tier.max_zoom,
                });
            }
            if !(tier.target_size > 0.0) || tier.target_count == 0 || !(tier.min_separation > 0.0)
            {
                return Err(ConfigError::NonPositiveTier { kind: tier.kind });
            }
        }
        for kind in TierKind::ALL {
            if !seen.contains(&kind) {
                return Err(ConfigError::MissingTier { kind });
            }
        }

        let mut sorted: Vec<&TierSpec> = self.tiers.iter().collect();
        sorted.sort_by_key(|t| t.min_zoom);
        for pair in sorted.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if b.min_zoom <= a.max_zoom {
                return Err(ConfigError::TierOverlap {
                    first: a.kind,
                    second: b.kind,
                    zoom: b.min_zoom,
                });
            }
            if b.min_zoom > a.max_zoom.saturating_add(1) {
                return Err(ConfigError::TierGap {
                    from: a.max_zoom + 1,
                    to: b.min_zoom - 1,
                });
            }
        }

        let covered_min = sorted.first().map(|t| t.min_zoom).unwrap_or(0);
        let covered_max = sorted.last().map(|t| t.max_zoom).unwrap_or(0);
        if covered_min > self.map.min_zoom || covered_max < self.map.max_zoom {
            return Err(ConfigError::TierCoverage {
                covered_min,
                covered_max,
                map_min: self.map.min_zoom,
                map_max: self.map.max_zoom,
            });
        }
        Ok(())
    }

    fn validate_synthesis(&self) -> Result<(), ConfigError> {
        let s = &self.synthesis;
        if self.years.is_empty() {
            return Err(ConfigError::InvalidSynthesis(
                "at least one year is required".into(),
            ));
        }
        if !(0.0..=1.0).contains(&s.flood_share) {
            return Err(ConfigError::InvalidSynthesis(format!(
                "flood_share {} is outside [0, 1]",
                s.flood_share
            )));
        }
        if !(0.0 <= s.intensity_min && s.intensity_min <= s.intensity_max && s.intensity_max <= 1.0)
        {
            return Err(ConfigError::InvalidSynthesis(format!(
                "intensity range {}..{} must lie within [0, 1]",
                s.intensity_min, s.intensity_max
            )));
        }
        if !(0.0..1.0).contains(&s.size_jitter) {
            return Err(ConfigError::InvalidSynthesis(format!(
                "size_jitter {} must be in [0, 1)",
                s.size_jitter
            )));
        }
        if s.attempts_per_zone == 0 {
            return Err(ConfigError::InvalidSynthesis(
                "attempts_per_zone must be positive".into(),
            ));
        }
        if s.min_vertices < 3 || s.min_vertices > s.max_vertices {
            return Err(ConfigError::InvalidSynthesis(format!(
                "vertex range {}..={} is invalid",
                s.min_vertices, s.max_vertices
            )));
        }
        if !(s.angular_jitter >= 0.0) || 2.0 * s.angular_jitter >= TAU / s.max_vertices as f64 {
            return Err(ConfigError::InvalidSynthesis(format!(
                "angular_jitter {} lets vertices leave their sector",
                s.angular_jitter
            )));
        }
        if !(s.radial_min > 0.0 && s.radial_min <= s.radial_max) {
            return Err(ConfigError::InvalidSynthesis(format!(
                "radial band {}..{} is invalid",
                s.radial_min, s.radial_max
            )));
        }
        Ok(())
    }
}

pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<EngineConfig> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read engine config {}", path.display()))?;
        let config: EngineConfig = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.tier(TierKind::District).unwrap().target_count, 70);
        assert_eq!(
            config.tier(TierKind::Microzone).unwrap().max_attempts(5),
            750
        );
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let config = EngineConfig::from_yaml_str("years: [2017, 2018]\n").unwrap();
        assert_eq!(config.years, vec![2017, 2018]);
        assert_eq!(config.tiers.len(), 3);
        assert_eq!(config.debounce.tier_change_ms, 300);
        config.validate().unwrap();
    }

    #[test]
    fn overlapping_tiers_are_rejected() {
        let mut config = EngineConfig::default();
        config.tiers[1].min_zoom = 10;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TierOverlap { zoom: 10, .. })
        ));
    }

    #[test]
    fn gaps_are_rejected() {
        let mut config = EngineConfig::default();
        config.tiers[1].max_zoom = 12;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TierGap { from: 13, to: 13 })
        ));
    }

    #[test]
    fn coverage_must_span_map_zoom() {
        let mut config = EngineConfig::default();
        config.map.max_zoom = 19;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TierCoverage { .. })
        ));
    }

    #[test]
    fn missing_and_duplicate_tiers() {
        let mut config = EngineConfig::default();
        config.tiers.pop();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingTier {
                kind: TierKind::Microzone
            })
        ));

        let mut config = EngineConfig::default();
        config.tiers[2].kind = TierKind::District;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateTier { .. })
        ));
    }

    #[test]
    fn jitter_must_keep_vertices_in_sector() {
        let mut config = EngineConfig::default();
        config.synthesis.angular_jitter = 0.6;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSynthesis(_))
        ));
    }

    #[test]
    fn yaml_round_trip_keeps_tiers() {
        let config = EngineConfig::default();
        let text = config.to_yaml().unwrap();
        let parsed = EngineConfig::from_yaml_str(&text).unwrap();
        assert_eq!(parsed.tiers, config.tiers);
    }
}
