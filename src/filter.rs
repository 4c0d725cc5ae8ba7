use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::zone::{Category, Zone};

fn default_selected_year() -> i32 {
    2025
}

fn default_cumulative() -> bool {
    true
}

fn default_threshold() -> f64 {
    0.8
}

fn default_categories() -> BTreeSet<Category> {
    BTreeSet::from([Category::Flood])
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("intensity threshold {0} is outside [0, 1]")]
    ThresholdOutOfRange(f64),
}

/// User-driven display filter. Mutated only through [`FilterState::apply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    #[serde(default = "default_selected_year")]
    pub selected_year: i32,
    #[serde(default = "default_cumulative")]
    pub cumulative: bool,
    #[serde(default = "default_threshold")]
    pub intensity_threshold: f64,
    #[serde(default = "default_categories")]
    pub visible_categories: BTreeSet<Category>,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            selected_year: default_selected_year(),
            cumulative: default_cumulative(),
            intensity_threshold: default_threshold(),
            visible_categories: default_categories(),
        }
    }
}

/// Partial change to a [`FilterState`]; `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterUpdate {
    #[serde(default)]
    pub selected_year: Option<i32>,
    #[serde(default)]
    pub cumulative: Option<bool>,
    #[serde(default)]
    pub intensity_threshold: Option<f64>,
    #[serde(default)]
    pub visible_categories: Option<BTreeSet<Category>>,
}

impl FilterUpdate {
    pub fn year(year: i32) -> Self {
        Self {
            selected_year: Some(year),
            ..Self::default()
        }
    }

    pub fn threshold(threshold: f64) -> Self {
        Self {
            intensity_threshold: Some(threshold),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.selected_year.is_none()
            && self.cumulative.is_none()
            && self.intensity_threshold.is_none()
            && self.visible_categories.is_none()
    }
}

/// What changed after applying an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterChange {
    pub temporal: bool,
    /// Threshold raised or a category removed. Existing zones still cover
    /// everything the filter admits; restyling hides the rest.
    pub narrowed: bool,
    /// Threshold lowered or a category added. Zones built under the old
    /// filter lack candidates it now admits.
    pub widened: bool,
}

impl FilterChange {
    pub fn is_noop(&self) -> bool {
        !self.temporal && !self.narrowed && !self.widened
    }
}

fn check_threshold(threshold: f64) -> Result<(), FilterError> {
    if threshold.is_finite() && (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(FilterError::ThresholdOutOfRange(threshold))
    }
}

impl FilterState {
    pub fn validate(&self) -> Result<(), FilterError> {
        check_threshold(self.intensity_threshold)
    }

    /// Creation-time admission used by synthesis and the historical loader.
    pub fn admits(&self, category: Category, intensity: f64) -> bool {
        intensity >= self.intensity_threshold && self.visible_categories.contains(&category)
    }

    pub fn shows_year(&self, year: i32) -> bool {
        if self.cumulative {
            year <= self.selected_year
        } else {
            year == self.selected_year
        }
    }

    pub fn shows(&self, zone: &Zone) -> bool {
        self.shows_year(zone.year()) && self.admits(zone.category(), zone.intensity())
    }

    /// Applies `update` atomically: nothing changes when it is rejected.
    pub fn apply(&mut self, update: &FilterUpdate) -> Result<FilterChange, FilterError> {
        if let Some(threshold) = update.intensity_threshold {
            check_threshold(threshold)?;
        }

        let mut change = FilterChange::default();
        if let Some(year) = update.selected_year {
            change.temporal |= year != self.selected_year;
            self.selected_year = year;
        }
        if let Some(cumulative) = update.cumulative {
            change.temporal |= cumulative != self.cumulative;
            self.cumulative = cumulative;
        }
        if let Some(threshold) = update.intensity_threshold {
            change.narrowed |= threshold > self.intensity_threshold;
            change.widened |= threshold < self.intensity_threshold;
            self.intensity_threshold = threshold;
        }
        if let Some(categories) = &update.visible_categories {
            change.narrowed |= !self.visible_categories.is_subset(categories);
            change.widened |= !categories.is_subset(&self.visible_categories);
            self.visible_categories = categories.clone();
        }
        Ok(change)
    }

    /// The update that would make an event of this category and intensity
    /// visible: its category is enabled and the threshold drops to ten
    /// points below its intensity. `None` when it already passes.
    pub fn reveal(&self, category: Category, intensity: f64) -> Option<FilterUpdate> {
        if self.admits(category, intensity) {
            return None;
        }
        let mut update = FilterUpdate::default();
        if !self.visible_categories.contains(&category) {
            let mut categories = self.visible_categories.clone();
            categories.insert(category);
            update.visible_categories = Some(categories);
        }
        let target = (intensity - 0.1).max(0.0);
        if target < self.intensity_threshold {
            update.intensity_threshold = Some(target);
        }
        Some(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cumulative_and_single_year_modes() {
        let mut filter = FilterState {
            selected_year: 2020,
            ..FilterState::default()
        };
        assert!(filter.shows_year(2015));
        assert!(filter.shows_year(2020));
        assert!(!filter.shows_year(2023));

        filter.cumulative = false;
        assert!(!filter.shows_year(2015));
        assert!(filter.shows_year(2020));
    }

    #[test]
    fn rejected_update_leaves_state_untouched() {
        let mut filter = FilterState::default();
        let before = filter.clone();
        let update = FilterUpdate {
            selected_year: Some(2018),
            intensity_threshold: Some(1.5),
            ..FilterUpdate::default()
        };
        assert_eq!(
            filter.apply(&update),
            Err(FilterError::ThresholdOutOfRange(1.5))
        );
        assert_eq!(filter, before);
    }

    #[test]
    fn apply_reports_what_changed() {
        let mut filter = FilterState::default();
        let change = filter.apply(&FilterUpdate::year(2018)).unwrap();
        assert!(change.temporal && !change.narrowed && !change.widened);

        let change = filter.apply(&FilterUpdate::threshold(0.5)).unwrap();
        assert!(!change.temporal && change.widened && !change.narrowed);

        let change = filter.apply(&FilterUpdate::threshold(0.6)).unwrap();
        assert!(change.narrowed && !change.widened);

        let change = filter.apply(&FilterUpdate::threshold(0.6)).unwrap();
        assert!(change.is_noop());
    }

    #[test]
    fn category_changes_classify_by_set_inclusion() {
        let mut filter = FilterState::default();
        let both = FilterUpdate {
            visible_categories: Some(BTreeSet::from(Category::ALL)),
            ..FilterUpdate::default()
        };
        let change = filter.apply(&both).unwrap();
        assert!(change.widened && !change.narrowed);

        let flood_only = FilterUpdate {
            visible_categories: Some(BTreeSet::from([Category::Flood])),
            ..FilterUpdate::default()
        };
        let change = filter.apply(&flood_only).unwrap();
        assert!(change.narrowed && !change.widened);

        let swap = FilterUpdate {
            visible_categories: Some(BTreeSet::from([Category::Moisture])),
            ..FilterUpdate::default()
        };
        let change = filter.apply(&swap).unwrap();
        assert!(change.narrowed && change.widened);
    }

    #[test]
    fn reveal_lowers_threshold_and_enables_category() {
        let filter = FilterState::default();
        let update = filter.reveal(Category::Moisture, 0.75).unwrap();
        assert_eq!(
            update.visible_categories,
            Some(BTreeSet::from([Category::Flood, Category::Moisture]))
        );
        let threshold = update.intensity_threshold.unwrap();
        assert!((threshold - 0.65).abs() < 1e-12);

        assert_eq!(filter.reveal(Category::Flood, 0.95), None);
    }

    #[test]
    fn filter_update_parses_from_partial_json() {
        let update: FilterUpdate =
            serde_json::from_str(r#"{"cumulative": false, "visible_categories": ["moisture"]}"#)
                .unwrap();
        assert_eq!(update.cumulative, Some(false));
        assert_eq!(
            update.visible_categories,
            Some(BTreeSet::from([Category::Moisture]))
        );
        assert!(update.selected_year.is_none());
    }
}
