//! Interaction state carried across UI cycles.
//!
//! The circle has two writers. The numeric radius control writes directly,
//! tagged with the generation it was rendered with. Map interaction never
//! writes directly: it stages a pending update that `begin_cycle` commits
//! before the numeric control is built again, bumping the generation so a
//! control still echoing its old value cannot overwrite the map's circle.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::circle::{resolve_map_output, MapOutput, ResolvedCircle};
use crate::filters::{DatePreset, FilterCriteria, GeoRadius};
use crate::geo::Coordinates;
use crate::models::Event;
use crate::sort::SortOption;

/// Clicks closer than this (degrees, on both axes) to the current center
/// are treated as jitter.
pub const CLICK_TOLERANCE_DEG: f64 = 0.001;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct CircleSelection {
    pub center: Coordinates,
    pub radius_km: f64,
}

impl CircleSelection {
    pub fn is_active(&self) -> bool {
        self.as_geo_radius().is_active()
    }

    pub fn as_geo_radius(&self) -> GeoRadius {
        GeoRadius::new(self.center, self.radius_km)
    }
}

/// A map-originated write waiting for the next cycle. Clicks move only the
/// center; drawings carry a radius too.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct PendingCircle {
    pub center: Coordinates,
    pub radius_km: Option<f64>,
}

/// Value and generation the numeric radius control must be built with.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct RadiusControl {
    pub value: f64,
    pub generation: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct FilterSelections {
    pub city: Option<String>,
    pub categories: BTreeSet<String>,
    pub date_preset: DatePreset,
    pub max_price: Option<f64>,
    pub search: String,
    pub sort: SortOption,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct SavedSet(BTreeSet<String>);

impl SavedSet {
    /// Returns true if the id is saved afterwards.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.0.remove(id) {
            false
        } else {
            self.0.insert(id.to_string());
            true
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Bookmarks resolved against the full catalog, in catalog order, plus
    /// ids no longer present in it.
    pub fn resolve(&self, events: &[Event]) -> SavedEvents {
        let found: Vec<Event> = events
            .iter()
            .filter(|e| self.contains(&e.id))
            .cloned()
            .collect();
        let missing = self
            .ids()
            .filter(|id| !found.iter().any(|e| e.id == *id))
            .map(str::to_string)
            .collect();
        SavedEvents {
            events: found,
            missing,
        }
    }
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct SavedEvents {
    pub events: Vec<Event>,
    pub missing: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct InteractionState {
    pub filters: FilterSelections,
    pub saved: SavedSet,
    pub detail_event_id: Option<String>,
    home: Coordinates,
    circle: CircleSelection,
    pending: Option<PendingCircle>,
    radius_generation: u64,
    // last payloads seen from the widget, which keeps reporting them on
    // every rerun until the user draws or clicks again
    seen_drawing: Option<ResolvedCircle>,
    seen_click: Option<Coordinates>,
}

impl InteractionState {
    pub fn new(home: Coordinates) -> Self {
        Self {
            filters: FilterSelections::default(),
            saved: SavedSet::default(),
            detail_event_id: None,
            home,
            circle: CircleSelection {
                center: home,
                radius_km: 0.0,
            },
            pending: None,
            radius_generation: 0,
            seen_drawing: None,
            seen_click: None,
        }
    }

    pub fn circle(&self) -> CircleSelection {
        self.circle
    }

    pub fn pending(&self) -> Option<PendingCircle> {
        self.pending
    }

    pub fn radius_control(&self) -> RadiusControl {
        RadiusControl {
            value: self.circle.radius_km,
            generation: self.radius_generation,
        }
    }

    /// Commits any staged map update. Must run before the radius control is
    /// built for this cycle; returns what to build it with.
    pub fn begin_cycle(&mut self) -> RadiusControl {
        if let Some(pending) = self.pending.take() {
            self.circle.center = pending.center;
            if let Some(radius_km) = pending.radius_km {
                self.circle.radius_km = radius_km;
                self.radius_generation += 1;
            }
            debug!(
                lat = self.circle.center.lat,
                lon = self.circle.center.lon,
                radius_km = self.circle.radius_km,
                generation = self.radius_generation,
                "committed pending circle"
            );
        }
        self.radius_control()
    }

    /// A write from the numeric control. Applied immediately unless it was
    /// rendered before the last map commit. Returns whether it was applied.
    pub fn submit_radius(&mut self, value: f64, generation: u64) -> bool {
        if generation != self.radius_generation {
            debug!(
                value,
                generation,
                current = self.radius_generation,
                "ignoring stale radius control value"
            );
            return false;
        }
        if !value.is_finite() {
            return false;
        }
        let value = value.max(0.0);
        if value == self.circle.radius_km {
            return false;
        }
        self.circle.radius_km = value;
        true
    }

    /// Stages whatever the map widget reported. Drawings take precedence
    /// over clicks. Returns whether anything new was staged.
    pub fn stage_map_output(&mut self, output: &MapOutput) -> bool {
        if let Some(resolved) = resolve_map_output(Some(output)) {
            if self.seen_drawing != Some(resolved) {
                self.seen_drawing = Some(resolved);
                // a click reported alongside the drawing is consumed by it
                if let Some(clicked) = output.last_clicked {
                    self.seen_click = Some(clicked.into());
                }
                self.stage_circle(resolved);
                return true;
            }
        }
        if let Some(clicked) = output.last_clicked {
            let clicked = Coordinates::from(clicked);
            if self.seen_click != Some(clicked) {
                self.seen_click = Some(clicked);
                return self.stage_center(clicked);
            }
        }
        false
    }

    pub fn stage_circle(&mut self, circle: ResolvedCircle) {
        self.pending = Some(PendingCircle {
            center: circle.center,
            radius_km: Some(circle.radius_km.max(0.0)),
        });
    }

    /// Stages a center move, keeping any radius already staged. Moves within
    /// the click tolerance are dropped.
    pub fn stage_center(&mut self, center: Coordinates) -> bool {
        let reference = self.pending.map_or(self.circle.center, |p| p.center);
        let moved = (center.lat - reference.lat).abs() > CLICK_TOLERANCE_DEG
            || (center.lon - reference.lon).abs() > CLICK_TOLERANCE_DEG;
        if !moved {
            return false;
        }
        let radius_km = self.pending.and_then(|p| p.radius_km);
        self.pending = Some(PendingCircle { center, radius_km });
        true
    }

    /// Moves the center immediately; no control is bound to it.
    pub fn jump_to(&mut self, center: Coordinates) {
        self.circle.center = center;
    }

    /// Radius to zero, center home, pending slot cleared, all in one step.
    pub fn reset_circle(&mut self) {
        self.pending = None;
        self.circle = CircleSelection {
            center: self.home,
            radius_km: 0.0,
        };
        self.radius_generation += 1;
    }

    pub fn reset_filters(&mut self) {
        self.filters = FilterSelections::default();
    }

    pub fn toggle_saved(&mut self, id: &str) -> bool {
        self.saved.toggle(id)
    }

    pub fn criteria(&self) -> FilterCriteria {
        FilterCriteria {
            city: self.filters.city.clone(),
            categories: self.filters.categories.clone(),
            date_preset: self.filters.date_preset,
            max_price: self.filters.max_price,
            search: self.filters.search.clone(),
            circle: self
                .circle
                .is_active()
                .then(|| self.circle.as_geo_radius()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circle::{Feature, LatLng};

    const HOME: Coordinates = Coordinates::new(37.9601, 58.3261);

    fn drawing(lon: f64, lat: f64, radius_m: f64) -> MapOutput {
        MapOutput {
            last_active_drawing: Some(Feature::point(lon, lat, radius_m)),
            ..MapOutput::default()
        }
    }

    fn click(lat: f64, lng: f64) -> MapOutput {
        MapOutput {
            last_clicked: Some(LatLng { lat, lng }),
            ..MapOutput::default()
        }
    }

    #[test]
    fn starts_inactive_at_home() {
        let state = InteractionState::new(HOME);
        assert_eq!(state.circle().center, HOME);
        assert_eq!(state.circle().radius_km, 0.0);
        assert!(state.criteria().circle.is_none());
    }

    #[test]
    fn numeric_writes_apply_immediately() {
        let mut state = InteractionState::new(HOME);
        let control = state.begin_cycle();
        assert!(state.submit_radius(3.0, control.generation));
        assert_eq!(state.circle().radius_km, 3.0);
        let geo = state.criteria().circle.expect("geo active");
        assert_eq!(geo.radius_km, 3.0);
        assert_eq!(geo.center, HOME);
    }

    #[test]
    fn map_writes_wait_for_next_cycle() {
        let mut state = InteractionState::new(HOME);
        state.begin_cycle();
        assert!(state.stage_map_output(&drawing(58.40, 37.90, 2000.0)));
        assert_eq!(state.circle().radius_km, 0.0, "not applied mid-cycle");
        assert!(state.pending().is_some());

        let control = state.begin_cycle();
        assert_eq!(state.circle().radius_km, 2.0);
        assert_eq!(state.circle().center, Coordinates::new(37.90, 58.40));
        assert_eq!(control.value, 2.0);
        assert!(state.pending().is_none());
    }

    #[test]
    fn pending_map_value_survives_stale_control_echo() {
        let mut state = InteractionState::new(HOME);
        let before = state.begin_cycle();
        assert_eq!(before.value, 0.0);
        state.stage_map_output(&drawing(58.33, 37.96, 2000.0));

        let control = state.begin_cycle();
        // the control still holds 0.0 from the previous render
        assert!(!state.submit_radius(before.value, before.generation));
        assert_eq!(state.circle().radius_km, 2.0);
        assert_eq!(control.value, 2.0);
        assert_eq!(state.radius_control().value, 2.0);
    }

    #[test]
    fn map_wins_over_numeric_in_same_cycle() {
        let mut state = InteractionState::new(HOME);
        let control = state.begin_cycle();
        state.stage_map_output(&drawing(58.33, 37.96, 5000.0));
        assert!(state.submit_radius(3.0, control.generation));
        assert_eq!(state.circle().radius_km, 3.0);

        state.begin_cycle();
        assert_eq!(state.circle().radius_km, 5.0);
    }

    #[test]
    fn numeric_is_authoritative_until_next_map_interaction() {
        let mut state = InteractionState::new(HOME);
        state.begin_cycle();
        state.stage_map_output(&drawing(58.33, 37.96, 5000.0));
        let control = state.begin_cycle();
        assert!(state.submit_radius(1.0, control.generation));

        // the widget keeps reporting the same drawing on later reruns
        assert!(!state.stage_map_output(&drawing(58.33, 37.96, 5000.0)));
        state.begin_cycle();
        assert_eq!(state.circle().radius_km, 1.0);

        // a new drawing takes over again
        assert!(state.stage_map_output(&drawing(58.33, 37.96, 8000.0)));
        state.begin_cycle();
        assert_eq!(state.circle().radius_km, 8.0);
    }

    #[test]
    fn negative_and_non_finite_radius_inputs() {
        let mut state = InteractionState::new(HOME);
        let control = state.begin_cycle();
        assert!(state.submit_radius(4.0, control.generation));
        assert!(state.submit_radius(-2.0, control.generation));
        assert_eq!(state.circle().radius_km, 0.0);
        assert!(!state.submit_radius(f64::NAN, control.generation));
        assert_eq!(state.circle().radius_km, 0.0);
    }

    #[test]
    fn reset_clears_pending_atomically() {
        let mut state = InteractionState::new(HOME);
        let control = state.begin_cycle();
        state.submit_radius(6.0, control.generation);
        state.jump_to(Coordinates::new(37.60, 61.83));
        state.stage_map_output(&drawing(58.5, 38.0, 9000.0));

        state.reset_circle();
        assert!(state.pending().is_none());
        assert_eq!(state.circle().radius_km, 0.0);
        assert_eq!(state.circle().center, HOME);

        let control = state.begin_cycle();
        assert_eq!(control.value, 0.0);
        assert_eq!(state.circle().radius_km, 0.0);
        // the old control value is stale after a reset
        assert!(!state.submit_radius(6.0, control.generation - 1));
    }

    #[test]
    fn reset_is_not_undone_by_a_repeated_drawing() {
        let mut state = InteractionState::new(HOME);
        state.begin_cycle();
        state.stage_map_output(&drawing(58.5, 38.0, 9000.0));
        state.begin_cycle();
        state.reset_circle();

        assert!(!state.stage_map_output(&drawing(58.5, 38.0, 9000.0)));
        state.begin_cycle();
        assert_eq!(state.circle().radius_km, 0.0);
    }

    #[test]
    fn clicks_move_center_but_keep_radius() {
        let mut state = InteractionState::new(HOME);
        let control = state.begin_cycle();
        state.submit_radius(10.0, control.generation);

        assert!(state.stage_map_output(&click(37.60, 61.83)));
        let control = state.begin_cycle();
        assert_eq!(state.circle().center, Coordinates::new(37.60, 61.83));
        assert_eq!(state.circle().radius_km, 10.0);
        // center-only commits leave the control's generation alone
        assert!(state.submit_radius(12.0, control.generation));
    }

    #[test]
    fn tiny_click_moves_are_ignored() {
        let mut state = InteractionState::new(HOME);
        state.begin_cycle();
        assert!(!state.stage_map_output(&click(HOME.lat + 0.0005, HOME.lon - 0.0009)));
        assert!(state.pending().is_none());
        assert!(state.stage_map_output(&click(HOME.lat + 0.0011, HOME.lon)));
    }

    #[test]
    fn drawing_takes_precedence_over_click() {
        let mut state = InteractionState::new(HOME);
        state.begin_cycle();
        let output = MapOutput {
            last_active_drawing: Some(Feature::point(58.40, 37.90, 1500.0)),
            all_drawings: Vec::new(),
            last_clicked: Some(LatLng { lat: 40.0, lng: 53.0 }),
        };
        state.stage_map_output(&output);
        state.begin_cycle();
        assert_eq!(state.circle().center, Coordinates::new(37.90, 58.40));
        assert_eq!(state.circle().radius_km, 1.5);
    }

    #[test]
    fn click_sent_with_a_drawing_does_not_move_it_on_rerun() {
        let mut state = InteractionState::new(HOME);
        state.begin_cycle();
        let output = MapOutput {
            last_active_drawing: Some(Feature::point(61.8302, 37.6005, 2000.0)),
            all_drawings: Vec::new(),
            last_clicked: Some(LatLng { lat: 37.62, lng: 61.85 }),
        };
        assert!(state.stage_map_output(&output));
        state.begin_cycle();
        assert_eq!(state.circle().center, Coordinates::new(37.6005, 61.8302));

        // the widget reports the same payload on the rerun
        assert!(!state.stage_map_output(&output));
        state.begin_cycle();
        assert_eq!(state.circle().center, Coordinates::new(37.6005, 61.8302));
        assert_eq!(state.circle().radius_km, 2.0);

        // a later, different click still moves the center
        let moved = MapOutput {
            last_clicked: Some(LatLng { lat: 37.70, lng: 61.90 }),
            ..output
        };
        assert!(state.stage_map_output(&moved));
        state.begin_cycle();
        assert_eq!(state.circle().center, Coordinates::new(37.70, 61.90));
    }

    #[test]
    fn unrecognized_shapes_change_nothing() {
        let mut state = InteractionState::new(HOME);
        state.begin_cycle();
        let output = MapOutput {
            last_active_drawing: Some(Feature::polygon(&[])),
            ..MapOutput::default()
        };
        assert!(!state.stage_map_output(&output));
        assert!(state.pending().is_none());
    }

    #[test]
    fn saved_set_toggles_and_resolves() {
        let mut state = InteractionState::new(HOME);
        assert!(state.toggle_saved("a"));
        assert!(state.toggle_saved("gone"));
        assert!(state.toggle_saved("b"));
        assert!(!state.toggle_saved("b"));
        assert_eq!(state.saved.len(), 2);

        let json = r#"[{"id": "a", "title": "A", "category": "Art", "city": "Mary",
            "venue": "Hall", "date_start": "2025-05-03T09:00:00",
            "date_end": "2025-05-03T10:00:00"}]"#;
        let events: Vec<Event> = serde_json::from_str(json).unwrap();
        let saved = state.saved.resolve(&events);
        assert_eq!(saved.events.len(), 1);
        assert_eq!(saved.missing, vec!["gone".to_string()]);
    }

    #[test]
    fn state_round_trips_through_json() {
        let mut state = InteractionState::new(HOME);
        state.filters.city = Some("Mary".to_string());
        state.toggle_saved("x");
        state.stage_map_output(&drawing(58.33, 37.96, 2000.0));

        let json = serde_json::to_string(&state).expect("serialize");
        let mut restored: InteractionState = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored, state);
        restored.begin_cycle();
        assert_eq!(restored.circle().radius_km, 2.0);
    }
}
