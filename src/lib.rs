pub mod circle;
pub mod config;
pub mod db;
pub mod filters;
pub mod geo;
pub mod models;
pub mod sort;
pub mod state;
pub mod stats;
pub mod utils;

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use circle::MapOutput;
use config::AppConfig;
use filters::{apply_filters, DatePreset};
use models::Event;
use sort::{sorted, SortOption};
use state::{CircleSelection, InteractionState, PendingCircle, RadiusControl, SavedEvents};

/// A user interaction reported by the UI layer during one cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", content = "value", rename_all = "snake_case")]
pub enum Action {
    SetCity(Option<String>),
    SetCategories(BTreeSet<String>),
    SetDatePreset(DatePreset),
    SetMaxPrice(Option<f64>),
    SetSearch(String),
    SetSort(SortOption),
    /// Numeric radius control, tagged with the generation it was rendered
    /// with.
    SetRadius { value: f64, generation: u64 },
    MapInteraction(MapOutput),
    JumpToCity(String),
    ToggleSaved(String),
    ShowDetail(String),
    CloseDetail,
    ResetFilters,
    ResetCircle,
}

/// Everything a renderer needs for one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleView {
    pub events: Vec<Event>,
    /// Size of the catalog before filtering.
    pub total: usize,
    pub radius_control: RadiusControl,
    pub circle: CircleSelection,
    pub pending: Option<PendingCircle>,
    /// Sort actually applied.
    pub sort: SortOption,
    pub saved: SavedEvents,
    pub detail: Option<Event>,
    /// Set when a map interaction was staged; the caller should run another
    /// cycle so the pending update is committed before the next render.
    pub rerun_requested: bool,
}

/// Runs one UI cycle: commit staged map updates, apply this cycle's
/// actions, then filter and sort the catalog.
pub fn evaluate(
    state: &mut InteractionState,
    events: &[Event],
    actions: &[Action],
    config: &AppConfig,
    now: NaiveDateTime,
) -> CycleView {
    state.begin_cycle();
    let mut rerun_requested = false;

    for action in actions {
        debug!(?action, "applying action");
        match action {
            Action::SetCity(city) => {
                state.filters.city = city.clone().filter(|c| !c.trim().is_empty());
            }
            Action::SetCategories(categories) => state.filters.categories = categories.clone(),
            Action::SetDatePreset(preset) => state.filters.date_preset = *preset,
            Action::SetMaxPrice(max_price) => state.filters.max_price = *max_price,
            Action::SetSearch(search) => state.filters.search = search.clone(),
            Action::SetSort(sort) => state.filters.sort = *sort,
            Action::SetRadius { value, generation } if value.is_finite() => {
                state.submit_radius(value.min(config.max_radius_km), *generation);
            }
            Action::SetRadius { value, .. } => debug!(value, "ignoring non-finite radius"),
            Action::MapInteraction(output) => {
                if state.stage_map_output(output) {
                    rerun_requested = true;
                }
            }
            Action::JumpToCity(name) => match config.city(name) {
                Some(city) => state.jump_to(city.coordinates()),
                None => warn!(city = %name, "unknown city, ignoring jump"),
            },
            Action::ToggleSaved(id) => {
                state.toggle_saved(id);
            }
            Action::ShowDetail(id) => state.detail_event_id = Some(id.clone()),
            Action::CloseDetail => state.detail_event_id = None,
            Action::ResetFilters => state.reset_filters(),
            Action::ResetCircle => state.reset_circle(),
        }
    }

    let mut criteria = state.criteria();
    if criteria.max_price.is_none() {
        criteria.max_price = config.default_max_price;
    }
    let geo_active = criteria.geo_active();
    let sort = state.filters.sort.effective(geo_active);
    let matched = sorted(apply_filters(events, &criteria, now), sort, geo_active);

    let detail = state
        .detail_event_id
        .as_deref()
        .and_then(|id| events.iter().find(|e| e.id == id))
        .cloned();
    if detail.is_none() && state.detail_event_id.is_some() {
        debug!("detail event no longer in catalog");
        state.detail_event_id = None;
    }

    info!(
        total = events.len(),
        shown = matched.len(),
        geo_active,
        rerun_requested,
        "cycle evaluated"
    );

    CycleView {
        events: matched,
        total: events.len(),
        radius_control: state.radius_control(),
        circle: state.circle(),
        pending: state.pending(),
        sort,
        saved: state.saved.resolve(events),
        detail,
        rerun_requested,
    }
}
