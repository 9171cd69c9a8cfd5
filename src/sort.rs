use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::models::Event;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SortOption {
    /// Popularity first, then soonest.
    Relevance,
    #[default]
    DateSoonest,
    PriceLowHigh,
    PriceHighLow,
    Popularity,
    /// Nearest first. Only meaningful while a geo radius is active.
    Distance,
}

impl SortOption {
    pub const ALL: [SortOption; 6] = [
        SortOption::Relevance,
        SortOption::DateSoonest,
        SortOption::PriceLowHigh,
        SortOption::PriceHighLow,
        SortOption::Popularity,
        SortOption::Distance,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SortOption::Relevance => "Relevance",
            SortOption::DateSoonest => "Date (Soonest)",
            SortOption::PriceLowHigh => "Price (Low to High)",
            SortOption::PriceHighLow => "Price (High to Low)",
            SortOption::Popularity => "Popularity",
            SortOption::Distance => "Distance (Nearest)",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let wanted = label.trim().to_lowercase();
        Self::ALL.into_iter().find(|option| {
            option.label().to_lowercase() == wanted
                || format!("{option:?}").to_lowercase() == wanted
        })
    }

    /// The option actually applied: distance without any distances to sort
    /// on degrades to date order.
    pub fn effective(self, geo_active: bool) -> SortOption {
        match self {
            SortOption::Distance if !geo_active => SortOption::DateSoonest,
            other => other,
        }
    }
}

pub fn sort_events(events: &mut [Event], option: SortOption, geo_active: bool) {
    let option = option.effective(geo_active);
    events.sort_by(|a, b| compare(a, b, option).then_with(|| a.id.cmp(&b.id)));
}

pub fn sorted(mut events: Vec<Event>, option: SortOption, geo_active: bool) -> Vec<Event> {
    sort_events(&mut events, option, geo_active);
    events
}

fn compare(a: &Event, b: &Event, option: SortOption) -> Ordering {
    match option {
        SortOption::Relevance => b
            .popularity
            .cmp(&a.popularity)
            .then_with(|| a.date_start.cmp(&b.date_start)),
        SortOption::DateSoonest => a.date_start.cmp(&b.date_start),
        SortOption::PriceLowHigh => a.price.total_cmp(&b.price),
        SortOption::PriceHighLow => b.price.total_cmp(&a.price),
        SortOption::Popularity => b.popularity.cmp(&a.popularity),
        SortOption::Distance => distance_key(a).total_cmp(&distance_key(b)),
    }
}

// events outside a geo pass have no distance and sink to the end
fn distance_key(event: &Event) -> f64 {
    event.distance_km.unwrap_or(f64::INFINITY)
}
