use std::collections::HashSet;

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use crate::models::Event;

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct EventStats {
    pub total: usize,
    pub cities: usize,
    pub categories: usize,
    pub free_events: usize,
    /// Mean price rounded to two decimals; 0 for an empty catalog.
    pub avg_price: f64,
    /// Events starting in `[now, now + 7 days)`.
    pub upcoming_this_week: usize,
}

pub fn events_stats(events: &[Event], now: NaiveDateTime) -> EventStats {
    if events.is_empty() {
        return EventStats::default();
    }
    let week_from_now = now + Duration::days(7);
    let total_price: f64 = events.iter().map(|e| e.price).sum();
    EventStats {
        total: events.len(),
        cities: events.iter().map(|e| e.city.as_str()).collect::<HashSet<_>>().len(),
        categories: events
            .iter()
            .map(|e| e.category.as_str())
            .collect::<HashSet<_>>()
            .len(),
        free_events: events.iter().filter(|e| e.is_free()).count(),
        avg_price: (total_price / events.len() as f64 * 100.0).round() / 100.0,
        upcoming_this_week: events
            .iter()
            .filter(|e| e.date_start >= now && e.date_start < week_from_now)
            .count(),
    }
}
