use std::collections::BTreeSet;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geo::Coordinates;
use crate::models::Event;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DatePreset {
    #[default]
    All,
    Today,
    Tomorrow,
    ThisWeekend,
    /// Rolling seven days starting at the evaluation instant.
    ThisWeek,
    ThisMonth,
}

impl DatePreset {
    pub const ALL: [DatePreset; 6] = [
        DatePreset::All,
        DatePreset::Today,
        DatePreset::Tomorrow,
        DatePreset::ThisWeekend,
        DatePreset::ThisWeek,
        DatePreset::ThisMonth,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            DatePreset::All => "All",
            DatePreset::Today => "Today",
            DatePreset::Tomorrow => "Tomorrow",
            DatePreset::ThisWeekend => "This Weekend",
            DatePreset::ThisWeek => "This Week",
            DatePreset::ThisMonth => "This Month",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let wanted = label.trim().to_lowercase().replace(['-', '_'], " ");
        Self::ALL
            .into_iter()
            .find(|preset| preset.label().to_lowercase() == wanted)
    }

    /// Half-open interval for this preset on `now`'s local calendar, or
    /// `None` when the preset does not restrict dates.
    pub fn resolve(&self, now: NaiveDateTime) -> Option<DateRange> {
        let today = now.date();
        match self {
            DatePreset::All => None,
            DatePreset::Today => Some(DateRange::days(today, 1)),
            DatePreset::Tomorrow => Some(DateRange::days(today + Duration::days(1), 1)),
            DatePreset::ThisWeekend => Some(DateRange::days(upcoming_saturday(today), 2)),
            DatePreset::ThisWeek => Some(DateRange {
                start: now,
                end: now + Duration::days(7),
            }),
            DatePreset::ThisMonth => {
                let first = today.with_day(1)?;
                let next = if today.month() == 12 {
                    NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)?
                } else {
                    NaiveDate::from_ymd_opt(today.year(), today.month() + 1, 1)?
                };
                Some(DateRange {
                    start: midnight(first),
                    end: midnight(next),
                })
            }
        }
    }
}

/// Saturday of the weekend a "this weekend" lookup refers to. Saturday maps
/// to itself; Sunday maps forward to the next Saturday, not back one day.
pub fn upcoming_saturday(today: NaiveDate) -> NaiveDate {
    let weekday = i64::from(today.weekday().num_days_from_monday());
    let days_until = (5 - weekday).rem_euclid(7);
    today + Duration::days(days_until)
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DateRange {
    fn days(first: NaiveDate, count: i64) -> Self {
        Self {
            start: midnight(first),
            end: midnight(first + Duration::days(count)),
        }
    }

    pub fn contains(&self, instant: &NaiveDateTime) -> bool {
        self.start <= *instant && *instant < self.end
    }
}

/// Center plus radius for the geo stage. A non-positive radius disables it.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct GeoRadius {
    pub center: Coordinates,
    pub radius_km: f64,
}

impl GeoRadius {
    pub fn new(center: Coordinates, radius_km: f64) -> Self {
        Self { center, radius_km }
    }

    pub fn is_active(&self) -> bool {
        self.radius_km.is_finite() && self.radius_km > 0.0
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct FilterCriteria {
    /// `None` is "any city".
    pub city: Option<String>,
    pub categories: BTreeSet<String>,
    pub date_preset: DatePreset,
    /// `None` is "no ceiling".
    pub max_price: Option<f64>,
    pub search: String,
    pub circle: Option<GeoRadius>,
}

impl FilterCriteria {
    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_date_preset(mut self, preset: DatePreset) -> Self {
        self.date_preset = preset;
        self
    }

    pub fn with_max_price(mut self, max_price: f64) -> Self {
        self.max_price = Some(max_price);
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    pub fn with_circle(mut self, center: Coordinates, radius_km: f64) -> Self {
        self.circle = Some(GeoRadius::new(center, radius_km));
        self
    }

    pub fn geo_active(&self) -> bool {
        self.circle.as_ref().is_some_and(GeoRadius::is_active)
    }
}

pub fn by_city(events: &[Event], city: Option<&str>) -> Vec<Event> {
    match city.map(str::trim).filter(|c| !c.is_empty()) {
        Some(city) => events.iter().filter(|e| e.city == city).cloned().collect(),
        None => events.to_vec(),
    }
}

pub fn by_categories(events: &[Event], categories: &BTreeSet<String>) -> Vec<Event> {
    if categories.is_empty() {
        return events.to_vec();
    }
    events
        .iter()
        .filter(|e| categories.contains(&e.category))
        .cloned()
        .collect()
}

pub fn by_date(events: &[Event], preset: DatePreset, now: NaiveDateTime) -> Vec<Event> {
    match preset.resolve(now) {
        Some(range) => events
            .iter()
            .filter(|e| range.contains(&e.date_start))
            .cloned()
            .collect(),
        None => events.to_vec(),
    }
}

pub fn by_max_price(events: &[Event], max_price: Option<f64>) -> Vec<Event> {
    match max_price {
        Some(ceiling) => events
            .iter()
            .filter(|e| e.price <= ceiling)
            .cloned()
            .collect(),
        None => events.to_vec(),
    }
}

pub fn by_search(events: &[Event], query: &str) -> Vec<Event> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return events.to_vec();
    }
    events
        .iter()
        .filter(|e| e.matches_text(&needle))
        .cloned()
        .collect()
}

/// Keeps events inside the circle and attaches their `distance_km`.
/// Events without usable coordinates are dropped only here.
pub fn within_radius(events: &[Event], circle: Option<&GeoRadius>) -> Vec<Event> {
    let circle = match circle {
        Some(circle) if circle.is_active() => circle,
        _ => return events.to_vec(),
    };
    events
        .iter()
        .filter_map(|event| {
            let distance = circle.center.distance_km(&event.coordinates()?);
            (distance <= circle.radius_km).then(|| Event {
                distance_km: Some(distance),
                ..event.clone()
            })
        })
        .collect()
}

/// Stages 1-5: everything except the geo radius.
pub fn apply_attribute_filters(
    events: &[Event],
    criteria: &FilterCriteria,
    now: NaiveDateTime,
) -> Vec<Event> {
    let stage = by_city(events, criteria.city.as_deref());
    debug!(remaining = stage.len(), "city stage");
    let stage = by_categories(&stage, &criteria.categories);
    debug!(remaining = stage.len(), "category stage");
    let stage = by_date(&stage, criteria.date_preset, now);
    debug!(remaining = stage.len(), preset = criteria.date_preset.label(), "date stage");
    let stage = by_max_price(&stage, criteria.max_price);
    debug!(remaining = stage.len(), "price stage");
    let stage = by_search(&stage, &criteria.search);
    debug!(remaining = stage.len(), "search stage");
    stage
}

pub fn apply_filters(events: &[Event], criteria: &FilterCriteria, now: NaiveDateTime) -> Vec<Event> {
    let narrowed = apply_attribute_filters(events, criteria, now);
    let result = within_radius(&narrowed, criteria.circle.as_ref());
    debug!(
        total = events.len(),
        remaining = result.len(),
        geo = criteria.geo_active(),
        "filter pipeline finished"
    );
    result
}
