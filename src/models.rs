use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::geo::Coordinates;

pub const MAX_PRICE: f64 = 10_000.0;
pub const DEFAULT_POPULARITY: u8 = 50;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Event {
    pub id: String, // stable identity key, never reassigned
    pub title: String,
    pub category: String,
    pub city: String,
    pub venue: String,
    #[serde(with = "local_timestamp")]
    pub date_start: NaiveDateTime,
    #[serde(with = "local_timestamp")]
    pub date_end: NaiveDateTime,
    #[serde(default)]
    pub price: f64,
    #[serde(default = "default_popularity")]
    pub popularity: u8,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Derived by the geo-radius stage; never read back from a source.
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

impl Event {
    /// Coordinates usable for geo filtering, if both are present and in range.
    pub fn coordinates(&self) -> Option<Coordinates> {
        let coords = Coordinates::new(self.lat?, self.lon?);
        coords.is_valid().then_some(coords)
    }

    pub fn is_free(&self) -> bool {
        self.price == 0.0
    }

    pub fn matches_text(&self, needle_lower: &str) -> bool {
        [&self.title, &self.venue, &self.description]
            .iter()
            .any(|field| field.to_lowercase().contains(needle_lower))
    }

    /// Copy with derived fields stripped, as written to a store.
    pub fn for_storage(&self) -> Event {
        Event {
            distance_km: None,
            ..self.clone()
        }
    }
}

fn default_popularity() -> u8 {
    DEFAULT_POPULARITY
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("title must be 3-100 characters")]
    Title,
    #[error("venue must be 3-200 characters")]
    Venue,
    #[error("description must be at most 2000 characters")]
    Description,
    #[error("price {0} is outside 0-10000")]
    Price(f64),
    #[error("popularity {0} is outside 1-100")]
    Popularity(u8),
    #[error("end date must not be before start date")]
    DateOrder,
    #[error("unknown category: {0}")]
    Category(String),
    #[error("coordinates must include both lat and lon within range")]
    Coordinates,
}

/// Admin-side input for creating or replacing an event.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct EventDraft {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    pub category: String,
    pub city: String,
    pub venue: String,
    #[serde(with = "local_timestamp")]
    pub date_start: NaiveDateTime,
    #[serde(with = "local_timestamp")]
    pub date_end: NaiveDateTime,
    #[serde(default)]
    pub price: f64,
    #[serde(default = "default_popularity")]
    pub popularity: u8,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl EventDraft {
    pub fn validate(&self, categories: &[String]) -> Result<(), ValidationError> {
        let title_len = self.title.trim().chars().count();
        if !(3..=100).contains(&title_len) {
            return Err(ValidationError::Title);
        }
        let venue_len = self.venue.trim().chars().count();
        if !(3..=200).contains(&venue_len) {
            return Err(ValidationError::Venue);
        }
        if self.description.chars().count() > 2000 {
            return Err(ValidationError::Description);
        }
        if !self.price.is_finite() || !(0.0..=MAX_PRICE).contains(&self.price) {
            return Err(ValidationError::Price(self.price));
        }
        if !(1..=100).contains(&self.popularity) {
            return Err(ValidationError::Popularity(self.popularity));
        }
        if self.date_end < self.date_start {
            return Err(ValidationError::DateOrder);
        }
        if !categories.is_empty() && !categories.iter().any(|c| c == &self.category) {
            return Err(ValidationError::Category(self.category.clone()));
        }
        match (self.lat, self.lon) {
            (None, None) => {}
            (Some(lat), Some(lon)) if Coordinates::new(lat, lon).is_valid() => {}
            _ => return Err(ValidationError::Coordinates),
        }
        Ok(())
    }

    pub fn into_event(self, categories: &[String]) -> Result<Event, ValidationError> {
        self.validate(categories)?;
        let id = match self.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => event_id(&self.title, &self.venue, &self.date_start),
        };
        Ok(Event {
            id,
            title: self.title.trim().to_string(),
            category: self.category,
            city: self.city,
            venue: self.venue.trim().to_string(),
            date_start: self.date_start,
            date_end: self.date_end,
            price: self.price,
            popularity: self.popularity,
            lat: self.lat,
            lon: self.lon,
            image: self.image.filter(|path| !path.trim().is_empty()),
            description: self.description,
            is_active: true,
            distance_km: None,
        })
    }
}

/// Stable id: `evt_` plus the first 12 hex chars of sha256(title|venue|start).
pub fn event_id(title: &str, venue: &str, date_start: &NaiveDateTime) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.trim().as_bytes());
    hasher.update(b"|");
    hasher.update(venue.trim().as_bytes());
    hasher.update(b"|");
    hasher.update(local_timestamp::format(date_start).as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("evt_{}", &digest[..12])
}

/// Wall-clock timestamps as stored in event sources. Accepts naive ISO
/// strings, RFC 3339 (the written wall clock is kept) and bare dates.
pub mod local_timestamp {
    use chrono::{DateTime, NaiveDate, NaiveDateTime};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    pub fn format(value: &NaiveDateTime) -> String {
        value.format(FORMAT).to_string()
    }

    pub fn parse(input: &str) -> Option<NaiveDateTime> {
        let input = input.trim();
        for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
            if let Ok(value) = NaiveDateTime::parse_from_str(input, fmt) {
                return Some(value);
            }
        }
        if let Ok(value) = DateTime::parse_from_rfc3339(input) {
            return Some(value.naive_local());
        }
        NaiveDate::parse_from_str(input, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
    }

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}")))
    }
}
