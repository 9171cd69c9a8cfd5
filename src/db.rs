use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::Value;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, StoreKind};
use crate::models::{Event, EventDraft, ValidationError};
use crate::utils;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to replace store file: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("invalid event: {0}")]
    Invalid(#[from] ValidationError),
    #[error("event not found: {0}")]
    NotFound(String),
}

/// Result of a degrading load: whatever could be read plus what could not.
#[derive(Debug, Default)]
pub struct Loaded {
    pub events: Vec<Event>,
    pub diagnostics: Vec<String>,
}

impl Loaded {
    fn failed(diagnostic: String) -> Self {
        warn!("{diagnostic}");
        Self {
            events: Vec::new(),
            diagnostics: vec![diagnostic],
        }
    }
}

pub trait EventStore {
    /// Never fails: unreadable sources yield an empty collection and a
    /// diagnostic.
    fn load(&self) -> Loaded;

    /// Replaces the whole collection.
    fn save(&self, events: &[Event]) -> Result<(), StoreError>;
}

pub fn open_store(config: &AppConfig) -> Result<Box<dyn EventStore>, StoreError> {
    match config.store {
        StoreKind::Json => Ok(Box::new(JsonStore::new(config.events_path()))),
        StoreKind::Sqlite => Ok(Box::new(SqliteStore::open_default(config)?)),
    }
}

pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventStore for JsonStore {
    fn load(&self) -> Loaded {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no event source yet");
                return Loaded::default();
            }
            Err(err) => {
                return Loaded::failed(format!(
                    "failed to read {}: {err}",
                    self.path.display()
                ))
            }
        };
        if contents.trim().is_empty() {
            return Loaded::default();
        }
        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Array(records)) => parse_records(records),
            Ok(_) => Loaded::failed(format!(
                "{} must contain an array of events",
                self.path.display()
            )),
            Err(err) => Loaded::failed(format!(
                "malformed event source {}: {err}",
                self.path.display()
            )),
        }
    }

    fn save(&self, events: &[Event]) -> Result<(), StoreError> {
        utils::ensure_parent(&self.path);
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let stored: Vec<Event> = events.iter().map(Event::for_storage).collect();
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(serde_json::to_string_pretty(&stored)?.as_bytes())?;
        file.flush()?;
        file.persist(&self.path)?;
        info!(path = %self.path.display(), count = stored.len(), "saved events");
        Ok(())
    }
}

/// Keeps every record that deserializes, skipping bad ones, duplicate ids
/// and soft-deleted entries.
fn parse_records(records: Vec<Value>) -> Loaded {
    let mut loaded = Loaded::default();
    let mut seen = HashSet::new();
    for (index, record) in records.into_iter().enumerate() {
        let event = match serde_json::from_value::<Event>(record) {
            Ok(event) => event,
            Err(err) => {
                let diagnostic = format!("skipped record {index}: {err}");
                warn!("{diagnostic}");
                loaded.diagnostics.push(diagnostic);
                continue;
            }
        };
        if !seen.insert(event.id.clone()) {
            let diagnostic = format!("skipped record {index}: duplicate id {}", event.id);
            warn!("{diagnostic}");
            loaded.diagnostics.push(diagnostic);
            continue;
        }
        if event.is_active {
            loaded.events.push(event);
        }
    }
    debug!(
        count = loaded.events.len(),
        skipped = loaded.diagnostics.len(),
        "parsed event source"
    );
    loaded
}

#[derive(Debug, Default, Clone, Serialize, PartialEq)]
pub struct ImportResult {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

pub struct SqliteStore {
    conn: Connection,
    categories: Vec<String>,
}

const EVENT_COLUMNS: &str = "id, title, category, city, venue, date_start, date_end, price, \
     popularity, lat, lon, image, description, is_active";

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        utils::ensure_parent(path);
        let store = Self {
            conn: Connection::open(path)?,
            categories: Vec::new(),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            categories: Vec::new(),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens the configured database, seeding a few sample events into an
    /// empty one.
    pub fn open_default(config: &AppConfig) -> Result<Self, StoreError> {
        let store =
            Self::open(&config.database_path())?.with_categories(config.categories.clone());
        store.seed_if_empty(config.local_now().unwrap_or_else(|_| Utc::now().naive_utc()))?;
        Ok(store)
    }

    /// Categories drafts are validated against. Empty accepts any.
    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS events(
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                category TEXT NOT NULL,
                city TEXT NOT NULL,
                venue TEXT NOT NULL,
                date_start TEXT NOT NULL,
                date_end TEXT NOT NULL,
                price REAL NOT NULL DEFAULT 0 CHECK (price >= 0),
                popularity INTEGER NOT NULL DEFAULT 50,
                lat REAL,
                lon REAL,
                image TEXT,
                description TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1
            );
            CREATE INDEX IF NOT EXISTS events_date_start ON events(date_start);",
        )
    }

    fn seed_if_empty(&self, now: NaiveDateTime) -> Result<(), StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        if count > 0 {
            return Ok(());
        }

        let samples = vec![
            sample_event("Ashgabat", "Ashgabat Opera Hall", "Music", now + Duration::days(1), 60.0, (37.9520, 58.3790)),
            sample_event("Ashgabat", "Berkarar Mall", "Market", now + Duration::days(3), 0.0, (37.9180, 58.3900)),
            sample_event("Mary", "Mary Drama Theater", "Film", now + Duration::days(10), 25.0, (37.5930, 61.8340)),
        ];
        for event in &samples {
            self.upsert_event(event)?;
        }
        info!(count = samples.len(), "seeded empty event database");
        Ok(())
    }

    pub fn upsert_event(&self, event: &Event) -> Result<(), StoreError> {
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO events (id, title, category, city, venue, date_start, date_end, price,
                popularity, lat, lon, image, description, created_at, updated_at, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14, ?15)
             ON CONFLICT(id) DO UPDATE SET
               title = excluded.title,
               category = excluded.category,
               city = excluded.city,
               venue = excluded.venue,
               date_start = excluded.date_start,
               date_end = excluded.date_end,
               price = excluded.price,
               popularity = excluded.popularity,
               lat = excluded.lat,
               lon = excluded.lon,
               image = excluded.image,
               description = excluded.description,
               updated_at = excluded.updated_at,
               is_active = excluded.is_active",
            params![
                event.id,
                event.title,
                event.category,
                event.city,
                event.venue,
                event.date_start,
                event.date_end,
                event.price,
                event.popularity,
                event.lat,
                event.lon,
                event.image,
                event.description,
                now,
                event.is_active,
            ],
        )?;
        Ok(())
    }

    /// Inserts a validated draft. Fails if the id is already taken.
    pub fn create_event(&self, draft: EventDraft) -> Result<Event, StoreError> {
        let event = draft.into_event(&self.categories)?;
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO events (id, title, category, city, venue, date_start, date_end, price,
                popularity, lat, lon, image, description, created_at, updated_at, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14, 1)",
            params![
                event.id,
                event.title,
                event.category,
                event.city,
                event.venue,
                event.date_start,
                event.date_end,
                event.price,
                event.popularity,
                event.lat,
                event.lon,
                event.image,
                event.description,
                now,
            ],
        )?;
        info!(id = %event.id, "created event");
        Ok(event)
    }

    /// Replaces the fields of an existing event. The id and the active flag
    /// are kept.
    pub fn update_event(&self, id: &str, draft: EventDraft) -> Result<Event, StoreError> {
        let mut event = draft.into_event(&self.categories)?;
        event.id = id.to_string();
        let changed = self.conn.execute(
            "UPDATE events SET title = ?2, category = ?3, city = ?4, venue = ?5,
                date_start = ?6, date_end = ?7, price = ?8, popularity = ?9, lat = ?10,
                lon = ?11, image = ?12, description = ?13, updated_at = ?14
             WHERE id = ?1",
            params![
                event.id,
                event.title,
                event.category,
                event.city,
                event.venue,
                event.date_start,
                event.date_end,
                event.price,
                event.popularity,
                event.lat,
                event.lon,
                event.image,
                event.description,
                Utc::now(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.get_event(id)
    }

    /// Looks up an event regardless of its active flag.
    pub fn get_event(&self, id: &str) -> Result<Event, StoreError> {
        self.conn
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
                params![id],
                event_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Soft delete: the row stays but `load` no longer returns it.
    pub fn delete_event(&self, id: &str) -> Result<(), StoreError> {
        self.set_active(id, false)
    }

    pub fn restore_event(&self, id: &str) -> Result<(), StoreError> {
        self.set_active(id, true)
    }

    fn set_active(&self, id: &str, active: bool) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE events SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, active, Utc::now()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        info!(id, active, "changed event visibility");
        Ok(())
    }

    pub fn event_count(&self) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM events WHERE is_active = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    /// Imports an array of drafts, one at a time. Failures are counted and
    /// described, never fatal.
    pub fn import_json(&self, path: &Path) -> ImportResult {
        let mut result = ImportResult::default();
        let records = match fs::read_to_string(path)
            .map_err(StoreError::from)
            .and_then(|raw| serde_json::from_str::<Value>(&raw).map_err(StoreError::from))
        {
            Ok(Value::Array(records)) => records,
            Ok(_) => {
                result.errors.push("JSON must contain an array of events".to_string());
                return result;
            }
            Err(err) => {
                result.errors.push(format!("failed to read JSON file: {err}"));
                return result;
            }
        };

        result.total = records.len();
        for record in records {
            let title = record
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            let outcome = serde_json::from_value::<EventDraft>(record)
                .map_err(StoreError::from)
                .and_then(|draft| self.create_event(draft));
            match outcome {
                Ok(_) => result.success += 1,
                Err(err) => {
                    result.failed += 1;
                    result.errors.push(format!("event '{title}': {err}"));
                }
            }
        }
        info!(
            total = result.total,
            success = result.success,
            failed = result.failed,
            "imported events"
        );
        result
    }

    /// Every event, soft-deleted ones included, as pretty JSON.
    pub fn export_json(&self) -> Result<String, StoreError> {
        let events = self.query_events(false)?;
        Ok(serde_json::to_string_pretty(&events)?)
    }

    fn query_events(&self, active_only: bool) -> Result<Vec<Event>, StoreError> {
        let filter = if active_only { "WHERE is_active = 1" } else { "" };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events {filter} ORDER BY date_start ASC, id ASC"
        ))?;
        let rows = stmt.query_map([], event_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

impl EventStore for SqliteStore {
    fn load(&self) -> Loaded {
        match self.query_events(true) {
            Ok(events) => {
                debug!(count = events.len(), "loaded events from sqlite");
                Loaded {
                    events,
                    diagnostics: Vec::new(),
                }
            }
            Err(err) => Loaded::failed(format!("failed to load events: {err}")),
        }
    }

    fn save(&self, events: &[Event]) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM events", [])?;
        for event in events {
            self.upsert_event(event)?;
        }
        tx.commit()?;
        info!(count = events.len(), "saved events");
        Ok(())
    }
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let popularity: i64 = row.get("popularity")?;
    Ok(Event {
        id: row.get("id")?,
        title: row.get("title")?,
        category: row.get("category")?,
        city: row.get("city")?,
        venue: row.get("venue")?,
        date_start: row.get("date_start")?,
        date_end: row.get("date_end")?,
        price: row.get("price")?,
        popularity: popularity.clamp(0, u8::MAX as i64) as u8,
        lat: row.get("lat")?,
        lon: row.get("lon")?,
        image: row.get("image")?,
        description: row.get("description")?,
        is_active: row.get("is_active")?,
        distance_km: None,
    })
}

fn sample_event(
    city: &str,
    venue: &str,
    category: &str,
    start: NaiveDateTime,
    price: f64,
    (lat, lon): (f64, f64),
) -> Event {
    let title = format!("{category} at {venue}");
    Event {
        id: crate::models::event_id(&title, venue, &start),
        title,
        category: category.to_string(),
        city: city.to_string(),
        venue: venue.to_string(),
        date_start: start,
        date_end: start + Duration::hours(3),
        price,
        popularity: 50,
        lat: Some(lat),
        lon: Some(lon),
        image: None,
        description: String::new(),
        is_active: true,
        distance_km: None,
    }
}
