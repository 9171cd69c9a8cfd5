use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::geo::Coordinates;
use crate::utils;

pub const DEFAULT_TIMEZONE: &str = "Asia/Ashgabat";
pub const DEFAULT_CENTER: Coordinates = Coordinates::new(37.9601, 58.3261);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown timezone: {0}")]
    Timezone(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct City {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl City {
    fn new(name: &str, lat: f64, lon: f64) -> Self {
        Self {
            name: name.to_string(),
            lat,
            lon,
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lon)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreKind,
    pub events_file: String,
    pub database_file: String,
    pub timezone: String,
    pub default_center: Coordinates,
    pub max_radius_km: f64,
    pub default_max_price: Option<f64>,
    pub cities: Vec<City>,
    pub categories: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreKind::Json,
            events_file: "events.json".to_string(),
            database_file: "events.db".to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            default_center: DEFAULT_CENTER,
            max_radius_km: 50.0,
            default_max_price: None,
            cities: vec![
                City::new("Ashgabat", 37.9601, 58.3261),
                City::new("Mary", 37.6005, 61.8302),
                City::new("Türkmenabat", 39.0733, 63.5786),
                City::new("Dashoguz", 41.8387, 59.9650),
                City::new("Balkanabat", 39.5104, 54.3672),
                City::new("Awaza", 40.0224, 52.9693),
            ],
            categories: [
                "Music",
                "Tech",
                "Sports",
                "Food",
                "Art",
                "Market",
                "Film",
                "Wellness",
                "Business",
                "Science",
                "Kids",
                "Travel",
                "Community",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
        }
    }
}

impl AppConfig {
    /// Applies `SHARKIYA_TZ` on top of whatever was loaded.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(tz) = std::env::var("SHARKIYA_TZ") {
            if !tz.trim().is_empty() {
                self.timezone = tz.trim().to_string();
            }
        }
        self
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Timezone(self.timezone.clone()))
    }

    /// Wall-clock "now" in the configured timezone, the instant every date
    /// preset is resolved against.
    pub fn local_now(&self) -> Result<NaiveDateTime, ConfigError> {
        Ok(Utc::now().with_timezone(&self.tz()?).naive_local())
    }

    pub fn city(&self, name: &str) -> Option<&City> {
        let wanted = name.trim().to_lowercase();
        self.cities
            .iter()
            .find(|city| city.name.to_lowercase() == wanted)
    }

    pub fn events_path(&self) -> PathBuf {
        utils::data_root().join(&self.events_file)
    }

    pub fn database_path(&self) -> PathBuf {
        utils::data_root().join(&self.database_file)
    }
}

pub struct ConfigStore {
    path: PathBuf,
    data: AppConfig,
}

impl ConfigStore {
    pub fn load() -> Self {
        Self::load_from(utils::config_path())
    }

    pub fn load_from(path: PathBuf) -> Self {
        let data = match read_config(&path) {
            Ok(config) => config,
            Err(err) => {
                warn!(path = %path.display(), "falling back to default config: {err}");
                AppConfig::default()
            }
        };
        Self {
            path,
            data: data.with_env_overrides(),
        }
    }

    pub fn read(&self) -> AppConfig {
        self.data.clone()
    }

    pub fn update<F>(&mut self, transform: F) -> Result<AppConfig, ConfigError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut next = self.data.clone();
        transform(&mut next);
        write_config(&self.path, &next)?;
        self.data = next;
        Ok(self.data.clone())
    }
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn write_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(config)?;
    fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ConfigStore::load_from(dir.path().join("config.json"));
        let config = store.read();
        assert_eq!(config.default_center, DEFAULT_CENTER);
        assert_eq!(config.cities.len(), 6);
        assert_eq!(config.categories.len(), 13);
        assert_eq!(config.max_radius_km, 50.0);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"store": "sqlite", "max_radius_km": 25.0}"#).unwrap();
        let config = ConfigStore::load_from(path).read();
        assert_eq!(config.store, StoreKind::Sqlite);
        assert_eq!(config.max_radius_km, 25.0);
        assert_eq!(config.events_file, "events.json");
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        let config = ConfigStore::load_from(path).read();
        assert_eq!(config.store, StoreKind::Json);
    }

    #[test]
    fn update_persists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.json");
        let mut store = ConfigStore::load_from(path.clone());
        store
            .update(|config| config.default_max_price = Some(120.0))
            .expect("update");
        let reloaded = ConfigStore::load_from(path).read();
        assert_eq!(reloaded.default_max_price, Some(120.0));
    }

    #[test]
    fn timezone_and_city_lookup() {
        let mut config = AppConfig::default();
        assert!(config.tz().is_ok());
        assert!(config.local_now().is_ok());
        assert_eq!(
            config.city("mary").map(City::coordinates),
            Some(Coordinates::new(37.6005, 61.8302))
        );
        assert!(config.city("Türkmenabat").is_some());
        assert_eq!(
            config.city(" TÜRKMENABAT ").map(|c| c.name.as_str()),
            Some("Türkmenabat")
        );
        assert!(config.city("Atlantis").is_none());

        config.timezone = "Mars/Olympus_Mons".to_string();
        assert!(matches!(config.tz(), Err(ConfigError::Timezone(_))));
    }
}
