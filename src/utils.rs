use chrono::NaiveDateTime;
use dirs::data_dir;
use once_cell::sync::Lazy;
use std::{fs, path::Path, path::PathBuf};
use tracing::warn;

static DATA_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    let root = match std::env::var_os("SHARKIYA_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => data_dir()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
            .join("sharkiya"),
    };
    if let Err(err) = fs::create_dir_all(&root) {
        warn!("failed to create data root {:?}: {err}", root);
    }
    root
});

pub fn data_root() -> PathBuf {
    DATA_ROOT.clone()
}

pub fn config_path() -> PathBuf {
    data_root().join("config.json")
}

pub fn session_path() -> PathBuf {
    data_root().join("session.json")
}

pub fn ensure_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            warn!("failed to create parent {:?}: {err}", parent);
        }
    }
}

pub fn format_price(price: f64) -> String {
    if price == 0.0 {
        "Free".to_string()
    } else {
        format!("{} TMT", price.trunc() as i64)
    }
}

pub fn format_when(start: &NaiveDateTime) -> String {
    start.format("%b %d, %Y • %I:%M %p").to_string()
}

pub fn format_distance(distance_km: Option<f64>) -> Option<String> {
    distance_km.map(|km| format!("{km:.1} km"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn prices_render_like_the_listing() {
        assert_eq!(format_price(0.0), "Free");
        assert_eq!(format_price(150.0), "150 TMT");
        assert_eq!(format_price(49.99), "49 TMT");
    }

    #[test]
    fn start_and_distance_render() {
        let start = NaiveDate::from_ymd_opt(2025, 5, 3)
            .unwrap()
            .and_hms_opt(19, 5, 0)
            .unwrap();
        assert_eq!(format_when(&start), "May 03, 2025 • 07:05 PM");
        assert_eq!(format_distance(Some(1.26)), Some("1.3 km".to_string()));
        assert_eq!(format_distance(None), None);
    }

    #[test]
    fn ensure_parent_creates_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("a").join("b").join("events.json");
        ensure_parent(&file);
        assert!(file.parent().unwrap().is_dir());
    }
}
