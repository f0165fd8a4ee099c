//! Filesystem locations and restaurant display settings.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Environment override for the data directory.
pub const DATA_DIR_ENV: &str = "HADEEZ_POS_DATA_DIR";

pub const APP_IDENTIFIER: &str = "com.hadeez.pos";

/// Maximum number of rolled log files kept on disk.
pub const MAX_LOG_FILES: usize = 14;

/// Prefix of the daily rolled log files (`pos.YYYY-MM-DD`).
pub const LOG_FILE_PREFIX: &str = "pos";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl AppPaths {
    /// Resolve from `HADEEZ_POS_DATA_DIR`, falling back to the platform
    /// local data directory.
    pub fn resolve() -> Self {
        match std::env::var_os(DATA_DIR_ENV) {
            Some(dir) if !dir.is_empty() => Self::from_data_dir(PathBuf::from(dir)),
            _ => Self::from_data_dir(platform_data_dir().join(APP_IDENTIFIER)),
        }
    }

    pub fn from_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let log_dir = data_dir.join("logs");
        Self { data_dir, log_dir }
    }
}

fn platform_data_dir() -> PathBuf {
    std::env::var("LOCALAPPDATA")
        .or_else(|_| std::env::var("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            #[cfg(target_os = "windows")]
            {
                PathBuf::from(std::env::var("USERPROFILE").unwrap_or_else(|_| ".".into()))
                    .join("AppData")
                    .join("Local")
            }
            #[cfg(not(target_os = "windows"))]
            {
                PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                    .join(".local")
                    .join("share")
            }
        })
}

/// Delete rolled log files beyond the newest `MAX_LOG_FILES`.
///
/// Returns how many files were removed.
pub fn prune_old_logs(log_dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return 0;
    };

    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let name = path.file_name()?.to_str()?;
            if !path.is_file() || !name.starts_with(&format!("{LOG_FILE_PREFIX}.")) {
                return None;
            }
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(std::time::UNIX_EPOCH);
            Some((path, modified))
        })
        .collect();

    // Newest first; daily names sort chronologically when mtimes tie.
    log_files.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));

    let mut removed = 0;
    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to prune log file {}: {e}", path.display()),
        }
    }
    removed
}

// ---------------------------------------------------------------------------
// Restaurant settings
// ---------------------------------------------------------------------------

/// Display fields read from the `settings` table for receipts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantSettings {
    pub restaurant_name: String,
    pub restaurant_address: String,
    pub restaurant_phone: String,
    pub currency: String,
    pub receipt_header: String,
    pub receipt_footer: String,
    pub tax_enabled: bool,
    pub tax_percent: f64,
}

impl Default for RestaurantSettings {
    fn default() -> Self {
        Self {
            restaurant_name: "Hadeez Restaurant".into(),
            restaurant_address: String::new(),
            restaurant_phone: String::new(),
            currency: "Rs.".into(),
            receipt_header: String::new(),
            receipt_footer: String::new(),
            tax_enabled: false,
            tax_percent: 0.0,
        }
    }
}

impl RestaurantSettings {
    /// Best-effort load. Missing keys keep their defaults and a store
    /// failure is logged, never returned.
    pub fn load(conn: &Connection) -> Self {
        match read_settings(conn) {
            Ok(map) => Self::from_map(&map),
            Err(e) => {
                warn!("Failed to read settings, using defaults: {e}");
                Self::default()
            }
        }
    }

    fn from_map(map: &HashMap<String, String>) -> Self {
        let defaults = Self::default();
        let text = |key: &str, fallback: String| map.get(key).cloned().unwrap_or(fallback);
        let name = text("restaurant_name", defaults.restaurant_name);
        let currency = text("currency", defaults.currency);
        Self {
            restaurant_name: if name.trim().is_empty() {
                Self::default().restaurant_name
            } else {
                name
            },
            restaurant_address: text("restaurant_address", defaults.restaurant_address),
            restaurant_phone: text("restaurant_phone", defaults.restaurant_phone),
            currency: if currency.trim().is_empty() {
                Self::default().currency
            } else {
                currency
            },
            receipt_header: text("receipt_header", defaults.receipt_header),
            receipt_footer: text("receipt_footer", defaults.receipt_footer),
            tax_enabled: map.get("tax_enabled").is_some_and(|v| v == "1" || v == "true"),
            tax_percent: map
                .get("tax_percent")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0.0),
        }
    }
}

fn read_settings(conn: &Connection) -> rusqlite::Result<HashMap<String, String>> {
    let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        ))
    })?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn test_paths_from_data_dir() {
        let paths = AppPaths::from_data_dir("/tmp/hadeez");
        assert_eq!(paths.data_dir, PathBuf::from("/tmp/hadeez"));
        assert_eq!(paths.log_dir, PathBuf::from("/tmp/hadeez/logs"));
    }

    #[test]
    fn test_resolved_paths_are_stable() {
        let a = AppPaths::resolve();
        let b = AppPaths::resolve();
        assert_eq!(a, b);
        assert!(a.log_dir.starts_with(&a.data_dir));
    }

    #[test]
    fn test_prune_keeps_newest_log_files() {
        let dir = tempfile::tempdir().unwrap();
        for day in 1..=20 {
            fs::write(dir.path().join(format!("pos.2026-01-{day:02}")), "x").unwrap();
        }
        fs::write(dir.path().join("pos.db"), "not a log").unwrap();
        fs::write(dir.path().join("other.txt"), "keep").unwrap();

        // pos.db shares the prefix, so 21 candidates.
        assert_eq!(prune_old_logs(dir.path()), 7);
        let remaining = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(remaining, MAX_LOG_FILES + 1);
        assert!(dir.path().join("other.txt").exists());
    }

    #[test]
    fn test_prune_missing_dir_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(prune_old_logs(&dir.path().join("nope")), 0);
    }

    #[test]
    fn test_settings_load_defaults_and_overrides() {
        let db = db::test_db();
        let conn = db.conn.lock().unwrap();
        let settings = RestaurantSettings::load(&conn);
        assert_eq!(settings.restaurant_name, "Hadeez Restaurant");
        assert_eq!(settings.currency, "Rs.");
        assert!(!settings.tax_enabled);

        db::set_setting(&conn, "restaurant_name", "Karachi Grill").unwrap();
        db::set_setting(&conn, "currency", "  ").unwrap();
        db::set_setting(&conn, "tax_enabled", "1").unwrap();
        db::set_setting(&conn, "tax_percent", "16").unwrap();
        let settings = RestaurantSettings::load(&conn);
        assert_eq!(settings.restaurant_name, "Karachi Grill");
        assert_eq!(settings.currency, "Rs.");
        assert!(settings.tax_enabled);
        assert_eq!(settings.tax_percent, 16.0);
    }

    #[test]
    fn test_settings_load_survives_missing_table() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(RestaurantSettings::load(&conn), RestaurantSettings::default());
    }
}
