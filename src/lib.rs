//! Hadeez POS service layer.
//!
//! Order completion, stock reconciliation and the credit ledger over a
//! local SQLite store. A desktop shell calls these functions with the
//! signed-in [`staff::Actor`]; nothing here reads ambient session state.

use std::path::Path;

use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod config;
pub mod credit;
pub mod db;
pub mod error;
pub mod models;
pub mod orders;
pub mod pricing;
pub mod receipt;
pub mod reports;
pub mod staff;
pub mod stock;

pub use config::AppPaths;
pub use db::DbState;
pub use error::{PosError, PosResult};

const DEFAULT_LOG_FILTER: &str = "info,hadeez_pos_lib=debug";

/// Flushes the rolling log file when dropped. Hold it for the life of the
/// process.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _worker: Option<WorkerGuard>,
}

/// Install console + daily rolling file logging under `log_dir`.
///
/// Safe to call more than once: later calls leave the existing subscriber
/// in place and return an inert guard.
pub fn init_logging(log_dir: &Path) -> LoggingGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    // Prune old log files before setting up the appender
    config::prune_old_logs(log_dir);
    if let Err(e) = std::fs::create_dir_all(log_dir) {
        eprintln!("could not create log dir {}: {e}", log_dir.display());
    }

    let file_appender = tracing_appender::rolling::daily(log_dir, config::LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);

    match tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
    {
        Ok(()) => LoggingGuard {
            _worker: Some(guard),
        },
        Err(_) => LoggingGuard { _worker: None },
    }
}

/// Start logging and open the database at the resolved locations.
pub fn start(paths: &AppPaths) -> PosResult<(DbState, LoggingGuard)> {
    let guard = init_logging(&paths.log_dir);
    info!("Starting Hadeez POS v{}", env!("CARGO_PKG_VERSION"));

    let db = db::init(&paths.data_dir).map_err(|e| {
        warn!("Database initialization failed: {e}");
        e
    })?;
    Ok((db, guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        let _first = init_logging(&log_dir);
        let _second = init_logging(&log_dir);
        assert!(log_dir.is_dir());
    }

    #[test]
    fn test_start_opens_database() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::from_data_dir(dir.path());
        let (db, _guard) = start(&paths).unwrap();
        assert!(db.db_path.ends_with("pos.db"));
        let conn = db.conn.lock().unwrap();
        assert_eq!(
            db::get_setting(&conn, "currency").as_deref(),
            Some("Rs.")
        );
    }
}
