//! Connection bootstrap for SQLite sessions.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas from `StoreConfig`.
//! - Apply caller-supplied migrations before returning a usable session.
//!
//! # Invariants
//! - Returned sessions have migrations fully applied.
//! - Returned sessions have no registered schemas yet.

use super::migrations::{apply_migrations, Migration};
use super::session::Session;
use super::DbResult;
use crate::config::StoreConfig;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::Instant;

/// Opens a SQLite database file with default settings.
pub fn open_session(path: impl AsRef<Path>, migrations: &[Migration]) -> DbResult<Session> {
    open_session_with_config(path, &StoreConfig::default(), migrations)
}

/// Opens a SQLite database file and applies all pending migrations.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub fn open_session_with_config(
    path: impl AsRef<Path>,
    config: &StoreConfig,
    migrations: &[Migration],
) -> DbResult<Session> {
    open_with("file", || Connection::open(path), config, migrations)
}

/// Opens an in-memory SQLite database with default settings.
pub fn open_session_in_memory(migrations: &[Migration]) -> DbResult<Session> {
    open_with(
        "memory",
        Connection::open_in_memory,
        &StoreConfig::default(),
        migrations,
    )
}

fn open_with(
    mode: &str,
    open: impl FnOnce() -> rusqlite::Result<Connection>,
    config: &StoreConfig,
    migrations: &[Migration],
) -> DbResult<Session> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let mut conn = match open() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn, config, migrations) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={} migrations={} duration_ms={}",
                mode,
                migrations.len(),
                started_at.elapsed().as_millis()
            );
            Ok(Session::new(conn))
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_bootstrap_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(
    conn: &mut Connection,
    config: &StoreConfig,
    migrations: &[Migration],
) -> DbResult<()> {
    let foreign_keys = if config.foreign_keys { "ON" } else { "OFF" };
    conn.execute_batch(&format!("PRAGMA foreign_keys = {foreign_keys};"))?;
    conn.busy_timeout(config.busy_timeout())?;
    apply_migrations(conn, migrations)?;
    Ok(())
}
