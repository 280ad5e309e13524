use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::util::{ensure_directory, now_utc_string};

mod metric_store;
mod site_queue;
#[cfg(test)]
mod tests;

pub use metric_store::MetricStore;
pub use site_queue::SiteQueue;

const DB_SCHEMA_VERSION: &str = "0.2.0";

pub fn open_database(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        ensure_directory(parent)?;
    }

    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    configure_connection(&connection)?;
    ensure_schema(&connection)?;
    Ok(connection)
}

#[cfg(test)]
pub(crate) fn open_in_memory() -> Result<Connection> {
    let connection = Connection::open_in_memory().context("failed to open in-memory database")?;
    ensure_schema(&connection)?;
    Ok(connection)
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    connection
        .busy_timeout(std::time::Duration::from_secs(5))
        .context("failed to set busy_timeout")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS metadata (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sites (
              seq INTEGER PRIMARY KEY AUTOINCREMENT,
              url TEXT NOT NULL,
              form_factor TEXT NOT NULL,
              status TEXT NOT NULL DEFAULT 'pending',
              has_error INTEGER NOT NULL DEFAULT 0,
              attempts INTEGER NOT NULL DEFAULT 0,
              updated_at TEXT NOT NULL,
              UNIQUE(url, form_factor)
            );

            CREATE TABLE IF NOT EXISTS metrics (
              url TEXT NOT NULL,
              form_factor TEXT NOT NULL,
              metrics_json TEXT NOT NULL,
              units_json TEXT NOT NULL DEFAULT '{}',
              errors_json TEXT NOT NULL,
              run_count INTEGER NOT NULL,
              report_count INTEGER NOT NULL,
              updated_at TEXT NOT NULL,
              PRIMARY KEY (url, form_factor)
            );

            CREATE INDEX IF NOT EXISTS idx_sites_status ON sites(status);
            ",
        )
        .context("failed to initialize queue and metric schema")?;

    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now_utc_string()],
    )?;

    Ok(())
}
