use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::model::{FormFactor, SiteStatus, SiteWorkItem};
use crate::util::now_utc_string;

/// Persisted work queue of `(url, form_factor)` audit targets.
///
/// The connection sits behind a mutex so concurrent runner workers serialize their point
/// updates; every method holds the lock for a single statement.
pub struct SiteQueue {
    connection: Mutex<Connection>,
    max_attempts: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_flight: usize,
    pub finished: usize,
    pub errored_retryable: usize,
    pub errored_terminal: usize,
    pub with_errors: usize,
}

type SiteRow = (String, String, String, i64, i64);

const SITE_COLUMNS: &str = "url, form_factor, status, has_error, attempts";

impl SiteQueue {
    pub fn new(connection: Connection, max_attempts: u32) -> Self {
        Self {
            connection: Mutex::new(connection),
            max_attempts: max_attempts.max(1),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|_| anyhow!("site queue connection lock poisoned"))
    }

    /// Upserts a site. Errored rows go back to `pending`; finished rows stay finished so
    /// a restarted batch resumes instead of re-auditing.
    pub fn enqueue(&self, url: &str, form_factor: FormFactor) -> Result<()> {
        let connection = self.lock()?;
        connection
            .execute(
                "
                INSERT INTO sites(url, form_factor, status, has_error, attempts, updated_at)
                VALUES(?1, ?2, 'pending', 0, 0, ?3)
                ON CONFLICT(url, form_factor) DO UPDATE SET
                  has_error=0,
                  attempts=0,
                  status=CASE
                    WHEN sites.status IN ('errored_retryable', 'errored_terminal') THEN 'pending'
                    ELSE sites.status
                  END,
                  updated_at=excluded.updated_at
                ",
                params![url, form_factor.as_str(), now_utc_string()],
            )
            .with_context(|| format!("failed to enqueue {url} ({form_factor})"))?;
        Ok(())
    }

    pub fn mark_in_flight(&self, url: &str, form_factor: FormFactor) -> Result<()> {
        self.set_status(url, form_factor, SiteStatus::InFlight)
    }

    pub fn mark_finished(&self, url: &str, form_factor: FormFactor) -> Result<()> {
        self.set_status(url, form_factor, SiteStatus::Finished)
    }

    /// Puts an interrupted site back into the pending set without touching its error state.
    pub fn requeue(&self, url: &str, form_factor: FormFactor) -> Result<()> {
        self.set_status(url, form_factor, SiteStatus::Pending)
    }

    /// Records a failed attempt. The row becomes terminal once `max_attempts` is reached.
    pub fn mark_errored(&self, url: &str, form_factor: FormFactor) -> Result<()> {
        let connection = self.lock()?;
        connection
            .execute(
                "
                UPDATE sites SET
                  has_error=1,
                  attempts=attempts + 1,
                  status=CASE
                    WHEN attempts + 1 >= ?3 THEN 'errored_terminal'
                    ELSE 'errored_retryable'
                  END,
                  updated_at=?4
                WHERE url=?1 AND form_factor=?2
                ",
                params![
                    url,
                    form_factor.as_str(),
                    i64::from(self.max_attempts),
                    now_utc_string()
                ],
            )
            .with_context(|| format!("failed to mark {url} ({form_factor}) as errored"))?;
        Ok(())
    }

    fn set_status(&self, url: &str, form_factor: FormFactor, status: SiteStatus) -> Result<()> {
        let connection = self.lock()?;
        connection
            .execute(
                "UPDATE sites SET status=?3, updated_at=?4 WHERE url=?1 AND form_factor=?2",
                params![url, form_factor.as_str(), status.as_str(), now_utc_string()],
            )
            .with_context(|| {
                format!(
                    "failed to set status {} for {url} ({form_factor})",
                    status.as_str()
                )
            })?;
        Ok(())
    }

    /// Items still to audit, in insertion order. `in_flight` rows are leftovers of a
    /// process that died mid-site.
    pub fn pending(&self) -> Result<Vec<SiteWorkItem>> {
        let connection = self.lock()?;
        let sql = format!(
            "SELECT {SITE_COLUMNS} FROM sites
             WHERE status IN ('pending', 'in_flight', 'errored_retryable')
             ORDER BY seq"
        );
        let mut statement = connection
            .prepare(&sql)
            .context("failed to prepare pending sites query")?;
        let rows = statement
            .query_map([], read_site_row)
            .context("failed to query pending sites")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to read pending sites")?;

        rows.into_iter().map(site_from_row).collect()
    }

    pub fn get(&self, url: &str, form_factor: FormFactor) -> Result<Option<SiteWorkItem>> {
        let connection = self.lock()?;
        let sql = format!("SELECT {SITE_COLUMNS} FROM sites WHERE url=?1 AND form_factor=?2");
        let row = connection
            .query_row(&sql, params![url, form_factor.as_str()], read_site_row)
            .optional()
            .with_context(|| format!("failed to load {url} ({form_factor})"))?;

        row.map(site_from_row).transpose()
    }

    pub fn counts(&self) -> Result<StatusCounts> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare("SELECT status, COUNT(*), SUM(has_error) FROM sites GROUP BY status")
            .context("failed to prepare site status counts")?;
        let rows = statement
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                ))
            })
            .context("failed to query site status counts")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to read site status counts")?;

        let mut counts = StatusCounts::default();
        for (status, count, with_errors) in rows {
            let count = usize::try_from(count).unwrap_or_default();
            counts.with_errors += usize::try_from(with_errors.unwrap_or(0)).unwrap_or_default();
            match status.parse::<SiteStatus>()? {
                SiteStatus::Pending => counts.pending += count,
                SiteStatus::InFlight => counts.in_flight += count,
                SiteStatus::Finished => counts.finished += count,
                SiteStatus::ErroredRetryable => counts.errored_retryable += count,
                SiteStatus::ErroredTerminal => counts.errored_terminal += count,
            }
        }

        Ok(counts)
    }

    pub fn reset(&self) -> Result<usize> {
        let connection = self.lock()?;
        let removed = connection
            .execute("DELETE FROM sites", [])
            .context("failed to reset site queue")?;
        Ok(removed)
    }
}

fn read_site_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SiteRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn site_from_row((url, form_factor, status, has_error, attempts): SiteRow) -> Result<SiteWorkItem> {
    Ok(SiteWorkItem {
        form_factor: form_factor
            .parse()
            .with_context(|| format!("invalid form factor stored for {url}"))?,
        status: status
            .parse()
            .with_context(|| format!("invalid status stored for {url}"))?,
        has_error: has_error != 0,
        attempts: u32::try_from(attempts).unwrap_or_default(),
        url,
    })
}
