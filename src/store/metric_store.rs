use std::collections::BTreeMap;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

use crate::model::{AggregatedSiteMetric, ConsoleError, FormFactor};
use crate::util::now_utc_string;

type MetricRow = (String, String, String, String, String, i64, i64);

const METRIC_COLUMNS: &str =
    "url, form_factor, metrics_json, units_json, errors_json, run_count, report_count";

pub struct MetricStore {
    connection: Connection,
}

impl MetricStore {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    pub fn upsert(&self, metric: &AggregatedSiteMetric) -> Result<()> {
        let metrics_json = serde_json::to_string(&metric.metrics)
            .with_context(|| format!("failed to encode metrics for {}", metric.url))?;
        let units_json = serde_json::to_string(&metric.units)
            .with_context(|| format!("failed to encode units for {}", metric.url))?;
        let errors_json = serde_json::to_string(&metric.errors)
            .with_context(|| format!("failed to encode errors for {}", metric.url))?;

        self.connection
            .execute(
                "
                INSERT INTO metrics(url, form_factor, metrics_json, units_json, errors_json, run_count, report_count, updated_at)
                VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(url, form_factor) DO UPDATE SET
                  metrics_json=excluded.metrics_json,
                  units_json=excluded.units_json,
                  errors_json=excluded.errors_json,
                  run_count=excluded.run_count,
                  report_count=excluded.report_count,
                  updated_at=excluded.updated_at
                ",
                params![
                    metric.url,
                    metric.form_factor.as_str(),
                    metrics_json,
                    units_json,
                    errors_json,
                    i64::from(metric.run_count),
                    i64::from(metric.report_count),
                    now_utc_string(),
                ],
            )
            .with_context(|| {
                format!(
                    "failed to upsert metrics for {} ({})",
                    metric.url, metric.form_factor
                )
            })?;

        Ok(())
    }

    pub fn get(&self, url: &str, form_factor: FormFactor) -> Result<Option<AggregatedSiteMetric>> {
        let sql = format!("SELECT {METRIC_COLUMNS} FROM metrics WHERE url=?1 AND form_factor=?2");
        let row = self
            .connection
            .query_row(&sql, params![url, form_factor.as_str()], read_metric_row)
            .optional()
            .with_context(|| format!("failed to load metrics for {url} ({form_factor})"))?;

        row.map(metric_from_row).transpose()
    }

    pub fn list(&self) -> Result<Vec<AggregatedSiteMetric>> {
        let sql = format!("SELECT {METRIC_COLUMNS} FROM metrics ORDER BY url, form_factor");
        let mut statement = self
            .connection
            .prepare(&sql)
            .context("failed to prepare metrics listing")?;
        let rows = statement
            .query_map([], read_metric_row)
            .context("failed to query metrics")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to read metrics")?;

        rows.into_iter().map(metric_from_row).collect()
    }

    pub fn count(&self) -> Result<i64> {
        let count = self
            .connection
            .query_row("SELECT COUNT(*) FROM metrics", [], |row| row.get(0))
            .context("failed to count metrics")?;
        Ok(count)
    }

    pub fn reset(&self) -> Result<usize> {
        let removed = self
            .connection
            .execute("DELETE FROM metrics", [])
            .context("failed to reset metric store")?;
        Ok(removed)
    }
}

fn read_metric_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MetricRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn metric_from_row(
    (url, form_factor, metrics_json, units_json, errors_json, run_count, report_count): MetricRow,
) -> Result<AggregatedSiteMetric> {
    let metrics: BTreeMap<String, f64> = serde_json::from_str(&metrics_json)
        .with_context(|| format!("failed to decode stored metrics for {url}"))?;
    let units: BTreeMap<String, String> = serde_json::from_str(&units_json)
        .with_context(|| format!("failed to decode stored units for {url}"))?;
    let errors: Vec<ConsoleError> = serde_json::from_str(&errors_json)
        .with_context(|| format!("failed to decode stored errors for {url}"))?;

    Ok(AggregatedSiteMetric {
        form_factor: form_factor
            .parse()
            .with_context(|| format!("invalid form factor stored for {url}"))?,
        metrics,
        units,
        errors,
        run_count: u32::try_from(run_count).unwrap_or_default(),
        report_count: u32::try_from(report_count).unwrap_or_default(),
        url,
    })
}
