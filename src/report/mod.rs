//! Raw Lighthouse report documents on disk.
//!
//! Each trial leaves one JSON report in the output directory. This module reads them back
//! into [`ReportSummary`] values holding just the metrics the aggregation cares about.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::model::{ConsoleError, FormFactor};

pub mod aggregate;
#[cfg(test)]
pub(crate) mod fixtures;
#[cfg(test)]
mod tests;

pub const PERFORMANCE_METRIC: &str = "performance";

pub const TRACKED_AUDITS: [&str; 6] = [
    "cumulative-layout-shift",
    "first-contentful-paint",
    "interactive",
    "largest-contentful-paint",
    "speed-index",
    "total-blocking-time",
];

const CONSOLE_ERRORS_AUDIT: &str = "errors-in-console";
const REPORT_EXTENSION: &str = "json";

/// Normalized view of one trial's report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSummary {
    pub path: PathBuf,
    pub url: String,
    pub form_factor: FormFactor,
    pub metrics: BTreeMap<String, f64>,
    pub units: BTreeMap<String, String>,
    pub errors: Vec<ConsoleError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LighthouseReport {
    requested_url: Option<String>,
    final_url: Option<String>,
    config_settings: ConfigSettings,
    categories: Categories,
    #[serde(default)]
    audits: HashMap<String, AuditResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigSettings {
    form_factor: FormFactor,
}

#[derive(Debug, Deserialize)]
struct Categories {
    performance: Category,
}

#[derive(Debug, Deserialize)]
struct Category {
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuditResult {
    numeric_value: Option<f64>,
    numeric_unit: Option<String>,
    details: Option<AuditDetails>,
}

#[derive(Debug, Deserialize)]
struct AuditDetails {
    #[serde(default)]
    items: Vec<ConsoleItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConsoleItem {
    description: Option<String>,
    source: Option<String>,
    url: Option<String>,
    source_location: Option<SourceLocation>,
}

#[derive(Debug, Deserialize)]
struct SourceLocation {
    url: Option<String>,
}

pub fn parse_report(data: &[u8], path: &Path) -> Result<ReportSummary> {
    let report: LighthouseReport = serde_json::from_slice(data)
        .with_context(|| format!("failed to parse report {}", path.display()))?;

    let url = report
        .requested_url
        .or(report.final_url)
        .with_context(|| format!("report has no requested URL: {}", path.display()))?;

    let mut metrics = BTreeMap::new();
    let mut units = BTreeMap::new();
    metrics.insert(
        PERFORMANCE_METRIC.to_string(),
        report.categories.performance.score.unwrap_or(0.0),
    );

    for audit in TRACKED_AUDITS {
        let result = report
            .audits
            .get(audit)
            .with_context(|| format!("report {} is missing audit {audit}", path.display()))?;
        // Lighthouse drops numericValue when the audit itself errored.
        metrics.insert(audit.to_string(), result.numeric_value.unwrap_or(0.0));
        if let Some(unit) = &result.numeric_unit {
            units.insert(audit.to_string(), unit.clone());
        }
    }

    let errors = report
        .audits
        .get(CONSOLE_ERRORS_AUDIT)
        .and_then(|audit| audit.details.as_ref())
        .map(|details| console_errors(&details.items))
        .unwrap_or_default();

    Ok(ReportSummary {
        path: path.to_path_buf(),
        url,
        form_factor: report.config_settings.form_factor,
        metrics,
        units,
        errors,
    })
}

fn console_errors(items: &[ConsoleItem]) -> Vec<ConsoleError> {
    let mut errors: Vec<ConsoleError> = Vec::new();
    for item in items {
        let Some(description) = item.description.as_deref() else {
            continue;
        };
        if errors.iter().any(|error| error.description == description) {
            continue;
        }
        errors.push(ConsoleError {
            description: description.to_string(),
            source: item.source.clone(),
            url: item
                .url
                .clone()
                .or_else(|| item.source_location.as_ref().and_then(|loc| loc.url.clone())),
        });
    }
    errors
}

pub fn load_report(path: &Path) -> Result<ReportSummary> {
    let data =
        fs::read(path).with_context(|| format!("failed to read report {}", path.display()))?;
    parse_report(&data, path)
}

/// Report files in `dir`, sorted by name. Temp files from in-progress writes are skipped.
pub fn discover_reports(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut reports = Vec::new();

    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        let is_report = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(REPORT_EXTENSION))
            .unwrap_or(false);

        if is_report {
            reports.push(path);
        }
    }

    reports.sort();
    Ok(reports)
}

/// Parses every report in `dir`. A single unreadable report fails the whole load.
pub fn load_all(dir: &Path) -> Result<Vec<ReportSummary>> {
    let paths = discover_reports(dir)?;
    let mut reports = Vec::with_capacity(paths.len());

    for path in paths {
        debug!(path = %path.display(), "analyzing report");
        reports.push(load_report(&path)?);
    }

    Ok(reports)
}

/// Removes reports left behind for one site by an earlier, incomplete attempt.
///
/// Only files named with `prefix` are parsed; the parsed URL and form factor must also
/// match, since different URLs can share a slug.
pub fn discard_site_reports(
    dir: &Path,
    prefix: &str,
    url: &str,
    form_factor: FormFactor,
) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut removed = 0usize;
    for path in discover_reports(dir)? {
        let is_candidate = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(prefix));
        if !is_candidate {
            continue;
        }
        let report = load_report(&path)?;
        if !urls_match(&report.url, url) || report.form_factor != form_factor {
            continue;
        }
        fs::remove_file(&path)
            .with_context(|| format!("failed to remove stale report {}", path.display()))?;
        removed += 1;
    }

    if removed > 0 {
        info!(
            url = %url,
            form_factor = %form_factor,
            removed,
            "discarded reports from an incomplete attempt"
        );
    }

    Ok(removed)
}

/// Lighthouse may normalize `https://host` to `https://host/`.
pub fn urls_match(left: &str, right: &str) -> bool {
    left.trim_end_matches('/') == right.trim_end_matches('/')
}

/// Deletes every report (and stray temp file) in `dir`.
pub fn purge_reports(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut removed = 0usize;
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !(name.ends_with(".json") || name.ends_with(".json.tmp")) {
            continue;
        }
        fs::remove_file(&path)
            .with_context(|| format!("failed to remove report {}", path.display()))?;
        removed += 1;
    }

    Ok(removed)
}
