//! A/B comparison of aggregated metrics.
//!
//! Deltas are signed so that a positive number is always an improvement of the comparison
//! deployment over the baseline: lower is better for every timing audit, higher is better
//! for the performance score.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Result, bail};
use tracing::{info, warn};

use crate::model::{
    AggregatedSiteMetric, AuditDelta, ComparisonDocument, ConsoleError, DiffRecord, FormFactor,
};
use crate::report::PERFORMANCE_METRIC;
use crate::store::MetricStore;
use crate::util::{now_utc_string, read_lines_file, round2};


pub const ROOT_PATH: &str = "/";

/// Relative paths to compare, normalized to start with `/`. The root path is always
/// compared separately, so it is dropped here.
pub fn load_paths(file: &Path) -> Result<Vec<String>> {
    Ok(normalize_paths(read_lines_file(file)?))
}

pub fn normalize_paths(lines: Vec<String>) -> Vec<String> {
    let mut paths: Vec<String> = Vec::with_capacity(lines.len());
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let path = if line.starts_with('/') {
            line.to_string()
        } else {
            format!("/{line}")
        };
        if path == ROOT_PATH || paths.contains(&path) {
            continue;
        }
        paths.push(path);
    }
    paths
}

pub fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

pub fn percent_delta(audit: &str, baseline: f64, comparison: f64) -> f64 {
    let mean = (baseline + comparison) / 2.0;
    if mean == 0.0 {
        return 0.0;
    }
    let delta = (baseline - comparison) / mean * 100.0;
    let delta = if audit == PERFORMANCE_METRIC { -delta } else { delta };
    round2(delta)
}

/// Comparison-side errors whose description never appeared on the baseline.
pub fn new_errors(baseline: &[ConsoleError], comparison: &[ConsoleError]) -> Vec<ConsoleError> {
    comparison
        .iter()
        .filter(|error| {
            !baseline
                .iter()
                .any(|known| known.description == error.description)
        })
        .cloned()
        .collect()
}

pub fn diff_metrics(
    path: &str,
    baseline: &AggregatedSiteMetric,
    comparison: &AggregatedSiteMetric,
    warnings: &mut Vec<String>,
) -> DiffRecord {
    let mut audits = BTreeMap::new();

    for (audit, &previous) in &baseline.metrics {
        let Some(&current) = comparison.metrics.get(audit) else {
            warnings.push(format!(
                "{audit} missing from {} ({})",
                comparison.url, comparison.form_factor
            ));
            continue;
        };
        audits.insert(
            audit.clone(),
            AuditDelta {
                previous,
                current,
                delta_percent: percent_delta(audit, previous, current),
                unit: baseline.units.get(audit).cloned(),
            },
        );
    }

    for audit in comparison.metrics.keys() {
        if !baseline.metrics.contains_key(audit) {
            warnings.push(format!(
                "{audit} missing from {} ({})",
                baseline.url, baseline.form_factor
            ));
        }
    }

    DiffRecord {
        path: path.to_string(),
        form_factor: baseline.form_factor,
        baseline_url: baseline.url.clone(),
        comparison_url: comparison.url.clone(),
        audits,
        new_errors: new_errors(&baseline.errors, &comparison.errors),
    }
}

/// Looks up a record, tolerating the trailing slash Lighthouse adds to bare origins.
fn find_metric(
    store: &MetricStore,
    url: &str,
    form_factor: FormFactor,
) -> Result<AggregatedSiteMetric> {
    let trimmed = url.trim_end_matches('/');
    let candidates = [url.to_string(), trimmed.to_string(), format!("{trimmed}/")];

    for candidate in &candidates {
        if let Some(metric) = store.get(candidate, form_factor)? {
            return Ok(metric);
        }
    }

    bail!("no aggregated metrics for {url} ({form_factor}); run the audit and summarize first")
}

/// Diffs the root path plus every extra path for each form factor. A missing baseline
/// or comparison record fails the whole comparison.
pub fn diff(
    store: &MetricStore,
    baseline_url: &str,
    comparison_url: &str,
    paths: &[String],
    form_factors: &[FormFactor],
) -> Result<ComparisonDocument> {
    let mut all_paths = vec![ROOT_PATH.to_string()];
    all_paths.extend(paths.iter().filter(|path| *path != ROOT_PATH).cloned());

    let mut records = Vec::new();
    let mut warnings = Vec::new();

    for path in &all_paths {
        for &form_factor in form_factors {
            let baseline = find_metric(store, &join_url(baseline_url, path), form_factor)?;
            let comparison = find_metric(store, &join_url(comparison_url, path), form_factor)?;
            let record = diff_metrics(path, &baseline, &comparison, &mut warnings);

            if let Some(performance) = record.audits.get(PERFORMANCE_METRIC) {
                info!(
                    path = %path,
                    form_factor = %form_factor,
                    previous = performance.previous,
                    current = performance.current,
                    delta_percent = performance.delta_percent,
                    new_errors = record.new_errors.len(),
                    "compared path"
                );
            }
            records.push(record);
        }
    }

    for warning in &warnings {
        warn!(warning = %warning, "incomplete audit comparison");
    }

    Ok(ComparisonDocument {
        document_version: 1,
        generated_at: now_utc_string(),
        baseline_url: baseline_url.to_string(),
        comparison_url: comparison_url.to_string(),
        records,
        warnings,
    })
}
