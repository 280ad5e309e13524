use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use super::{ReportSummary, load_all};
use crate::model::{
    AggregatedSiteMetric, ConsoleError, FormFactor, SummaryManifest, SummaryReportEntry,
};
use crate::store::MetricStore;
use crate::util::{now_utc_string, round2, sha256_file, utc_compact_string};

pub type SiteKey = (String, FormFactor);

/// Running totals for one `(url, form_factor)` group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteSums {
    pub sums: BTreeMap<String, f64>,
    pub units: BTreeMap<String, String>,
    pub errors: Vec<ConsoleError>,
    pub report_count: u32,
}

pub struct SummaryOutcome {
    pub metrics: Vec<AggregatedSiteMetric>,
    pub manifest: SummaryManifest,
}

pub fn reduce(reports: &[ReportSummary]) -> BTreeMap<SiteKey, SiteSums> {
    let mut grouped: BTreeMap<SiteKey, SiteSums> = BTreeMap::new();

    for report in reports {
        let group = grouped
            .entry((report.url.clone(), report.form_factor))
            .or_default();

        for (audit, value) in &report.metrics {
            *group.sums.entry(audit.clone()).or_insert(0.0) += value;
        }
        for (audit, unit) in &report.units {
            group
                .units
                .entry(audit.clone())
                .or_insert_with(|| unit.clone());
        }

        for error in &report.errors {
            if !group
                .errors
                .iter()
                .any(|known| known.description == error.description)
            {
                group.errors.push(error.clone());
            }
        }

        group.report_count += 1;
    }

    grouped
}

/// Divides every sum by the requested `run_count`, not by the number of reports found.
pub fn average(
    grouped: BTreeMap<SiteKey, SiteSums>,
    run_count: u32,
) -> Result<Vec<AggregatedSiteMetric>> {
    if run_count == 0 {
        bail!("run count must be at least 1 to average reports");
    }
    let divisor = f64::from(run_count);

    Ok(grouped
        .into_iter()
        .map(|((url, form_factor), group)| AggregatedSiteMetric {
            url,
            form_factor,
            metrics: group
                .sums
                .into_iter()
                .map(|(audit, sum)| (audit, round2(sum / divisor)))
                .collect(),
            units: group.units,
            errors: group.errors,
            run_count,
            report_count: group.report_count,
        })
        .collect())
}

/// Folds every report in `report_dir` into averaged metrics and stores them.
pub fn summarize(
    report_dir: &Path,
    run_count: u32,
    store: &MetricStore,
) -> Result<SummaryOutcome> {
    let started = Utc::now();
    let reports = load_all(report_dir)?;
    if reports.is_empty() {
        bail!("no reports found in {}", report_dir.display());
    }

    let mut entries = Vec::with_capacity(reports.len());
    for report in &reports {
        entries.push(SummaryReportEntry {
            file: report
                .path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            url: report.url.clone(),
            form_factor: report.form_factor,
            sha256: sha256_file(&report.path)?,
        });
    }

    let metrics = average(reduce(&reports), run_count)?;

    let mut warnings = Vec::new();
    for metric in &metrics {
        if metric.report_count != run_count {
            warn!(
                url = %metric.url,
                form_factor = %metric.form_factor,
                reports = metric.report_count,
                runs = run_count,
                "report count does not match requested runs"
            );
            warnings.push(format!(
                "{} ({}) has {} reports for {} requested runs",
                metric.url, metric.form_factor, metric.report_count, run_count
            ));
        }
        store.upsert(metric)?;
    }

    info!(
        reports = reports.len(),
        sites = metrics.len(),
        runs = run_count,
        "stored averaged metrics"
    );

    let manifest = SummaryManifest {
        manifest_version: 1,
        run_id: format!("summary-{}", utc_compact_string(started)),
        generated_at: now_utc_string(),
        report_directory: report_dir.display().to_string(),
        run_count,
        report_count: reports.len(),
        site_count: metrics.len(),
        reports: entries,
        warnings,
    };

    Ok(SummaryOutcome { metrics, manifest })
}
