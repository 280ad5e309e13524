use anyhow::{Result, bail};
use tracing::info;

use crate::cli::SummarizeArgs;
use crate::commands::batch::{Stores, summarize_reports};
use crate::config::StoreConfig;
use crate::report::PERFORMANCE_METRIC;

pub fn run(args: SummarizeArgs) -> Result<()> {
    if args.times == 0 {
        bail!("--times must be at least 1");
    }

    let store = StoreConfig::resolve(&args.store);
    let metrics = Stores::open_metrics(&store)?;
    let outcome = summarize_reports(&args.output, args.times, &store, &metrics)?;

    for metric in &outcome.metrics {
        info!(
            url = %metric.url,
            form_factor = %metric.form_factor,
            performance = metric.metrics.get(PERFORMANCE_METRIC).copied().unwrap_or_default(),
            reports = metric.report_count,
            errors = metric.errors.len(),
            "averaged site"
        );
    }
    Ok(())
}
