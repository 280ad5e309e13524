use anyhow::{Result, bail};
use tracing::{info, warn};

use crate::cli::AbBatchArgs;
use crate::commands::batch::{Stores, run_audits, summarize_after_run};
use crate::commands::diff::write_comparison;
use crate::config::BatchConfig;
use crate::diff::{ROOT_PATH, join_url, load_paths};

pub fn run(args: AbBatchArgs, verbose: bool) -> Result<()> {
    let config = BatchConfig::from_ab_args(&args, verbose)?;
    let Some(target) = config.ab.clone() else {
        bail!("ab-batch requires a baseline and a comparison url");
    };

    let paths = match &target.paths_file {
        Some(file) => load_paths(file)?,
        None => Vec::new(),
    };

    let stores = Stores::open(&config.store, config.max_attempts)?;
    if config.clean {
        stores.clean(&config)?;
    }

    let mut urls = Vec::with_capacity(2 * (paths.len() + 1));
    for base in [&target.baseline_url, &target.comparison_url] {
        urls.push(join_url(base, ROOT_PATH));
        urls.extend(paths.iter().map(|path| join_url(base, path)));
    }
    let enqueued = stores.enqueue_all(&urls, &config.form_factors)?;
    info!(
        baseline = %target.baseline_url,
        comparison = %target.comparison_url,
        paths = paths.len(),
        work_items = enqueued,
        "queued A/B sites"
    );

    let outcome = run_audits(&config, &stores.queue)?;
    let summary = summarize_after_run(
        &outcome,
        &config.output,
        config.times,
        &config.store,
        &stores.metrics,
    )?;
    if summary.is_none() {
        warn!("skipping comparison, no deployment produced a report");
        return Ok(());
    }

    write_comparison(&stores.metrics, &target, &paths, &config.form_factors)
}
