use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::audit::{
    AuditRunner, BatchOutcome, ChromeLauncher, LighthouseCli, RunContext, RunnerOptions, StopSignal,
};
use crate::cli::BatchArgs;
use crate::config::{BatchConfig, StoreConfig};
use crate::model::FormFactor;
use crate::report::aggregate::{SummaryOutcome, summarize};
use crate::report::{discover_reports, purge_reports};
use crate::store::{MetricStore, SiteQueue, open_database};
use crate::util::{ensure_directory, utc_compact_string, write_json_pretty};

pub fn run(args: BatchArgs, verbose: bool) -> Result<()> {
    let config = BatchConfig::from_batch_args(&args, verbose)?;
    let urls = config.site_urls()?;

    let stores = Stores::open(&config.store, config.max_attempts)?;
    if config.clean {
        stores.clean(&config)?;
    }

    let enqueued = stores.enqueue_all(&urls, &config.form_factors)?;
    info!(
        sites = urls.len(),
        work_items = enqueued,
        output = %config.output.display(),
        "queued sites"
    );

    let outcome = run_audits(&config, &stores.queue)?;
    summarize_after_run(
        &outcome,
        &config.output,
        config.times,
        &config.store,
        &stores.metrics,
    )?;
    Ok(())
}

/// The queue and metric store of one cache root, each on its own connection.
pub(crate) struct Stores {
    pub queue: SiteQueue,
    pub metrics: MetricStore,
}

impl Stores {
    pub fn open(store: &StoreConfig, max_attempts: u32) -> Result<Self> {
        Ok(Self {
            queue: SiteQueue::new(open_database(&store.db_path)?, max_attempts),
            metrics: MetricStore::new(open_database(&store.db_path)?),
        })
    }

    pub fn open_metrics(store: &StoreConfig) -> Result<MetricStore> {
        Ok(MetricStore::new(open_database(&store.db_path)?))
    }

    /// Forgets processed sites, stored metrics and the reports on disk.
    pub fn clean(&self, config: &BatchConfig) -> Result<()> {
        let sites = self.queue.reset()?;
        let metrics = self.metrics.reset()?;
        let reports = purge_reports(&config.output)?;
        info!(sites, metrics, reports, "cleaned previous batch state");
        Ok(())
    }

    pub fn enqueue_all(&self, urls: &[String], form_factors: &[FormFactor]) -> Result<usize> {
        let mut count = 0;
        for url in urls {
            for &form_factor in form_factors {
                self.queue.enqueue(url, form_factor)?;
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Drains the queue on a tokio runtime with real browser and audit tool processes.
/// Ctrl-C stops the batch after the trials in progress; the sites stay queued.
pub(crate) fn run_audits(config: &BatchConfig, queue: &SiteQueue) -> Result<BatchOutcome> {
    ensure_directory(&config.output)?;

    let context = RunContext::new(config.output.clone())?;
    let engine = LighthouseCli::new(
        config.tools.lighthouse_bin.clone(),
        config.tools.lighthouse_config_dir.clone(),
        config.tools.audit_timeout,
    )
    .with_extra_flags(config.tools.lighthouse_flags.clone());
    let browser = ChromeLauncher::new(
        config.tools.chrome_bin.clone(),
        config.tools.chrome_flags.clone(),
        config.tools.chrome_startup_timeout,
    );
    let options = RunnerOptions {
        concurrency: config.concurrency,
        runs_per_site: config.times,
    };
    let stop = StopSignal::new();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let watcher = stop.clone();
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing trials in progress");
            watcher.trigger();
        }
    });

    info!(batch_id = %context.batch_id(), verbose = config.verbose, "starting batch");
    let outcome = runtime.block_on(
        AuditRunner::new(queue, &context, &engine, &browser, options, stop.clone()).run(),
    )?;

    if stop.is_triggered() {
        bail!(
            "batch interrupted with {} sites still queued; rerun the same command to resume",
            outcome.interrupted
        );
    }
    if outcome.terminal_failures > 0 {
        warn!(
            sites = outcome.terminal_failures,
            "some sites failed and were left drained"
        );
    }

    Ok(outcome)
}

/// Summarizes after a batch. A batch in which every site failed leaves nothing to
/// average; that is logged and skipped so per-site failures never fail the command.
pub(crate) fn summarize_after_run(
    outcome: &BatchOutcome,
    output: &Path,
    times: u32,
    store: &StoreConfig,
    metrics: &MetricStore,
) -> Result<Option<SummaryOutcome>> {
    if outcome.finished == 0 && discover_reports(output)?.is_empty() {
        warn!(
            output = %output.display(),
            failed = outcome.terminal_failures,
            "no reports to summarize, every audited site failed"
        );
        return Ok(None);
    }

    summarize_reports(output, times, store, metrics).map(Some)
}

/// Aggregates the output directory and writes the summary manifest.
pub(crate) fn summarize_reports(
    output: &Path,
    times: u32,
    store: &StoreConfig,
    metrics: &MetricStore,
) -> Result<SummaryOutcome> {
    let outcome = summarize(output, times, metrics)?;
    let manifest_path = summary_manifest_path(store);
    write_json_pretty(&manifest_path, &outcome.manifest)?;
    info!(path = %manifest_path.display(), "wrote summary manifest");
    Ok(outcome)
}

fn summary_manifest_path(store: &StoreConfig) -> PathBuf {
    store.manifest_dir.join(format!(
        "summary_run_{}.json",
        utc_compact_string(chrono::Utc::now())
    ))
}
