use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::StatusArgs;
use crate::config::StoreConfig;
use crate::report::PERFORMANCE_METRIC;
use crate::store::{MetricStore, SiteQueue, open_database};

pub fn run(args: StatusArgs) -> Result<()> {
    let store = StoreConfig::resolve(&args.store);

    info!(cache_root = %args.store.cache_root.display(), "status requested");

    if !store.db_path.exists() {
        warn!(path = %store.db_path.display(), "database file missing");
        return Ok(());
    }

    let queue = SiteQueue::new(open_database(&store.db_path)?, 1);
    let counts = queue.counts()?;
    info!(
        path = %store.db_path.display(),
        pending = counts.pending,
        in_flight = counts.in_flight,
        finished = counts.finished,
        errored_retryable = counts.errored_retryable,
        errored_terminal = counts.errored_terminal,
        with_errors = counts.with_errors,
        "site queue status"
    );

    for item in queue.pending()? {
        debug!(
            url = %item.url,
            form_factor = %item.form_factor,
            status = %item.status.as_str(),
            attempts = item.attempts,
            "still queued"
        );
    }

    let metrics = MetricStore::new(open_database(&store.db_path)?);
    info!(sites = metrics.count()?, "metric store status");

    for metric in metrics.list()? {
        debug!(
            url = %metric.url,
            form_factor = %metric.form_factor,
            performance = metric.metrics.get(PERFORMANCE_METRIC).copied().unwrap_or_default(),
            reports = metric.report_count,
            runs = metric.run_count,
            "stored metric"
        );
    }

    Ok(())
}
