use anyhow::Result;
use tracing::info;

use crate::cli::DiffArgs;
use crate::commands::batch::Stores;
use crate::config::{AbTarget, DiffConfig};
use crate::diff::{diff, load_paths};
use crate::model::FormFactor;
use crate::store::MetricStore;
use crate::util::write_json_pretty;

pub fn run(args: DiffArgs) -> Result<()> {
    let config = DiffConfig::from_args(&args)?;
    let paths = match &config.target.paths_file {
        Some(file) => load_paths(file)?,
        None => Vec::new(),
    };

    let metrics = Stores::open_metrics(&config.store)?;
    write_comparison(&metrics, &config.target, &paths, &config.form_factors)
}

pub(crate) fn write_comparison(
    metrics: &MetricStore,
    target: &AbTarget,
    paths: &[String],
    form_factors: &[FormFactor],
) -> Result<()> {
    let document = diff(
        metrics,
        &target.baseline_url,
        &target.comparison_url,
        paths,
        form_factors,
    )?;
    write_json_pretty(&target.comparison_path, &document)?;

    info!(
        path = %target.comparison_path.display(),
        records = document.records.len(),
        warnings = document.warnings.len(),
        "wrote comparison document"
    );
    Ok(())
}
