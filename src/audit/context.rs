use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::{Context, Result};
use chrono::Utc;
use regex::Regex;

use crate::model::FormFactor;
use crate::util::utc_compact_string;

/// Per-batch state shared by every runner worker: where reports go and the run counter
/// that keeps report file names unique within the batch.
pub struct RunContext {
    output_dir: PathBuf,
    batch_id: String,
    next_run: AtomicU64,
    scheme_prefix: Regex,
    unsafe_chars: Regex,
}

impl RunContext {
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_batch_id(output_dir, utc_compact_string(Utc::now()))
    }

    pub fn with_batch_id(output_dir: impl Into<PathBuf>, batch_id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            output_dir: output_dir.into(),
            batch_id: batch_id.into(),
            next_run: AtomicU64::new(0),
            scheme_prefix: Regex::new(r"^(?i)https?://(?:www\.)?")
                .context("failed to compile URL scheme regex")?,
            unsafe_chars: Regex::new(r"[^A-Za-z0-9_-]+")
                .context("failed to compile site slug regex")?,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn next_run_id(&self) -> u64 {
        self.next_run.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn site_slug(&self, url: &str) -> String {
        let stripped = self.scheme_prefix.replace(url, "");
        let slug = self.unsafe_chars.replace_all(&stripped, "-");
        let slug = slug.trim_matches('-');
        if slug.is_empty() {
            "site".to_string()
        } else {
            slug.to_string()
        }
    }

    /// File-name prefix shared by every report of one site and form factor.
    pub fn report_prefix(&self, url: &str, form_factor: FormFactor) -> String {
        format!("{}_report_{}_", self.site_slug(url), form_factor)
    }

    /// Allocates the next run id and returns the report path for that trial.
    pub fn report_path(&self, url: &str, form_factor: FormFactor) -> PathBuf {
        let run_id = self.next_run_id();
        self.output_dir.join(format!(
            "{}{}_{run_id}.json",
            self.report_prefix(url, form_factor),
            self.batch_id
        ))
    }
}

/// Cooperative interrupt flag. Workers finish the trial in progress, release the browser
/// and then stop picking up work.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
