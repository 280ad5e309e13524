use anyhow::Result;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, error, info, warn};

use super::{AuditEngine, BrowserLauncher, BrowserSession, RunContext, StopSignal};
use crate::model::SiteWorkItem;
use crate::report::discard_site_reports;
use crate::store::SiteQueue;
use crate::util::write_file_atomic;

#[derive(Debug, Clone, Copy)]
pub struct RunnerOptions {
    pub concurrency: usize,
    pub runs_per_site: u32,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            runs_per_site: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub passes: u32,
    pub finished: usize,
    pub failed_attempts: usize,
    pub terminal_failures: usize,
    pub interrupted: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SiteOutcome {
    Finished,
    Errored { retryable: bool },
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrialLoop {
    Completed,
    Failed { run: u32 },
    Interrupted { completed: u32 },
}

/// Drains the site queue: one browser lease per site, `runs_per_site` sequential trials
/// inside it, at most `concurrency` sites in flight.
///
/// A failed trial aborts the remaining trials for that site. The site is marked errored
/// and the queue decides whether it is retried in a later pass or left drained.
pub struct AuditRunner<'a, E, B> {
    queue: &'a SiteQueue,
    context: &'a RunContext,
    engine: &'a E,
    browser: &'a B,
    options: RunnerOptions,
    stop: StopSignal,
}

impl<'a, E, B> AuditRunner<'a, E, B>
where
    E: AuditEngine,
    B: BrowserLauncher,
{
    pub fn new(
        queue: &'a SiteQueue,
        context: &'a RunContext,
        engine: &'a E,
        browser: &'a B,
        options: RunnerOptions,
        stop: StopSignal,
    ) -> Self {
        Self {
            queue,
            context,
            engine,
            browser,
            options,
            stop,
        }
    }

    pub async fn run(&self) -> Result<BatchOutcome> {
        let concurrency = self.options.concurrency.max(1);
        let mut outcome = BatchOutcome::default();

        loop {
            let pending = self.queue.pending()?;
            if pending.is_empty() {
                break;
            }
            if self.stop.is_triggered() {
                outcome.interrupted += pending.len();
                break;
            }

            outcome.passes += 1;
            info!(
                pass = outcome.passes,
                sites = pending.len(),
                runs = self.options.runs_per_site,
                concurrency,
                "auditing pending sites"
            );

            let results: Vec<SiteOutcome> = stream::iter(pending.iter())
                .map(|site| self.audit_site(site))
                .buffer_unordered(concurrency)
                .try_collect()
                .await?;

            let mut retryable = 0usize;
            for result in results {
                match result {
                    SiteOutcome::Finished => outcome.finished += 1,
                    SiteOutcome::Errored { retryable: true } => {
                        outcome.failed_attempts += 1;
                        retryable += 1;
                    }
                    SiteOutcome::Errored { retryable: false } => {
                        outcome.failed_attempts += 1;
                        outcome.terminal_failures += 1;
                    }
                    SiteOutcome::Interrupted => outcome.interrupted += 1,
                }
            }

            if retryable == 0 || self.stop.is_triggered() {
                break;
            }
            info!(sites = retryable, "retrying errored sites");
        }

        info!(
            passes = outcome.passes,
            finished = outcome.finished,
            failed_attempts = outcome.failed_attempts,
            terminal_failures = outcome.terminal_failures,
            interrupted = outcome.interrupted,
            "batch run complete"
        );

        Ok(outcome)
    }

    async fn audit_site(&self, site: &SiteWorkItem) -> Result<SiteOutcome> {
        let url = site.url.as_str();
        let form_factor = site.form_factor;

        if self.stop.is_triggered() {
            return Ok(SiteOutcome::Interrupted);
        }

        info!(url = %url, form_factor = %form_factor, attempt = site.attempts + 1, "auditing site");
        self.queue.mark_in_flight(url, form_factor)?;
        // Anything already on disk for a pending site is from an attempt that never finished.
        discard_site_reports(
            self.context.output_dir(),
            &self.context.report_prefix(url, form_factor),
            url,
            form_factor,
        )?;

        let session = match self.browser.open().await {
            Ok(session) => session,
            Err(err) => {
                error!(
                    url = %url,
                    form_factor = %form_factor,
                    error = %format!("{err:#}"),
                    "failed to launch browser"
                );
                return self.record_failure(site);
            }
        };

        let trials = self.run_trials(site, session.endpoint()).await;

        if let Err(err) = self.browser.close(session).await {
            warn!(
                url = %url,
                form_factor = %form_factor,
                error = %format!("{err:#}"),
                "failed to close browser"
            );
        }

        match trials? {
            TrialLoop::Completed => {
                self.queue.mark_finished(url, form_factor)?;
                Ok(SiteOutcome::Finished)
            }
            TrialLoop::Failed { run } => {
                warn!(
                    url = %url,
                    form_factor = %form_factor,
                    run,
                    skipped = self.options.runs_per_site - run,
                    "aborting remaining trials after failure"
                );
                self.record_failure(site)
            }
            TrialLoop::Interrupted { completed } => {
                warn!(
                    url = %url,
                    form_factor = %form_factor,
                    completed,
                    "interrupted, site returned to queue"
                );
                self.queue.requeue(url, form_factor)?;
                Ok(SiteOutcome::Interrupted)
            }
        }
    }

    async fn run_trials(
        &self,
        site: &SiteWorkItem,
        endpoint: &super::BrowserEndpoint,
    ) -> Result<TrialLoop> {
        let runs = self.options.runs_per_site;

        for run in 1..=runs {
            if run > 1 && self.stop.is_triggered() {
                return Ok(TrialLoop::Interrupted {
                    completed: run - 1,
                });
            }

            debug!(url = %site.url, run, runs, "starting trial");
            match self
                .engine
                .run_audit(&site.url, endpoint, site.form_factor)
                .await
            {
                Ok(document) => {
                    let path = self.context.report_path(&site.url, site.form_factor);
                    write_file_atomic(&path, document.as_bytes())?;
                    debug!(url = %site.url, run, path = %path.display(), "wrote report");
                }
                Err(err) if self.stop.is_triggered() => {
                    // A trial that dies once the stop flag is set is treated as interrupted.
                    warn!(url = %site.url, run, error = %format!("{err:#}"), "trial cut short by interrupt");
                    return Ok(TrialLoop::Interrupted {
                        completed: run - 1,
                    });
                }
                Err(err) => {
                    error!(
                        url = %site.url,
                        form_factor = %site.form_factor,
                        run,
                        error = %format!("{err:#}"),
                        "audit trial failed"
                    );
                    return Ok(TrialLoop::Failed { run });
                }
            }
        }

        Ok(TrialLoop::Completed)
    }

    fn record_failure(&self, site: &SiteWorkItem) -> Result<SiteOutcome> {
        self.queue.mark_errored(&site.url, site.form_factor)?;
        let retryable = self
            .queue
            .get(&site.url, site.form_factor)?
            .is_some_and(|item| !item.finished());
        Ok(SiteOutcome::Errored { retryable })
    }
}
