use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::{AuditEngine, BrowserEndpoint, ReportDocument};
use crate::model::FormFactor;

const STDERR_TAIL_CHARS: usize = 2000;

/// Runs the `lighthouse` CLI against an already running browser and captures the JSON
/// report from stdout.
pub struct LighthouseCli {
    binary: PathBuf,
    config_dir: Option<PathBuf>,
    extra_flags: Vec<String>,
    audit_timeout: Duration,
}

impl LighthouseCli {
    pub fn new(
        binary: impl Into<PathBuf>,
        config_dir: Option<PathBuf>,
        audit_timeout: Duration,
    ) -> Self {
        Self {
            binary: binary.into(),
            config_dir,
            extra_flags: Vec::new(),
            audit_timeout,
        }
    }

    /// Flags passed through to every `lighthouse` invocation after the form factor flags.
    pub fn with_extra_flags(mut self, flags: Vec<String>) -> Self {
        self.extra_flags = flags;
        self
    }

    fn form_factor_args(&self, form_factor: FormFactor) -> Vec<String> {
        match (&self.config_dir, form_factor) {
            (Some(dir), _) => vec![format!(
                "--config-path={}",
                dir.join(format!("lr-{form_factor}-config.js")).display()
            )],
            (None, FormFactor::Desktop) => vec!["--preset=desktop".to_string()],
            (None, FormFactor::Mobile) => vec!["--form-factor=mobile".to_string()],
        }
    }
}

impl AuditEngine for LighthouseCli {
    async fn run_audit(
        &self,
        url: &str,
        endpoint: &BrowserEndpoint,
        form_factor: FormFactor,
    ) -> Result<ReportDocument> {
        let mut command = Command::new(&self.binary);
        command
            .arg(url)
            .arg(format!("--hostname={}", endpoint.host))
            .arg(format!("--port={}", endpoint.port))
            .arg("--output=json")
            .arg("--output-path=stdout")
            .arg("--quiet")
            .args(self.form_factor_args(form_factor))
            .args(&self.extra_flags)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Keep the audit out of the terminal's process group so Ctrl-C lets it finish.
        #[cfg(unix)]
        command.process_group(0);

        debug!(url = %url, port = endpoint.port, form_factor = %form_factor, "running lighthouse");
        let output = timeout(self.audit_timeout, command.output())
            .await
            .with_context(|| {
                format!(
                    "lighthouse timed out after {}s on {url}",
                    self.audit_timeout.as_secs()
                )
            })?
            .with_context(|| format!("failed to run {}", self.binary.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .chars()
                .rev()
                .take(STDERR_TAIL_CHARS)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            bail!(
                "lighthouse exited with {} on {url}: {}",
                output.status,
                tail.trim()
            );
        }

        if output.stdout.iter().all(u8::is_ascii_whitespace) {
            bail!("lighthouse produced no report for {url}");
        }

        Ok(ReportDocument::new(output.stdout))
    }
}
