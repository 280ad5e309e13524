use std::net::TcpListener;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use super::{BrowserEndpoint, BrowserLauncher, BrowserSession};

const LOCALHOST: &str = "127.0.0.1";
const STARTUP_POLL: Duration = Duration::from_millis(100);

/// Launches a headless Chrome with its own throwaway profile for every lease.
pub struct ChromeLauncher {
    binary: PathBuf,
    flags: Vec<String>,
    startup_timeout: Duration,
}

pub struct ChromeSession {
    child: Child,
    endpoint: BrowserEndpoint,
    profile_dir: PathBuf,
}

impl BrowserSession for ChromeSession {
    fn endpoint(&self) -> &BrowserEndpoint {
        &self.endpoint
    }
}

impl ChromeLauncher {
    pub fn new(binary: impl Into<PathBuf>, flags: Vec<String>, startup_timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            flags,
            startup_timeout,
        }
    }
}

impl BrowserLauncher for ChromeLauncher {
    type Session = ChromeSession;

    async fn open(&self) -> Result<ChromeSession> {
        let port = free_local_port()?;
        let profile_dir =
            std::env::temp_dir().join(format!("lhbatch-chrome-{}-{port}", std::process::id()));

        info!(binary = %self.binary.display(), port, "starting chrome");
        let mut command = Command::new(&self.binary);
        command
            .args(&self.flags)
            .arg(format!("--remote-debugging-port={port}"))
            .arg(format!("--user-data-dir={}", profile_dir.display()))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("about:blank")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        // Own process group: a terminal Ctrl-C reaches only lhbatch, which stops cooperatively.
        #[cfg(unix)]
        command.process_group(0);
        let mut child = command
            .spawn()
            .with_context(|| format!("failed to launch {}", self.binary.display()))?;

        let deadline = Instant::now() + self.startup_timeout;
        loop {
            if let Some(status) = child
                .try_wait()
                .context("failed to poll chrome process")?
            {
                bail!("chrome exited during startup with {status}");
            }
            if TcpStream::connect((LOCALHOST, port)).await.is_ok() {
                break;
            }
            if Instant::now() >= deadline {
                let _ = child.kill().await;
                bail!(
                    "chrome did not open debugging port {port} within {}s",
                    self.startup_timeout.as_secs()
                );
            }
            sleep(STARTUP_POLL).await;
        }

        debug!(port, "chrome ready");
        Ok(ChromeSession {
            child,
            endpoint: BrowserEndpoint {
                host: LOCALHOST.to_string(),
                port,
            },
            profile_dir,
        })
    }

    async fn close(&self, mut session: ChromeSession) -> Result<()> {
        info!(port = session.endpoint.port, "stopping chrome");
        session
            .child
            .kill()
            .await
            .context("failed to stop chrome")?;

        if session.profile_dir.exists() {
            if let Err(err) = std::fs::remove_dir_all(&session.profile_dir) {
                warn!(
                    path = %session.profile_dir.display(),
                    error = %err,
                    "failed to remove chrome profile"
                );
            }
        }

        Ok(())
    }
}

fn free_local_port() -> Result<u16> {
    let listener =
        TcpListener::bind((LOCALHOST, 0)).context("failed to reserve a local debugging port")?;
    let port = listener
        .local_addr()
        .context("failed to read reserved port")?
        .port();
    Ok(port)
}
