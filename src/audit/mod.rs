//! Running audits: the collaborator seams, the per-batch context and the runner that
//! drains the site queue.

use anyhow::Result;

use crate::model::FormFactor;

mod chrome;
mod context;
mod lighthouse;
mod runner;

pub use chrome::ChromeLauncher;
pub use context::{RunContext, StopSignal};
pub use lighthouse::LighthouseCli;
pub use runner::{AuditRunner, BatchOutcome, RunnerOptions};

/// Where an audit engine can reach the leased browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserEndpoint {
    pub host: String,
    pub port: u16,
}

/// Raw report bytes as produced by the audit engine.
#[derive(Debug, Clone)]
pub struct ReportDocument(Vec<u8>);

impl ReportDocument {
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[allow(async_fn_in_trait)]
pub trait AuditEngine {
    async fn run_audit(
        &self,
        url: &str,
        endpoint: &BrowserEndpoint,
        form_factor: FormFactor,
    ) -> Result<ReportDocument>;
}

pub trait BrowserSession {
    fn endpoint(&self) -> &BrowserEndpoint;
}

/// Leases a fresh browser per site. Every successful `open` is paired with a `close`.
#[allow(async_fn_in_trait)]
pub trait BrowserLauncher {
    type Session: BrowserSession;

    async fn open(&self) -> Result<Self::Session>;

    async fn close(&self, session: Self::Session) -> Result<()>;
}
