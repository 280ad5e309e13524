use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormFactor {
    Desktop,
    Mobile,
}

impl FormFactor {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
        }
    }
}

impl fmt::Display for FormFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormFactor {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "desktop" => Ok(Self::Desktop),
            "mobile" => Ok(Self::Mobile),
            other => bail!("unknown form factor: {other}"),
        }
    }
}

/// Lifecycle of a queued site. Only `Finished` and `ErroredTerminal` count as drained.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteStatus {
    Pending,
    InFlight,
    Finished,
    ErroredRetryable,
    ErroredTerminal,
}

impl SiteStatus {
    pub const ALL: [SiteStatus; 5] = [
        Self::Pending,
        Self::InFlight,
        Self::Finished,
        Self::ErroredRetryable,
        Self::ErroredTerminal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Finished => "finished",
            Self::ErroredRetryable => "errored_retryable",
            Self::ErroredTerminal => "errored_terminal",
        }
    }

    pub fn is_drained(self) -> bool {
        matches!(self, Self::Finished | Self::ErroredTerminal)
    }
}

impl FromStr for SiteStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| anyhow::anyhow!("unknown site status: {value}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteWorkItem {
    pub url: String,
    pub form_factor: FormFactor,
    pub status: SiteStatus,
    pub has_error: bool,
    pub attempts: u32,
}

impl SiteWorkItem {
    pub fn finished(&self) -> bool {
        self.status.is_drained()
    }
}

/// A console error surfaced by the audit; `description` is its identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleError {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[cfg(test)]
impl ConsoleError {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            source: None,
            url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedSiteMetric {
    pub url: String,
    pub form_factor: FormFactor,
    pub metrics: BTreeMap<String, f64>,
    /// `numericUnit` of each audit, as reported by Lighthouse.
    pub units: BTreeMap<String, String>,
    pub errors: Vec<ConsoleError>,
    pub run_count: u32,
    pub report_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditDelta {
    pub previous: f64,
    pub current: f64,
    pub delta_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffRecord {
    pub path: String,
    pub form_factor: FormFactor,
    pub baseline_url: String,
    pub comparison_url: String,
    pub audits: BTreeMap<String, AuditDelta>,
    pub new_errors: Vec<ConsoleError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonDocument {
    pub document_version: u32,
    pub generated_at: String,
    pub baseline_url: String,
    pub comparison_url: String,
    pub records: Vec<DiffRecord>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryReportEntry {
    pub file: String,
    pub url: String,
    pub form_factor: FormFactor,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub report_directory: String,
    pub run_count: u32,
    pub report_count: usize,
    pub site_count: usize,
    pub reports: Vec<SummaryReportEntry>,
    pub warnings: Vec<String>,
}
