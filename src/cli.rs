use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::model::FormFactor;

#[derive(Parser, Debug)]
#[command(
    name = "lhbatch",
    version,
    about = "Resumable batch Lighthouse audits with A/B metric comparison"
)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Audit every passed site a given number of times
    Batch(BatchArgs),
    /// Audit a baseline and a comparison deployment, then diff their averaged metrics
    AbBatch(AbBatchArgs),
    /// Average the reports in the output directory into the metric store
    Summarize(SummarizeArgs),
    /// Diff stored metrics of two deployments
    Diff(DiffArgs),
    /// Show queue and metric store state
    Status(StatusArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum FormFactorArg {
    Desktop,
    Mobile,
    Both,
}

impl FormFactorArg {
    pub fn form_factors(self) -> Vec<FormFactor> {
        match self {
            Self::Desktop => vec![FormFactor::Desktop],
            Self::Mobile => vec![FormFactor::Mobile],
            Self::Both => vec![FormFactor::Desktop, FormFactor::Mobile],
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum SingleFormFactorArg {
    Desktop,
    Mobile,
}

impl From<SingleFormFactorArg> for FormFactorArg {
    fn from(value: SingleFormFactorArg) -> Self {
        match value {
            SingleFormFactorArg::Desktop => Self::Desktop,
            SingleFormFactorArg::Mobile => Self::Mobile,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    #[arg(long, default_value = ".cache/lhbatch")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ToolArgs {
    #[arg(long, default_value = "lighthouse")]
    pub lighthouse_bin: PathBuf,

    /// Directory holding lr-desktop-config.js / lr-mobile-config.js
    #[arg(long)]
    pub lighthouse_config_dir: Option<PathBuf>,

    #[arg(long, default_value = "google-chrome")]
    pub chrome_bin: PathBuf,

    #[arg(
        long = "chrome-flag",
        allow_hyphen_values = true,
        default_values_t = ["--headless".to_string(), "--disable-gpu".to_string()]
    )]
    pub chrome_flags: Vec<String>,

    /// Extra flag passed to every lighthouse run, e.g. --lighthouse-flag=--throttling-method=devtools
    #[arg(long = "lighthouse-flag", allow_hyphen_values = true)]
    pub lighthouse_flags: Vec<String>,

    #[arg(long, default_value_t = 180)]
    pub audit_timeout_secs: u64,

    #[arg(long, default_value_t = 30)]
    pub chrome_startup_timeout_secs: u64,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// The output folder to place reports
    #[arg(short, long, default_value = "reports")]
    pub output: PathBuf,

    /// Number of times to run Lighthouse on each url
    #[arg(short, long, default_value_t = 1)]
    pub times: u32,

    /// Forget processed sites, stored metrics and reports before auditing
    #[arg(long, default_value_t = false)]
    pub clean: bool,

    /// Number of sites audited at the same time
    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,

    /// Attempts per site before an errored site is left drained
    #[arg(long, default_value_t = 1)]
    pub max_attempts: u32,

    #[command(flatten)]
    pub tools: ToolArgs,
}

#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// Site urls to analyze
    #[arg(short, long, num_args = 1.., conflicts_with = "file")]
    pub sites: Vec<String>,

    /// An input file with a site url per line
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = SingleFormFactorArg::Desktop)]
    pub form_factor: SingleFormFactorArg,

    #[command(flatten)]
    pub run: RunArgs,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Debug, Clone)]
pub struct AbBatchArgs {
    /// The URL to compare results against
    pub baseline_url: String,

    /// The URL whose results are compared with the baseline
    pub comparison_url: String,

    /// Extra paths to audit on both deployments, one per line
    #[arg(long)]
    pub paths_file: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = FormFactorArg::Both)]
    pub form_factor: FormFactorArg,

    #[arg(long)]
    pub comparison_path: Option<PathBuf>,

    #[command(flatten)]
    pub run: RunArgs,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Debug, Clone)]
pub struct SummarizeArgs {
    #[arg(short, long, default_value = "reports")]
    pub output: PathBuf,

    /// Number of runs requested per site; averages divide by this
    #[arg(short, long, default_value_t = 1)]
    pub times: u32,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Debug, Clone)]
pub struct DiffArgs {
    pub baseline_url: String,

    pub comparison_url: String,

    #[arg(long)]
    pub paths_file: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = FormFactorArg::Both)]
    pub form_factor: FormFactorArg,

    #[arg(long)]
    pub comparison_path: Option<PathBuf>,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub store: StoreArgs,
}
