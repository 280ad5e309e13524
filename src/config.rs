use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};

use crate::cli::{AbBatchArgs, BatchArgs, DiffArgs, FormFactorArg, RunArgs, StoreArgs, ToolArgs};
use crate::model::FormFactor;
use crate::util::read_lines_file;

const DB_FILE_NAME: &str = "lhbatch.sqlite";
const COMPARISON_FILE_NAME: &str = "comparison.json";

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub manifest_dir: PathBuf,
}

impl StoreConfig {
    pub fn resolve(args: &StoreArgs) -> Self {
        Self {
            db_path: args
                .db_path
                .clone()
                .unwrap_or_else(|| args.cache_root.join(DB_FILE_NAME)),
            manifest_dir: args.cache_root.join("manifests"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub lighthouse_bin: PathBuf,
    pub lighthouse_config_dir: Option<PathBuf>,
    pub chrome_bin: PathBuf,
    pub chrome_flags: Vec<String>,
    pub lighthouse_flags: Vec<String>,
    pub audit_timeout: Duration,
    pub chrome_startup_timeout: Duration,
}

impl ToolConfig {
    fn resolve(args: &ToolArgs) -> Result<Self> {
        if let Some(dir) = &args.lighthouse_config_dir {
            require_directory(dir, "lighthouse config directory")?;
        }
        if args.audit_timeout_secs == 0 || args.chrome_startup_timeout_secs == 0 {
            bail!("tool timeouts must be at least one second");
        }

        Ok(Self {
            lighthouse_bin: args.lighthouse_bin.clone(),
            lighthouse_config_dir: args.lighthouse_config_dir.clone(),
            chrome_bin: args.chrome_bin.clone(),
            chrome_flags: args.chrome_flags.clone(),
            lighthouse_flags: args.lighthouse_flags.clone(),
            audit_timeout: Duration::from_secs(args.audit_timeout_secs),
            chrome_startup_timeout: Duration::from_secs(args.chrome_startup_timeout_secs),
        })
    }
}

/// Baseline and comparison deployments plus the extra paths audited on both.
#[derive(Debug, Clone)]
pub struct AbTarget {
    pub baseline_url: String,
    pub comparison_url: String,
    pub paths_file: Option<PathBuf>,
    pub comparison_path: PathBuf,
}

/// Every option a batch understands, resolved once from the command line.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub sites: Vec<String>,
    pub file: Option<PathBuf>,
    pub output: PathBuf,
    pub verbose: bool,
    pub times: u32,
    pub form_factors: Vec<FormFactor>,
    pub clean: bool,
    pub concurrency: usize,
    pub max_attempts: u32,
    pub ab: Option<AbTarget>,
    pub store: StoreConfig,
    pub tools: ToolConfig,
}

impl BatchConfig {
    pub fn from_batch_args(args: &BatchArgs, verbose: bool) -> Result<Self> {
        if args.sites.is_empty() && args.file.is_none() {
            bail!("sites or file must be specified");
        }
        if let Some(file) = &args.file {
            require_file(file, "sites file")?;
        }

        let mut config = Self::base(
            &args.run,
            &args.store,
            verbose,
            FormFactorArg::from(args.form_factor).form_factors(),
        )?;
        config.sites = args.sites.clone();
        config.file = args.file.clone();
        Ok(config)
    }

    pub fn from_ab_args(args: &AbBatchArgs, verbose: bool) -> Result<Self> {
        let ab = resolve_ab_target(
            &args.baseline_url,
            &args.comparison_url,
            args.paths_file.as_ref(),
            args.comparison_path.as_ref(),
            &args.store,
        )?;

        let mut config = Self::base(
            &args.run,
            &args.store,
            verbose,
            args.form_factor.form_factors(),
        )?;
        config.ab = Some(ab);
        Ok(config)
    }

    /// Site URLs from `--file` or `--sites`, with `https://` added to bare hosts.
    pub fn site_urls(&self) -> Result<Vec<String>> {
        let raw = match &self.file {
            Some(file) => read_lines_file(file)?,
            None => self.sites.clone(),
        };

        let mut urls = Vec::with_capacity(raw.len());
        for site in &raw {
            let site = site.trim();
            if site.is_empty() {
                continue;
            }
            let url = normalize_site_url(site);
            if url.len() <= "https://".len() {
                bail!("site url has no host: {site}");
            }
            urls.push(url);
        }

        if urls.is_empty() {
            bail!("no site urls to audit");
        }
        Ok(urls)
    }

    fn base(
        run: &RunArgs,
        store: &StoreArgs,
        verbose: bool,
        form_factors: Vec<FormFactor>,
    ) -> Result<Self> {
        if run.times == 0 {
            bail!("--times must be at least 1");
        }
        if run.concurrency == 0 {
            bail!("--concurrency must be at least 1");
        }
        if run.max_attempts == 0 {
            bail!("--max-attempts must be at least 1");
        }

        Ok(Self {
            sites: Vec::new(),
            file: None,
            output: run.output.clone(),
            verbose,
            times: run.times,
            form_factors,
            clean: run.clean,
            concurrency: run.concurrency,
            max_attempts: run.max_attempts,
            ab: None,
            store: StoreConfig::resolve(store),
            tools: ToolConfig::resolve(&run.tools)?,
        })
    }
}

/// Inputs of a standalone `diff`.
#[derive(Debug, Clone)]
pub struct DiffConfig {
    pub target: AbTarget,
    pub form_factors: Vec<FormFactor>,
    pub store: StoreConfig,
}

impl DiffConfig {
    pub fn from_args(args: &DiffArgs) -> Result<Self> {
        Ok(Self {
            target: resolve_ab_target(
                &args.baseline_url,
                &args.comparison_url,
                args.paths_file.as_ref(),
                args.comparison_path.as_ref(),
                &args.store,
            )?,
            form_factors: args.form_factor.form_factors(),
            store: StoreConfig::resolve(&args.store),
        })
    }
}

fn resolve_ab_target(
    baseline_url: &str,
    comparison_url: &str,
    paths_file: Option<&PathBuf>,
    comparison_path: Option<&PathBuf>,
    store: &StoreArgs,
) -> Result<AbTarget> {
    require_http_url(baseline_url, "baseline URL")?;
    require_http_url(comparison_url, "comparison URL")?;
    if let Some(file) = paths_file {
        require_file(file, "paths file")?;
    }

    Ok(AbTarget {
        baseline_url: baseline_url.to_string(),
        comparison_url: comparison_url.to_string(),
        paths_file: paths_file.cloned(),
        comparison_path: comparison_path
            .cloned()
            .unwrap_or_else(|| store.cache_root.join(COMPARISON_FILE_NAME)),
    })
}

pub fn normalize_site_url(site: &str) -> String {
    if has_http_scheme(site) {
        return site.to_string();
    }
    format!("https://{}", site.trim_start_matches('/'))
}

fn has_http_scheme(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn require_http_url(url: &str, label: &str) -> Result<()> {
    if !has_http_scheme(url) {
        bail!("{label} must start with http:// or https://: {url}");
    }
    Ok(())
}

fn require_file(path: &Path, label: &str) -> Result<()> {
    if !path.is_file() {
        bail!("{label} not found: {}", path.display());
    }
    Ok(())
}

fn require_directory(path: &Path, label: &str) -> Result<()> {
    if !path.is_dir() {
        bail!("{label} not found: {}", path.display());
    }
    Ok(())
}
