use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use url::Url;

pub const MAIN_DOC_URL: &str = "https://docs.python.org/3/";
pub const PEP_DOC_URL: &str = "https://peps.python.org/";

const CONFIG_FILE: &str = "pydoc_status";
const ENV_PREFIX: &str = "PYDOC";

/// Upper bound for `max_retries`; backoff doubles on every attempt.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Status letters used by the PEP index, mapped to the page statuses they stand for.
pub const EXPECTED_STATUS: &[(&str, &[&str])] = &[
    ("A", &["Active", "Accepted"]),
    ("D", &["Deferred"]),
    ("F", &["Final"]),
    ("P", &["Provisional"]),
    ("R", &["Rejected"]),
    ("S", &["Superseded"]),
    ("W", &["Withdrawn"]),
    ("", &["Draft", "Active"]),
];

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub main_doc_url: String,
    pub pep_doc_url: String,
    pub cache_path: PathBuf,
    pub results_dir: PathBuf,
    pub downloads_dir: PathBuf,
    pub logs_dir: PathBuf,
    /// Log files kept on disk, the current one included.
    pub log_files_kept: usize,
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub user_agent: String,
}

impl Settings {
    /// Defaults, then `pydoc_status.toml` if present, then `PYDOC_*` env vars.
    pub fn load() -> Result<Self> {
        let settings: Settings = Self::builder()?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Built-in defaults only, ignoring file and environment.
    pub fn defaults() -> Result<Self> {
        let settings: Settings = Self::builder()?.build()?.try_deserialize()?;
        Ok(settings)
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(Config::builder()
            .set_default("main_doc_url", MAIN_DOC_URL)?
            .set_default("pep_doc_url", PEP_DOC_URL)?
            .set_default("cache_path", "data/http_cache.sqlite")?
            .set_default("results_dir", "results")?
            .set_default("downloads_dir", "downloads")?
            .set_default("logs_dir", "logs")?
            .set_default("log_files_kept", 5)?
            .set_default("concurrency", 10)?
            .set_default("timeout_secs", 30)?
            .set_default("max_retries", 3)?
            .set_default("backoff_ms", 2000)?
            .set_default(
                "user_agent",
                concat!("pydoc_status/", env!("CARGO_PKG_VERSION")),
            )?)
    }

    fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        if self.timeout_secs == 0 {
            bail!("timeout_secs must be at least 1");
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            bail!("max_retries must be at most {}", MAX_RETRIES_LIMIT);
        }
        self.main_url()?;
        self.pep_url()?;
        Ok(())
    }

    pub fn main_url(&self) -> Result<Url> {
        Url::parse(&self.main_doc_url)
            .with_context(|| format!("invalid main_doc_url: {}", self.main_doc_url))
    }

    pub fn pep_url(&self) -> Result<Url> {
        Url::parse(&self.pep_doc_url)
            .with_context(|| format!("invalid pep_doc_url: {}", self.pep_doc_url))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Expected page statuses for a PEP index status letter (`""` for drafts).
pub fn expected_for_letter(letter: &str) -> Option<&'static [&'static str]> {
    EXPECTED_STATUS
        .iter()
        .find(|(key, _)| *key == letter)
        .map(|(_, statuses)| *statuses)
}
